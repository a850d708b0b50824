//! adfilter Filter List Compiler
//!
//! This crate turns EasyList-style filter-list text into the immutable
//! [`RuleIndex`](af_core::RuleIndex) queried by the matching core.

pub mod builder;
pub mod optimizer;
pub mod parser;

pub use builder::{build_index, compile_filter_list, CompileStats};
pub use optimizer::{optimize_rules, OptimizeStats};
pub use parser::{parse_filter_list, parse_line, MalformedLine, MalformedReason, ParseOutput, ParsedLine};
