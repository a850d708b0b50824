//! adfilter CLI
//!
//! CLI tool for compiling filter lists and querying the matching engine.

mod lists;

use std::fs;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use af_compiler::compile_filter_list;
use af_core::elemhide::ElementHiding;
use af_core::types::{MatchDecision, MatchResult, RequestType};
use af_filter::DEFAULT_BRIDGE_NAME;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use lists::{build_engine, EngineArgs};

#[derive(Parser)]
#[command(name = "af-cli")]
#[command(about = "adfilter filter list compiler and tools")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile filter lists and report statistics
    Compile {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,
    },

    /// Classify a single request
    Classify {
        #[command(flatten)]
        engine: EngineArgs,

        /// Request URL
        #[arg(short, long)]
        url: String,

        /// URL of the document issuing the request
        #[arg(short, long, default_value = "")]
        document: String,

        /// Resource type (script, image, sub_frame, ...)
        #[arg(short = 't', long = "type", default_value = "other")]
        request_type: String,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the element hiding stylesheet for a document
    Stylesheet {
        #[command(flatten)]
        engine: EngineArgs,

        /// Document URL
        #[arg(short, long)]
        document: String,

        /// Print only the CSS injection rules, as a JSON array
        #[arg(long)]
        css_rules: bool,
    },

    /// Print the script hiding elements that loaded a blocked resource
    HideScript {
        /// Blocked resource URL; omit to print the page-level script
        #[arg(short, long)]
        url: Option<String>,

        /// JavaScript bridge object name
        #[arg(long, default_value = DEFAULT_BRIDGE_NAME)]
        bridge: String,

        /// Emit console logging in the script
        #[arg(long)]
        debug: bool,
    },

    /// Classify requests from a JSON-lines file (or stdin) and print JSON lines
    Batch {
        #[command(flatten)]
        engine: EngineArgs,

        /// Request file, one {"url", "documentUrl", "type"} object per line
        #[arg(short, long)]
        input: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = match cli.command {
        Commands::Compile { input } => cmd_compile(&input),
        Commands::Classify {
            engine,
            url,
            document,
            request_type,
            json,
        } => cmd_classify(&engine, &url, &document, &request_type, json),
        Commands::Stylesheet {
            engine,
            document,
            css_rules,
        } => cmd_stylesheet(&engine, &document, css_rules),
        Commands::HideScript { url, bridge, debug } => cmd_hide_script(url.as_deref(), &bridge, debug),
        Commands::Batch { engine, input } => cmd_batch(&engine, input.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_compile(inputs: &[String]) -> Result<(), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    for path in inputs {
        let start = Instant::now();
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let (index, stats) = compile_filter_list(&content)
            .map_err(|e| format!("Failed to compile '{}': {}", path, e))?;
        let elapsed = start.elapsed();

        let opt = stats.optimize;
        println!(
            "{}",
            Path::new(path).file_name().unwrap_or_default().to_string_lossy()
        );
        println!(
            "  Lines:    {} ({} comments, {} malformed)",
            stats.lines, stats.comments, stats.malformed
        );
        println!(
            "  Rules:    {} -> {} (dedupe {}, badfilter {} incl {})",
            opt.before,
            opt.after,
            opt.deduped,
            opt.badfiltered_rules + opt.badfilter_rules,
            opt.badfilter_rules
        );
        println!(
            "  Network:  {} in {} buckets, {} unbucketed",
            stats.network_rules, stats.buckets, stats.fallback_rules
        );
        println!("  Hiding:   {} selectors, {} css rules", stats.hide_rules, stats.style_rules);
        println!("  Indexed:  {} rules", index.rule_count());
        println!("  Time:     {:.1}ms", elapsed.as_secs_f64() * 1000.0);
    }

    Ok(())
}

/// One classified request, as printed by `classify --json` and `batch`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Verdict<'a> {
    url: &'a str,
    decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
}

impl<'a> Verdict<'a> {
    fn new(url: &'a str, result: &'a MatchResult) -> Self {
        let matched = result.matched_rule.as_ref();
        Self {
            url,
            decision: match result.decision {
                MatchDecision::Allow => "allow",
                MatchDecision::Block => "block",
            },
            rule: matched.map(|m| m.rule.raw.as_str()),
            filter: matched.map(|m| m.filter_id.as_str()),
        }
    }
}

fn cmd_classify(
    args: &EngineArgs,
    url: &str,
    document: &str,
    request_type: &str,
    json: bool,
) -> Result<(), String> {
    let engine = build_engine(args)?;
    let result = engine.classify(url, document, RequestType::from_str(request_type));
    let verdict = Verdict::new(url, &result);

    if json {
        let line = serde_json::to_string(&verdict).map_err(|e| e.to_string())?;
        println!("{line}");
        return Ok(());
    }

    println!("{}", verdict.decision.to_uppercase());
    if let Some(matched) = &result.matched_rule {
        println!("  Rule:     {} ({:?})", matched.rule.raw, matched.rule.kind);
        println!("  Filter:   {}", matched.filter_id);
    }
    Ok(())
}

fn cmd_stylesheet(args: &EngineArgs, document: &str, css_rules: bool) -> Result<(), String> {
    let engine = build_engine(args)?;
    if css_rules {
        println!("{}", engine.css_rules_json(document));
        return Ok(());
    }

    match engine.hiding_style_sheet(document) {
        Some(css) => println!("{css}"),
        None => eprintln!("No hiding selectors apply to {document}"),
    }
    Ok(())
}

fn cmd_hide_script(url: Option<&str>, bridge: &str, debug: bool) -> Result<(), String> {
    let hiding = ElementHiding::new(bridge, debug);
    match url {
        Some(url) => {
            let script = hiding
                .element_hiding_script(url)
                .map_err(|e| format!("Cannot build hiding script: {}", e))?;
            println!("{script}");
        }
        None => println!("{}", hiding.page_script()),
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    url: String,
    #[serde(default)]
    document_url: String,
    #[serde(default, rename = "type")]
    request_type: String,
}

fn cmd_batch(args: &EngineArgs, input: Option<&str>) -> Result<(), String> {
    let engine = build_engine(args)?;

    let reader: Box<dyn BufRead> = match input {
        Some(path) => {
            let file = fs::File::open(path)
                .map_err(|e| format!("Failed to open '{}': {}", path, e))?;
            Box::new(io::BufReader::new(file))
        }
        None => Box::new(io::stdin().lock()),
    };
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    let start = Instant::now();
    let (mut total, mut blocked, mut skipped) = (0usize, 0usize, 0usize);
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Failed to read input: {}", e))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let request: BatchRequest = match serde_json::from_str(trimmed) {
            Ok(request) => request,
            Err(e) => {
                log::warn!("line {}: {}", idx + 1, e);
                skipped += 1;
                continue;
            }
        };

        let request_type = RequestType::from_str(&request.request_type);
        let result = engine.classify(&request.url, &request.document_url, request_type);
        total += 1;
        if result.blocked() {
            blocked += 1;
        }

        let json = serde_json::to_string(&Verdict::new(&request.url, &result))
            .map_err(|e| e.to_string())?;
        writeln!(out, "{json}").map_err(|e| format!("Failed to write output: {}", e))?;
    }
    out.flush().map_err(|e| format!("Failed to write output: {}", e))?;

    eprintln!(
        "Classified {} requests ({} blocked, {} skipped) in {:.1}ms",
        total,
        blocked,
        skipped,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}
