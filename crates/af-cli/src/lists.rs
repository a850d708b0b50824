use std::fs;
use std::path::Path;
use std::sync::Arc;

use af_filter::{AdFilter, DownloadEvent, EngineConfig, MemoryStore};
use clap::Args;

/// Where the engine's filters come from.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Filter list files
    #[arg(short, long)]
    pub list: Vec<String>,

    /// Engine configuration (JSON)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Extra user rule, may be repeated
    #[arg(long = "rule")]
    pub rules: Vec<String>,
}

pub fn read_config(path: Option<&str>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read config '{}': {}", path, e))?;
            EngineConfig::from_json(&json).map_err(|e| format!("Invalid config '{}': {}", path, e))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Build an engine and install every list given on the command line, plus
/// configured filters whose URL names a local file.
pub fn build_engine(args: &EngineArgs) -> Result<AdFilter, String> {
    let mut config = read_config(args.config.as_deref())?;
    config.custom_rules.extend(args.rules.iter().cloned());

    let engine = AdFilter::new(&config, Arc::new(MemoryStore::new()))
        .map_err(|e| format!("Failed to build engine: {}", e))?;

    for filter in &config.filters {
        let path = filter.url.strip_prefix("file://").unwrap_or(&filter.url);
        if Path::new(path).is_file() {
            install(&engine, &filter.url, path)?;
        } else {
            log::warn!("skipping filter {}: not a local file", filter.url);
        }
    }
    for path in &args.list {
        install(&engine, path, path)?;
    }

    Ok(engine)
}

/// Feed a list file through the download lifecycle, as the app's download
/// worker would.
fn install(engine: &AdFilter, url: &str, path: &str) -> Result<(), String> {
    let data = fs::read(path).map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    let name = Path::new(path)
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .into_owned();

    let manager = engine.manager();
    let id = manager.add_filter(url, &name);
    for event in [
        DownloadEvent::Enqueued,
        DownloadEvent::Started,
        DownloadEvent::Installing,
        DownloadEvent::Succeeded { data },
    ] {
        manager
            .handle_download_event(&id, event)
            .map_err(|e| format!("Failed to install '{}': {}", path, e))?;
    }
    Ok(())
}
