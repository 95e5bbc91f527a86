use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use plate_origin::config::EngineConfig;
use plate_origin::fusion::VisualSignalRecord;
use plate_origin::session::PlateOriginEngine;
use plate_origin::store::GrammarStore;
use plate_origin::{PlateOriginError, Result};

const USAGE: &str = "usage: plate-origin [--config FILE] <GRAMMARS.json | -> <TEXT> [SIGNALS.json]\n\
    A grammar path of '-' uses grammar_path from the configuration.";

struct Arguments {
    config: Option<PathBuf>,
    grammars: Option<PathBuf>,
    text: String,
    signals: Option<PathBuf>,
}

fn parse_arguments() -> Option<Arguments> {
    let mut config = None;
    let mut positional = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config = Some(PathBuf::from(args.next()?)),
            "--help" | "-h" => return None,
            _ => positional.push(arg),
        }
    }
    let mut positional = positional.into_iter();
    let grammars = positional.next()?;
    let text = positional.next()?;
    let signals = positional.next().map(PathBuf::from);
    if positional.next().is_some() {
        return None;
    }
    Some(Arguments {
        config,
        grammars: (grammars != "-").then(|| PathBuf::from(grammars)),
        text,
        signals,
    })
}

fn read_signals(path: &Path) -> Result<Vec<VisualSignalRecord>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| PlateOriginError::Ingestion(format!("cannot read {}: {e}", path.display())))?;
    Ok(serde_json::from_str(&json)?)
}

fn run(arguments: Arguments) -> Result<()> {
    let config = EngineConfig::load(arguments.config.as_deref())?;
    let grammar_path = arguments
        .grammars
        .or_else(|| config.grammar_path.clone())
        .ok_or_else(|| PlateOriginError::Config("no grammar database given".into()))?;
    let store = GrammarStore::from_json_file(&grammar_path)?;
    info!(path = %grammar_path.display(), grammars = store.len(), "using grammar database");
    let engine = PlateOriginEngine::new(Arc::new(store), config)?;

    let mut session = engine.session();
    session.add_text(&arguments.text)?;
    if let Some(path) = &arguments.signals {
        for record in read_signals(path)? {
            // a bad signal is reported and skipped, the rest still count
            if let Err(e) = session.add_visual_record(record) {
                error!(error = %e, "skipping visual signal");
            }
        }
    }
    let ranked = session.current_result();
    println!("{}", serde_json::to_string_pretty(ranked)?);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("plate_origin=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(arguments) = parse_arguments() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    match run(arguments) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
