//! sayso binary — composition root.
//!
//! Wires the pipeline together with explicit construction (no global
//! singletons):
//! 1. Load configuration from TOML, apply env overrides
//! 2. Rebuild the whitelist and ensure fingerprints exist (startup)
//! 3. Build the matcher (ONNX model if installed, hash fallback otherwise)
//! 4. Register built-in callable modules and open the audit log
//! 5. Dispatch one instruction (operand, --call, or interactive prompt)

mod builtin;
mod cli;
mod console;

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use sayso_core::SaysoConfig;
use sayso_dispatch::{
    ActionRegistry, ArgMap, AuditLog, CallableRegistry, DispatchOutcome, Dispatcher,
};
use sayso_match::embedding::DynEmbedder;
use sayso_match::{FingerprintIndex, HashEmbedder, IntentMatcher, OnnxEmbedder};

use cli::CliArgs;
use console::ConsoleConfirmation;

/// Pick the embedding backend: the configured ONNX model if it loads,
/// otherwise the deterministic hash fallback.
fn build_embedder(model_dir: &str) -> Box<dyn DynEmbedder> {
    match OnnxEmbedder::from_directory(Path::new(model_dir)) {
        Ok(embedder) => Box::new(embedder),
        Err(e) => {
            tracing::warn!(
                model_dir = %model_dir,
                error = %e,
                "ONNX model unavailable; falling back to hash fingerprints"
            );
            Box::new(HashEmbedder::new())
        }
    }
}

/// Prompt for one instruction on stdin.
fn read_instruction() -> Option<String> {
    print!("Instruction: ");
    std::io::stdout().flush().ok()?;
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let trimmed = line.trim().to_string();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        }
    }
}

/// Parse the --args-json payload into named arguments.
fn parse_named_args(raw: Option<&str>) -> Result<ArgMap, serde_json::Error> {
    match raw {
        Some(raw) => {
            let object: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)?;
            Ok(object.into_iter().collect())
        }
        None => Ok(ArgMap::new()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Tracing: RUST_LOG wins, then --log-level, then "info".
    let fallback_level = args.log_level.clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback_level)),
        )
        .init();

    tracing::info!("Starting sayso v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_path = args.resolve_config_path();
    let mut config = SaysoConfig::load_or_default(&config_path);
    config.apply_env_overrides();

    // Registry over the action source directory.
    let registry = Arc::new(ActionRegistry::new(
        &config.actions.dir,
        &config.actions.extension,
        &config.matcher.whitelist_path,
    ));

    // Embedding backend, chosen once and shared by index build + matching.
    let embedder = build_embedder(&config.matcher.model_dir);
    let index_path = Path::new(&config.matcher.index_path);

    // Startup maintenance: the rebuild is cheap and idempotent, so it runs
    // on every launch unless explicitly skipped; fingerprints are only
    // regenerated when missing or forced.
    let mut prebuilt_index = None;
    if !args.no_startup {
        if args.reindex {
            tracing::info!("Re-indexing action source");
        }
        let entries = registry.rebuild()?;

        if args.regen_fingerprints || !index_path.exists() {
            tracing::info!(actions = entries.len(), "Generating fingerprints");
            let index = FingerprintIndex::build(
                entries.iter().map(|e| e.id.clone()).collect(),
                entries.iter().map(|e| e.description.clone()).collect(),
                embedder.as_ref(),
            )
            .await?;
            index.save(index_path)?;
            prebuilt_index = Some(index);
        }
    }

    let matcher = Arc::new(IntentMatcher::new_dyn(embedder));
    match prebuilt_index {
        Some(index) => matcher.install_index(index),
        None => {
            if let Err(e) = matcher.load_index(index_path) {
                tracing::warn!(error = %e, "Fingerprint index not loaded; matching disabled");
            }
        }
    }

    // Callable modules, audit log, confirmation channel.
    let callables = Arc::new(CallableRegistry::new());
    builtin::register_builtins(&callables);

    let audit = Arc::new(AuditLog::open(&config.audit.log_path)?);

    let dispatcher = Dispatcher::new(
        registry,
        matcher,
        callables,
        audit,
        Arc::new(ConsoleConfirmation),
        &config,
    );

    // One dispatch session per invocation.
    let outcome: DispatchOutcome = if let Some(action_id) = args.call.as_deref() {
        let named_args = parse_named_args(args.args_json.as_deref())?;
        dispatcher.dispatch_structured(action_id, named_args).await?
    } else {
        let instruction = match args.instruction.clone().or_else(read_instruction) {
            Some(instruction) => instruction,
            None => {
                tracing::info!("No instruction given; exiting");
                return Ok(());
            }
        };
        dispatcher.dispatch_text(&instruction).await?
    };

    println!("{}", outcome.message);
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
