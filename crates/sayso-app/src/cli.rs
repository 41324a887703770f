//! CLI argument definitions for the sayso binary.
//!
//! Uses `clap` with derive macros. Priority resolution:
//! CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// sayso — dispatch natural-language instructions to whitelisted actions.
#[derive(Parser, Debug)]
#[command(name = "sayso", version, about)]
pub struct CliArgs {
    /// Free-form instruction to dispatch. Prompts interactively if omitted.
    pub instruction: Option<String>,

    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Dispatch a pre-resolved action id through the in-process callable
    /// strategy instead of matching free text.
    #[arg(long = "call", value_name = "ACTION_ID", conflicts_with = "instruction")]
    pub call: Option<String>,

    /// Named arguments for --call, as a JSON object.
    #[arg(long = "args-json", value_name = "JSON", requires = "call")]
    pub args_json: Option<String>,

    /// Force a whitelist rebuild on startup.
    #[arg(long = "reindex")]
    pub reindex: bool,

    /// Regenerate fingerprints from action descriptions on startup.
    #[arg(long = "regen-fingerprints")]
    pub regen_fingerprints: bool,

    /// Skip whitelist/fingerprint maintenance on startup.
    #[arg(long = "no-startup")]
    pub no_startup: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SAYSO_CONFIG env var > ~/.sayso/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SAYSO_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".sayso").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".sayso").join("config.toml");
    }
    PathBuf::from("config.toml")
}
