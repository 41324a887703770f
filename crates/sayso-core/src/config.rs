use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, SaysoError};

/// Environment variable overriding the confidence threshold.
pub const ENV_CONF_THRESHOLD: &str = "SAYSO_CONF_THRESH";
/// Environment variable overriding the audit log path.
pub const ENV_AUDIT_LOG: &str = "SAYSO_AUDIT_LOG";

/// Top-level configuration for the sayso dispatcher.
///
/// Loaded from `~/.sayso/config.toml` by default. Each section corresponds
/// to one pipeline concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaysoConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub actions: ActionSourceConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl SaysoConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SaysoConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SaysoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Apply environment-variable overrides on top of the loaded file.
    ///
    /// `SAYSO_CONF_THRESH` overrides the confidence threshold and
    /// `SAYSO_AUDIT_LOG` overrides the audit log path. Unparseable values
    /// are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var(ENV_CONF_THRESHOLD) {
            match raw.parse::<f32>() {
                Ok(v) if (0.0..=1.0).contains(&v) => self.matcher.confidence_threshold = v,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_CONF_THRESHOLD),
            }
        }
        if let Ok(path) = std::env::var(ENV_AUDIT_LOG) {
            if !path.is_empty() {
                self.audit.log_path = path;
            }
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory holding persisted state (whitelist, fingerprint index).
    pub state_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_dir: "state".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Action source collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSourceConfig {
    /// Directory containing the executable action units.
    pub dir: String,
    /// Canonical extension identifying action units (without the dot).
    pub extension: String,
    /// Interpreter used to spawn subprocess actions.
    pub interpreter: String,
    /// Subprocess timeout in seconds; 0 disables the timeout.
    pub timeout_secs: u64,
}

impl ActionSourceConfig {
    /// The effective subprocess timeout, if one is configured.
    pub fn timeout(&self) -> Option<std::time::Duration> {
        (self.timeout_secs > 0).then(|| std::time::Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ActionSourceConfig {
    fn default() -> Self {
        Self {
            dir: "actions".to_string(),
            extension: "py".to_string(),
            interpreter: "python3".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Intent matcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Path of the persisted whitelist file.
    pub whitelist_path: String,
    /// Path of the persisted fingerprint index.
    pub index_path: String,
    /// Directory holding the sentence-transformer model export
    /// (`model.onnx` + `tokenizer.json`).
    pub model_dir: String,
    /// Embedding dimensionality; must be consistent within one index.
    pub embedding_dim: usize,
    /// Matches with confidence strictly below this require an extra
    /// confirmation.
    pub confidence_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            whitelist_path: "state/whitelist.txt".to_string(),
            index_path: "state/fingerprints.json".to_string(),
            model_dir: "models/all-MiniLM-L6-v2".to_string(),
            embedding_dim: 384,
            confidence_threshold: 0.75,
        }
    }
}

/// Audit log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Path of the append-only audit log.
    pub log_path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: "logs/dispatch.log".to_string(),
        }
    }
}
