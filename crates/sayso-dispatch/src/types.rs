//! Core types and value objects for the dispatch pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Placeholder message for an action that succeeded with no output.
pub const NO_OUTPUT: &str = "<no output>";

/// Pipeline stages recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStage {
    Match,
    GateDecision,
    DryRun,
    Execution,
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStage::Match => write!(f, "MATCH"),
            DispatchStage::GateDecision => write!(f, "GATE_DECISION"),
            DispatchStage::DryRun => write!(f, "DRY_RUN"),
            DispatchStage::Execution => write!(f, "EXECUTION"),
        }
    }
}

impl std::str::FromStr for DispatchStage {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MATCH" => Ok(DispatchStage::Match),
            "GATE_DECISION" => Ok(DispatchStage::GateDecision),
            "DRY_RUN" => Ok(DispatchStage::DryRun),
            "EXECUTION" => Ok(DispatchStage::Execution),
            _ => Err(format!("Unknown dispatch stage: {}", s)),
        }
    }
}

/// Uniform result of one dispatch call or engine invocation.
///
/// A user abort is a failed outcome, not an error: the gate doing its job
/// is a normal, successfully-handled result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub success: bool,
    pub message: String,
}

impl DispatchOutcome {
    /// A successful outcome carrying the given message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A failed outcome carrying the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A registered action as discovered by a registry rebuild.
///
/// The semantic fingerprint is not stored here; it lives in the separately
/// persisted fingerprint index so matching can be rebuilt independently of
/// whitelist validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    /// Filename-like identifier, unique within the whitelist.
    pub id: String,
    /// Short description from the action's leading documentation block.
    pub description: String,
}
