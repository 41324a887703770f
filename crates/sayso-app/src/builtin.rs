//! Built-in callable modules.
//!
//! In-process counterparts for the actions that have one, registered at
//! startup so structured intents can execute without spawning a process.
//! Handlers only stage and acknowledge their work here; the heavy lifting
//! stays in the action scripts themselves.

use std::sync::Arc;

use sayso_dispatch::callable::{ENTRY_FALLBACK, ENTRY_PRIMARY};
use sayso_dispatch::{ArgMap, CallableModule, CallableRegistry, EntryPoint, ParamSpec};
use serde_json::json;
use tracing::info;

/// Register every built-in callable module.
pub fn register_builtins(registry: &CallableRegistry) {
    registry.register("voice_reminder_timer.py", reminder_module());
    registry.register("screen_tiler_grid.py", tiler_module());
}

/// Reminder timer: primary `main(message, seconds=60)` entry point.
fn reminder_module() -> CallableModule {
    CallableModule::new().with_entry(
        ENTRY_PRIMARY,
        EntryPoint::new(
            vec![
                ParamSpec::required("message"),
                ParamSpec::optional("seconds", json!(60)),
            ],
            Arc::new(|args: &ArgMap| {
                let message = args
                    .get("message")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "message must be a string".to_string())?;
                if message.is_empty() {
                    return Err("message must not be empty".to_string());
                }
                let seconds = args
                    .get("seconds")
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| "seconds must be a non-negative integer".to_string())?;

                info!(message = %message, seconds, "Reminder staged");
                Ok(Some(format!(
                    "Reminder staged: '{}' in {}s",
                    message, seconds
                )))
            }),
        ),
    )
}

/// Window tiler: exposes only the fallback `run(rows=2, cols=2)` entry.
fn tiler_module() -> CallableModule {
    CallableModule::new().with_entry(
        ENTRY_FALLBACK,
        EntryPoint::new(
            vec![
                ParamSpec::optional("rows", json!(2)),
                ParamSpec::optional("cols", json!(2)),
            ],
            Arc::new(|args: &ArgMap| {
                let rows = args.get("rows").and_then(|v| v.as_u64()).unwrap_or(2);
                let cols = args.get("cols").and_then(|v| v.as_u64()).unwrap_or(2);
                if rows == 0 || cols == 0 {
                    return Err("grid dimensions must be positive".to_string());
                }

                info!(rows, cols, "Window tiling staged");
                Ok(Some(format!("Tiling staged: {}x{} grid", rows, cols)))
            }),
        ),
    )
}
