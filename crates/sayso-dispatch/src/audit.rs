//! Append-only audit log.
//!
//! Every match, gate decision, dry-run, and execution outcome is recorded
//! as one tab-delimited line: RFC 3339 timestamp, stage tag, action id,
//! free-text detail. The pipeline never rotates or truncates the file;
//! rotation is an operational concern outside this system.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::SecondsFormat;

use crate::error::DispatchError;
use crate::types::DispatchStage;

/// Serialized writer over one append-only audit file.
///
/// Concurrent dispatch sessions share a single `AuditLog`; the internal
/// mutex guarantees one record lands at a time.
pub struct AuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl AuditLog {
    /// Open (creating if needed) the audit file in append mode.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, DispatchError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying audit file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it.
    ///
    /// Field separators inside `action_id` and `detail` are replaced with
    /// spaces to keep the log line-oriented.
    pub fn record(
        &self,
        stage: DispatchStage,
        action_id: &str,
        detail: &str,
    ) -> Result<(), DispatchError> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = format!(
            "{}\t{}\t{}\t{}\n",
            timestamp,
            stage,
            sanitize(action_id),
            sanitize(detail)
        );

        let mut file = self
            .file
            .lock()
            .map_err(|e| DispatchError::Audit(format!("audit lock poisoned: {}", e)))?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

fn sanitize(text: &str) -> String {
    text.replace(['\t', '\n', '\r'], " ")
}
