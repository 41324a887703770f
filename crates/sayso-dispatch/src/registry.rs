//! Action registry and whitelist persistence.
//!
//! The whitelist is the authoritative set of action ids eligible for
//! execution. It is rebuilt by scanning the action source directory and
//! persisted as a newline-delimited file, one id per line, in sorted
//! filename order so a rebuild over unchanged sources is byte-identical.
//! The file is replaced atomically; readers never observe a partial write.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::DispatchError;
use crate::types::ActionEntry;

/// Registry over one action source directory and its persisted whitelist.
pub struct ActionRegistry {
    source_dir: PathBuf,
    /// Extension suffix including the dot, e.g. ".py".
    suffix: String,
    whitelist_path: PathBuf,
}

impl ActionRegistry {
    /// Create a registry for `source_dir`, persisting the whitelist at
    /// `whitelist_path`. `extension` is given without the dot.
    pub fn new(
        source_dir: impl Into<PathBuf>,
        extension: &str,
        whitelist_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_dir: source_dir.into(),
            suffix: format!(".{}", extension.trim_start_matches('.')),
            whitelist_path: whitelist_path.into(),
        }
    }

    /// Path an action id resolves to under the source directory.
    pub fn action_path(&self, id: &str) -> PathBuf {
        self.source_dir.join(id)
    }

    /// Path of the persisted whitelist file.
    pub fn whitelist_path(&self) -> &Path {
        &self.whitelist_path
    }

    /// Scan the action source directory and persist the whitelist.
    ///
    /// Returns the discovered actions with their extracted descriptions.
    /// Idempotent: two rebuilds over unchanged sources produce
    /// byte-identical whitelist files.
    pub fn rebuild(&self) -> Result<Vec<ActionEntry>, DispatchError> {
        let mut ids: Vec<String> = Vec::new();
        for dir_entry in std::fs::read_dir(&self.source_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(&self.suffix) {
                ids.push(name);
            }
        }
        ids.sort();

        let mut content = String::new();
        for id in &ids {
            content.push_str(id);
            content.push('\n');
        }
        self.write_whitelist_atomic(&content)?;

        info!(
            actions = ids.len(),
            whitelist = %self.whitelist_path.display(),
            "Whitelist rebuilt"
        );

        Ok(ids
            .into_iter()
            .map(|id| {
                let description = self.description_of(&id);
                ActionEntry { id, description }
            })
            .collect())
    }

    /// Write-to-temp-then-rename so readers never see a half-written file.
    fn write_whitelist_atomic(&self, content: &str) -> Result<(), DispatchError> {
        if let Some(parent) = self.whitelist_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.whitelist_path.with_extension("txt.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.whitelist_path)?;
        Ok(())
    }

    /// Load the persisted whitelist.
    ///
    /// A missing or unreadable whitelist file is [`DispatchError::RegistryCorrupt`],
    /// a hard failure. An empty-but-present file is a valid empty whitelist.
    pub fn load_whitelist(&self) -> Result<Whitelist, DispatchError> {
        let content = std::fs::read_to_string(&self.whitelist_path).map_err(|e| {
            DispatchError::RegistryCorrupt(format!(
                "{}: {}",
                self.whitelist_path.display(),
                e
            ))
        })?;
        Ok(Whitelist::parse(&content))
    }

    /// Membership check against the whitelist as persisted right now.
    pub fn contains(&self, id: &str) -> Result<bool, DispatchError> {
        Ok(self.load_whitelist()?.contains(id))
    }

    /// Fail with [`DispatchError::NotWhitelisted`] unless `id` is currently
    /// whitelisted. Re-run at the execution boundary regardless of earlier
    /// checks.
    pub fn validate(&self, id: &str) -> Result<(), DispatchError> {
        if self.contains(id)? {
            Ok(())
        } else {
            Err(DispatchError::NotWhitelisted(id.to_string()))
        }
    }

    /// Extract an action's short description.
    ///
    /// Prefers the leading documentation block of its source, falls back to
    /// the id itself when the source has no documentation, and to the empty
    /// string when the source is unreadable (index building keeps
    /// positional alignment by fingerprinting that empty value).
    pub fn description_of(&self, id: &str) -> String {
        match std::fs::read_to_string(self.action_path(id)) {
            Ok(source) => leading_doc(&source).unwrap_or_else(|| id.to_string()),
            Err(e) => {
                warn!(action = %id, error = %e, "Action source unreadable; using empty description");
                String::new()
            }
        }
    }
}

/// The loaded whitelist: discovery-ordered ids plus an O(1) membership set.
#[derive(Debug, Clone)]
pub struct Whitelist {
    ids: Vec<String>,
    set: HashSet<String>,
}

impl Whitelist {
    fn parse(content: &str) -> Self {
        let ids: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        let set = ids.iter().cloned().collect();
        Self { ids, set }
    }

    /// Ids in persisted (discovery) order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.set.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Extract the leading documentation block from action source text.
///
/// Recognizes a leading triple-quoted docstring, or failing that the
/// leading run of `#` comment lines. Returns `None` when neither is
/// present.
fn leading_doc(source: &str) -> Option<String> {
    let trimmed = source.trim_start();
    for quote in ["\"\"\"", "'''"] {
        if let Some(rest) = trimmed.strip_prefix(quote) {
            if let Some(end) = rest.find(quote) {
                return Some(rest[..end].trim().to_string());
            }
        }
    }

    // Leading comment lines; a single blank line is tolerated before the
    // block begins, a blank after it ends the block.
    let mut comments: Vec<String> = Vec::new();
    for line in source.lines() {
        let s = line.trim();
        if let Some(stripped) = s.strip_prefix('#') {
            comments.push(stripped.trim_start_matches('#').trim().to_string());
        } else if s.is_empty() {
            if !comments.is_empty() {
                break;
            }
        } else {
            break;
        }
    }

    if comments.is_empty() {
        None
    } else {
        Some(comments.join(" "))
    }
}
