//! In-process callable modules.
//!
//! Instead of loading action source dynamically, the host registers one
//! typed handler module per action id at startup. Each module exposes up
//! to two entry points under the fixed names `main` (primary) and `run`
//! (fallback), each declaring its parameter schema; argument binding is
//! schema validation, performed before any invocation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::DispatchError;

/// Primary entry point name looked up first.
pub const ENTRY_PRIMARY: &str = "main";
/// Fallback entry point name when no primary exists.
pub const ENTRY_FALLBACK: &str = "run";

/// Named arguments for one callable invocation.
///
/// A `BTreeMap` keeps iteration order stable so dry-run previews are
/// deterministic for identical arguments.
pub type ArgMap = BTreeMap<String, Value>;

/// Handler function behind an entry point.
///
/// Errors are reported as plain strings; they become failed outcomes at
/// the execution engine, never propagated faults.
pub type EntryFn = Arc<dyn Fn(&ArgMap) -> Result<Option<String>, String> + Send + Sync>;

/// One declared parameter of an entry point.
#[derive(Clone)]
pub struct ParamSpec {
    pub name: String,
    /// Default value applied when the caller leaves the parameter unset.
    /// `None` marks the parameter required.
    pub default: Option<Value>,
}

impl ParamSpec {
    /// A parameter the caller must always supply.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    /// A parameter with a default applied when unset.
    pub fn optional(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// An invocable entry point with its declared parameter schema.
#[derive(Clone)]
pub struct EntryPoint {
    params: Vec<ParamSpec>,
    func: EntryFn,
}

impl EntryPoint {
    pub fn new(params: Vec<ParamSpec>, func: EntryFn) -> Self {
        Self { params, func }
    }

    /// Bind named arguments against the declared schema.
    ///
    /// Applies defaults for unspecified parameters. An unknown name or an
    /// unbound required parameter fails with
    /// [`DispatchError::ArgumentBinding`] before anything is invoked.
    pub fn bind(&self, named: &ArgMap) -> Result<ArgMap, DispatchError> {
        for key in named.keys() {
            if !self.params.iter().any(|p| p.name == *key) {
                return Err(DispatchError::ArgumentBinding(format!(
                    "unexpected argument '{}'",
                    key
                )));
            }
        }

        let mut bound = ArgMap::new();
        for param in &self.params {
            if let Some(value) = named.get(&param.name) {
                bound.insert(param.name.clone(), value.clone());
            } else if let Some(default) = &param.default {
                bound.insert(param.name.clone(), default.clone());
            } else {
                return Err(DispatchError::ArgumentBinding(format!(
                    "missing required argument '{}'",
                    param.name
                )));
            }
        }
        Ok(bound)
    }

    /// Invoke the handler with pre-bound arguments.
    pub fn invoke(&self, bound: &ArgMap) -> Result<Option<String>, String> {
        (self.func)(bound)
    }
}

/// A registered callable module: the in-process counterpart of one action.
#[derive(Clone, Default)]
pub struct CallableModule {
    entries: HashMap<String, EntryPoint>,
}

impl CallableModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an entry point under the given name (builder style).
    pub fn with_entry(mut self, name: impl Into<String>, entry: EntryPoint) -> Self {
        self.entries.insert(name.into(), entry);
        self
    }

    /// Resolve the module's entry point: `main` first, then `run`.
    pub fn entry(&self) -> Option<(&str, &EntryPoint)> {
        for name in [ENTRY_PRIMARY, ENTRY_FALLBACK] {
            if let Some(entry) = self.entries.get(name) {
                return Some((name, entry));
            }
        }
        None
    }
}

/// Registry mapping action ids to their callable modules.
///
/// Populated at startup, read-mostly afterwards; safe for concurrent
/// dispatch sessions.
#[derive(Default)]
pub struct CallableRegistry {
    modules: RwLock<HashMap<String, CallableModule>>,
}

impl CallableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the module for an action id.
    pub fn register(&self, id: impl Into<String>, module: CallableModule) {
        let mut modules = self.modules.write().unwrap_or_else(|e| e.into_inner());
        modules.insert(id.into(), module);
    }

    /// Look up the module for an action id.
    pub fn get(&self, id: &str) -> Option<CallableModule> {
        self.modules
            .read()
            .ok()
            .and_then(|modules| modules.get(id).cloned())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.modules
            .read()
            .map(|modules| modules.contains_key(id))
            .unwrap_or(false)
    }
}
