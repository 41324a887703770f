//! Execution engine: the last line of defense before an action runs.
//!
//! Both invocation strategies re-validate the whitelist at the moment of
//! execution, independent of earlier checks. Neither performs partial
//! work: if validation, path resolution, or argument binding fails, no
//! process is spawned and no callable is invoked.

use std::panic::AssertUnwindSafe;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::callable::{ArgMap, CallableRegistry};
use crate::error::DispatchError;
use crate::registry::ActionRegistry;
use crate::types::{DispatchOutcome, NO_OUTPUT};

/// One planned invocation, shared between dry-run preview and real
/// execution so the preview always describes exactly what would run.
#[derive(Debug, Clone)]
pub enum ExecRequest {
    /// Spawn the action as an isolated child process.
    Subprocess {
        args: Vec<String>,
        timeout: Option<Duration>,
    },
    /// Invoke the action's registered in-process entry point.
    Callable { named_args: ArgMap },
}

/// Executes whitelisted actions as subprocesses or in-process callables.
pub struct Executor {
    registry: Arc<ActionRegistry>,
    callables: Arc<CallableRegistry>,
    interpreter: String,
}

impl Executor {
    pub fn new(
        registry: Arc<ActionRegistry>,
        callables: Arc<CallableRegistry>,
        interpreter: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            callables,
            interpreter: interpreter.into(),
        }
    }

    /// Execute a planned invocation, previewing instead when `dry_run`.
    pub async fn execute(
        &self,
        id: &str,
        request: &ExecRequest,
        dry_run: bool,
    ) -> Result<DispatchOutcome, DispatchError> {
        match request {
            ExecRequest::Subprocess { args, timeout } => {
                self.execute_subprocess(id, args, dry_run, *timeout).await
            }
            ExecRequest::Callable { named_args } => {
                self.execute_callable(id, named_args, dry_run)
            }
        }
    }

    /// Run a whitelisted action as a child process.
    ///
    /// Dry-run returns the exact command line that would run, with no side
    /// effects. A non-zero exit or any spawn-level fault is a failed
    /// outcome, never a propagated error.
    pub async fn execute_subprocess(
        &self,
        id: &str,
        args: &[String],
        dry_run: bool,
        timeout: Option<Duration>,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.registry.validate(id)?;

        let path = self.registry.action_path(id);
        if !path.is_file() {
            return Err(DispatchError::NotFound(path.display().to_string()));
        }

        if dry_run {
            let mut preview = format!(
                "[dry-run] Would run: {} {}",
                self.interpreter,
                path.display()
            );
            for arg in args {
                preview.push(' ');
                preview.push_str(arg);
            }
            return Ok(DispatchOutcome::ok(preview));
        }

        let mut command = tokio::process::Command::new(&self.interpreter);
        command
            .arg(&path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawned = match timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(action = %id, timeout_secs = limit.as_secs(), "Action timed out");
                    return Ok(DispatchOutcome::failed(format!(
                        "Action timed out after {}s",
                        limit.as_secs()
                    )));
                }
            },
            None => command.output().await,
        };

        let output = match spawned {
            Ok(output) => output,
            Err(e) => {
                warn!(action = %id, error = %e, "Failed to spawn action");
                return Ok(DispatchOutcome::failed(format!(
                    "Failed to spawn action: {}",
                    e
                )));
            }
        };

        if output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
            info!(action = %id, "Action executed");
            Ok(DispatchOutcome::ok(if stdout.is_empty() {
                NO_OUTPUT.to_string()
            } else {
                stdout
            }))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            };
            warn!(action = %id, status = %output.status, "Action failed");
            Ok(DispatchOutcome::failed(format!("Action failed: {}", detail)))
        }
    }

    /// Invoke a whitelisted action's registered in-process entry point.
    ///
    /// Runs inside the dispatcher's own process, so any fault raised by
    /// the handler — an error return or a panic — is contained here and
    /// converted into a failed outcome.
    pub fn execute_callable(
        &self,
        id: &str,
        named_args: &ArgMap,
        dry_run: bool,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.registry.validate(id)?;

        let module = self.callables.get(id).ok_or_else(|| {
            DispatchError::NotFound(format!("no callable module registered for {}", id))
        })?;
        let (entry_name, entry) = module
            .entry()
            .ok_or_else(|| DispatchError::NoEntryPoint(id.to_string()))?;

        let bound = entry.bind(named_args)?;

        if dry_run {
            let rendered: Vec<String> =
                bound.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            return Ok(DispatchOutcome::ok(format!(
                "[dry-run] Would call: {}::{}({})",
                id,
                entry_name,
                rendered.join(", ")
            )));
        }

        let invoked = std::panic::catch_unwind(AssertUnwindSafe(|| entry.invoke(&bound)));
        match invoked {
            Ok(Ok(output)) => {
                info!(action = %id, entry = entry_name, "Callable executed");
                let message = output
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| NO_OUTPUT.to_string());
                Ok(DispatchOutcome::ok(message))
            }
            Ok(Err(message)) => {
                warn!(action = %id, error = %message, "Callable failed");
                Ok(DispatchOutcome::failed(format!(
                    "Callable failed: {}",
                    message
                )))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(action = %id, error = %message, "Callable panicked");
                Ok(DispatchOutcome::failed(format!(
                    "Callable panicked: {}",
                    message
                )))
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callable::{CallableModule, EntryPoint, ParamSpec, ENTRY_PRIMARY};
    use serde_json::json;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Test fixture: a registry over shell scripts (so tests do not depend
    /// on a Python interpreter) plus an empty callable registry.
    struct Fixture {
        _dir: tempfile::TempDir,
        registry: Arc<ActionRegistry>,
        callables: Arc<CallableRegistry>,
    }

    impl Fixture {
        fn new(scripts: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let actions = dir.path().join("actions");
            std::fs::create_dir_all(&actions).unwrap();
            for (name, body) in scripts {
                std::fs::write(actions.join(name), body).unwrap();
            }

            let registry = Arc::new(ActionRegistry::new(
                actions,
                "sh",
                dir.path().join("state").join("whitelist.txt"),
            ));
            registry.rebuild().unwrap();

            Self {
                _dir: dir,
                registry,
                callables: Arc::new(CallableRegistry::new()),
            }
        }

        fn executor(&self) -> Executor {
            Executor::new(
                Arc::clone(&self.registry),
                Arc::clone(&self.callables),
                "sh",
            )
        }
    }

    // ---- subprocess strategy ----

    #[tokio::test]
    async fn test_subprocess_success_captures_stdout() {
        let fixture = Fixture::new(&[("hello.sh", "echo hello world\n")]);
        let outcome = fixture
            .executor()
            .execute_subprocess("hello.sh", &[], false, None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "hello world");
    }

    #[tokio::test]
    async fn test_subprocess_empty_output_placeholder() {
        let fixture = Fixture::new(&[("quiet.sh", "exit 0\n")]);
        let outcome = fixture
            .executor()
            .execute_subprocess("quiet.sh", &[], false, None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, NO_OUTPUT);
    }

    #[tokio::test]
    async fn test_subprocess_nonzero_exit_is_failed_outcome() {
        let fixture = Fixture::new(&[("fail.sh", "echo boom >&2\nexit 3\n")]);
        let outcome = fixture
            .executor()
            .execute_subprocess("fail.sh", &[], false, None)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("boom"));
    }

    #[tokio::test]
    async fn test_subprocess_not_whitelisted() {
        let fixture = Fixture::new(&[("allowed.sh", "echo hi\n")]);
        let err = fixture
            .executor()
            .execute_subprocess("missing_script.sh", &[], false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotWhitelisted(_)));
    }

    #[tokio::test]
    async fn test_subprocess_whitelisted_but_file_removed() {
        let fixture = Fixture::new(&[("gone.sh", "echo hi\n")]);
        // Remove the file after the whitelist was built.
        std::fs::remove_file(fixture.registry.action_path("gone.sh")).unwrap();
        let err = fixture
            .executor()
            .execute_subprocess("gone.sh", &[], false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_subprocess_revalidates_at_call_time() {
        // Valid at rebuild time, removed from the whitelist afterwards:
        // execution must refuse.
        let fixture = Fixture::new(&[("was_ok.sh", "echo hi\n")]);
        std::fs::remove_file(fixture.registry.action_path("was_ok.sh")).unwrap();
        fixture.registry.rebuild().unwrap();

        // Restore the file so only the whitelist check can refuse.
        std::fs::write(fixture.registry.action_path("was_ok.sh"), "echo hi\n").unwrap();

        let err = fixture
            .executor()
            .execute_subprocess("was_ok.sh", &[], false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotWhitelisted(_)));
    }

    #[tokio::test]
    async fn test_subprocess_dry_run_preview_and_no_side_effects() {
        let fixture = Fixture::new(&[("marker.sh", "touch marker_created\n")]);
        let executor = fixture.executor();

        let mut previews = Vec::new();
        for _ in 0..3 {
            let outcome = executor
                .execute_subprocess(
                    "marker.sh",
                    &["--fast".to_string()],
                    true,
                    Some(Duration::from_secs(5)),
                )
                .await
                .unwrap();
            assert!(outcome.success);
            previews.push(outcome.message);
        }

        // Idempotent: every preview is identical and shows the exact command.
        assert_eq!(previews[0], previews[1]);
        assert_eq!(previews[1], previews[2]);
        let expected = format!(
            "[dry-run] Would run: sh {} --fast",
            fixture.registry.action_path("marker.sh").display()
        );
        assert_eq!(previews[0], expected);

        // Side-effect-free: the script never ran.
        assert!(!Path::new("marker_created").exists());
    }

    #[tokio::test]
    async fn test_subprocess_timeout_is_failed_outcome() {
        let fixture = Fixture::new(&[("slow.sh", "sleep 5\n")]);
        let outcome = fixture
            .executor()
            .execute_subprocess("slow.sh", &[], false, Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_subprocess_spawn_fault_is_failed_outcome() {
        let fixture = Fixture::new(&[("hello.sh", "echo hi\n")]);
        let executor = Executor::new(
            Arc::clone(&fixture.registry),
            Arc::clone(&fixture.callables),
            "/nonexistent/interpreter",
        );
        let outcome = executor
            .execute_subprocess("hello.sh", &[], false, None)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("Failed to spawn action"));
    }

    #[tokio::test]
    async fn test_subprocess_passes_arguments() {
        let fixture = Fixture::new(&[("args.sh", "echo \"$1:$2\"\n")]);
        let outcome = fixture
            .executor()
            .execute_subprocess(
                "args.sh",
                &["alpha".to_string(), "beta".to_string()],
                false,
                None,
            )
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "alpha:beta");
    }

    // ---- callable strategy ----

    fn fixture_with_module(module: CallableModule) -> Fixture {
        let fixture = Fixture::new(&[("note.sh", "echo unused\n")]);
        fixture.callables.register("note.sh", module);
        fixture
    }

    #[test]
    fn test_callable_invokes_with_defaults() {
        let module = CallableModule::new().with_entry(
            ENTRY_PRIMARY,
            EntryPoint::new(
                vec![
                    ParamSpec::required("text"),
                    ParamSpec::optional("times", json!(2)),
                ],
                Arc::new(|args: &ArgMap| {
                    let text = args.get("text").and_then(|v| v.as_str()).unwrap_or("");
                    let times = args.get("times").and_then(|v| v.as_u64()).unwrap_or(1);
                    Ok(Some(text.repeat(times as usize)))
                }),
            ),
        );
        let fixture = fixture_with_module(module);

        let mut named = ArgMap::new();
        named.insert("text".to_string(), json!("ab"));
        let outcome = fixture
            .executor()
            .execute_callable("note.sh", &named, false)
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, "abab");
    }

    #[test]
    fn test_callable_unknown_argument_no_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let module = CallableModule::new().with_entry(
            ENTRY_PRIMARY,
            EntryPoint::new(
                vec![ParamSpec::required("text")],
                Arc::new(move |_args: &ArgMap| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }),
            ),
        );
        let fixture = fixture_with_module(module);

        let mut named = ArgMap::new();
        named.insert("unexpected_key".to_string(), json!(1));
        let err = fixture
            .executor()
            .execute_callable("note.sh", &named, false)
            .unwrap_err();
        assert!(matches!(err, DispatchError::ArgumentBinding(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callable_not_whitelisted() {
        let fixture = fixture_with_module(CallableModule::new());
        let err = fixture
            .executor()
            .execute_callable("unlisted.sh", &ArgMap::new(), false)
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotWhitelisted(_)));
    }

    #[test]
    fn test_callable_module_missing_is_not_found() {
        let fixture = Fixture::new(&[("note.sh", "echo unused\n")]);
        let err = fixture
            .executor()
            .execute_callable("note.sh", &ArgMap::new(), false)
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound(_)));
    }

    #[test]
    fn test_callable_no_entry_point() {
        let module = CallableModule::new().with_entry(
            "execute",
            EntryPoint::new(vec![], Arc::new(|_: &ArgMap| Ok(None))),
        );
        let fixture = fixture_with_module(module);
        let err = fixture
            .executor()
            .execute_callable("note.sh", &ArgMap::new(), false)
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoEntryPoint(_)));
    }

    #[test]
    fn test_callable_error_return_is_failed_outcome() {
        let module = CallableModule::new().with_entry(
            ENTRY_PRIMARY,
            EntryPoint::new(
                vec![],
                Arc::new(|_: &ArgMap| Err("disk full".to_string())),
            ),
        );
        let fixture = fixture_with_module(module);
        let outcome = fixture
            .executor()
            .execute_callable("note.sh", &ArgMap::new(), false)
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Callable failed: disk full");
    }

    #[test]
    fn test_callable_panic_is_contained() {
        let module = CallableModule::new().with_entry(
            ENTRY_PRIMARY,
            EntryPoint::new(
                vec![],
                Arc::new(|_: &ArgMap| panic!("handler exploded")),
            ),
        );
        let fixture = fixture_with_module(module);
        let outcome = fixture
            .executor()
            .execute_callable("note.sh", &ArgMap::new(), false)
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.contains("handler exploded"));
    }

    #[test]
    fn test_callable_none_output_placeholder() {
        let module = CallableModule::new().with_entry(
            ENTRY_PRIMARY,
            EntryPoint::new(vec![], Arc::new(|_: &ArgMap| Ok(None))),
        );
        let fixture = fixture_with_module(module);
        let outcome = fixture
            .executor()
            .execute_callable("note.sh", &ArgMap::new(), false)
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.message, NO_OUTPUT);
    }

    #[test]
    fn test_callable_dry_run_no_invocation_and_stable_preview() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let module = CallableModule::new().with_entry(
            ENTRY_PRIMARY,
            EntryPoint::new(
                vec![
                    ParamSpec::required("text"),
                    ParamSpec::optional("times", json!(2)),
                ],
                Arc::new(move |_: &ArgMap| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }),
            ),
        );
        let fixture = fixture_with_module(module);

        let mut named = ArgMap::new();
        named.insert("text".to_string(), json!("hi"));

        let executor = fixture.executor();
        let first = executor
            .execute_callable("note.sh", &named, true)
            .unwrap();
        let second = executor
            .execute_callable("note.sh", &named, true)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.message,
            "[dry-run] Would call: note.sh::main(text=\"hi\", times=2)"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_dispatches_on_request_kind() {
        let fixture = Fixture::new(&[("hello.sh", "echo via subprocess\n")]);
        let executor = fixture.executor();

        let request = ExecRequest::Subprocess {
            args: vec![],
            timeout: None,
        };
        let outcome = executor.execute("hello.sh", &request, false).await.unwrap();
        assert_eq!(outcome.message, "via subprocess");

        fixture.callables.register(
            "hello.sh",
            CallableModule::new().with_entry(
                ENTRY_PRIMARY,
                EntryPoint::new(vec![], Arc::new(|_: &ArgMap| Ok(Some("via callable".into())))),
            ),
        );
        let request = ExecRequest::Callable {
            named_args: ArgMap::new(),
        };
        let outcome = executor.execute("hello.sh", &request, false).await.unwrap();
        assert_eq!(outcome.message, "via callable");
    }
}
