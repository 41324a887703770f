//! Dispatch orchestrator: sequences matcher, gate, engine, and audit log
//! for one call.
//!
//! Two entry paths converge on the same gate and engine so the safety
//! guarantees are uniform: free text goes through the intent matcher and
//! executes as a subprocess; a pre-resolved structured intent enters with
//! confidence 1.0 and executes through the in-process callable strategy.
//! Neither path skips the dry-run or the execution confirmation.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use sayso_core::SaysoConfig;
use sayso_match::IntentMatcher;

use crate::audit::AuditLog;
use crate::callable::{ArgMap, CallableRegistry};
use crate::confirm::ConfirmationProvider;
use crate::error::DispatchError;
use crate::executor::{ExecRequest, Executor};
use crate::gate::{ConfirmationGate, GatePlan};
use crate::registry::ActionRegistry;
use crate::types::{DispatchOutcome, DispatchStage};

/// Explicitly constructed dispatch context: all collaborators are owned
/// here and wired by the composition root, with no process-wide singletons.
pub struct Dispatcher {
    registry: Arc<ActionRegistry>,
    matcher: Arc<IntentMatcher>,
    executor: Executor,
    audit: Arc<AuditLog>,
    provider: Arc<dyn ConfirmationProvider>,
    threshold: f32,
    subprocess_timeout: Option<Duration>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ActionRegistry>,
        matcher: Arc<IntentMatcher>,
        callables: Arc<CallableRegistry>,
        audit: Arc<AuditLog>,
        provider: Arc<dyn ConfirmationProvider>,
        config: &SaysoConfig,
    ) -> Self {
        let executor = Executor::new(
            Arc::clone(&registry),
            callables,
            config.actions.interpreter.clone(),
        );
        Self {
            registry,
            matcher,
            executor,
            audit,
            provider,
            threshold: config.matcher.confidence_threshold,
            subprocess_timeout: config.actions.timeout(),
        }
    }

    /// Resolve a free-form instruction and dispatch the matched action as
    /// a subprocess.
    pub async fn dispatch_text(&self, input: &str) -> Result<DispatchOutcome, DispatchError> {
        let session = Uuid::new_v4();

        let matched = match self.matcher.match_instruction(input).await {
            Ok(matched) => matched,
            Err(e) => {
                self.audit.record(
                    DispatchStage::Match,
                    "-",
                    &format!("session={} match failed for {:?}: {}", session, input, e),
                )?;
                return Err(e.into());
            }
        };

        self.audit.record(
            DispatchStage::Match,
            &matched.action_id,
            &format!(
                "session={} matched {:?} (confidence {:.4})",
                session, input, matched.confidence
            ),
        )?;
        info!(
            action = %matched.action_id,
            confidence = matched.confidence,
            "Instruction matched"
        );

        let plan = GatePlan {
            session,
            action_id: matched.action_id,
            confidence: matched.confidence,
            description: matched.description,
        };
        let request = ExecRequest::Subprocess {
            args: Vec::new(),
            timeout: self.subprocess_timeout,
        };

        let mut gate = ConfirmationGate::new(self.threshold);
        gate.run(
            &plan,
            &request,
            &self.executor,
            self.provider.as_ref(),
            &self.audit,
        )
        .await
    }

    /// Dispatch a pre-resolved structured intent through the in-process
    /// callable strategy.
    ///
    /// The structured source vouches for the match, so confidence is fixed
    /// at 1.0 — the low-confidence branch is skipped, the dry-run and
    /// execution confirmation are not.
    pub async fn dispatch_structured(
        &self,
        action_id: &str,
        named_args: ArgMap,
    ) -> Result<DispatchOutcome, DispatchError> {
        let session = Uuid::new_v4();

        self.audit.record(
            DispatchStage::Match,
            action_id,
            &format!(
                "session={} structured intent with {} argument(s)",
                session,
                named_args.len()
            ),
        )?;
        info!(action = %action_id, "Structured intent received");

        let plan = GatePlan {
            session,
            action_id: action_id.to_string(),
            confidence: 1.0,
            description: self.registry.description_of(action_id),
        };
        let request = ExecRequest::Callable { named_args };

        let mut gate = ConfirmationGate::new(self.threshold);
        gate.run(
            &plan,
            &request,
            &self.executor,
            self.provider.as_ref(),
            &self.audit,
        )
        .await
    }
}
