//! Confirmation gate: the graduated safety check between a matched action
//! and its execution.
//!
//! One gate instance lives for exactly one dispatch call and walks:
//!
//! ```text
//! Matched -> (confidence >= threshold)? -> DryRun
//! Matched -> (confidence <  threshold)? -> AwaitLowConfConfirm -> DryRun | Aborted
//! DryRun  -> AwaitExecConfirm -> Executing | Aborted
//! Executing -> Done
//! ```
//!
//! The dry-run preview is produced by the execution engine itself, so the
//! text shown to the user is exactly the invocation that would run.

use std::fmt;

use uuid::Uuid;

use crate::audit::AuditLog;
use crate::confirm::{is_approval, ConfirmationProvider};
use crate::error::DispatchError;
use crate::executor::{ExecRequest, Executor};
use crate::types::{DispatchOutcome, DispatchStage};

/// Outcome message when the user denies the low-confidence confirmation.
pub const ABORT_LOW_CONFIDENCE: &str = "Aborted by user (low confidence).";
/// Outcome message when the user denies the execution confirmation.
pub const ABORT_EXECUTION: &str = "Execution aborted by user.";

/// Gate states for one dispatch call. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Matched,
    AwaitLowConfConfirm,
    DryRun,
    AwaitExecConfirm,
    Executing,
    Done,
    Aborted,
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateState::Matched => write!(f, "matched"),
            GateState::AwaitLowConfConfirm => write!(f, "await_low_conf_confirm"),
            GateState::DryRun => write!(f, "dry_run"),
            GateState::AwaitExecConfirm => write!(f, "await_exec_confirm"),
            GateState::Executing => write!(f, "executing"),
            GateState::Done => write!(f, "done"),
            GateState::Aborted => write!(f, "aborted"),
        }
    }
}

/// True for the transitions the gate is allowed to take.
pub fn is_valid_transition(from: GateState, to: GateState) -> bool {
    matches!(
        (from, to),
        (GateState::Matched, GateState::AwaitLowConfConfirm)
            | (GateState::Matched, GateState::DryRun)
            | (GateState::AwaitLowConfConfirm, GateState::DryRun)
            | (GateState::AwaitLowConfConfirm, GateState::Aborted)
            | (GateState::DryRun, GateState::AwaitExecConfirm)
            | (GateState::AwaitExecConfirm, GateState::Executing)
            | (GateState::AwaitExecConfirm, GateState::Aborted)
            | (GateState::Executing, GateState::Done)
    )
}

/// The matched action a gate run decides about.
#[derive(Debug, Clone)]
pub struct GatePlan {
    /// Dispatch session id, threaded into every audit record.
    pub session: Uuid,
    pub action_id: String,
    /// Match confidence; structured intents enter with 1.0.
    pub confidence: f32,
    pub description: String,
}

/// Per-call confirmation gate.
pub struct ConfirmationGate {
    threshold: f32,
    state: GateState,
}

impl ConfirmationGate {
    /// Fresh gate in the `Matched` state.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            state: GateState::Matched,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    fn advance(&mut self, to: GateState) {
        debug_assert!(
            is_valid_transition(self.state, to),
            "illegal gate transition {} -> {}",
            self.state,
            to
        );
        tracing::debug!(from = %self.state, to = %to, "Gate transition");
        self.state = to;
    }

    /// Walk the state machine for one dispatch call.
    ///
    /// Returns the execution outcome, or a failed outcome carrying the
    /// abort message when the user denies a confirmation. Errors from the
    /// engine (whitelist, resolution, binding) are audited and propagated.
    pub async fn run(
        &mut self,
        plan: &GatePlan,
        request: &ExecRequest,
        executor: &Executor,
        provider: &dyn ConfirmationProvider,
        audit: &AuditLog,
    ) -> Result<DispatchOutcome, DispatchError> {
        let id = plan.action_id.as_str();

        if plan.confidence < self.threshold {
            self.advance(GateState::AwaitLowConfConfirm);
            audit.record(
                DispatchStage::GateDecision,
                id,
                &format!(
                    "session={} confidence {:.4} below threshold {:.2}; extra confirmation required",
                    plan.session, plan.confidence, self.threshold
                ),
            )?;

            let prompt = format!(
                "Low confidence match ({:.3}) for '{}'.\nThis action has low confidence. Confirm running the matched action? Type YES to confirm: ",
                plan.confidence, id
            );
            let response = provider.request(&prompt).await;
            if !is_approval(response.as_deref()) {
                self.advance(GateState::Aborted);
                audit.record(
                    DispatchStage::GateDecision,
                    id,
                    &format!("session={} denied at low-confidence confirmation", plan.session),
                )?;
                return Ok(DispatchOutcome::failed(ABORT_LOW_CONFIDENCE));
            }
            audit.record(
                DispatchStage::GateDecision,
                id,
                &format!("session={} approved at low-confidence confirmation", plan.session),
            )?;
            self.advance(GateState::DryRun);
        } else {
            audit.record(
                DispatchStage::GateDecision,
                id,
                &format!(
                    "session={} confidence {:.4} meets threshold {:.2}",
                    plan.session, plan.confidence, self.threshold
                ),
            )?;
            self.advance(GateState::DryRun);
        }

        let preview = match executor.execute(id, request, true).await {
            Ok(preview) => preview,
            Err(e) => {
                audit.record(
                    DispatchStage::DryRun,
                    id,
                    &format!("session={} error: {}", plan.session, e),
                )?;
                return Err(e);
            }
        };
        audit.record(
            DispatchStage::DryRun,
            id,
            &format!("session={} {}", plan.session, preview.message),
        )?;

        self.advance(GateState::AwaitExecConfirm);
        let prompt = format!(
            "{}\nProceed with executing the action? Type YES to confirm: ",
            preview.message
        );
        let response = provider.request(&prompt).await;
        if !is_approval(response.as_deref()) {
            self.advance(GateState::Aborted);
            audit.record(
                DispatchStage::GateDecision,
                id,
                &format!("session={} denied at execution confirmation", plan.session),
            )?;
            return Ok(DispatchOutcome::failed(ABORT_EXECUTION));
        }

        self.advance(GateState::Executing);
        let outcome = match executor.execute(id, request, false).await {
            Ok(outcome) => outcome,
            Err(e) => {
                audit.record(
                    DispatchStage::Execution,
                    id,
                    &format!("session={} error: {}", plan.session, e),
                )?;
                return Err(e);
            }
        };
        audit.record(
            DispatchStage::Execution,
            id,
            &format!(
                "session={} success={} {}",
                plan.session, outcome.success, outcome.message
            ),
        )?;
        self.advance(GateState::Done);

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [GateState; 7] = [
        GateState::Matched,
        GateState::AwaitLowConfConfirm,
        GateState::DryRun,
        GateState::AwaitExecConfirm,
        GateState::Executing,
        GateState::Done,
        GateState::Aborted,
    ];

    #[test]
    fn test_valid_transitions() {
        assert!(is_valid_transition(GateState::Matched, GateState::DryRun));
        assert!(is_valid_transition(
            GateState::Matched,
            GateState::AwaitLowConfConfirm
        ));
        assert!(is_valid_transition(
            GateState::AwaitLowConfConfirm,
            GateState::DryRun
        ));
        assert!(is_valid_transition(
            GateState::AwaitLowConfConfirm,
            GateState::Aborted
        ));
        assert!(is_valid_transition(
            GateState::DryRun,
            GateState::AwaitExecConfirm
        ));
        assert!(is_valid_transition(
            GateState::AwaitExecConfirm,
            GateState::Executing
        ));
        assert!(is_valid_transition(
            GateState::AwaitExecConfirm,
            GateState::Aborted
        ));
        assert!(is_valid_transition(GateState::Executing, GateState::Done));
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for to in ALL_STATES {
            assert!(!is_valid_transition(GateState::Done, to));
            assert!(!is_valid_transition(GateState::Aborted, to));
        }
    }

    #[test]
    fn test_exact_transition_count() {
        let mut valid = 0;
        for from in ALL_STATES {
            for to in ALL_STATES {
                if is_valid_transition(from, to) {
                    valid += 1;
                }
            }
        }
        assert_eq!(valid, 8, "Expected exactly 8 valid transitions");
    }

    #[test]
    fn test_no_path_skips_dry_run() {
        // Executing is only reachable from AwaitExecConfirm, which is only
        // reachable from DryRun.
        for from in ALL_STATES {
            if is_valid_transition(from, GateState::Executing) {
                assert_eq!(from, GateState::AwaitExecConfirm);
            }
            if is_valid_transition(from, GateState::AwaitExecConfirm) {
                assert_eq!(from, GateState::DryRun);
            }
        }
    }

    #[test]
    fn test_new_gate_starts_matched() {
        let gate = ConfirmationGate::new(0.75);
        assert_eq!(gate.state(), GateState::Matched);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(GateState::Matched.to_string(), "matched");
        assert_eq!(
            GateState::AwaitLowConfConfirm.to_string(),
            "await_low_conf_confirm"
        );
        assert_eq!(GateState::DryRun.to_string(), "dry_run");
        assert_eq!(GateState::AwaitExecConfirm.to_string(), "await_exec_confirm");
        assert_eq!(GateState::Executing.to_string(), "executing");
        assert_eq!(GateState::Done.to_string(), "done");
        assert_eq!(GateState::Aborted.to_string(), "aborted");
    }
}
