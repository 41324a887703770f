//! The confirmation channel: a blocking request/response text exchange.
//!
//! The gate suspends on a pluggable provider so the surrounding
//! application decides where prompts go (console, UI, test double).
//! Approval is exactly the literal token `YES`, case-insensitive; any
//! other response — including an interrupted or absent one — denies.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

/// The literal affirmative token required for approval.
pub const APPROVAL_TOKEN: &str = "YES";

/// Blocking request/response channel for human approval.
#[async_trait]
pub trait ConfirmationProvider: Send + Sync {
    /// Present `prompt` and return the raw response text.
    ///
    /// `None` means the request was interrupted or cancelled; the gate
    /// treats that as a denial, never as approval by default.
    async fn request(&self, prompt: &str) -> Option<String>;
}

/// True only for an exact, case-insensitive `YES`.
pub fn is_approval(response: Option<&str>) -> bool {
    matches!(response, Some(text) if text.trim().eq_ignore_ascii_case(APPROVAL_TOKEN))
}

/// Scripted provider replaying canned responses, for tests and
/// programmatic drivers.
///
/// Responses are consumed front to back; once exhausted, every further
/// request is answered with `None` (denial). Prompts are captured so
/// callers can assert how many confirmations were requested.
#[derive(Default)]
pub struct ScriptedConfirmation {
    responses: Mutex<VecDeque<Option<String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedConfirmation {
    /// Provider answering with the given responses in order.
    pub fn new(responses: Vec<Option<&str>>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Provider approving every request.
    pub fn always_yes() -> Self {
        Self::new(vec![Some(APPROVAL_TOKEN); 16])
    }

    /// Prompts received so far, in order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of confirmation requests received so far.
    pub fn request_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ConfirmationProvider for ScriptedConfirmation {
    async fn request(&self, prompt: &str) -> Option<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses.lock().unwrap().pop_front().flatten()
    }
}
