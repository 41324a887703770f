//! Console confirmation provider.
//!
//! Prints the gate's prompt to stdout and blocks on one line of stdin.
//! EOF or a read error is reported as `None`, which the gate treats as a
//! denial.

use async_trait::async_trait;
use sayso_dispatch::ConfirmationProvider;
use std::io::{BufRead, Write};

pub struct ConsoleConfirmation;

#[async_trait]
impl ConfirmationProvider for ConsoleConfirmation {
    async fn request(&self, prompt: &str) -> Option<String> {
        let prompt = prompt.to_string();
        // Blocking stdin read; keep it off the async worker threads.
        tokio::task::spawn_blocking(move || {
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            if write!(out, "{}", prompt).is_err() || out.flush().is_err() {
                return None;
            }

            let stdin = std::io::stdin();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => None, // EOF: treat as cancelled
                Ok(_) => Some(line.trim().to_string()),
                Err(_) => None,
            }
        })
        .await
        .ok()
        .flatten()
    }
}
