//! Shared foundation for the sayso dispatch pipeline.
//!
//! Holds the configuration model and the top-level error type used across
//! the matcher, dispatch, and application crates.

pub mod config;
pub mod error;

pub use config::SaysoConfig;
pub use error::{Result, SaysoError};
