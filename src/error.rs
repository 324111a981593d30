//! Error types for stockdash_rs
//!
//! This module defines domain-specific error types that provide clear,
//! actionable error messages to callers.

use thiserror::Error;

/// Failures while fetching a live quote for a single symbol.
///
/// These never reach the user as error messages: the caller substitutes the
/// sentinel quote for the affected symbol and keeps polling.
#[derive(Debug, Error)]
pub enum QuoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned HTTP {0} for {1}")]
    Status(u16, String),
}
