//! Error types for a pull run.
//!
//! Errors are classified by blast radius:
//! - Record-level: one input record is unusable — skip it, count it, keep going
//! - Run-level: the whole run aborts and the previously published snapshot
//!   stays authoritative

use thiserror::Error;

/// Error type for the fetch → normalize → index → publish pipeline.
#[derive(Debug, Error)]
pub enum PullError {
    // Run-level errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TidyHQ request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Normalization produced zero usable contacts")]
    EmptyDataset,

    // The org record is a singleton, so an unusable one aborts the run
    // instead of being skipped like list records.
    #[error("Organization record is malformed: {0}")]
    MalformedOrg(String),

    #[error("Publish incomplete, previous snapshot remains authoritative: {0}")]
    PublishIncomplete(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Record-level error — recovered by the normalizer (skip + count)
    #[error("Malformed {category} record: {reason}")]
    MalformedRecord {
        category: &'static str,
        reason: String,
    },
}

impl PullError {
    /// Shorthand for the one recoverable variant.
    pub fn malformed(category: &'static str, reason: impl Into<String>) -> Self {
        PullError::MalformedRecord {
            category,
            reason: reason.into(),
        }
    }

    /// Returns true if this error aborts the whole run.
    ///
    /// Everything except `MalformedRecord` is fatal; malformed records are
    /// dropped by the normalizer and reported in the run summary instead.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PullError::MalformedRecord { .. })
    }
}
