//! Error types for consensus assembly

use thiserror::Error;

/// Assembly failure for a single read group
///
/// These are fatal for the group they occur in only; the session reports the
/// group as failed and moves on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// Group holds no reads at all
    #[error("Group {0} contains no reads")]
    EmptyGroup(String),

    /// Every read trimmed to nothing at the quality threshold
    #[error("Group {group}: no read passed quality trimming (threshold {threshold})")]
    NoUsableReads { group: String, threshold: u8 },
}

/// Result type for assembly operations
pub type AssemblyResult<T> = Result<T, AssemblyError>;
