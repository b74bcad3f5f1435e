use thiserror::Error;

/// Result type used across the optimizer.
///
/// Failures raised by a [`QuadSource`](crate::sampling::QuadSource) travel through it unchanged.
pub type OptResult<T> = anyhow::Result<T>;

/// Internal consistency errors of the optimizer.
///
/// All of them are programming errors: they are never retried and abort the current search.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptError {
    #[error("Invalid combination: {0}")]
    InvalidCombination(String),
    #[error("Unsupported join position: {0}")]
    UnsupportedJoinPosition(String),
    #[error("Inconsistent plan: {0}")]
    InconsistentPlan(String),
}
