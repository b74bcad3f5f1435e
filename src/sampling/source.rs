use async_trait::async_trait;

use crate::error::OptResult;
use crate::pattern::{Quad, QuadPattern};

/// Indexed quad source the optimizer samples from.
///
/// Both lookups address the result set of a [`QuadPattern`], where `None` positions are
/// wildcards. Implementations should answer positional lookups through an index rather than a
/// scan. Errors are passed to the caller of the optimizer unchanged and are never retried.
#[async_trait]
pub trait QuadSource: Send + Sync {
    /// Number of quads matching `pattern`.
    async fn count(&self, pattern: &QuadPattern) -> OptResult<usize>;

    /// Quads at the given 0-based positions of the result set of `pattern`.
    async fn sample(&self, indexes: &[usize], pattern: &QuadPattern) -> OptResult<Vec<Quad>>;
}
