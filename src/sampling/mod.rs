//! Sampling based cardinality estimation.
//!
//! Nothing is known about the data upfront. The [`JoinSampler`] counts every pattern against a
//! [`QuadSource`], keeps a small uniform sample of matching rows, and grows joined subsets one
//! pattern at a time. A join step counts the candidates of every sampled row, scales the
//! subset's cardinality by the observed selectivity, and draws a fresh sample from the
//! candidates with weighted sampling without replacement. Every positional lookup is charged to
//! a budget; once it is spent the estimates stop at the largest fully covered subset size.

mod estimate;
pub use estimate::*;
mod index;
pub use index::*;
mod sampler;
pub use sampler::*;
mod source;
pub use source::*;
