//! Cost based join order search over sampled estimates.

mod enumerator;
pub use enumerator::*;
