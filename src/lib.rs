//! ## Background
//!
//! A basic graph pattern query is a join of quad patterns, and the order in which the patterns
//! are joined decides how many intermediate rows an engine produces. Classic cost based join
//! ordering relies on statistics collected upfront, which graph stores without a fixed schema
//! rarely have, and which describe single predicates poorly once patterns are correlated.
//!
//! This crate estimates join cardinalities at optimization time instead. Patterns are sampled
//! against an index of the data [3], and samples of joined subsets are grown one pattern at a
//! time, in the spirit of wander join [4]. The estimates feed a bottom-up dynamic programming
//! search over bushy join trees [1], enumerating only pairs of connected subgraphs so cross
//! products are never considered [2].
//!
//! ## Design
//!
//! ### Pattern graph
//!
//! [`pattern::PatternGraph`] connects patterns sharing a variable and renumbers them in breadth
//! first order from a root pattern. Every later stage works on these canonical indices.
//!
//! ### Join sampler
//!
//! [`sampling::JoinSampler`] counts and samples every pattern through a
//! [`sampling::QuadSource`], then estimates every connected subset in increasing size until its
//! lookup budget runs out. A partial result records the largest subset size it fully covers.
//!
//! ### Plan enumerator
//!
//! [`search::PlanEnumerator`] runs DPccp over the estimates and returns the cheapest
//! [`plan::PlanNode`] tree. When the estimates are partial, the plan covers fewer patterns and
//! the remaining ones are handed back to the caller.
//!
//! [`optimizer::SamplingJoinOptimizer`] wires the three stages together.
//!
//! ## Reference
//!
//! 1. Selinger, P. Griffiths, et al. "Access path selection in a relational database management
//! system." Readings in Artificial Intelligence and Databases. Morgan Kaufmann, 1989. 511-522.
//! 2. Moerkotte, G. and Neumann, T., 2006. Analysis of two existing and one new dynamic
//! programming algorithm for the generation of optimal bushy join trees without cross products.
//! VLDB, pp.930-941.
//! 3. Leis, V., Radke, B., Gubichev, A., Kemper, A. and Neumann, T., 2017. Cardinality
//! estimation done right: Index-based join sampling. CIDR.
//! 4. Li, F., Wu, B., Yi, K. and Zhao, Z., 2016. Wander join: Online aggregation via random
//! walks. SIGMOD, pp.615-629.

#[macro_use]
extern crate prettytable;

pub mod error;
pub mod optimizer;
pub mod pattern;
pub mod plan;
pub mod sampling;
pub mod search;
pub mod store;
