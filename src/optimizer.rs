use std::collections::BTreeSet;

use anyhow::ensure;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{OptError, OptResult};
use crate::pattern::{GraphPattern, PatternGraph};
use crate::plan::{JoinExecutor, PlanNodeRef};
use crate::sampling::{EnumerationResult, JoinSampler, QuadSource};
use crate::search::PlanEnumerator;

const DEFAULT_SAMPLE_WIDTH: usize = 10;
const DEFAULT_BUDGET: usize = 1000;

/// Tuning knobs of the sampling optimizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptimizerContext {
    /// Maximum number of rows kept per estimated subset.
    pub sample_width: usize,
    /// Number of positional lookups the join sampler may issue.
    pub budget: usize,
}

impl Default for OptimizerContext {
    fn default() -> Self {
        Self {
            sample_width: DEFAULT_SAMPLE_WIDTH,
            budget: DEFAULT_BUDGET,
        }
    }
}

impl OptimizerContext {
    pub fn with_sample_width(mut self, sample_width: usize) -> Self {
        self.sample_width = sample_width;
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }
}

/// How a cardinality handed to the caller was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardinalityKind {
    /// Extrapolated from samples.
    Estimate,
}

/// Cardinality metadata attached to a partial join result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CardinalityEstimate {
    pub kind: CardinalityKind,
    pub value: f64,
}

/// Result of executing an optimized join.
#[derive(Clone, Debug, PartialEq)]
pub struct PartialJoin<E> {
    /// Join of every pattern the plan covers.
    pub joined: E,
    /// Entries of the patterns left out of the plan, in input order. They still have to be
    /// joined with `joined` by the caller.
    pub remaining: Vec<E>,
    pub cardinality: CardinalityEstimate,
}

/// Optimizes the join order of graph patterns against a quad source.
///
/// Runs the whole pipeline: the connectivity graph fixes a canonical order, the join sampler
/// estimates subset cardinalities, and the plan enumerator picks the cheapest join tree over
/// them.
pub struct SamplingJoinOptimizer<'a, S: ?Sized, R = StdRng> {
    source: &'a S,
    context: OptimizerContext,
    rng: R,
}

impl<'a, S: QuadSource + ?Sized> SamplingJoinOptimizer<'a, S, StdRng> {
    pub fn new(source: &'a S, context: OptimizerContext) -> Self {
        Self {
            source,
            context,
            rng: StdRng::from_entropy(),
        }
    }

    /// Optimizer with a seeded random source, producing the same estimates on every run over
    /// the same data.
    pub fn with_seed(source: &'a S, context: OptimizerContext, seed: u64) -> Self {
        Self {
            source,
            context,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<'a, S: QuadSource + ?Sized, R: Rng> SamplingJoinOptimizer<'a, S, R> {
    pub fn with_rng<R2: Rng>(self, rng: R2) -> SamplingJoinOptimizer<'a, S, R2> {
        SamplingJoinOptimizer {
            source: self.source,
            context: self.context,
            rng,
        }
    }

    pub fn context(&self) -> &OptimizerContext {
        &self.context
    }

    /// Finds a join order for `patterns`, starting the canonical order at `root`.
    ///
    /// Lookup errors of the source are returned unchanged.
    pub async fn optimize(&mut self, patterns: &[GraphPattern], root: usize) -> OptResult<OptimizedJoin> {
        let graph = PatternGraph::build(patterns, root)?;
        let ordered = graph.ordered(patterns);

        let estimates = JoinSampler::new(self.source, self.context.sample_width, self.context.budget)
            .with_rng(&mut self.rng)
            .run(&ordered)
            .await?;

        let plan = PlanEnumerator::new(&graph, &estimates).search()?;
        let optimized = OptimizedJoin {
            graph,
            estimates,
            plan,
        };

        if optimized.is_sampling_unusable() {
            warn!(
                "Sampling budget of {} does not cover any join, plan is a single pattern",
                self.context.budget
            );
        }
        info!(
            "Optimized {} patterns, plan covers {:?}, estimated cardinality {:.2}:\n{}",
            patterns.len(),
            optimized.covered(),
            optimized.plan.estimated_size(),
            optimized.plan
        );
        Ok(optimized)
    }
}

/// A join plan together with the graph and the estimates it was derived from.
#[derive(Debug)]
pub struct OptimizedJoin {
    graph: PatternGraph,
    estimates: EnumerationResult,
    plan: PlanNodeRef,
}

impl OptimizedJoin {
    pub fn graph(&self) -> &PatternGraph {
        &self.graph
    }

    pub fn estimates(&self) -> &EnumerationResult {
        &self.estimates
    }

    /// The plan, over canonical pattern indices.
    pub fn plan(&self) -> &PlanNodeRef {
        &self.plan
    }

    /// True when not even pairs of patterns were estimated. The plan then is a single pattern
    /// and callers should order the join by other means.
    pub fn is_sampling_unusable(&self) -> bool {
        self.estimates.is_degenerate()
    }

    /// Input indices of the patterns joined by the plan, ascending.
    pub fn covered(&self) -> Vec<usize> {
        self.partition_input(true)
    }

    /// Input indices of the patterns the plan leaves out, ascending.
    pub fn uncovered(&self) -> Vec<usize> {
        self.partition_input(false)
    }

    pub fn cardinality(&self) -> CardinalityEstimate {
        CardinalityEstimate {
            kind: CardinalityKind::Estimate,
            value: self.plan.estimated_size(),
        }
    }

    /// Joins `entries`, one per pattern in input order, following the plan.
    pub async fn execute<E, J>(&self, entries: Vec<E>, joiner: &J) -> OptResult<PartialJoin<E>>
    where
        E: Clone + Send + Sync + 'static,
        J: JoinExecutor<E> + ?Sized,
    {
        ensure!(
            entries.len() == self.graph.len(),
            OptError::InconsistentPlan(format!(
                "Got {} entries for {} patterns",
                entries.len(),
                self.graph.len()
            ))
        );

        let canonical: Vec<E> = self.graph.ordered(&entries).into_iter().cloned().collect();
        let joined = self.plan.execute(&canonical, joiner).await?;

        let entries_of_plan = self.plan.entries();
        let remaining = entries
            .into_iter()
            .enumerate()
            .filter(|(original, _)| !entries_of_plan.contains(self.graph.canonical_index(*original)))
            .map(|(_, entry)| entry)
            .collect();

        Ok(PartialJoin {
            joined,
            remaining,
            cardinality: self.cardinality(),
        })
    }

    fn partition_input(&self, inside: bool) -> Vec<usize> {
        let covered: BTreeSet<usize> = self
            .plan
            .entries()
            .iter()
            .map(|&canonical| self.graph.original_index(canonical))
            .collect();
        (0..self.graph.len())
            .filter(|original| covered.contains(original) == inside)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{PatternTerm, Quad};
    use crate::store::MemoryQuadStore;

    fn pattern(s: &str, p: &str, o: &str) -> GraphPattern {
        let term = |value: &str| match value.strip_prefix('?') {
            Some(name) => PatternTerm::var(name),
            None => PatternTerm::bound(value),
        };
        GraphPattern::new(term(s), term(p), term(o))
    }

    /// 7 subjects with one `<p0>` object, three `<p1>` objects and two `<p2>` objects each.
    fn star_store() -> MemoryQuadStore {
        let mut store = MemoryQuadStore::new();
        for s in 0..7 {
            let subject = format!("<s{}>", s);
            store.insert(Quad::new(subject.as_str(), "<p0>", format!("<a{}>", s), "<g>"));
            for o in 0..3 {
                store.insert(Quad::new(subject.as_str(), "<p1>", format!("<b{}_{}>", s, o), "<g>"));
            }
            for o in 0..2 {
                store.insert(Quad::new(subject.as_str(), "<p2>", format!("<c{}_{}>", s, o), "<g>"));
            }
        }
        store
    }

    fn star_patterns() -> Vec<GraphPattern> {
        vec![
            pattern("?v0", "<p0>", "?v1"),
            pattern("?v0", "<p1>", "?v2"),
            pattern("?v0", "<p2>", "?v3"),
        ]
    }

    fn concat(left: String, right: String) -> impl std::future::Future<Output = OptResult<String>> {
        async move { Ok(format!("{}{}", left, right)) }
    }

    fn sorted_chars(value: &str) -> String {
        let mut chars: Vec<char> = value.chars().collect();
        chars.sort_unstable();
        chars.into_iter().collect()
    }

    fn entries() -> Vec<String> {
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    }

    #[test]
    fn test_context_defaults() {
        let context = OptimizerContext::default();
        assert_eq!(10, context.sample_width);
        assert_eq!(1000, context.budget);

        let context = context.with_budget(5).with_sample_width(3);
        assert_eq!(OptimizerContext { sample_width: 3, budget: 5 }, context);
    }

    #[tokio::test]
    async fn test_full_plan() {
        let store = star_store();
        let mut optimizer = SamplingJoinOptimizer::with_seed(&store, OptimizerContext::default(), 1);

        let optimized = optimizer.optimize(&star_patterns(), 0).await.unwrap();

        assert!(optimized.estimates().is_complete());
        assert!(!optimized.is_sampling_unusable());
        assert_eq!(vec![0, 1, 2], optimized.covered());
        assert!(optimized.uncovered().is_empty());
        assert_eq!(2, optimized.plan().join_count());
        // <p0> joins <p2> first: 7 * 14 + 14 + 7 + 14 = 133, then 14 * 21 + 42 + 133 + 21.
        assert_eq!(490.0, optimized.plan().cost());
        assert_eq!(
            CardinalityEstimate {
                kind: CardinalityKind::Estimate,
                value: 42.0
            },
            optimized.cardinality()
        );

        let result = optimized.execute(entries(), &concat).await.unwrap();
        assert_eq!("ABC", sorted_chars(&result.joined));
        assert!(result.remaining.is_empty());
    }

    #[tokio::test]
    async fn test_partial_plan_hands_back_uncovered() {
        let store = star_store();
        let context = OptimizerContext::default().with_budget(25);
        let mut optimizer = SamplingJoinOptimizer::with_seed(&store, context, 1);

        let optimized = optimizer.optimize(&star_patterns(), 0).await.unwrap();

        assert_eq!(Some(2), optimized.estimates().max_fully_estimated_size);
        assert_eq!(2, optimized.plan().entries().len());
        assert_eq!(vec![0, 2], optimized.covered());
        assert_eq!(vec![1], optimized.uncovered());

        let result = optimized.execute(entries(), &concat).await.unwrap();
        assert_eq!("AC", sorted_chars(&result.joined));
        assert_eq!(vec!["B".to_string()], result.remaining);
        assert_eq!(CardinalityKind::Estimate, result.cardinality.kind);
        assert_eq!(14.0, result.cardinality.value);
    }

    #[tokio::test]
    async fn test_degenerate_sampling() {
        let store = star_store();
        let context = OptimizerContext::default().with_budget(5);
        let mut optimizer = SamplingJoinOptimizer::with_seed(&store, context, 1);

        let optimized = optimizer.optimize(&star_patterns(), 0).await.unwrap();

        assert!(optimized.is_sampling_unusable());
        assert!(optimized.plan().is_leaf());
        assert_eq!(vec![0], optimized.covered());
        assert_eq!(vec![1, 2], optimized.uncovered());
    }

    #[tokio::test]
    async fn test_execute_rejects_entry_count_mismatch() {
        let store = star_store();
        let mut optimizer = SamplingJoinOptimizer::with_seed(&store, OptimizerContext::default(), 1);
        let optimized = optimizer.optimize(&star_patterns(), 0).await.unwrap();

        let err = optimized
            .execute(vec!["A".to_string()], &concat)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OptError>(),
            Some(OptError::InconsistentPlan(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_patterns_rejected() {
        let store = star_store();
        let mut optimizer = SamplingJoinOptimizer::new(&store, OptimizerContext::default());
        assert!(optimizer.optimize(&[], 0).await.is_err());
    }
}
