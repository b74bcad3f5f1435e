use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter};

use anyhow::ensure;
use futures::future::try_join_all;
use itertools::Itertools;
use log::{debug, info, log_enabled, warn, Level};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::IntoEnumIterator;

use crate::error::{OptError, OptResult};
use crate::pattern::{GraphPattern, Quad, QuadPattern, QuadPosition, SampleRow};
use crate::sampling::{sample_indexes, EnumerationResult, EstimateEntry, QuadSource, SubsetKey};

/// Where a pattern joins the patterns of a subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinLocation {
    Position(QuadPosition),
    /// No shared variable, the join is a cross product.
    Cartesian,
}

impl JoinLocation {
    /// Position of the first variable of `pattern`, scanning subject, predicate, object and
    /// graph in that order, that is also a variable of one of `base`.
    pub fn locate(base: &[&GraphPattern], pattern: &GraphPattern) -> Self {
        let bound: HashSet<&str> = base
            .iter()
            .flat_map(|base_pattern| base_pattern.variables())
            .collect();

        QuadPosition::iter()
            .find(|&position| {
                pattern
                    .variable_at(position)
                    .map_or(false, |variable| bound.contains(variable))
            })
            .map_or(JoinLocation::Cartesian, JoinLocation::Position)
    }

    /// `s`, `p`, `o`, `g` or `c` for cartesian.
    pub fn code(self) -> &'static str {
        match self {
            JoinLocation::Position(position) => position.code(),
            JoinLocation::Cartesian => "c",
        }
    }
}

impl Display for JoinLocation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of extending one subset by one pattern.
struct JoinStep {
    entry: EstimateEntry,
    /// Number of `sample` lookups issued.
    sample_cost: usize,
}

/// Estimates join cardinalities by sampling a [`QuadSource`] bottom up.
///
/// Every pattern is counted and sampled first. Then subsets grow one pattern at a time, in
/// increasing size, until every connected subset has an estimate or the lookup budget is spent.
/// Patterns are addressed by their position in the slice handed to [`JoinSampler::run`], which
/// must be the canonical order of the pattern graph.
pub struct JoinSampler<'a, S: ?Sized, R = StdRng> {
    source: &'a S,
    sample_width: usize,
    budget: usize,
    rng: R,
}

impl<'a, S: QuadSource + ?Sized> JoinSampler<'a, S, StdRng> {
    pub fn new(source: &'a S, sample_width: usize, budget: usize) -> Self {
        Self {
            source,
            sample_width,
            budget,
            rng: StdRng::from_entropy(),
        }
    }
}

impl<'a, S: QuadSource + ?Sized, R: Rng> JoinSampler<'a, S, R> {
    /// Replaces the random source, e.g. with a seeded one for reproducible estimates.
    pub fn with_rng<R2: Rng>(self, rng: R2) -> JoinSampler<'a, S, R2> {
        JoinSampler {
            source: self.source,
            sample_width: self.sample_width,
            budget: self.budget,
            rng,
        }
    }

    pub fn sample_width(&self) -> usize {
        self.sample_width
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub async fn run(&mut self, patterns: &[&GraphPattern]) -> OptResult<EnumerationResult> {
        ensure!(
            !patterns.is_empty(),
            OptError::InvalidCombination("Sampling requires at least one pattern".to_string())
        );
        ensure!(
            self.sample_width > 0,
            OptError::InvalidCombination("Sample width must be positive".to_string())
        );

        let mut estimates = HashMap::new();
        for (idx, pattern) in patterns.iter().enumerate() {
            let entry = self.sample_pattern(pattern).await?;
            debug!(
                "Pattern {} ({}) matches {} quads, sampled {} rows",
                idx,
                pattern,
                entry.estimated_cardinality,
                entry.sample.len()
            );
            estimates.insert(SubsetKey::single(idx), entry);
        }

        let mut queue: VecDeque<(SubsetKey, usize)> = (0..patterns.len())
            .tuple_combinations()
            .map(|(base, new_index)| (SubsetKey::single(base), new_index))
            .collect();
        let mut enqueued: HashSet<SubsetKey> = queue
            .iter()
            .map(|(base, new_index)| base.with(*new_index))
            .collect();

        let mut remaining = i64::try_from(self.budget).unwrap_or(i64::MAX);
        let mut max_fully_estimated_size = None;

        while let Some((base, new_index)) = queue.pop_front() {
            let combination = base.with(new_index);
            ensure!(
                base.len() + 1 == combination.len(),
                OptError::InvalidCombination(format!(
                    "Pattern {} already in subset {}",
                    new_index, base
                ))
            );

            let base_entry = estimates.get(&base).ok_or_else(|| {
                OptError::InvalidCombination(format!("Subset {} has no estimate", base))
            })?;
            if base_entry.sample.is_empty() {
                debug!("Skipping {}: subset {} has no sampled rows", combination, base);
                continue;
            }

            let base_patterns: Vec<&GraphPattern> = base.iter().map(|&idx| patterns[idx]).collect();
            let position = match JoinLocation::locate(&base_patterns, patterns[new_index]) {
                JoinLocation::Position(position) => position,
                JoinLocation::Cartesian => {
                    // TODO: estimate cross products so disconnected pattern graphs can be ordered.
                    debug!(
                        "Skipping {}: pattern {} shares no variable with {}",
                        combination, new_index, base
                    );
                    continue;
                }
            };

            let step = self
                .sample_join(base_entry, patterns[new_index], position)
                .await?;
            debug!(
                "Estimated {} by joining pattern {} at {}: cardinality {:.2}, {} rows, {} lookups",
                combination,
                new_index,
                position.code(),
                step.entry.estimated_cardinality,
                step.entry.sample.len(),
                step.sample_cost
            );
            estimates.insert(combination.clone(), step.entry);

            remaining -= i64::try_from(step.sample_cost).unwrap_or(i64::MAX);
            if remaining < 0 {
                let next_size = queue
                    .front()
                    .map_or(combination.len() + 1, |(next_base, _)| next_base.len() + 1);
                let covered = next_size - 1;
                if covered < patterns.len() {
                    max_fully_estimated_size = Some(covered);
                }
                warn!(
                    "Sampling budget of {} exhausted after {}, fully estimated up to {} patterns",
                    self.budget, combination, covered
                );
                break;
            }

            for extra in (0..patterns.len()).filter(|&idx| !combination.contains(idx)) {
                if enqueued.insert(combination.with(extra)) {
                    queue.push_back((combination.clone(), extra));
                }
            }
        }

        let result = EnumerationResult {
            estimates,
            max_fully_estimated_size,
        };
        info!(
            "Sampled {} subsets of {} patterns, remaining budget {}, max fully estimated size {:?}",
            result.estimates.len(),
            patterns.len(),
            remaining,
            result.max_fully_estimated_size
        );
        if log_enabled!(Level::Debug) {
            debug!("Join estimates:\n{}", result.to_table());
        }
        Ok(result)
    }

    /// Counts `pattern` and samples its rows. Not charged to the budget.
    ///
    /// The count treats every variable as a wildcard, so quads breaking a repeated variable
    /// (`?a <p> ?a`) are counted but cannot be bound. The count is scaled by the share of drawn
    /// quads that bind.
    async fn sample_pattern(&mut self, pattern: &GraphPattern) -> OptResult<EstimateEntry> {
        let lookup = pattern.to_lookup();
        let count = self.source.count(&lookup).await?;
        let indexes = sample_indexes(count, self.sample_width, &mut self.rng);
        let quads = if indexes.is_empty() {
            vec![]
        } else {
            self.source.sample(&indexes, &lookup).await?
        };

        let sample: Vec<SampleRow> = quads.iter().filter_map(|quad| pattern.bind(quad)).collect();
        let estimated_cardinality = count as f64 * survival(sample.len(), indexes.len());
        Ok(EstimateEntry {
            sample,
            estimated_cardinality,
        })
    }

    /// Joins `pattern` to the rows of `base` on the variable at `position`.
    ///
    /// Every base row is counted against the source with its value substituted at `position`.
    /// The candidates of all rows form one contiguous range, from which `sample_width` positions
    /// are drawn without replacement and fetched one by one.
    async fn sample_join(
        &mut self,
        base: &EstimateEntry,
        pattern: &GraphPattern,
        position: QuadPosition,
    ) -> OptResult<JoinStep> {
        let variable = pattern.variable_at(position).ok_or_else(|| {
            OptError::UnsupportedJoinPosition(format!(
                "No variable at {} of {}",
                position.code(),
                pattern
            ))
        })?;

        let template = pattern.to_lookup();
        let lookups = base
            .sample
            .iter()
            .map(|row| {
                let value = row.get(variable).ok_or_else(|| {
                    OptError::UnsupportedJoinPosition(format!(
                        "Sampled row does not bind ?{}",
                        variable
                    ))
                })?;
                let mut lookup = template.clone();
                lookup.set(position, Some(value.clone()));
                Ok(lookup)
            })
            .collect::<OptResult<Vec<QuadPattern>>>()?;

        let source = self.source;
        let counts = try_join_all(lookups.iter().map(|lookup| source.count(lookup))).await?;

        // Exclusive end of every row's candidates in the combined range.
        let mut ends = Vec::with_capacity(counts.len());
        let mut total = 0usize;
        for count in &counts {
            total = total.checked_add(*count).ok_or_else(|| {
                OptError::InvalidCombination(format!(
                    "Candidates of {} sampled rows for {} overflow",
                    counts.len(),
                    pattern
                ))
            })?;
            ends.push(total);
        }

        let requests: Vec<(usize, [usize; 1])> =
            sample_indexes(total, self.sample_width, &mut self.rng)
                .into_iter()
                .map(|global| {
                    let row = ends.partition_point(|&end| end <= global);
                    let start = if row == 0 { 0 } else { ends[row - 1] };
                    (row, [global - start])
                })
                .collect();

        let fetched: Vec<Vec<Quad>> = try_join_all(
            requests
                .iter()
                .map(|(row, offset)| source.sample(offset, &lookups[*row])),
        )
        .await?;

        // Drawn quads disagreeing with their base row on another shared variable are not
        // join results and are dropped.
        let sample: Vec<SampleRow> = requests
            .iter()
            .zip(fetched.iter())
            .filter_map(|((row, _), quads)| {
                quads
                    .first()
                    .and_then(|quad| pattern.extend_row(&base.sample[*row], quad))
            })
            .collect();

        let selectivity = total as f64 / base.sample.len() as f64
            * survival(sample.len(), requests.len());
        Ok(JoinStep {
            entry: EstimateEntry {
                sample,
                estimated_cardinality: selectivity * base.estimated_cardinality,
            },
            sample_cost: requests.len(),
        })
    }
}

/// Share of `drawn` quads that made it into a sample. Nothing drawn means nothing survives.
fn survival(kept: usize, drawn: usize) -> f64 {
    if drawn == 0 {
        0.0
    } else {
        kept as f64 / drawn as f64
    }
}
