//! In-memory quad source.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use itertools::Itertools;
use log::trace;

use crate::error::OptResult;
use crate::pattern::{Quad, QuadPattern};
use crate::sampling::QuadSource;

/// A set of quads answering lookups by scanning in quad order.
///
/// Meant for tests and small datasets: there is no index, so every lookup walks the quads up to
/// the last requested position. Sources backed by real data should implement [`QuadSource`] over
/// their own indexes.
///
/// Duplicate quads are stored once. Every `count` and `sample` call is counted, which makes the
/// store handy to check how many lookups an optimization issued.
#[derive(Debug, Default)]
pub struct MemoryQuadStore {
    quads: BTreeSet<Quad>,
    count_calls: AtomicUsize,
    sample_calls: AtomicUsize,
}

impl MemoryQuadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the quad was already present.
    pub fn insert(&mut self, quad: Quad) -> bool {
        self.quads.insert(quad)
    }

    pub fn len(&self) -> usize {
        self.quads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quads.is_empty()
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::Relaxed)
    }

    pub fn sample_calls(&self) -> usize {
        self.sample_calls.load(Ordering::Relaxed)
    }

    fn matching<'a>(&'a self, pattern: &'a QuadPattern) -> impl Iterator<Item = &'a Quad> + 'a {
        self.quads.iter().filter(move |quad| pattern.matches(quad))
    }
}

impl FromIterator<Quad> for MemoryQuadStore {
    fn from_iter<I: IntoIterator<Item = Quad>>(iter: I) -> Self {
        Self {
            quads: iter.into_iter().collect(),
            ..Self::default()
        }
    }
}

#[async_trait]
impl QuadSource for MemoryQuadStore {
    async fn count(&self, pattern: &QuadPattern) -> OptResult<usize> {
        self.count_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.matching(pattern).count())
    }

    /// Quads are returned in the order of `indexes`. Positions past the end of the result set
    /// are skipped.
    async fn sample(&self, indexes: &[usize], pattern: &QuadPattern) -> OptResult<Vec<Quad>> {
        self.sample_calls.fetch_add(1, Ordering::Relaxed);
        trace!("Sampling {} quads matching {:?}", indexes.len(), pattern);

        // (position, slot in the answer), walked alongside a single scan of the matches.
        let wanted: Vec<(usize, usize)> = indexes
            .iter()
            .copied()
            .enumerate()
            .map(|(slot, index)| (index, slot))
            .sorted()
            .collect();
        let mut found: Vec<Option<Quad>> = vec![None; indexes.len()];
        let mut pending = wanted.iter().peekable();
        for (position, quad) in self.matching(pattern).enumerate() {
            while let Some((_, slot)) = pending.next_if(|(index, _)| *index == position) {
                found[*slot] = Some(quad.clone());
            }
            if pending.peek().is_none() {
                break;
            }
        }
        Ok(found.into_iter().flatten().collect())
    }
}
