use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;
use prettytable::Table;
use smallvec::SmallVec;

use crate::pattern::SampleRow;

/// Canonical identity of a set of canonical pattern indices.
///
/// Members are kept sorted and deduplicated, so every permutation of the same members produces
/// an equal key. Renders as a JSON array, e.g. `[0,2,5]`.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubsetKey(SmallVec<[usize; 8]>);

impl SubsetKey {
    pub fn new<I: IntoIterator<Item = usize>>(indexes: I) -> Self {
        let mut members: SmallVec<[usize; 8]> = indexes.into_iter().collect();
        members.sort_unstable();
        members.dedup();
        Self(members)
    }

    pub fn single(index: usize) -> Self {
        Self(SmallVec::from_slice(&[index]))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &usize> {
        self.0.iter()
    }

    /// This subset plus `index`.
    pub fn with(&self, index: usize) -> Self {
        Self::new(self.0.iter().copied().chain(Some(index)))
    }

    pub fn union(&self, other: &SubsetKey) -> Self {
        Self::new(self.0.iter().chain(other.0.iter()).copied())
    }

    pub fn is_disjoint(&self, other: &SubsetKey) -> bool {
        !self.0.iter().any(|&index| other.contains(index))
    }
}

impl FromIterator<usize> for SubsetKey {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl Display for SubsetKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.iter().join(","))
    }
}

/// Sampled rows and estimated cardinality of one subset of patterns.
///
/// The cardinality of a multi-pattern subset is a running product of selectivities, only single
/// patterns are counted against the source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EstimateEntry {
    pub sample: Vec<SampleRow>,
    pub estimated_cardinality: f64,
}

/// Output of the join sampler.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnumerationResult {
    pub estimates: HashMap<SubsetKey, EstimateEntry>,
    /// Set when the budget ran out: every subset up to this size has been estimated, larger
    /// ones may be missing.
    pub max_fully_estimated_size: Option<usize>,
}

impl EnumerationResult {
    pub fn get(&self, key: &SubsetKey) -> Option<&EstimateEntry> {
        self.estimates.get(key)
    }

    pub fn cardinality(&self, key: &SubsetKey) -> Option<f64> {
        self.get(key).map(|entry| entry.estimated_cardinality)
    }

    pub fn is_complete(&self) -> bool {
        self.max_fully_estimated_size.is_none()
    }

    /// The budget did not even cover the pairwise estimates, sampling is unusable for ordering.
    pub fn is_degenerate(&self) -> bool {
        self.max_fully_estimated_size == Some(1)
    }

    /// Largest subset size a plan over `pattern_count` patterns may rely on.
    pub fn size_bound(&self, pattern_count: usize) -> usize {
        self.max_fully_estimated_size
            .map_or(pattern_count, |size| size.min(pattern_count))
    }

    /// Estimates ordered by subset size, then members.
    pub fn to_table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(row!["subset", "estimated cardinality", "sample size"]);
        for (key, entry) in self
            .estimates
            .iter()
            .sorted_by(|(left, _), (right, _)| (left.len(), *left).cmp(&(right.len(), *right)))
        {
            table.add_row(row![
                key,
                format!("{:.2}", entry.estimated_cardinality),
                entry.sample.len()
            ]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use itertools::Itertools;

    use super::*;

    #[test]
    fn test_key_ignores_member_order() {
        let keys: Vec<SubsetKey> = [3usize, 0, 2]
            .into_iter()
            .permutations(3)
            .map(SubsetKey::new)
            .collect();

        assert!(keys.iter().all_equal());
        assert_eq!(SubsetKey::new([0, 2, 3]), SubsetKey::single(0).with(3).with(2));
        assert_eq!(
            keys[0],
            SubsetKey::new([0, 2]).union(&SubsetKey::new([2, 3]))
        );
    }

    #[test]
    fn test_key_renders_as_json_array() {
        let key = SubsetKey::new([5, 0, 2]);
        assert_eq!(serde_json::to_string(&vec![0, 2, 5]).unwrap(), key.to_string());
        assert_eq!("[]", SubsetKey::default().to_string());
    }

    #[test]
    fn test_key_set_operations() {
        let key = SubsetKey::new([1, 4]);
        assert!(key.contains(4));
        assert!(!key.contains(2));
        assert!(key.is_disjoint(&SubsetKey::new([0, 2])));
        assert!(!key.is_disjoint(&SubsetKey::new([4])));
        assert_eq!(2, key.with(1).len());
    }

    #[test]
    fn test_size_bound() {
        let mut result = EnumerationResult::default();
        assert!(result.is_complete());
        assert_eq!(4, result.size_bound(4));

        result.max_fully_estimated_size = Some(1);
        assert!(result.is_degenerate());
        assert_eq!(1, result.size_bound(4));
    }

    #[test]
    fn test_table_lists_every_estimate() {
        let mut result = EnumerationResult::default();
        for key in [SubsetKey::new([0, 1]), SubsetKey::single(0), SubsetKey::single(1)] {
            result.estimates.insert(
                key,
                EstimateEntry {
                    sample: vec![],
                    estimated_cardinality: 2.0,
                },
            );
        }

        let table = result.to_table();
        assert_eq!(3, table.len());
        assert!(table.to_string().contains("[0,1]"));
    }
}
