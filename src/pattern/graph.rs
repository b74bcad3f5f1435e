use std::collections::BTreeSet;
use std::iter::once;

use anyhow::ensure;
use itertools::Itertools;
use log::debug;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::Bfs;

use crate::error::{OptError, OptResult};
use crate::pattern::{GraphPattern, QuadPosition};

/// Node weight is the pattern's index in the caller's list.
type ConnectivityGraph = UnGraph<usize, ()>;

/// Connectivity graph of a list of graph patterns.
///
/// Two patterns are adjacent when they share a variable in subject, predicate or object
/// position. Patterns are renumbered in breadth first order starting from a root pattern, and
/// every downstream component addresses patterns by these canonical indices only.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternGraph {
    /// Canonical index -> index in the input list.
    order: Vec<usize>,
    /// Index in the input list -> canonical index.
    canonical: Vec<usize>,
    /// Canonical adjacency, sorted ascending.
    adjacency: Vec<Vec<usize>>,
    components: usize,
}

impl PatternGraph {
    /// Builds the connectivity graph and the canonical order of `patterns`.
    ///
    /// The traversal starts at `root`. Patterns not reachable from it are numbered afterwards,
    /// one connected component at a time, so canonical indices are always `0..patterns.len()`.
    pub fn build(patterns: &[GraphPattern], root: usize) -> OptResult<Self> {
        ensure!(
            !patterns.is_empty(),
            OptError::InvalidCombination("Pattern graph requires at least one pattern".to_string())
        );
        ensure!(
            root < patterns.len(),
            OptError::InvalidCombination(format!(
                "Root pattern {} out of range for {} patterns",
                root,
                patterns.len()
            ))
        );

        let variables: Vec<BTreeSet<&str>> = patterns
            .iter()
            .map(|pattern| pattern.variables_in(QuadPosition::connectivity()))
            .collect();

        let mut graph = ConnectivityGraph::with_capacity(patterns.len(), patterns.len());
        let nodes: Vec<NodeIndex> = (0..patterns.len()).map(|idx| graph.add_node(idx)).collect();
        for (left, right) in (0..patterns.len()).tuple_combinations() {
            if !variables[left].is_disjoint(&variables[right]) {
                graph.add_edge(nodes[left], nodes[right], ());
            }
        }

        let mut canonical = vec![None; patterns.len()];
        let mut order = Vec::with_capacity(patterns.len());
        let mut components = 0;
        for start in once(root).chain(0..patterns.len()) {
            if canonical[start].is_some() {
                continue;
            }
            components += 1;
            let mut bfs = Bfs::new(&graph, nodes[start]);
            while let Some(node_id) = bfs.next(&graph) {
                let original = graph[node_id];
                canonical[original] = Some(order.len());
                order.push(original);
            }
        }

        let canonical: Vec<usize> = canonical.into_iter().collect::<Option<_>>().ok_or_else(|| {
            OptError::InvalidCombination("Pattern left out of canonical order".to_string())
        })?;

        let adjacency = order
            .iter()
            .map(|&original| {
                graph
                    .neighbors(nodes[original])
                    .map(|neighbor| canonical[graph[neighbor]])
                    .sorted()
                    .collect()
            })
            .collect();

        debug!(
            "Built pattern graph over {} patterns with {} edges and {} components, order: {:?}",
            patterns.len(),
            graph.edge_count(),
            components,
            order
        );

        Ok(Self {
            order,
            canonical,
            adjacency,
            components,
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Input indices in canonical order.
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    pub fn original_index(&self, canonical: usize) -> usize {
        self.order[canonical]
    }

    pub fn canonical_index(&self, original: usize) -> usize {
        self.canonical[original]
    }

    /// Canonical neighbors of a canonical index.
    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    pub fn adjacency(&self) -> &[Vec<usize>] {
        &self.adjacency
    }

    /// Number of connected components. More than one means some joins are cartesian.
    pub fn components(&self) -> usize {
        self.components
    }

    pub fn is_connected(&self) -> bool {
        self.components == 1
    }

    /// Nodes adjacent to any member of `nodes`, excluding `nodes` themselves.
    pub fn neighborhood<'a, I>(&self, nodes: I) -> BTreeSet<usize>
    where
        I: IntoIterator<Item = &'a usize>,
    {
        let members: BTreeSet<usize> = nodes.into_iter().copied().collect();
        members
            .iter()
            .flat_map(|&node| self.adjacency[node].iter().copied())
            .filter(|neighbor| !members.contains(neighbor))
            .collect()
    }

    /// Whether any member of `left` is adjacent to any member of `right`.
    pub fn connects(&self, left: &[usize], right: &[usize]) -> bool {
        left.iter().any(|&node| {
            self.adjacency[node]
                .iter()
                .any(|neighbor| right.contains(neighbor))
        })
    }

    /// Reorders `items`, given in input order, into canonical order.
    pub fn ordered<'a, T>(&self, items: &'a [T]) -> Vec<&'a T> {
        self.order.iter().map(|&original| &items[original]).collect()
    }
}
