use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::ensure;
use itertools::Itertools;
use log::{debug, info, warn};

use crate::error::{OptError, OptResult};
use crate::pattern::PatternGraph;
use crate::plan::{PlanNode, PlanNodeRef};
use crate::sampling::{EnumerationResult, SubsetKey};

/// Searches the cheapest bushy join tree with csg-cmp dynamic programming (DPccp).
///
/// Only pairs of connected subgraphs joined by at least one edge are considered, so cross
/// products are never planned. Subsets are bounded by the largest size the sampler fully
/// estimated; a subset without an estimate is taken as empty.
pub struct PlanEnumerator<'a> {
    graph: &'a PatternGraph,
    estimates: &'a EnumerationResult,
    size_bound: usize,
    best_plans: HashMap<SubsetKey, PlanNodeRef>,
    accepted_pairs: Vec<(SubsetKey, SubsetKey)>,
}

impl<'a> PlanEnumerator<'a> {
    pub fn new(graph: &'a PatternGraph, estimates: &'a EnumerationResult) -> Self {
        Self {
            graph,
            estimates,
            size_bound: estimates.size_bound(graph.len()),
            best_plans: HashMap::new(),
            accepted_pairs: vec![],
        }
    }

    /// Largest number of patterns a plan may cover.
    pub fn size_bound(&self) -> usize {
        self.size_bound
    }

    /// Csg-cmp pairs emitted by the last search, in emission order.
    pub fn accepted_pairs(&self) -> &[(SubsetKey, SubsetKey)] {
        &self.accepted_pairs
    }

    /// Cheapest plan found for exactly the patterns of `key`.
    pub fn best_plan(&self, key: &SubsetKey) -> Option<&PlanNodeRef> {
        self.best_plans.get(key)
    }

    /// Returns the cheapest plan covering all patterns, or, when the estimates stop at a
    /// smaller size, the cheapest plan covering exactly that many patterns.
    pub fn search(&mut self) -> OptResult<PlanNodeRef> {
        let pattern_count = self.graph.len();
        ensure!(
            pattern_count > 0 && self.size_bound > 0,
            OptError::InvalidCombination(format!(
                "Cannot search plans over {} patterns bounded to {}",
                pattern_count, self.size_bound
            ))
        );

        self.best_plans.clear();
        self.accepted_pairs.clear();
        for idx in 0..pattern_count {
            let key = SubsetKey::single(idx);
            let cardinality = self.estimates.cardinality(&key).ok_or_else(|| {
                OptError::InvalidCombination(format!("Pattern {} has no estimate", idx))
            })?;
            self.best_plans
                .insert(key, Arc::new(PlanNode::leaf(idx, cardinality)));
        }

        for idx in (0..pattern_count).rev() {
            let start = SubsetKey::single(idx);
            self.emit_csg(&start)?;
            self.enumerate_csg_rec(&start, &(0..=idx).collect())?;
        }

        let best = self
            .best_plans
            .values()
            .min_by(|left, right| {
                let (left_size, right_size) = (left.entries().len(), right.entries().len());
                right_size
                    .cmp(&left_size)
                    .then_with(|| left.cost().total_cmp(&right.cost()))
                    .then_with(|| left.entries().cmp(right.entries()))
            })
            .cloned()
            .ok_or_else(|| OptError::InvalidCombination("No plan was built".to_string()))?;

        if best.entries().len() < self.size_bound {
            warn!(
                "No connected plan over {} patterns, falling back to {} covering {}",
                self.size_bound,
                best.entries(),
                best.entries().len()
            );
        }
        info!(
            "Selected plan over {} with cost {:.2} after {} csg-cmp pairs",
            best.entries(),
            best.cost(),
            self.accepted_pairs.len()
        );
        Ok(best)
    }

    /// Emits every pair with `csg` on one side and a connected complement of larger minimum
    /// index on the other.
    fn emit_csg(&mut self, csg: &SubsetKey) -> OptResult<()> {
        if csg.len() >= self.size_bound {
            return Ok(());
        }

        let min = csg.as_slice()[0];
        let mut excluded: BTreeSet<usize> = (0..=min).collect();
        excluded.extend(csg.iter().copied());
        let neighborhood: BTreeSet<usize> = self
            .graph
            .neighborhood(csg.iter())
            .difference(&excluded)
            .copied()
            .collect();

        for &neighbor in neighborhood.iter().rev() {
            let cmp = SubsetKey::single(neighbor);
            self.emit_csg_cmp(csg, &cmp)?;

            let mut cmp_excluded = excluded.clone();
            cmp_excluded.extend(neighborhood.iter().filter(|&&node| node <= neighbor));
            self.enumerate_cmp_rec(csg, &cmp, &cmp_excluded)?;
        }
        Ok(())
    }

    /// Grows `csg` by every subset of its non-excluded neighborhood.
    fn enumerate_csg_rec(&mut self, csg: &SubsetKey, excluded: &BTreeSet<usize>) -> OptResult<()> {
        let neighborhood = self.open_neighborhood(csg, excluded);
        // A csg must leave room for at least one complement pattern.
        let room = self.size_bound.saturating_sub(csg.len() + 1);
        let grown = Self::extensions(csg, &neighborhood, room);

        for extended in &grown {
            self.emit_csg(extended)?;
        }

        let mut excluded = excluded.clone();
        excluded.extend(neighborhood);
        for extended in &grown {
            self.enumerate_csg_rec(extended, &excluded)?;
        }
        Ok(())
    }

    /// Grows the complement `cmp` of `csg` by every subset of its non-excluded neighborhood.
    fn enumerate_cmp_rec(
        &mut self,
        csg: &SubsetKey,
        cmp: &SubsetKey,
        excluded: &BTreeSet<usize>,
    ) -> OptResult<()> {
        let neighborhood = self.open_neighborhood(cmp, excluded);
        let room = self.size_bound.saturating_sub(csg.len() + cmp.len());
        let grown = Self::extensions(cmp, &neighborhood, room);

        for extended in &grown {
            if self.graph.connects(csg.as_slice(), extended.as_slice()) {
                self.emit_csg_cmp(csg, extended)?;
            }
        }

        let mut excluded = excluded.clone();
        excluded.extend(neighborhood);
        for extended in &grown {
            self.enumerate_cmp_rec(csg, extended, &excluded)?;
        }
        Ok(())
    }

    fn open_neighborhood(&self, nodes: &SubsetKey, excluded: &BTreeSet<usize>) -> Vec<usize> {
        self.graph
            .neighborhood(nodes.iter())
            .into_iter()
            .filter(|node| !excluded.contains(node))
            .collect()
    }

    /// `nodes` united with each non-empty subset of `neighborhood` of at most `room` members.
    fn extensions(nodes: &SubsetKey, neighborhood: &[usize], room: usize) -> Vec<SubsetKey> {
        (1..=room.min(neighborhood.len()))
            .flat_map(|size| neighborhood.iter().copied().combinations(size))
            .map(|extra| nodes.union(&SubsetKey::new(extra)))
            .collect()
    }

    fn emit_csg_cmp(&mut self, csg: &SubsetKey, cmp: &SubsetKey) -> OptResult<()> {
        ensure!(
            !csg.is_empty() && !cmp.is_empty() && csg.is_disjoint(cmp),
            OptError::InvalidCombination(format!("Invalid csg-cmp pair {} and {}", csg, cmp))
        );

        let union = csg.union(cmp);
        if union.len() > self.size_bound {
            return Ok(());
        }

        let left = self.plan_for(csg)?;
        let right = self.plan_for(cmp)?;
        let estimated_size = self.estimates.cardinality(&union).unwrap_or(0.0);

        let forward = PlanNode::join(left.clone(), right.clone(), estimated_size)?;
        let backward = PlanNode::join(right, left, estimated_size)?;
        let plan = if backward.cost() < forward.cost() {
            backward
        } else {
            forward
        };

        debug!(
            "Pair {} - {}: size {:.2}, cost {:.2}",
            csg,
            cmp,
            estimated_size,
            plan.cost()
        );
        self.accepted_pairs.push((csg.clone(), cmp.clone()));

        let improves = self
            .best_plans
            .get(&union)
            .map_or(true, |existing| plan.cost() < existing.cost());
        if improves {
            self.best_plans.insert(union, Arc::new(plan));
        }
        Ok(())
    }

    fn plan_for(&self, key: &SubsetKey) -> OptResult<PlanNodeRef> {
        self.best_plans.get(key).cloned().ok_or_else(|| {
            OptError::InvalidCombination(format!("No plan built for {} yet", key)).into()
        })
    }
}
