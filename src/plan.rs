use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{OptError, OptResult};
use crate::sampling::SubsetKey;

pub type PlanNodeRef = Arc<PlanNode>;

/// Joins the results of two plan subtrees.
///
/// Implemented for any `Fn(E, E) -> impl Future<Output = OptResult<E>>`.
#[async_trait]
pub trait JoinExecutor<E: Send + 'static>: Send + Sync {
    async fn join(&self, left: E, right: E) -> OptResult<E>;
}

#[async_trait]
impl<E, F, Fut> JoinExecutor<E> for F
where
    E: Send + 'static,
    F: Fn(E, E) -> Fut + Send + Sync,
    Fut: Future<Output = OptResult<E>> + Send + 'static,
{
    async fn join(&self, left: E, right: E) -> OptResult<E> {
        (self)(left, right).await
    }
}

/// One node of a binary join plan over canonical pattern indices.
///
/// A leaf covers exactly one pattern, a join covers the disjoint union of its children. The
/// cost is derived when the node is built:
///
/// ```text
/// cost(leaf) = estimated_size
/// cost(join) = left.estimated_size * right.estimated_size + estimated_size
///              + left.cost + right.cost
/// ```
#[derive(Debug, PartialEq)]
pub struct PlanNode {
    left: Option<PlanNodeRef>,
    right: Option<PlanNodeRef>,
    entries: SubsetKey,
    estimated_size: f64,
    cost: f64,
}

/// Breath first iterator of a plan tree.
struct BFSPlanNodeIter<'a> {
    queue: VecDeque<&'a PlanNode>,
}

impl<'a> Iterator for BFSPlanNodeIter<'a> {
    type Item = &'a PlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.queue.pop_front()?;
        self.queue
            .extend(node.left.iter().chain(node.right.iter()).map(|child| &**child));
        Some(node)
    }
}

impl PlanNode {
    pub fn leaf(index: usize, estimated_size: f64) -> Self {
        Self {
            left: None,
            right: None,
            entries: SubsetKey::single(index),
            estimated_size,
            cost: estimated_size,
        }
    }

    /// Joins two plans over disjoint pattern sets into a plan of `estimated_size` rows.
    pub fn join(left: PlanNodeRef, right: PlanNodeRef, estimated_size: f64) -> OptResult<Self> {
        if !left.entries.is_disjoint(&right.entries) {
            return Err(OptError::InvalidCombination(format!(
                "Cannot join overlapping plans {} and {}",
                left.entries, right.entries
            ))
            .into());
        }

        let cost = left.estimated_size * right.estimated_size
            + estimated_size
            + left.cost
            + right.cost;
        Ok(Self {
            entries: left.entries.union(&right.entries),
            left: Some(left),
            right: Some(right),
            estimated_size,
            cost,
        })
    }

    pub fn left(&self) -> Option<&PlanNodeRef> {
        self.left.as_ref()
    }

    pub fn right(&self) -> Option<&PlanNodeRef> {
        self.right.as_ref()
    }

    pub fn entries(&self) -> &SubsetKey {
        &self.entries
    }

    pub fn estimated_size(&self) -> f64 {
        self.estimated_size
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// The pattern of a leaf.
    pub fn leaf_index(&self) -> Option<usize> {
        match self.entries.as_slice() {
            [index] if self.is_leaf() => Some(*index),
            _ => None,
        }
    }

    pub fn bfs_iterator(&self) -> impl Iterator<Item = &PlanNode> {
        BFSPlanNodeIter {
            queue: VecDeque::from([self]),
        }
    }

    /// Number of binary joins in the plan.
    pub fn join_count(&self) -> usize {
        self.bfs_iterator().filter(|node| !node.is_leaf()).count()
    }

    /// Executes the plan over `entries`, indexed by canonical pattern index.
    ///
    /// Children run left before right, then their results are merged by `joiner`. A leaf
    /// resolves to a clone of its entry.
    pub fn execute<'a, E, J>(&'a self, entries: &'a [E], joiner: &'a J) -> BoxFuture<'a, OptResult<E>>
    where
        E: Clone + Send + Sync + 'static,
        J: JoinExecutor<E> + ?Sized,
    {
        async move {
            match (&self.left, &self.right) {
                (Some(left), Some(right)) => {
                    let left = left.execute(entries, joiner).await?;
                    let right = right.execute(entries, joiner).await?;
                    joiner.join(left, right).await
                }
                (None, None) => {
                    let index = self.leaf_index().ok_or_else(|| {
                        OptError::InconsistentPlan(format!(
                            "Leaf covers {} instead of one pattern",
                            self.entries
                        ))
                    })?;
                    let entry = entries.get(index).cloned().ok_or_else(|| {
                        OptError::InconsistentPlan(format!(
                            "Pattern {} out of range for {} entries",
                            index,
                            entries.len()
                        ))
                    })?;
                    Ok(entry)
                }
                _ => Err(OptError::InconsistentPlan(format!(
                    "Join over {} is missing a child",
                    self.entries
                ))
                .into()),
            }
        }
        .boxed()
    }

    fn fmt_with_indent(&self, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
        let kind = if self.is_leaf() { "Pattern" } else { "Join" };
        writeln!(
            f,
            "{:indent$}{} {} size={:.2} cost={:.2}",
            "",
            kind,
            self.entries,
            self.estimated_size,
            self.cost,
            indent = depth * 2
        )?;
        for child in self.left.iter().chain(self.right.iter()) {
            child.fmt_with_indent(f, depth + 1)?;
        }
        Ok(())
    }
}

impl Display for PlanNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.fmt_with_indent(f, 0)
    }
}
