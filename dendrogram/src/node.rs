//! Internal nodes of a dendrogram, stored in an index-addressed arena.
//!
//! Each internal node owns exactly two children. A child is either a
//! leaf (a node of the observed graph) or another internal node referred
//! to by its arena index:
//!
//! ```text
//!            1
//!          /   \
//!         0     C        arena[0] = (Leaf A, Leaf B)
//!        / \             arena[1] = (Internal 0, Leaf C)
//!       A   B
//! ```
//!
//! Indices are handed out sequentially by the arena that owns the nodes,
//! so two arenas never share a counter. A rotation only swaps child slots
//! between two adjacent nodes; nodes are never created or removed after
//! the initial construction.

use crate::model::{ln_split_likelihood, split_likelihood};
use fnv::FnvHashSet;
use graph_util::EdgeCountGraph;
use rand::Rng;
use std::fmt;
use std::hash::Hash;

/// One child slot of an internal node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Child<L> {
    /// A graph node
    Leaf(L),
    /// Arena index of another internal node
    Internal(usize),
}

impl<L> Child<L> {
    /// Arena index if this child is an internal node
    pub fn internal(&self) -> Option<usize> {
        match self {
            Child::Internal(idx) => Some(*idx),
            Child::Leaf(_) => None,
        }
    }

    /// Whether this child is a graph node
    pub fn is_leaf(&self) -> bool {
        matches!(self, Child::Leaf(_))
    }
}

impl<L: fmt::Display> fmt::Display for Child<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Child::Internal(idx) => write!(f, "{} (D)", idx),
            Child::Leaf(leaf) => write!(f, "{} (G)", leaf),
        }
    }
}

/// An internal node with its cached leaf descendants.
#[derive(Debug, Clone)]
pub struct InternalNode<L> {
    index: usize,
    left: Child<L>,
    right: Child<L>,
    /// flattened leaf descendants; refreshed whenever the subtree changes
    leaves: Vec<L>,
}

impl<L> InternalNode<L> {
    /// Arena index, fixed for the lifetime of the node
    pub fn index(&self) -> usize {
        self.index
    }

    /// Left child slot
    pub fn left(&self) -> &Child<L> {
        &self.left
    }

    /// Right child slot
    pub fn right(&self) -> &Child<L> {
        &self.right
    }

    /// Cached leaf descendants (order is irrelevant)
    pub fn leaves(&self) -> &[L] {
        &self.leaves
    }

    /// At least one child is internal, so a rotation can pivot through it
    pub fn is_mutable(&self) -> bool {
        self.left.internal().is_some() || self.right.internal().is_some()
    }
}

/// `<index>\t<left>\t<right>`, one line of the persisted tree file
impl<L: fmt::Display> fmt::Display for InternalNode<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.index, self.left, self.right)
    }
}

/// A proposed rotation around one internal node.
///
/// Applying the same descriptor twice restores the original topology:
/// [`NodeArena::apply_mutation`] overwrites `local_child` with whatever
/// it swapped out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation<L> {
    /// internal child of the rotated node that the rotation goes through
    pub pivot: usize,
    /// swap the pivot's left child (`true`) or right child (`false`)
    pub use_left: bool,
    /// the rotated node's other child
    pub local_child: Child<L>,
}

/// Arena of internal nodes; a node's index is its position.
#[derive(Debug, Clone)]
pub struct NodeArena<L> {
    nodes: Vec<InternalNode<L>>,
}

impl<L> Default for NodeArena<L> {
    fn default() -> Self {
        NodeArena { nodes: vec![] }
    }
}

impl<L> NodeArena<L> {
    /// Empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty arena with room for `capacity` nodes
    pub fn with_capacity(capacity: usize) -> Self {
        NodeArena {
            nodes: Vec::with_capacity(capacity),
        }
    }

    /// Number of internal nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// No internal node yet
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node at `idx`
    pub fn node(&self, idx: usize) -> Option<&InternalNode<L>> {
        self.nodes.get(idx)
    }

    /// Nodes in index order
    pub fn iter(&self) -> std::slice::Iter<'_, InternalNode<L>> {
        self.nodes.iter()
    }

    /// Whether node `idx` exists and has an internal child
    pub fn is_mutable(&self, idx: usize) -> bool {
        self.nodes
            .get(idx)
            .map(|node| node.is_mutable())
            .unwrap_or(false)
    }

    /// Leaf descendants of a child slot; a leaf contributes itself
    pub fn child_leaves<'a>(&'a self, child: &'a Child<L>) -> &'a [L] {
        match child {
            Child::Leaf(leaf) => std::slice::from_ref(leaf),
            Child::Internal(idx) => &self.nodes[*idx].leaves,
        }
    }

    fn get_node(&self, idx: usize) -> anyhow::Result<&InternalNode<L>> {
        self.nodes
            .get(idx)
            .ok_or_else(|| anyhow::anyhow!("no internal node {} (arena size {})", idx, self.len()))
    }
}

impl<L> NodeArena<L>
where
    L: Clone + Eq + Hash,
{
    /// Create a node over children `a` and `b` and return its index.
    ///
    /// Internal children must already live in this arena.
    pub fn combine(&mut self, a: Child<L>, b: Child<L>) -> anyhow::Result<usize> {
        for child in [&a, &b] {
            if let Some(idx) = child.internal() {
                self.get_node(idx)?;
            }
        }
        if let (Some(i), Some(j)) = (a.internal(), b.internal()) {
            if i == j {
                return Err(anyhow::anyhow!("cannot combine node {} with itself", i));
            }
        }

        let index = self.nodes.len();
        let leaves = [self.child_leaves(&a), self.child_leaves(&b)].concat();
        self.nodes.push(InternalNode {
            index,
            left: a,
            right: b,
            leaves,
        });
        Ok(index)
    }

    /// Rebuild the leaf cache of `idx` from its children's caches
    fn refresh(&mut self, idx: usize) {
        let node = &self.nodes[idx];
        let leaves = [self.child_leaves(&node.left), self.child_leaves(&node.right)].concat();
        self.nodes[idx].leaves = leaves;
    }

    /// Leaf descendants of node `idx`.
    ///
    /// With `force`, every cache in the subtree is rebuilt bottom-up
    /// before the answer is read.
    pub fn leaf_set(&mut self, idx: usize, force: bool) -> anyhow::Result<&[L]> {
        self.get_node(idx)?;

        if force {
            // pre-order walk, then refresh in reverse so children go first
            let mut order = vec![];
            let mut stack = vec![idx];
            while let Some(j) = stack.pop() {
                order.push(j);
                let node = &self.nodes[j];
                stack.extend(node.left.internal());
                stack.extend(node.right.internal());
            }
            for &j in order.iter().rev() {
                self.refresh(j);
            }
        }

        Ok(&self.nodes[idx].leaves)
    }

    /// `(links, max_links)` across the split at node `idx`
    pub fn split_counts<G>(&self, idx: usize, graph: &G) -> (usize, usize)
    where
        G: EdgeCountGraph<Node = L>,
    {
        let node = &self.nodes[idx];
        let left = self.child_leaves(&node.left);
        let right = self.child_leaves(&node.right);
        let links = graph.edges_between(left, right);
        (links, left.len() * right.len())
    }

    /// Likelihood term of node `idx` against the current topology
    pub fn likelihood<G>(&self, idx: usize, graph: &G) -> f64
    where
        G: EdgeCountGraph<Node = L>,
    {
        let (links, max_links) = self.split_counts(idx, graph);
        split_likelihood(links, max_links)
    }

    /// Log of [`Self::likelihood`], computed without underflow
    pub fn ln_likelihood<G>(&self, idx: usize, graph: &G) -> f64
    where
        G: EdgeCountGraph<Node = L>,
    {
        let (links, max_links) = self.split_counts(idx, graph);
        ln_split_likelihood(links, max_links)
    }

    /// Draw a rotation around node `idx`.
    ///
    /// The left child is the pivot when it is internal, the right child
    /// otherwise; a fair coin picks which of the pivot's edges to swap.
    pub fn propose_mutation<R: Rng>(
        &self,
        idx: usize,
        rng: &mut R,
    ) -> anyhow::Result<Mutation<L>> {
        let node = self.get_node(idx)?;

        let (pivot, local_child) = match (&node.left, &node.right) {
            (Child::Internal(pivot), other) => (*pivot, other.clone()),
            (other, Child::Internal(pivot)) => (*pivot, other.clone()),
            _ => {
                return Err(anyhow::anyhow!(
                    "node {} has no internal child to rotate through",
                    idx
                ))
            }
        };

        Ok(Mutation {
            pivot,
            use_left: rng.random_bool(0.5),
            local_child,
        })
    }

    /// Rotate at node `idx`: swap the pivot's chosen child with the
    /// node's local child.
    ///
    /// `mutation.local_child` is replaced by the child that moved up, so
    /// a second call with the same descriptor undoes the first. The leaf
    /// set of `idx` as a whole is unchanged; only the split between `idx`
    /// and the pivot moves, and both caches are rebuilt here.
    pub fn apply_mutation(&mut self, idx: usize, mutation: &mut Mutation<L>) -> anyhow::Result<()> {
        let pivot = mutation.pivot;
        let node = self.get_node(idx)?;
        self.get_node(pivot)?;

        let local_is_right = match (&node.left, &node.right) {
            (Child::Internal(p), other) if *p == pivot && *other == mutation.local_child => true,
            (other, Child::Internal(p)) if *p == pivot && *other == mutation.local_child => false,
            _ => {
                return Err(anyhow::anyhow!(
                    "stale mutation: node {} does not hold pivot {} next to {:?}",
                    idx,
                    pivot,
                    mutation.local_child.internal()
                ))
            }
        };

        let pivot_node = &mut self.nodes[pivot];
        let slot = if mutation.use_left {
            &mut pivot_node.left
        } else {
            &mut pivot_node.right
        };
        let moved = std::mem::replace(slot, mutation.local_child.clone());

        let node = &mut self.nodes[idx];
        if local_is_right {
            node.right = moved.clone();
        } else {
            node.left = moved.clone();
        }
        mutation.local_child = moved;

        self.refresh(pivot);
        self.refresh(idx);
        Ok(())
    }

    /// Check that the arena is one binary tree whose leaves are exactly
    /// `leaves`, each once, and return the root index.
    pub fn validate(&mut self, leaves: &[L]) -> anyhow::Result<usize> {
        let n = self.nodes.len();
        if n == 0 {
            return Err(anyhow::anyhow!("empty arena has no root"));
        }
        if n + 1 != leaves.len() {
            return Err(anyhow::anyhow!(
                "{} internal nodes cannot hold {} leaves",
                n,
                leaves.len()
            ));
        }

        let mut num_parents = vec![0_usize; n];
        for node in &self.nodes {
            for child in [&node.left, &node.right] {
                if let Some(j) = child.internal() {
                    if j >= n {
                        return Err(anyhow::anyhow!(
                            "node {} points to missing node {}",
                            node.index,
                            j
                        ));
                    }
                    num_parents[j] += 1;
                }
            }
        }

        if let Some(j) = num_parents.iter().position(|&k| k > 1) {
            return Err(anyhow::anyhow!("node {} has more than one parent", j));
        }

        let roots: Vec<usize> = (0..n).filter(|&j| num_parents[j] == 0).collect();
        let root = match roots.as_slice() {
            [root] => *root,
            _ => return Err(anyhow::anyhow!("expected one root, found {}", roots.len())),
        };

        // every node must hang below the root
        let mut visited = vec![false; n];
        let mut stack = vec![root];
        while let Some(j) = stack.pop() {
            if visited[j] {
                return Err(anyhow::anyhow!("cycle through node {}", j));
            }
            visited[j] = true;
            stack.extend(self.nodes[j].left.internal());
            stack.extend(self.nodes[j].right.internal());
        }
        if let Some(j) = visited.iter().position(|&v| !v) {
            return Err(anyhow::anyhow!("node {} is not reachable from the root", j));
        }

        let expected: FnvHashSet<&L> = leaves.iter().collect();
        if expected.len() != leaves.len() {
            return Err(anyhow::anyhow!("duplicate leaves in the graph's node set"));
        }

        let found = self.leaf_set(root, true)?;
        let mut seen = FnvHashSet::default();
        for leaf in found {
            if !expected.contains(leaf) {
                return Err(anyhow::anyhow!("a leaf is not a node of the graph"));
            }
            if !seen.insert(leaf) {
                return Err(anyhow::anyhow!("a leaf appears more than once"));
            }
        }
        if seen.len() != expected.len() {
            return Err(anyhow::anyhow!(
                "{} of {} graph nodes are missing from the tree",
                expected.len() - seen.len(),
                expected.len()
            ));
        }

        Ok(root)
    }
}
