use std::fmt::Display;
use std::hash::Hash;

/// An observed graph seen through the two queries the likelihood needs.
///
/// Implementors must be shareable across threads so that read-only
/// likelihood sweeps can run in parallel.
pub trait EdgeCountGraph: Sync {
    /// Node identifier; becomes a leaf of the dendrogram
    type Node: Clone + Eq + Hash + Display + Send + Sync;

    /// All nodes of the graph, each exactly once
    fn nodes(&self) -> Vec<Self::Node>;

    /// Number of nodes
    fn num_nodes(&self) -> usize {
        self.nodes().len()
    }

    /// Count edges with one endpoint in `set_a` and the other in `set_b`.
    ///
    /// * `set_a` - first node group
    /// * `set_b` - second node group, disjoint from `set_a`
    fn edges_between(&self, set_a: &[Self::Node], set_b: &[Self::Node]) -> usize;
}
