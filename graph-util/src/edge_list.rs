use crate::traits::EdgeCountGraph;

use fnv::{FnvHashMap, FnvHashSet};
use log::debug;
use std::fmt::Display;
use std::hash::Hash;

/// Undirected simple graph.
///
/// Nodes keep their insertion order; adjacency is stored both ways.
/// Self-loops are dropped and repeated edges collapse into one.
#[derive(Debug, Clone)]
pub struct EdgeListGraph<N>
where
    N: Clone + Eq + Hash,
{
    nodes: Vec<N>,
    adjacency: FnvHashMap<N, FnvHashSet<N>>,
    num_edges: usize,
}

impl<N> Default for EdgeListGraph<N>
where
    N: Clone + Eq + Hash,
{
    fn default() -> Self {
        EdgeListGraph {
            nodes: vec![],
            adjacency: FnvHashMap::default(),
            num_edges: 0,
        }
    }
}

impl<N> EdgeListGraph<N>
where
    N: Clone + Eq + Hash,
{
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from isolated nodes and an edge list.
    ///
    /// * `nodes` - nodes to register first (may be empty)
    /// * `edges` - undirected pairs; unseen endpoints are registered on the fly
    pub fn from_edges<I, E>(nodes: I, edges: E) -> Self
    where
        I: IntoIterator<Item = N>,
        E: IntoIterator<Item = (N, N)>,
    {
        let mut graph = Self::new();
        for v in nodes {
            graph.add_node(v);
        }
        for (u, v) in edges {
            graph.add_edge(u, v);
        }
        graph
    }

    /// Register a node; returns false if it was already there
    pub fn add_node(&mut self, v: N) -> bool {
        if self.adjacency.contains_key(&v) {
            return false;
        }
        self.adjacency.insert(v.clone(), FnvHashSet::default());
        self.nodes.push(v);
        true
    }

    /// Add an undirected edge; returns false for self-loops and duplicates
    pub fn add_edge(&mut self, u: N, v: N) -> bool {
        if u == v {
            debug!("ignoring a self-loop");
            return false;
        }
        self.add_node(u.clone());
        self.add_node(v.clone());

        let fresh = self
            .adjacency
            .get_mut(&u)
            .map(|nbrs| nbrs.insert(v.clone()))
            .unwrap_or(false);

        if let Some(nbrs) = self.adjacency.get_mut(&v) {
            nbrs.insert(u);
        }

        if fresh {
            self.num_edges += 1;
        }
        fresh
    }

    /// Whether `u` and `v` are adjacent
    pub fn has_edge(&self, u: &N, v: &N) -> bool {
        self.adjacency
            .get(u)
            .map(|nbrs| nbrs.contains(v))
            .unwrap_or(false)
    }

    /// Neighbours of `v` (empty if unknown)
    pub fn neighbors<'a>(&'a self, v: &N) -> impl Iterator<Item = &'a N> + 'a {
        self.adjacency.get(v).into_iter().flat_map(|nbrs| nbrs.iter())
    }

    /// Number of distinct undirected edges
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }
}

impl<N> EdgeCountGraph for EdgeListGraph<N>
where
    N: Clone + Eq + Hash + Display + Send + Sync,
{
    type Node = N;

    fn nodes(&self) -> Vec<N> {
        self.nodes.clone()
    }

    fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn edges_between(&self, set_a: &[N], set_b: &[N]) -> usize {
        // look up each member of the smaller side in the larger one
        let (small, large) = if set_a.len() <= set_b.len() {
            (set_a, set_b)
        } else {
            (set_b, set_a)
        };

        if large.len() < 8 {
            return small
                .iter()
                .map(|u| large.iter().filter(|v| self.has_edge(u, v)).count())
                .sum();
        }

        let large: FnvHashSet<&N> = large.iter().collect();
        small
            .iter()
            .filter_map(|u| self.adjacency.get(u))
            .map(|nbrs| nbrs.iter().filter(|v| large.contains(v)).count())
            .sum()
    }
}
