//! A dendrogram sampling session.
//!
//! Owns the node arena, the per-node likelihood cache and the running
//! aggregate likelihood, and drives Metropolis-Hastings steps over local
//! rotations.

use crate::model::{ln_split_likelihood, metropolis_accept, split_likelihood};
use crate::node::{Child, NodeArena};
use graph_util::EdgeCountGraph;
use log::{info, trace};
use rand::rngs::SmallRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::VecDeque;

/// Options for a dendrogram session.
#[derive(Debug, Clone)]
pub struct DendrogramOptions {
    /// Random seed. Default: 42
    pub seed: u64,
    /// Uniform draws spent looking for a mutable node before falling
    /// back to a full scan. Default: 1000
    pub max_select_attempts: usize,
}

impl Default for DendrogramOptions {
    fn default() -> Self {
        DendrogramOptions {
            seed: 42,
            max_select_attempts: 1000,
        }
    }
}

/// Dendrogram over the nodes of `graph` plus its sampler state.
///
/// # Usage
///
/// ```ignore
/// use dendrogram::{Dendrogram, DendrogramOptions};
/// use graph_util::EdgeListGraph;
///
/// let graph = EdgeListGraph::from_edges(vec![], vec![("a", "b"), ("b", "c")]);
/// let mut tree = Dendrogram::new(&graph, &DendrogramOptions::default())?;
/// for _ in 0..1000 {
///     tree.sample()?;
/// }
/// tree.save("fit.tree", "fit.info")?;
/// ```
///
/// Not safe to sample from several threads at once; every `sample`
/// call takes `&mut self`.
pub struct Dendrogram<'g, G, R = SmallRng>
where
    G: EdgeCountGraph,
{
    graph: &'g G,
    arena: NodeArena<G::Node>,
    root: usize,
    /// likelihood term of each node, indexed like the arena
    likelihoods: Vec<f64>,
    /// product of `likelihoods`, maintained incrementally
    likelihood: f64,
    /// log of each node's term, computed directly so it never underflows
    log_likelihoods: Vec<f64>,
    /// sum of `log_likelihoods`, maintained incrementally
    log_likelihood: f64,
    mcmc_steps: usize,
    accepted_steps: usize,
    max_select_attempts: usize,
    rng: R,
}

impl<'g, G> Dendrogram<'g, G, SmallRng>
where
    G: EdgeCountGraph,
{
    /// Random initial dendrogram seeded by `options.seed`
    pub fn new(graph: &'g G, options: &DendrogramOptions) -> anyhow::Result<Self> {
        let rng = SmallRng::seed_from_u64(options.seed);
        Self::with_rng(graph, rng, options)
    }

    /// Session over a prebuilt topology, seeded by `options.seed`
    pub fn with_topology(
        graph: &'g G,
        arena: NodeArena<G::Node>,
        options: &DendrogramOptions,
    ) -> anyhow::Result<Self> {
        let rng = SmallRng::seed_from_u64(options.seed);
        Self::with_topology_and_rng(graph, arena, rng, options)
    }
}

impl<'g, G, R> Dendrogram<'g, G, R>
where
    G: EdgeCountGraph,
    R: Rng,
{
    /// Random initial dendrogram driven by `rng`; `options.seed` is unused.
    ///
    /// The node pool is shuffled, then one element is taken from each
    /// end, combined into a new internal node, and the new node goes
    /// back into the reshuffled pool until a single root remains.
    pub fn with_rng(graph: &'g G, mut rng: R, options: &DendrogramOptions) -> anyhow::Result<Self> {
        let leaves = graph.nodes();
        let n = leaves.len();
        if n < 2 {
            return Err(anyhow::anyhow!(
                "a dendrogram needs at least two leaves, got {}",
                n
            ));
        }

        let mut remaining: VecDeque<Child<G::Node>> = leaves.into_iter().map(Child::Leaf).collect();
        remaining.make_contiguous().shuffle(&mut rng);

        let mut arena = NodeArena::with_capacity(n - 1);

        let root = loop {
            match (remaining.pop_back(), remaining.pop_front()) {
                (Some(a), Some(b)) => {
                    let idx = arena.combine(a, b)?;
                    remaining.push_back(Child::Internal(idx));
                    remaining.make_contiguous().shuffle(&mut rng);
                }
                (Some(Child::Internal(root)), None) => break root,
                _ => return Err(anyhow::anyhow!("failed to assemble {} leaves", n)),
            }
        };

        Ok(Self::from_parts(graph, arena, root, rng, options))
    }

    /// Session over a prebuilt topology driven by `rng`.
    ///
    /// The arena must form one binary tree over exactly the graph's
    /// nodes; any other shape is an error.
    pub fn with_topology_and_rng(
        graph: &'g G,
        mut arena: NodeArena<G::Node>,
        rng: R,
        options: &DendrogramOptions,
    ) -> anyhow::Result<Self> {
        let root = arena.validate(&graph.nodes())?;
        Ok(Self::from_parts(graph, arena, root, rng, options))
    }

    fn from_parts(
        graph: &'g G,
        arena: NodeArena<G::Node>,
        root: usize,
        rng: R,
        options: &DendrogramOptions,
    ) -> Self {
        let (likelihoods, log_likelihoods): (Vec<f64>, Vec<f64>) = (0..arena.len())
            .into_par_iter()
            .map(|idx| {
                let (links, max_links) = arena.split_counts(idx, graph);
                (
                    split_likelihood(links, max_links),
                    ln_split_likelihood(links, max_links),
                )
            })
            .unzip();

        let likelihood: f64 = likelihoods.iter().product();
        let log_likelihood: f64 = log_likelihoods.iter().sum();

        info!(
            "dendrogram over {} leaves, {} internal nodes, likelihood {:e}",
            arena.len() + 1,
            arena.len(),
            likelihood
        );

        Dendrogram {
            graph,
            arena,
            root,
            likelihoods,
            likelihood,
            log_likelihoods,
            log_likelihood,
            mcmc_steps: 0,
            accepted_steps: 0,
            max_select_attempts: options.max_select_attempts,
            rng,
        }
    }

    /// One Metropolis-Hastings step; returns the aggregate likelihood
    /// after the move was accepted or reverted.
    ///
    /// Requires at least three leaves, otherwise no node can rotate.
    pub fn sample(&mut self) -> anyhow::Result<f64> {
        if self.arena.len() < 2 {
            return Err(anyhow::anyhow!(
                "sampling needs at least three leaves, got {}",
                self.arena.len() + 1
            ));
        }

        let selected = self.select_mutable()?;
        let mut mutation = self.arena.propose_mutation(selected, &mut self.rng)?;
        self.arena.apply_mutation(selected, &mut mutation)?;
        let pivot = mutation.pivot;

        let previous = self.likelihood;
        let candidate = self.update(selected, pivot)?;

        let accepted = candidate > previous || {
            let u: f64 = self.rng.random();
            metropolis_accept(candidate, previous, u)
        };

        if accepted {
            self.accepted_steps += 1;
        } else {
            self.arena.apply_mutation(selected, &mut mutation)?;
            self.update(selected, pivot)?;
        }

        self.mcmc_steps += 1;

        trace!(
            "step {}: rotate {} through {}, {:e} -> {:e} ({})",
            self.mcmc_steps,
            selected,
            pivot,
            previous,
            candidate,
            if accepted { "accepted" } else { "rejected" }
        );

        Ok(self.likelihood)
    }

    /// Pick a mutable node uniformly at random.
    ///
    /// Rejection sampling over the whole arena first; after
    /// `max_select_attempts` misses, draw from the explicit list of
    /// mutable nodes instead.
    fn select_mutable(&mut self) -> anyhow::Result<usize> {
        let n = self.arena.len();

        for _ in 0..self.max_select_attempts {
            let idx = self.rng.random_range(0..n);
            if self.arena.is_mutable(idx) {
                return Ok(idx);
            }
        }

        let mutable: Vec<usize> = (0..n).filter(|&idx| self.arena.is_mutable(idx)).collect();
        mutable
            .choose(&mut self.rng)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no internal node can be rotated"))
    }

    /// Refresh the likelihood terms of nodes `a` and `b` and fold the
    /// change into the aggregate. Returns the new aggregate.
    ///
    /// Only valid when no other node's split changed since the last
    /// refresh, which holds after a single rotation.
    pub fn update(&mut self, a: usize, b: usize) -> anyhow::Result<f64> {
        let n = self.arena.len();
        if a >= n || b >= n || a == b {
            return Err(anyhow::anyhow!(
                "cannot update nodes {} and {} of {}",
                a,
                b,
                n
            ));
        }

        let stale = self.likelihoods[a] * self.likelihoods[b];
        self.log_likelihood -= self.log_likelihoods[a] + self.log_likelihoods[b];

        for idx in [a, b] {
            let (links, max_links) = self.arena.split_counts(idx, self.graph);
            self.likelihoods[idx] = split_likelihood(links, max_links);
            self.log_likelihoods[idx] = ln_split_likelihood(links, max_links);
        }

        self.log_likelihood += self.log_likelihoods[a] + self.log_likelihoods[b];

        if stale > 0.0 && self.likelihood > 0.0 {
            self.likelihood /= stale;
            self.likelihood *= self.likelihoods[a] * self.likelihoods[b];
        } else {
            // an underflowed term or aggregate cannot be divided out
            self.likelihood = self.likelihood_product();
        }

        Ok(self.likelihood)
    }

    /// Aggregate likelihood: product of every node's term.
    ///
    /// Underflows to zero for large trees; see [`Self::log_likelihood`].
    pub fn likelihood(&self) -> f64 {
        self.likelihood
    }

    /// Product of the cached per-node terms, recomputed from scratch
    pub fn likelihood_product(&self) -> f64 {
        self.likelihoods.iter().product()
    }

    /// Sum of per-node log-likelihoods, maintained alongside the
    /// aggregate; finite where the product underflows
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Log-likelihood recomputed from every node against the current
    /// topology. Linear in the tree size; [`Self::log_likelihood`] is the
    /// running value.
    pub fn log_likelihood_sweep(&self) -> f64 {
        let arena = &self.arena;
        let graph = self.graph;
        let terms: Vec<f64> = (0..arena.len())
            .into_par_iter()
            .map(|idx| arena.ln_likelihood(idx, graph))
            .collect();
        terms.iter().sum()
    }

    /// Cached likelihood term of node `idx`
    pub fn node_likelihood(&self, idx: usize) -> Option<f64> {
        self.likelihoods.get(idx).copied()
    }

    /// Number of `sample` calls so far
    pub fn mcmc_steps(&self) -> usize {
        self.mcmc_steps
    }

    /// Number of `sample` calls whose move was kept
    pub fn accepted_steps(&self) -> usize {
        self.accepted_steps
    }

    /// Arena index of the root
    pub fn root(&self) -> usize {
        self.root
    }

    /// Leaves under the root, i.e. every graph node once
    pub fn root_leaves(&self) -> &[G::Node] {
        self.arena
            .node(self.root)
            .map(|node| node.leaves())
            .unwrap_or(&[])
    }

    /// Number of leaves
    pub fn num_leaves(&self) -> usize {
        self.arena.len() + 1
    }

    /// Internal nodes in index order
    pub fn arena(&self) -> &NodeArena<G::Node> {
        &self.arena
    }

    /// The observed graph
    pub fn graph(&self) -> &'g G {
        self.graph
    }
}
