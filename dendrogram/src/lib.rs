//! Hierarchical random graph dendrograms fitted by MCMC.
//!
//! A dendrogram is a binary tree whose leaves are the nodes of an
//! observed graph. Each internal node splits its leaves into two groups
//! and explains the edges across that split with one connection
//! probability. The sampler walks the space of dendrograms by local
//! rotations, accepting each move by the Metropolis rule on the product
//! of the per-node likelihoods.
//!
//! # Model
//!
//! ```text
//! lik(node) = theta^links * (1 - theta)^(|L||R| - links),  theta = links / (|L||R|)
//! lik(tree) = prod over internal nodes of lik(node)
//! ```
//!
//! The product underflows for large graphs;
//! [`Dendrogram::log_likelihood`] reports the same quantity in log
//! space.

#![deny(missing_docs)]

/// Split likelihood and acceptance rule
pub mod model;

/// Internal nodes, rotations and the node arena
pub mod node;

/// Sampling session: construction, likelihood cache, MCMC steps
pub mod tree;

/// Tree, info and dot renderings and writers
pub mod export;

/// Bounded chain runner with burn-in, thinning and a likelihood trace
#[allow(missing_docs)]
pub mod chain;

/// Buffered (optionally gzipped) file helpers
#[allow(missing_docs)]
pub mod common_io;

#[cfg(test)]
mod test;

pub use chain::{run_chain, ChainArgs, ChainTrace};
pub use node::{Child, InternalNode, Mutation, NodeArena};
pub use tree::{Dendrogram, DendrogramOptions};
