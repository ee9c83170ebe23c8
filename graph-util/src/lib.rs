//! Graph collaborators consumed by the dendrogram sampler.
//!
//! The sampler only needs two queries from an observed graph: the set
//! of its nodes and the number of edges crossing between two disjoint
//! node groups. [`traits::EdgeCountGraph`] captures those queries and
//! [`edge_list::EdgeListGraph`] is a small in-memory implementation.

#![deny(missing_docs)]

/// Edge-count queries required by the likelihood model
pub mod traits;

/// In-memory undirected graph backed by hash adjacency sets
pub mod edge_list;

pub use edge_list::EdgeListGraph;
pub use traits::EdgeCountGraph;
