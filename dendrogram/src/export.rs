//! Text renderings of a dendrogram: tree file, info file, dot graph.
//!
//! ```text
//! tree:  <index>\t<left>\t<right>     child = "<idx> (D)" | "<leaf> (G)"
//! info:  Likelihood:\t<f64>
//!        MCMC Steps:\t<n>
//! dot:   graph { INTERNAL_<i> ... LEAF_<k> ... }
//! ```

use crate::common_io::{with_extension, write_lines};
use crate::node::{Child, InternalNode, NodeArena};
use crate::tree::Dendrogram;
use fnv::FnvHashMap;
use graph_util::EdgeCountGraph;
use log::info;
use rand::Rng;
use std::fmt::Display;
use std::hash::Hash;

/// Numbers leaves in first-encounter order within one dot export.
pub struct LeafRegistry<'a, L> {
    ids: FnvHashMap<&'a L, usize>,
}

impl<'a, L> LeafRegistry<'a, L>
where
    L: Eq + Hash + Display,
{
    /// Fresh numbering starting at `LEAF_0`
    pub fn new() -> Self {
        LeafRegistry {
            ids: FnvHashMap::default(),
        }
    }

    /// Dot lines linking `from` to `leaf`, declaring the leaf on first sight
    pub fn link(&mut self, from: &str, leaf: &'a L) -> Vec<Box<str>> {
        let mut dot = vec![];
        let next = self.ids.len();
        let id = *self.ids.entry(leaf).or_insert_with(|| {
            dot.push(format!("LEAF_{} [shape=none, label=\"{}\"];", next, leaf).into_boxed_str());
            next
        });
        dot.push(format!("{} -- LEAF_{};", from, id).into_boxed_str());
        dot
    }
}

impl<'a, L> Default for LeafRegistry<'a, L>
where
    L: Eq + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Dot statements of one internal node
pub fn node_dot_lines<'a, L>(
    node: &'a InternalNode<L>,
    registry: &mut LeafRegistry<'a, L>,
) -> Vec<Box<str>>
where
    L: Eq + Hash + Display,
{
    let name = format!("INTERNAL_{}", node.index());
    let mut dot = vec![format!("{} [shape=point,label=\"\"];", name).into_boxed_str()];

    for child in [node.left(), node.right()] {
        match child {
            Child::Internal(idx) => {
                dot.push(format!("{} -- INTERNAL_{};", name, idx).into_boxed_str());
            }
            Child::Leaf(leaf) => dot.extend(registry.link(&name, leaf)),
        }
    }
    dot
}

/// One tree-file line per node, in index order
pub fn tree_lines<L: Display>(arena: &NodeArena<L>) -> Vec<Box<str>> {
    arena
        .iter()
        .map(|node| node.to_string().into_boxed_str())
        .collect()
}

/// Whole dot graph; leaf numbering restarts on every call
pub fn dot_lines<L>(arena: &NodeArena<L>) -> Vec<Box<str>>
where
    L: Eq + Hash + Display,
{
    let mut registry = LeafRegistry::new();
    let mut lines = vec!["graph {".into()];
    for node in arena.iter() {
        lines.extend(
            node_dot_lines(node, &mut registry)
                .into_iter()
                .map(|x| format!("\t{}", x).into_boxed_str()),
        );
    }
    lines.push("}".into());
    lines
}

/// Info-file lines. The likelihood uses the shortest text that parses
/// back to the same `f64`: `0.25`, `1.0`, `1e-20`.
pub fn info_lines(likelihood: f64, mcmc_steps: usize) -> Vec<Box<str>> {
    vec![
        format!("Likelihood:\t{:?}", likelihood).into_boxed_str(),
        format!("MCMC Steps:\t{}", mcmc_steps).into_boxed_str(),
    ]
}

impl<'g, G, R> Dendrogram<'g, G, R>
where
    G: EdgeCountGraph,
    R: Rng,
{
    /// Tree-file lines of the current topology
    pub fn tree_lines(&self) -> Vec<Box<str>> {
        tree_lines(self.arena())
    }

    /// Dot lines of the current topology
    pub fn dot_lines(&self) -> Vec<Box<str>> {
        dot_lines(self.arena())
    }

    /// Info-file lines: aggregate likelihood and step count
    pub fn info_lines(&self) -> Vec<Box<str>> {
        info_lines(self.likelihood(), self.mcmc_steps())
    }

    /// Write the tree file
    pub fn write_tree(&self, tree_file: &str) -> anyhow::Result<()> {
        write_lines(&self.tree_lines(), tree_file)
    }

    /// Write the info file
    pub fn write_info(&self, info_file: &str) -> anyhow::Result<()> {
        write_lines(&self.info_lines(), info_file)
    }

    /// Write the dot graph
    pub fn write_dot(&self, dot_file: &str) -> anyhow::Result<()> {
        write_lines(&self.dot_lines(), dot_file)
    }

    /// Write the tree file, the info file, and a dot file next to the
    /// tree file with its extension swapped for `.dot`.
    pub fn save(&self, tree_file: &str, info_file: &str) -> anyhow::Result<()> {
        let dot_file = with_extension(tree_file, "dot")?;
        self.write_tree(tree_file)?;
        self.write_info(info_file)?;
        self.write_dot(&dot_file)?;
        info!(
            "saved {} nodes to {}, {} and {}",
            self.arena().len(),
            tree_file,
            info_file,
            dot_file
        );
        Ok(())
    }
}
