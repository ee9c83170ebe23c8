//! Sampler-level tests for the dendrogram crate.

use crate::node::{Child, NodeArena};
use crate::tree::{Dendrogram, DendrogramOptions};
use approx::{assert_abs_diff_eq, assert_relative_eq};
use fnv::FnvHashSet;
use graph_util::{EdgeCountGraph, EdgeListGraph};
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};

/// Random source that always emits the same word.
///
/// `0` makes every uniform draw `0.0`; `u64::MAX` makes it just
/// below one.
struct ConstRng(u64);

impl RngCore for ConstRng {
    fn next_u32(&mut self) -> u32 {
        (self.0 >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.0
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        dst.fill(self.0 as u8);
    }
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Two dense groups of `n_per_group` nodes with sparse links between them.
fn planted_two_groups(n_per_group: usize, p_in: f64, p_out: f64, seed: u64) -> EdgeListGraph<usize> {
    let n = 2 * n_per_group;
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut edges = vec![];
    for i in 0..n {
        for j in (i + 1)..n {
            let p = if (i < n_per_group) == (j < n_per_group) {
                p_in
            } else {
                p_out
            };
            if rng.random::<f64>() < p {
                edges.push((i, j));
            }
        }
    }
    EdgeListGraph::from_edges(0..n, edges)
}

fn assert_valid_tree<G, R>(tree: &Dendrogram<G, R>, graph: &G)
where
    G: EdgeCountGraph,
    R: Rng,
{
    let n = graph.num_nodes();
    assert_eq!(tree.arena().len(), n - 1);

    let leaves = tree.root_leaves();
    assert_eq!(leaves.len(), n);
    let unique: FnvHashSet<_> = leaves.iter().collect();
    assert_eq!(unique.len(), n);
    for v in graph.nodes() {
        assert!(unique.contains(&v));
    }

    // rebuilding the arena from scratch must agree on the root
    let mut arena = tree.arena().clone();
    assert_eq!(arena.validate(&graph.nodes()).unwrap(), tree.root());

    for node in tree.arena().iter() {
        let expected = [node.left(), node.right()]
            .iter()
            .map(|c| tree.arena().child_leaves(c).len())
            .sum::<usize>();
        assert_eq!(node.leaves().len(), expected);
    }
}

#[test]
fn test_construction_covers_all_leaves() -> anyhow::Result<()> {
    init_logger();
    for n in 2..40 {
        let graph = EdgeListGraph::from_edges(0..n, (1..n).map(|i| (i - 1, i)));
        let options = DendrogramOptions {
            seed: n as u64,
            ..Default::default()
        };
        let tree = Dendrogram::new(&graph, &options)?;
        assert_valid_tree(&tree, &graph);
        assert_eq!(tree.num_leaves(), n);
        assert_eq!(tree.mcmc_steps(), 0);
    }
    Ok(())
}

#[test]
fn test_node_likelihoods_in_unit_interval() -> anyhow::Result<()> {
    let graph = planted_two_groups(10, 0.6, 0.1, 1);
    let mut tree = Dendrogram::new(&graph, &DendrogramOptions::default())?;
    for _ in 0..200 {
        tree.sample()?;
        for idx in 0..tree.arena().len() {
            let lik = tree.node_likelihood(idx).unwrap();
            assert!((0.0..=1.0).contains(&lik));
        }
    }
    Ok(())
}

#[test]
fn test_sampling_preserves_tree() -> anyhow::Result<()> {
    init_logger();
    let graph = planted_two_groups(8, 0.7, 0.05, 3);
    let mut tree = Dendrogram::new(&graph, &DendrogramOptions::default())?;
    for _ in 0..500 {
        let lik = tree.sample()?;
        assert_eq!(lik, tree.likelihood());
    }
    assert_eq!(tree.mcmc_steps(), 500);
    assert!(tree.accepted_steps() <= 500);
    assert_valid_tree(&tree, &graph);
    Ok(())
}

#[test]
fn test_aggregate_matches_product() -> anyhow::Result<()> {
    let graph = planted_two_groups(6, 0.8, 0.1, 5);
    let mut tree = Dendrogram::new(&graph, &DendrogramOptions::default())?;
    for _ in 0..300 {
        tree.sample()?;

        // cache against the cache
        assert_relative_eq!(
            tree.likelihood(),
            tree.likelihood_product(),
            max_relative = 1e-9
        );

        // cache against the current topology
        let fresh: f64 = (0..tree.arena().len())
            .map(|idx| tree.arena().likelihood(idx, &graph))
            .product();
        assert_relative_eq!(tree.likelihood(), fresh, max_relative = 1e-9);
    }
    Ok(())
}

#[test]
fn test_log_likelihood_tracks_product() -> anyhow::Result<()> {
    let graph = planted_two_groups(5, 0.8, 0.1, 9);
    let mut tree = Dendrogram::new(&graph, &DendrogramOptions::default())?;
    for _ in 0..100 {
        tree.sample()?;
        assert_relative_eq!(
            tree.log_likelihood(),
            tree.likelihood().ln(),
            max_relative = 1e-9
        );
    }
    Ok(())
}

#[test]
fn test_running_log_likelihood_matches_sweep() -> anyhow::Result<()> {
    let graph = planted_two_groups(12, 0.6, 0.1, 11);
    let mut tree = Dendrogram::new(&graph, &DendrogramOptions::default())?;
    assert_relative_eq!(
        tree.log_likelihood(),
        tree.log_likelihood_sweep(),
        max_relative = 1e-12
    );
    for t in 1..=5000 {
        tree.sample()?;
        if t % 500 == 0 {
            assert_abs_diff_eq!(
                tree.log_likelihood(),
                tree.log_likelihood_sweep(),
                epsilon = 1e-6
            );
        }
    }
    assert_eq!(tree.mcmc_steps(), 5000);
    Ok(())
}

/// Caterpillar over `leaves` appended to `arena`; returns its root.
fn caterpillar(arena: &mut NodeArena<usize>, leaves: std::ops::Range<usize>) -> anyhow::Result<usize> {
    let mut leaves = leaves.map(Child::Leaf);
    let (Some(first), Some(second)) = (leaves.next(), leaves.next()) else {
        anyhow::bail!("caterpillar needs two leaves");
    };
    let mut top = arena.combine(first, second)?;
    for leaf in leaves {
        top = arena.combine(Child::Internal(top), leaf)?;
    }
    Ok(top)
}

#[test]
fn test_underflowed_root_term_rebuilds_aggregate() -> anyhow::Result<()> {
    init_logger();
    // half of the 64 x 64 cross pairs are linked, so the root split
    // scores 0.5^4096, which is zero in f64
    let edges = (0..64)
        .flat_map(|i| (64..128).map(move |j| (i, j)))
        .filter(|(i, j)| (i + j) % 2 == 0);
    let graph = EdgeListGraph::from_edges(0..128, edges);

    let mut arena = NodeArena::new();
    let left = caterpillar(&mut arena, 0..64)?;
    let right = caterpillar(&mut arena, 64..128)?;
    let root = arena.combine(Child::Internal(left), Child::Internal(right))?;

    let mut tree = Dendrogram::with_topology(&graph, arena, &DendrogramOptions::default())?;
    assert_eq!(tree.root(), root);
    assert_eq!(tree.node_likelihood(root), Some(0.0));
    assert_eq!(tree.likelihood(), 0.0);

    let expected = 4096.0 * 0.5_f64.ln();
    assert_relative_eq!(tree.log_likelihood(), expected, max_relative = 1e-12);

    // the root term is zero, so it cannot be divided out of the aggregate
    let lik = tree.update(root, left)?;
    assert_eq!(lik, tree.likelihood_product());
    assert_eq!(tree.likelihood(), tree.likelihood_product());
    assert_relative_eq!(tree.log_likelihood(), expected, max_relative = 1e-12);

    for _ in 0..300 {
        tree.sample()?;
        assert_relative_eq!(
            tree.likelihood(),
            tree.likelihood_product(),
            max_relative = 1e-9
        );
        assert!(tree.log_likelihood().is_finite());
    }
    assert_abs_diff_eq!(
        tree.log_likelihood(),
        tree.log_likelihood_sweep(),
        epsilon = 1e-6
    );
    assert_valid_tree(&tree, &graph);
    Ok(())
}

#[test]
fn test_same_seed_same_chain() -> anyhow::Result<()> {
    let graph = planted_two_groups(6, 0.5, 0.2, 2);
    let options = DendrogramOptions {
        seed: 123,
        ..Default::default()
    };
    let mut a = Dendrogram::new(&graph, &options)?;
    let mut b = Dendrogram::new(&graph, &options)?;
    for _ in 0..100 {
        assert_eq!(a.sample()?, b.sample()?);
    }
    assert_eq!(a.tree_lines(), b.tree_lines());
    Ok(())
}

#[test]
fn test_zero_draws_accept_every_move() -> anyhow::Result<()> {
    // every uniform draw is 0.0, below any positive ratio
    let graph = planted_two_groups(4, 0.7, 0.1, 4);
    let mut tree = Dendrogram::with_rng(&graph, ConstRng(0), &DendrogramOptions::default())?;
    for _ in 0..20 {
        let before = tree.likelihood();
        tree.sample()?;
        if before > 0.0 {
            assert_eq!(tree.accepted_steps(), tree.mcmc_steps());
        }
    }
    assert_valid_tree(&tree, &graph);
    Ok(())
}

#[test]
fn test_high_draws_never_go_downhill() -> anyhow::Result<()> {
    // every uniform draw is just below one: only moves that do not lower
    // the likelihood survive, and rejected moves restore the topology
    let graph = planted_two_groups(4, 0.7, 0.1, 6);
    let mut tree = Dendrogram::with_rng(
        &graph,
        ConstRng(u64::MAX),
        &DendrogramOptions::default(),
    )?;
    for _ in 0..20 {
        let before = tree.likelihood();
        let lines_before = tree.tree_lines();
        let accepted_before = tree.accepted_steps();

        let after = tree.sample()?;

        if tree.accepted_steps() == accepted_before {
            assert_eq!(tree.tree_lines(), lines_before);
            assert_relative_eq!(after, before, max_relative = 1e-12);
        } else {
            assert!(after >= before * (1.0 - 1e-12));
        }
    }
    assert_valid_tree(&tree, &graph);
    Ok(())
}

#[test]
fn test_three_leaf_chain_visits_all_topologies() -> anyhow::Result<()> {
    // leaves A, B, C with edges A-B and B-C; the three rooted shapes
    // differ by which leaf sits alone under the root
    let graph = EdgeListGraph::from_edges(vec![], vec![("A", "B"), ("B", "C")]);
    let mut tree = Dendrogram::new(&graph, &DendrogramOptions::default())?;

    let mut singles = FnvHashSet::default();
    for _ in 0..500 {
        tree.sample()?;
        let root = tree.arena().node(tree.root()).unwrap();
        for child in [root.left(), root.right()] {
            if let Child::Leaf(leaf) = child {
                singles.insert(*leaf);
            }
        }
    }
    // {B}|{A,C} scores 1, the other two 0.25: leaving it is accepted
    // a quarter of the time
    assert_eq!(singles.len(), 3);
    Ok(())
}

#[test]
fn test_sampling_needs_three_leaves() -> anyhow::Result<()> {
    let graph = EdgeListGraph::from_edges(vec![], vec![("A", "B")]);
    let mut arena = NodeArena::new();
    arena.combine(Child::Leaf("A"), Child::Leaf("B"))?;
    let mut tree = Dendrogram::with_topology(&graph, arena, &DendrogramOptions::default())?;
    let err = tree.sample().unwrap_err();
    assert!(err.to_string().contains("at least three leaves"));
    Ok(())
}
