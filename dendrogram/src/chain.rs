use crate::common_io::write_lines;
use crate::tree::{Dendrogram, DendrogramOptions};

use clap::Args;
use graph_util::EdgeCountGraph;
use indicatif::ProgressBar;
use log::info;
use rand::Rng;

/// Chain length, burn-in and thinning for a bounded MCMC run.
#[derive(Args, Debug, Clone)]
pub struct ChainArgs {
    /// number of MCMC steps after burn-in
    #[arg(long, short = 'n', default_value_t = 10_000)]
    pub num_steps: usize,

    /// number of initial steps to discard
    #[arg(long, default_value_t = 1_000)]
    pub burnin: usize,

    /// record every `thin`-th step after burn-in
    #[arg(long, default_value_t = 10)]
    pub thin: usize,

    /// random seed
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// uniform draws before scanning for a rotatable node
    #[arg(long, default_value_t = 1_000)]
    pub max_select_attempts: usize,

    /// show a progress bar
    #[arg(long, default_value_t = false)]
    pub progress: bool,
}

impl Default for ChainArgs {
    fn default() -> Self {
        ChainArgs {
            num_steps: 10_000,
            burnin: 1_000,
            thin: 10,
            seed: 42,
            max_select_attempts: 1_000,
            progress: false,
        }
    }
}

impl ChainArgs {
    /// Session options derived from these arguments
    pub fn options(&self) -> DendrogramOptions {
        DendrogramOptions {
            seed: self.seed,
            max_select_attempts: self.max_select_attempts,
        }
    }
}

/// One recorded state of the chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceRecord {
    pub step: usize,
    pub likelihood: f64,
    pub log_likelihood: f64,
}

/// Recorded likelihoods plus the best dendrogram seen.
#[derive(Debug, Clone)]
pub struct ChainTrace {
    pub records: Vec<TraceRecord>,
    /// highest log-likelihood seen, the starting state included
    pub best_log_likelihood: f64,
    pub best_step: usize,
    /// tree-file lines of the best state
    pub best_tree: Vec<Box<str>>,
    /// fraction of steps in this run whose move was kept
    pub acceptance_rate: f64,
}

impl ChainTrace {
    pub fn n_records(&self) -> usize {
        self.records.len()
    }

    pub fn likelihoods(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.likelihood).collect()
    }

    pub fn log_likelihoods(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.log_likelihood).collect()
    }

    /// Tab-separated trace with a header line
    pub fn to_lines(&self) -> Vec<Box<str>> {
        let mut lines = vec!["step\tlikelihood\tlog_likelihood".into()];
        lines.extend(self.records.iter().map(|r| {
            format!("{}\t{:?}\t{:?}", r.step, r.likelihood, r.log_likelihood).into_boxed_str()
        }));
        lines
    }

    pub fn write(&self, output_file: &str) -> anyhow::Result<()> {
        write_lines(&self.to_lines(), output_file)
    }

    pub fn write_best_tree(&self, tree_file: &str) -> anyhow::Result<()> {
        write_lines(&self.best_tree, tree_file)
    }
}

/// Run `burnin + num_steps` sampling steps on `dendrogram`.
///
/// Step numbers in the trace continue the session's own step counter.
pub fn run_chain<G, R>(
    dendrogram: &mut Dendrogram<G, R>,
    args: &ChainArgs,
) -> anyhow::Result<ChainTrace>
where
    G: EdgeCountGraph,
    R: Rng,
{
    if args.thin == 0 {
        return Err(anyhow::anyhow!("thinning interval must be positive"));
    }

    let total = args.burnin + args.num_steps;
    let accepted_before = dendrogram.accepted_steps();

    let mut best_log_likelihood = dendrogram.log_likelihood();
    let mut best_step = dendrogram.mcmc_steps();
    let mut best_tree = dendrogram.tree_lines();

    let mut records = Vec::with_capacity(args.num_steps / args.thin + 1);

    let pb = if args.progress {
        ProgressBar::new(total as u64)
    } else {
        ProgressBar::hidden()
    };

    for t in 0..total {
        let likelihood = dendrogram.sample()?;
        let log_likelihood = dendrogram.log_likelihood();

        if log_likelihood > best_log_likelihood {
            best_log_likelihood = log_likelihood;
            best_step = dendrogram.mcmc_steps();
            best_tree = dendrogram.tree_lines();
        }

        if t >= args.burnin && (t - args.burnin + 1) % args.thin == 0 {
            records.push(TraceRecord {
                step: dendrogram.mcmc_steps(),
                likelihood,
                log_likelihood,
            });
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let acceptance_rate = if total > 0 {
        (dendrogram.accepted_steps() - accepted_before) as f64 / total as f64
    } else {
        0.0
    };

    info!(
        "{} steps, acceptance {:.3}, best log-likelihood {:.4} at step {}",
        total, acceptance_rate, best_log_likelihood, best_step
    );

    Ok(ChainTrace {
        records,
        best_log_likelihood,
        best_step,
        best_tree,
        acceptance_rate,
    })
}
