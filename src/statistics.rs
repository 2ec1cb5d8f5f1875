//! Solver statistics and the helpers used to log them in a MiniZinc-style
//! `prefix name=value` format.

use std::fmt::Display;

use once_cell::sync::OnceCell;

static STATISTIC_OPTIONS: OnceCell<StatisticOptions> = OnceCell::new();

#[derive(Debug)]
struct StatisticOptions {
    log_statistics: bool,
    prefix: &'static str,
}

/// Configures statistic logging once per process; later calls are ignored.
pub fn configure(log_statistics: bool, prefix: &'static str) {
    let _ = STATISTIC_OPTIONS.set(StatisticOptions {
        log_statistics,
        prefix,
    });
}

/// Logs a single statistic in the configured format, e.g. `%% fail_count=10`.
pub fn log_statistic(name: impl Display, value: impl Display) {
    if let Some(options) = STATISTIC_OPTIONS.get() {
        if options.log_statistics {
            println!("{}{name}={value}", options.prefix);
        }
    }
}

/// Signals that a block of statistics has been logged.
pub fn log_statistic_postfix() {
    if let Some(options) = STATISTIC_OPTIONS.get() {
        if options.log_statistics {
            println!("{}done", options.prefix);
        }
    }
}

/// Counters maintained by the solver during search.
///
/// The statistics are written only by the running solver and should be read after a solve call
/// returns. `bisect_count` and `enumerate_count` are reserved for a bisection branching strategy
/// and currently always zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolverStats {
    /// Deepest point of the search tree reached so far.
    pub max_depth: u64,
    /// Sum of the depths of all visited nodes; `avg_depth` derives from this.
    pub depth_sum: u64,
    /// Number of visited nodes that contributed to `depth_sum`.
    pub depth_count: u64,
    /// Number of restarts performed.
    pub restart_count: u64,
    /// Number of exhausted search frames.
    pub fail_count: u64,
    /// Number of NoGoods recorded.
    pub nogood_count: u64,
    /// Number of NoGood watch inspections.
    pub nogood_check_count: u64,
    /// Number of conflicts detected through a fully entailed NoGood.
    pub nogood_prune_count: u64,
    /// Number of domain removals enqueued by NoGood unit propagation.
    pub nogood_domain_count: u64,
    /// Number of those removals that collapsed the target domain to a singleton.
    pub nogood_instantiate_count: u64,
    /// Size of the NoGood pool when the solve call returned.
    pub nogoods_size: u64,
    /// Reserved; always zero.
    pub bisect_count: u64,
    /// Reserved; always zero.
    pub enumerate_count: u64,
}

impl SolverStats {
    /// Average depth over all visited nodes, zero before any node was visited.
    pub fn avg_depth(&self) -> f64 {
        if self.depth_count == 0 {
            0.0
        } else {
            self.depth_sum as f64 / self.depth_count as f64
        }
    }

    pub(crate) fn log(&self) {
        log_statistic("max_depth", self.max_depth);
        log_statistic("avg_depth", self.avg_depth());
        log_statistic("restart_count", self.restart_count);
        log_statistic("fail_count", self.fail_count);
        log_statistic("nogood_count", self.nogood_count);
        log_statistic("nogood_check_count", self.nogood_check_count);
        log_statistic("nogood_prune_count", self.nogood_prune_count);
        log_statistic("nogood_domain_count", self.nogood_domain_count);
        log_statistic("nogood_instantiate_count", self.nogood_instantiate_count);
        log_statistic("nogoods_size", self.nogoods_size);
        log_statistic("bisect_count", self.bisect_count);
        log_statistic("enumerate_count", self.enumerate_count);
    }
}
