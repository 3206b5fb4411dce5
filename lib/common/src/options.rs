use std::num::NonZeroUsize;
use std::thread::available_parallelism;

/// Defines how many rewrite rules the plan rewriter should apply.
///
/// Currently, the default value is [OptimizationLevel::Full], as all rules are cheap compared to
/// the cost of sending a sub-query to a remote source.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OptimizationLevel {
    /// No optimizations, except rewrites that are necessary for an executable plan.
    None,
    /// Flattening, cartesian product introduction, join ordering, and filter pushdown.
    Default,
    /// Runs all rules.
    #[default]
    Full,
}

/// Defines how per-source match results are turned into leaf nodes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AgglutinationStrategy {
    /// Detects triples that only a single source can answer and merges exclusive groups.
    #[default]
    Merging,
    /// Emits one leaf per exclusive group and non-exclusive triple without merging.
    Simple,
}

/// Options for planning a federated query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlannerOptions {
    /// The agglutination engine to use.
    pub agglutination: AgglutinationStrategy,
    /// The rewrite rules to apply.
    pub optimization_level: OptimizationLevel,
    /// The number of worker threads used for matching and agglutination. A value of `1` runs
    /// everything on the calling thread.
    pub parallelism: usize,
    /// Whether to run consistency checks on the agglutination result and the final plan.
    pub verify: bool,
}

impl PlannerOptions {
    /// Sets the agglutination strategy.
    #[must_use]
    pub fn with_agglutination(mut self, agglutination: AgglutinationStrategy) -> Self {
        self.agglutination = agglutination;
        self
    }

    /// Sets the optimization level.
    #[must_use]
    pub fn with_optimization_level(mut self, optimization_level: OptimizationLevel) -> Self {
        self.optimization_level = optimization_level;
        self
    }

    /// Sets the parallelism. Values smaller than `1` are treated as `1`.
    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Enables or disables consistency checks.
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            agglutination: AgglutinationStrategy::default(),
            optimization_level: OptimizationLevel::default(),
            parallelism: default_parallelism(),
            verify: cfg!(debug_assertions),
        }
    }
}

/// Returns the available parallelism of the machine, or `1` if it cannot be determined.
pub fn default_parallelism() -> usize {
    available_parallelism().map_or(1, NonZeroUsize::get)
}
