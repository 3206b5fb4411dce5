//! Configuration and execution utilities shared by the planner crates.

mod options;
mod parallel;

pub use options::{default_parallelism, AgglutinationStrategy, OptimizationLevel, PlannerOptions};
pub use parallel::{parallel_map, ParallelFor, RayonParallelFor, SequentialParallelFor};
