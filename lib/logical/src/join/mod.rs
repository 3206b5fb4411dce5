mod join_reordering;

pub use join_reordering::{estimate_cost, estimate_triple_cardinality, GreedyJoinOrderPlanner};

use crate::plan::PlanNodeRef;
use rdf_federation_model::PlanResult;
use std::fmt::Debug;

/// Decides the order in which the children of a conjunction are joined.
pub trait JoinOrderPlanner: Debug + Send + Sync {
    /// Combines `nodes` into a tree of joins and cartesian products.
    ///
    /// The returned tree must contain every node of `nodes` exactly once (by identity). Optional
    /// nodes must only appear as the right child of a join.
    ///
    /// # Errors
    ///
    /// Fails if `nodes` is empty.
    fn plan_join_order(&self, nodes: Vec<PlanNodeRef>) -> PlanResult<PlanNodeRef>;
}
