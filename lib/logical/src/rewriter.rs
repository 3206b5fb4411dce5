use crate::join::{GreedyJoinOrderPlanner, JoinOrderPlanner};
use crate::plan::{LockedNodes, PlanNode, PlanNodeKind, PlanNodeRef};
use crate::rules::{
    CartesianIntroductionRule, ConjunctionReplacementRule, DistinctPushDownRule,
    FilterPushDownRule, FlattenRule, PlanRewriteRule, PushDownFreeQueriesRule,
};
use rdf_federation_common::OptimizationLevel;
use rdf_federation_model::{PlanResult, PlanningError};
use std::sync::Arc;

/// Creates a list of rewrite rules based on the given `optimization_level`.
pub fn create_rewrite_rules(
    optimization_level: OptimizationLevel,
    join_order_planner: Arc<dyn JoinOrderPlanner>,
) -> Vec<Arc<dyn PlanRewriteRule>> {
    let conjunction_replacement = Arc::new(ConjunctionReplacementRule::new(join_order_planner));

    match optimization_level {
        OptimizationLevel::None => vec![conjunction_replacement],
        OptimizationLevel::Default => vec![
            Arc::new(FlattenRule::new()),
            Arc::new(CartesianIntroductionRule::new()),
            conjunction_replacement,
            Arc::new(FilterPushDownRule::new()),
        ],
        OptimizationLevel::Full => vec![
            Arc::new(FlattenRule::new()),
            Arc::new(CartesianIntroductionRule::new()),
            Arc::new(PushDownFreeQueriesRule::new()),
            conjunction_replacement,
            Arc::new(FilterPushDownRule::new()),
            Arc::new(DistinctPushDownRule::new()),
        ],
    }
}

/// Applies a fixed sequence of [PlanRewriteRule]s to a plan.
///
/// After all rules have been applied, the plan must not contain a conjunction anymore.
#[derive(Debug)]
pub struct PlanRewriter {
    rules: Vec<Arc<dyn PlanRewriteRule>>,
}

impl PlanRewriter {
    /// Creates a new [PlanRewriter] that uses the [GreedyJoinOrderPlanner].
    pub fn new(optimization_level: OptimizationLevel) -> Self {
        Self::with_join_order_planner(optimization_level, Arc::new(GreedyJoinOrderPlanner::new()))
    }

    /// Creates a new [PlanRewriter] that uses the given [JoinOrderPlanner].
    pub fn with_join_order_planner(
        optimization_level: OptimizationLevel,
        join_order_planner: Arc<dyn JoinOrderPlanner>,
    ) -> Self {
        Self::with_rules(create_rewrite_rules(
            optimization_level,
            join_order_planner,
        ))
    }

    /// Creates a new [PlanRewriter] from a custom list of rules.
    pub fn with_rules(rules: Vec<Arc<dyn PlanRewriteRule>>) -> Self {
        Self { rules }
    }

    /// Returns the rules of this rewriter in application order.
    pub fn rules(&self) -> &[Arc<dyn PlanRewriteRule>] {
        &self.rules
    }

    /// Rewrites `plan` while keeping the nodes in `locked` intact.
    ///
    /// # Errors
    ///
    /// Returns [PlanningError::UnorderedConjunction] if the rewritten plan still contains a
    /// conjunction. Errors of the individual rules are passed through.
    pub fn rewrite(&self, plan: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
        let mut plan = Arc::clone(plan);
        for rule in &self.rules {
            let new_plan = rule.rewrite(&plan, locked)?;
            if Arc::ptr_eq(&plan, &new_plan) {
                tracing::trace!(rule = rule.name(), "Rule did not change the plan");
            } else {
                tracing::debug!(
                    rule = rule.name(),
                    nodes = new_plan.node_count(),
                    "Rule rewrote the plan"
                );
            }
            plan = new_plan;
        }

        check_no_conjunction(&plan)?;
        Ok(plan)
    }
}

fn check_no_conjunction(node: &PlanNode) -> PlanResult<()> {
    if matches!(node.kind(), PlanNodeKind::Conjunction) {
        return Err(PlanningError::UnorderedConjunction(node.id().as_u64()));
    }
    node.children()
        .iter()
        .try_for_each(|child| check_no_conjunction(child))
}
