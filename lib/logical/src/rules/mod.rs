//! Rules that rewrite a federated plan.
//!
//! Every rule receives the set of locked nodes. A rule never restructures a locked node or its
//! subtree, and a rule that does not change a subtree returns the same [PlanNodeRef].

mod cartesian_introduction;
mod conjunction_replacement;
mod distinct_push_down;
mod filter_push_down;
mod flatten;
mod push_down_free_queries;

pub use cartesian_introduction::CartesianIntroductionRule;
pub use conjunction_replacement::ConjunctionReplacementRule;
pub use distinct_push_down::DistinctPushDownRule;
pub use filter_push_down::FilterPushDownRule;
pub use flatten::FlattenRule;
pub use push_down_free_queries::PushDownFreeQueriesRule;

use crate::plan::{LockedNodes, PlanNode, PlanNodeRef};
use rdf_federation_model::{same_source, PlanResult, Query, SourceRef};
use std::fmt::Debug;
use std::sync::Arc;

/// A rule that rewrites a plan into an equivalent plan.
pub trait PlanRewriteRule: Debug + Send + Sync {
    /// The name of the rule.
    fn name(&self) -> &str;

    /// Rewrites `plan`. Nodes in `locked` and their subtrees are kept as-is.
    fn rewrite(&self, plan: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef>;
}

/// Returns whether `node` is a query leaf that can be merged with other queries: it is assigned
/// to a source, not locked, not optional, and has no modifiers except filters.
pub(crate) fn is_free_query(node: &PlanNode, locked: &LockedNodes) -> bool {
    node.as_bound_query().is_some()
        && !locked.contains(node)
        && node.modifiers().only_filters()
}

/// Tries to merge two free query leaves of the same source into a single leaf.
///
/// The leaves must answer disjoint triples and share a variable unless the source supports
/// cartesian products. The merge policies of both queries must permit the merge.
pub(crate) fn try_merge_leaves(
    lhs: &PlanNode,
    rhs: &PlanNode,
    locked: &LockedNodes,
) -> PlanResult<Option<PlanNodeRef>> {
    if !is_free_query(lhs, locked) || !is_free_query(rhs, locked) {
        return Ok(None);
    }
    if !lhs.matched_triples().is_disjoint(rhs.matched_triples()) {
        return Ok(None);
    }
    let (Some((lhs_query, lhs_source)), Some((rhs_query, rhs_source))) =
        (lhs.as_bound_query(), rhs.as_bound_query())
    else {
        return Ok(None);
    };

    let Some(query) = merge_queries(lhs_query, rhs_query, lhs_source, rhs_source)? else {
        return Ok(None);
    };
    PlanNode::query(query, Arc::clone(lhs_source)).map(Some)
}

fn merge_queries(
    lhs: &Query,
    rhs: &Query,
    lhs_source: &SourceRef,
    rhs_source: &SourceRef,
) -> PlanResult<Option<Query>> {
    if !same_source(lhs_source.as_ref(), rhs_source.as_ref()) {
        return Ok(None);
    }
    if !lhs.shares_variable(rhs) && !lhs_source.supports_cartesian() {
        return Ok(None);
    }
    if !lhs.allows_merge_with(rhs) {
        return Ok(None);
    }
    lhs.merge(rhs)
}
