use crate::plan::{transform_down, LockedNodes, PlanNode, PlanNodeKind, PlanNodeRef};
use crate::rules::PlanRewriteRule;
use rdf_federation_model::{Modifiers, PlanResult, SparqlFilter};
use std::sync::Arc;

/// Pushes filters as close to the leaves as possible.
///
/// A filter is pushed into every child that binds all variables of the filter. Optional children
/// never receive filters, and neither do children with a limit or ask queries, as the filter must
/// be applied to their result. The filters of a union are only pushed if every branch can evaluate
/// them. Filters pushed into a locked node are attached to a new pipe above that node.
#[derive(Debug, Default)]
pub struct FilterPushDownRule;

impl FilterPushDownRule {
    /// Creates a new [FilterPushDownRule].
    pub fn new() -> Self {
        Self
    }
}

impl PlanRewriteRule for FilterPushDownRule {
    fn name(&self) -> &str {
        "filter-push-down"
    }

    fn rewrite(&self, plan: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
        transform_down(plan, locked, &mut |node| push_down_filters(node, locked))
    }
}

fn push_down_filters(node: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
    if node.modifiers().filters().is_empty() || node.is_leaf() {
        return Ok(Arc::clone(node));
    }
    // This pipe already hosts the filters of a locked node.
    if matches!(node.kind(), PlanNodeKind::Pipe)
        && node.children().iter().any(|c| locked.contains(c))
    {
        return Ok(Arc::clone(node));
    }

    let mut modifiers = node.modifiers().clone();
    let mut children = node.children().to_vec();
    let mut changed = false;
    for filter in modifiers.take_filters() {
        let targets = children
            .iter()
            .enumerate()
            .filter(|(_, c)| accepts_filters(c) && filter.is_covered_by(c.bound_variables()))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        let push = match node.kind() {
            PlanNodeKind::Union => targets.len() == children.len(),
            _ => !targets.is_empty(),
        };
        if !push {
            modifiers.add_filter(filter);
            continue;
        }

        for i in targets {
            children[i] = add_filter(&children[i], filter.clone(), locked)?;
        }
        changed = true;
    }

    if !changed {
        return Ok(Arc::clone(node));
    }
    tracing::debug!(node = %node.id(), "Pushed down filters");

    if matches!(node.kind(), PlanNodeKind::Pipe) && modifiers.is_empty() {
        if let Some(child) = children.pop() {
            return Ok(child);
        }
    }
    PlanNode::try_new(node.kind().clone(), children, modifiers)
}

fn accepts_filters(node: &PlanNode) -> bool {
    let modifiers = node.modifiers();
    !modifiers.is_optional() && modifiers.limit().is_none() && !modifiers.is_ask()
}

fn add_filter(
    node: &PlanNodeRef,
    filter: SparqlFilter,
    locked: &LockedNodes,
) -> PlanResult<PlanNodeRef> {
    if locked.contains(node) {
        let mut modifiers = Modifiers::new();
        modifiers.add_filter(filter);
        return PlanNode::pipe(Arc::clone(node), modifiers);
    }
    node.with_added_filter(filter)
}
