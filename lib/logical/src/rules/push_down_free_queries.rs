use crate::plan::{transform_up, LockedNodes, PlanNode, PlanNodeKind, PlanNodeRef};
use crate::rules::{is_free_query, try_merge_leaves, PlanRewriteRule};
use rdf_federation_model::PlanResult;
use std::sync::Arc;

/// Distributes free query leaves of a conjunction into sibling unions and cartesian products.
///
/// Consider the following plan:
///
/// ```text
/// Conjunction
///   Query[A]: ?x <p> ?y
///   Union
///     Query[A]: ?y <q> ?z
///     Query[A]: ?y <r> ?z
/// ```
///
/// As source `A` evaluates all queries, the free leaf can be merged into every branch of the
/// union, which removes a join that would otherwise be evaluated by the federation engine:
///
/// ```text
/// Union
///   Query[A]: ?x <p> ?y . ?y <q> ?z
///   Query[A]: ?x <p> ?y . ?y <r> ?z
/// ```
///
/// For a union, the free leaf must be mergeable with every branch. For a cartesian product, the
/// free leaf is merged into every component that shares a variable with it. If more than one
/// component receives the free leaf, the components are no longer disconnected and the cartesian
/// product becomes a conjunction. If any required merge is not possible, the rewrite is not
/// applied.
#[derive(Debug, Default)]
pub struct PushDownFreeQueriesRule;

impl PushDownFreeQueriesRule {
    /// Creates a new [PushDownFreeQueriesRule].
    pub fn new() -> Self {
        Self
    }
}

impl PlanRewriteRule for PushDownFreeQueriesRule {
    fn name(&self) -> &str {
        "push-down-free-queries"
    }

    fn rewrite(&self, plan: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
        transform_up(plan, locked, &mut |node| push_down_free_queries(node, locked))
    }
}

fn push_down_free_queries(node: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
    if !matches!(node.kind(), PlanNodeKind::Conjunction) {
        return Ok(Arc::clone(node));
    }

    let mut children = node.children().to_vec();
    let mut changed = false;
    'search: loop {
        for free in 0..children.len() {
            if !is_free_query(&children[free], locked) {
                continue;
            }
            for sibling in 0..children.len() {
                if sibling == free {
                    continue;
                }
                if let Some(distributed) =
                    distribute(&children[free], &children[sibling], locked)?
                {
                    tracing::debug!(
                        free = %children[free].id(),
                        target = %children[sibling].id(),
                        "Distributed free query"
                    );
                    children[sibling] = distributed;
                    children.remove(free);
                    changed = true;
                    continue 'search;
                }
            }
        }
        break;
    }

    if changed {
        node.with_children(children)
    } else {
        Ok(Arc::clone(node))
    }
}

/// Merges `free` into `target`. Returns [None] if not every required merge is possible.
fn distribute(
    free: &PlanNode,
    target: &PlanNode,
    locked: &LockedNodes,
) -> PlanResult<Option<PlanNodeRef>> {
    if locked.contains(target) || !target.modifiers().only_filters() {
        return Ok(None);
    }

    match target.kind() {
        PlanNodeKind::Union => {
            let mut branches = Vec::with_capacity(target.children().len());
            for branch in target.children() {
                if branch
                    .public_variables()
                    .is_disjoint(free.public_variables())
                {
                    return Ok(None);
                }
                let Some(merged) = try_merge_leaves(free, branch, locked)? else {
                    return Ok(None);
                };
                branches.push(merged);
            }
            target.with_children(branches).map(Some)
        }
        PlanNodeKind::CartesianProduct => {
            let mut components = target.children().to_vec();
            let mut merges = 0;
            for component in &mut components {
                if component
                    .public_variables()
                    .is_disjoint(free.public_variables())
                {
                    continue;
                }
                let Some(merged) = try_merge_leaves(free, component, locked)? else {
                    return Ok(None);
                };
                *component = merged;
                merges += 1;
            }

            match merges {
                0 => Ok(None),
                1 => target.with_children(components).map(Some),
                // The merged components now share the variables of the free leaf.
                _ => PlanNode::try_new(
                    PlanNodeKind::Conjunction,
                    components,
                    target.modifiers().clone(),
                )
                .map(Some),
            }
        }
        _ => Ok(None),
    }
}
