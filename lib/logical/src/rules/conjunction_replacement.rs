use crate::join::JoinOrderPlanner;
use crate::plan::{transform_up, LockedNodes, PlanNode, PlanNodeKind, PlanNodeRef};
use crate::rules::PlanRewriteRule;
use rdf_federation_model::{PlanResult, SparqlFilter};
use std::sync::Arc;

/// Replaces every conjunction with a tree of joins and cartesian products.
///
/// The order of the joins is decided by a [JoinOrderPlanner]. Afterward, the filters of the
/// conjunction are attached to the deepest join (or cartesian product) that binds all variables
/// of the filter. All other modifiers are attached to the root of the new tree. If the root is
/// locked, a pipe is introduced that carries the modifiers.
#[derive(Debug)]
pub struct ConjunctionReplacementRule {
    planner: Arc<dyn JoinOrderPlanner>,
}

impl ConjunctionReplacementRule {
    /// Creates a new [ConjunctionReplacementRule].
    pub fn new(planner: Arc<dyn JoinOrderPlanner>) -> Self {
        Self { planner }
    }

    fn replace_conjunction(
        &self,
        node: &PlanNodeRef,
        locked: &LockedNodes,
    ) -> PlanResult<PlanNodeRef> {
        if !matches!(node.kind(), PlanNodeKind::Conjunction) {
            return Ok(Arc::clone(node));
        }

        let inputs = node.children();
        let mut modifiers = node.modifiers().clone();
        let mut tree = self.planner.plan_join_order(inputs.to_vec())?;
        tracing::debug!(
            conjunction = %node.id(),
            inputs = inputs.len(),
            "Replaced conjunction with join tree"
        );

        // A single input is never restructured. Its filters are handled with the other modifiers.
        if !is_input(inputs, &tree) {
            for filter in modifiers.take_filters() {
                tree = place_filter(&tree, filter, inputs)?;
            }
        }

        if modifiers.is_empty() {
            return Ok(tree);
        }
        if is_input(inputs, &tree) {
            return if tree.modifiers().is_empty() && !locked.contains(&tree) {
                tree.with_modifiers(modifiers)
            } else {
                PlanNode::pipe(tree, modifiers)
            };
        }

        for filter in tree.modifiers().filters() {
            modifiers.add_filter(filter.clone());
        }
        tree.with_modifiers(modifiers)
    }
}

impl PlanRewriteRule for ConjunctionReplacementRule {
    fn name(&self) -> &str {
        "conjunction-replacement"
    }

    fn rewrite(&self, plan: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
        let result = transform_up(plan, locked, &mut |node| {
            self.replace_conjunction(node, locked)
        })?;
        warn_locked_conjunctions(&result, locked);
        Ok(result)
    }
}

fn is_input(inputs: &[PlanNodeRef], node: &PlanNodeRef) -> bool {
    inputs.iter().any(|input| Arc::ptr_eq(input, node))
}

/// Attaches `filter` to the deepest join or cartesian product in `tree` that binds every variable
/// of the filter. The inputs of the join tree are never modified.
fn place_filter(
    tree: &PlanNodeRef,
    filter: SparqlFilter,
    inputs: &[PlanNodeRef],
) -> PlanResult<PlanNodeRef> {
    let target = tree.children().iter().position(|child| {
        !is_input(inputs, child)
            && !child.is_optional()
            && matches!(
                child.kind(),
                PlanNodeKind::Join | PlanNodeKind::CartesianProduct
            )
            && filter.is_covered_by(child.bound_variables())
    });

    match target {
        Some(index) => {
            let mut children = tree.children().to_vec();
            children[index] = place_filter(&children[index], filter, inputs)?;
            tree.with_children(children)
        }
        None => tree.with_added_filter(filter),
    }
}

fn warn_locked_conjunctions(node: &PlanNode, locked: &LockedNodes) {
    if matches!(node.kind(), PlanNodeKind::Conjunction) && locked.contains(node) {
        tracing::warn!(
            node = %node.id(),
            "Locked conjunction cannot be replaced with a join tree"
        );
    }
    for child in node.children() {
        warn_locked_conjunctions(child, locked);
    }
}
