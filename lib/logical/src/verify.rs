use crate::plan::{NodeId, PlanNode};
use rdf_federation_model::{internal_err, PlanResult, QueryUniverse};

/// Checks the structural invariants of a plan.
///
/// - Every node shares the universe of the root.
/// - No node appears twice on a path from the root to a leaf.
/// - The matched triples of every node are a subset of the matched triples of its parent.
///
/// # Errors
///
/// Returns [PlanningError::Internal](rdf_federation_model::PlanningError::Internal) if an
/// invariant is violated.
pub fn verify_plan(plan: &PlanNode) -> PlanResult<()> {
    let mut path = Vec::new();
    verify_node(plan, plan.universe(), &mut path)
}

fn verify_node(
    node: &PlanNode,
    universe: &QueryUniverse,
    path: &mut Vec<NodeId>,
) -> PlanResult<()> {
    if !node.universe().is_same(universe) {
        internal_err!("Node {} does not share the universe of the plan", node.id());
    }
    if path.contains(&node.id()) {
        internal_err!("Node {} is its own ancestor", node.id());
    }

    path.push(node.id());
    for child in node.children() {
        if !child.matched_triples().is_subset(node.matched_triples()) {
            internal_err!(
                "Matched triples of node {} are not a subset of its parent {}",
                child.id(),
                node.id()
            );
        }
        verify_node(child, universe, path)?;
    }
    path.pop();
    Ok(())
}
