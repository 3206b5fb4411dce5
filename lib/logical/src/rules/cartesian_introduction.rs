use crate::plan::{transform_up, LockedNodes, PlanNode, PlanNodeKind, PlanNodeRef};
use crate::rules::PlanRewriteRule;
use rdf_federation_model::{triple_variables, PlanResult, Query, Variable};
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Splits query leaves whose triples form multiple connected components into a cartesian
/// product of one leaf per component.
///
/// Two triples are connected if they share a variable. Filters and value bindings are moved to
/// the single component that mentions all of their variables. If there is no such component,
/// they remain on the cartesian product, together with all other modifiers of the leaf.
#[derive(Debug, Default)]
pub struct CartesianIntroductionRule;

impl CartesianIntroductionRule {
    /// Creates a new [CartesianIntroductionRule].
    pub fn new() -> Self {
        Self
    }
}

impl PlanRewriteRule for CartesianIntroductionRule {
    fn name(&self) -> &str {
        "cartesian-introduction"
    }

    fn rewrite(&self, plan: &PlanNodeRef, locked: &LockedNodes) -> PlanResult<PlanNodeRef> {
        transform_up(plan, locked, &mut split_query)
    }
}

fn split_query(node: &PlanNodeRef) -> PlanResult<PlanNodeRef> {
    let Some(query) = node.as_query() else {
        return Ok(Arc::clone(node));
    };

    let components = query.connected_components();
    if components.len() < 2 {
        return Ok(Arc::clone(node));
    }

    let component_variables = components
        .iter()
        .map(|triples| {
            triples
                .iter()
                .flat_map(triple_variables)
                .collect::<FxHashSet<_>>()
        })
        .collect::<Vec<_>>();
    let covering_component = |variables: &[Variable]| {
        if variables.is_empty() {
            return None;
        }
        component_variables
            .iter()
            .position(|vars| variables.iter().all(|v| vars.contains(v)))
    };

    let mut parts = components
        .iter()
        .map(|triples| query.restrict(triples))
        .collect::<PlanResult<Vec<Query>>>()?;

    let mut modifiers = query.modifiers().clone();
    for filter in modifiers.take_filters() {
        match covering_component(filter.variables()) {
            Some(i) => {
                parts[i].add_filter(filter);
            }
            None => {
                modifiers.add_filter(filter);
            }
        }
    }
    if let Some(values) = modifiers.take_values() {
        match covering_component(values.variables()) {
            Some(i) => parts[i].modifiers_mut().set_values(Some(values)),
            None => modifiers.set_values(Some(values)),
        }
    }

    tracing::debug!(
        node = %node.id(),
        components = parts.len(),
        "Introduced cartesian product"
    );
    let children = parts
        .into_iter()
        .map(|part| node.with_query(part))
        .collect::<PlanResult<Vec<_>>>()?;
    PlanNode::try_new(PlanNodeKind::CartesianProduct, children, modifiers)
}
