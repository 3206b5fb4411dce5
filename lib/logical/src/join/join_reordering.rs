use crate::join::JoinOrderPlanner;
use crate::plan::{PlanNode, PlanNodeKind, PlanNodeRef};
use rdf_federation_model::{
    plan_err, NamedNodePattern, PlanResult, TermPattern, TriplePattern, VariableSet,
};

/// A [JoinOrderPlanner] that greedily builds left-deep join trees.
///
/// Planning is done in two steps:
/// - Identifying the connected components of the inputs (i.e., inputs that transitively share
///   variables).
/// - Reordering the elements of each connected component and combining the components via a
///   cartesian product. Components that only consist of optional nodes are left-joined to the
///   result instead.
///
/// Within a component, the planner starts with the cheapest node and then repeatedly joins the
/// cheapest node that shares a variable with the nodes joined so far. Nodes whose input variables
/// are not yet bound and optional nodes are deferred as long as possible.
#[derive(Debug, Default)]
pub struct GreedyJoinOrderPlanner;

impl GreedyJoinOrderPlanner {
    /// Creates a [GreedyJoinOrderPlanner].
    pub fn new() -> Self {
        Self
    }
}

impl JoinOrderPlanner for GreedyJoinOrderPlanner {
    fn plan_join_order(&self, nodes: Vec<PlanNodeRef>) -> PlanResult<PlanNodeRef> {
        if nodes.is_empty() {
            plan_err!("Cannot order the joins of an empty conjunction");
        }

        let (required, optional): (Vec<_>, Vec<_>) = identify_join_components(nodes)?
            .0
            .into_iter()
            .partition(|component| !component.is_optional());
        if required.is_empty() {
            return combine_components(optional);
        }

        // Optional components share no variable with the rest and are left-joined to the result.
        let mut plan = combine_components(required)?;
        for node in optional.into_iter().flat_map(|component| component.0) {
            plan = PlanNode::join(plan, node)?;
        }
        Ok(plan)
    }
}

/// Reorders every component and combines the results via a cartesian product.
fn combine_components(components: Vec<ConnectedJoinComponent>) -> PlanResult<PlanNodeRef> {
    let mut components = components
        .into_iter()
        .map(greedy_reorder_component)
        .collect::<PlanResult<Vec<_>>>()?;

    if components.len() == 1 {
        if let Some(component) = components.pop() {
            return Ok(component);
        }
    }
    PlanNode::cartesian_product(components)
}

/// Represents a set of [ConnectedJoinComponent] that share no variables.
#[derive(Clone, Debug)]
struct JoinComponents(Vec<ConnectedJoinComponent>);

/// Represents a single connected join component.
///
/// Within a connected join component, the individual parts share variables with each other. Iff
/// two parts are part of the join component, they either share a variable directly or they share
/// a variable with another part of the component that then (transitively) shares a variable with
/// the other part.
#[derive(Clone, Debug)]
struct ConnectedJoinComponent(Vec<PlanNodeRef>, VariableSet);

impl ConnectedJoinComponent {
    fn is_optional(&self) -> bool {
        self.0.iter().all(|node| node.is_optional())
    }
}

/// Identifies the connected components of `nodes`.
fn identify_join_components(nodes: Vec<PlanNodeRef>) -> PlanResult<JoinComponents> {
    let mut components = nodes
        .into_iter()
        .map(|node| {
            let variables = node.public_variables().clone();
            ConnectedJoinComponent(vec![node], variables)
        })
        .collect::<Vec<_>>();

    // Merge components until all are pair-wise disjoint
    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..components.len() {
            let (left, right) = components.split_at_mut(i + 1);
            for right_element in right.iter_mut() {
                if !left[i].1.is_disjoint(&right_element.1) {
                    left[i].0.append(&mut right_element.0);
                    left[i].1.union_with(&right_element.1)?;
                    right_element.1.clear();
                    changed = true;
                }
            }
        }
    }

    // Clean-up empty components
    components.retain(|component| !component.0.is_empty());

    Ok(JoinComponents(components))
}

/// Greedy reordering for a single connected component.
fn greedy_reorder_component(component: ConnectedJoinComponent) -> PlanResult<PlanNodeRef> {
    let mut to_order = component.0;
    let Some(first) = to_order.first() else {
        plan_err!("A join component must not be empty");
    };
    let mut bound = first.universe().empty_variables();

    let first_idx = cheapest(&to_order, |n| !n.is_optional() && n.input_variables().is_empty())
        .or_else(|| cheapest(&to_order, |n| !n.is_optional()))
        .or_else(|| cheapest(&to_order, |_| true))
        .unwrap_or(0);
    let mut current_plan = to_order.remove(first_idx);
    bound.union_with(current_plan.public_variables())?;

    while !to_order.is_empty() {
        let connected = |n: &PlanNode| !n.public_variables().is_disjoint(&bound);
        let satisfied = |n: &PlanNode| n.input_variables().is_subset(&bound);

        let next_idx = cheapest(&to_order, |n| connected(n) && satisfied(n) && !n.is_optional())
            .or_else(|| cheapest(&to_order, |n| connected(n) && satisfied(n)))
            .or_else(|| cheapest(&to_order, connected))
            .or_else(|| cheapest(&to_order, |_| true))
            .unwrap_or(0);
        let next = to_order.remove(next_idx);
        bound.union_with(next.public_variables())?;
        current_plan = PlanNode::join(current_plan, next)?;
    }

    Ok(current_plan)
}

/// Returns the index of the cheapest node that satisfies `predicate`.
fn cheapest(nodes: &[PlanNodeRef], predicate: impl Fn(&PlanNode) -> bool) -> Option<usize> {
    nodes
        .iter()
        .enumerate()
        .filter(|(_, node)| predicate(node))
        .min_by_key(|(_, node)| estimate_cost(node))
        .map(|(i, _)| i)
}

/// Estimates the cost of evaluating a plan.
///
/// "Cost" is here an abstract metric where a higher cost incurs a higher cost for computing the
/// result. While this is loosely tied to cardinality estimation, the planner does not use any
/// statistics and relies on heuristics to estimate the cost.
pub fn estimate_cost(node: &PlanNode) -> usize {
    let cost = match node.kind() {
        PlanNodeKind::Query { query, .. } | PlanNodeKind::UnassignedQuery { query } => query
            .triples()
            .iter()
            .map(estimate_triple_cardinality)
            .min()
            .unwrap_or(1),
        PlanNodeKind::Join | PlanNodeKind::Conjunction => node
            .children()
            .iter()
            .map(|child| (estimate_cost(child), child))
            .reduce(|(lhs_cost, lhs), (rhs_cost, rhs)| {
                (estimate_join_cost(lhs_cost, lhs, rhs_cost, rhs), rhs)
            })
            .map_or(0, |(cost, _)| cost),
        PlanNodeKind::Union => node
            .children()
            .iter()
            .map(|child| estimate_cost(child))
            .fold(0, usize::saturating_add),
        PlanNodeKind::CartesianProduct => node
            .children()
            .iter()
            .map(|child| estimate_cost(child))
            .fold(1, usize::saturating_mul),
        PlanNodeKind::Pipe => node.children().first().map_or(0, |c| estimate_cost(c)),
        PlanNodeKind::Empty { .. } => 0,
    };

    match node.modifiers().limit() {
        Some(limit) => cost.min(limit),
        None => cost,
    }
}

/// Estimates the cost of the join.
///
/// This uses the heuristics from Oxigraph's join reordering.
fn estimate_join_cost(lhs_cost: usize, lhs: &PlanNode, rhs_cost: usize, rhs: &PlanNode) -> usize {
    let number_of_common_vars = lhs
        .public_variables()
        .iter()
        .filter(|v| rhs.public_variables().contains(v))
        .count();
    let number_of_common_vars = u32::try_from(number_of_common_vars).unwrap_or(u32::MAX);
    lhs_cost
        .saturating_mul(rhs_cost)
        .saturating_div(1_000_usize.saturating_pow(number_of_common_vars))
}

/// Estimates the cardinality of a single triple pattern.
///
/// This uses the heuristics from Oxigraph's join reordering.
pub fn estimate_triple_cardinality(triple: &TriplePattern) -> usize {
    let subject_bound = matches!(
        &triple.subject,
        TermPattern::NamedNode(_) | TermPattern::Literal(_)
    );
    let predicate_bound = matches!(&triple.predicate, NamedNodePattern::NamedNode(_));
    let object_bound = matches!(
        &triple.object,
        TermPattern::NamedNode(_) | TermPattern::Literal(_)
    );

    match (subject_bound, predicate_bound, object_bound) {
        (true, true, true) => 1,
        (true, true, false) => 10,
        (true, false, true) => 2,
        (false, true, true) => 10_000,
        (true, false, false) => 100,
        (false, false, false) => 1_000_000_000,
        (false, true, false) => 1_000_000,
        (false, false, true) => 100_000,
    }
}
