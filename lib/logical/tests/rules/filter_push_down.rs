use crate::test_utils::{alice_filter, leaf, source, triple};
use proptest::prelude::*;
use rdf_federation_logical::plan::{LockedNodes, PlanNode, PlanNodeRef};
use rdf_federation_logical::rules::{FilterPushDownRule, PlanRewriteRule};
use rdf_federation_model::{Modifiers, PlanResult, Query, SourceRef};
use std::sync::Arc;

fn limited(node: &PlanNodeRef, limit: usize) -> PlanResult<PlanNodeRef> {
    let mut modifiers = node.modifiers().clone();
    modifiers.set_limit(Some(limit));
    node.with_modifiers(modifiers)
}

#[test]
fn filter_is_not_pushed_below_limit() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let root = Query::new([t1.clone()]);
    let plan = PlanNode::union(vec![
        limited(&leaf(&root, &[t1.clone()], &source("A")), 10)?,
        limited(&leaf(&root, &[t1], &source("B")), 10)?,
    ])?
    .with_added_filter(alice_filter("x"))?;

    let result = FilterPushDownRule::new().rewrite(&plan, &LockedNodes::new())?;

    assert!(Arc::ptr_eq(&plan, &result));
    Ok(())
}

#[test]
fn filter_is_pushed_next_to_limited_sibling() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("x", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let plan = PlanNode::conjunction(vec![
        limited(&leaf(&root, &[t1], &source("A")), 10)?,
        leaf(&root, &[t2], &source("B")),
    ])?
    .with_added_filter(alice_filter("x"))?;

    let result = FilterPushDownRule::new().rewrite(&plan, &LockedNodes::new())?;

    assert!(result.modifiers().filters().is_empty());
    assert!(result.children()[0].modifiers().filters().is_empty());
    assert_eq!(result.children()[1].modifiers().filters().len(), 1);
    Ok(())
}

#[test]
fn filter_is_not_pushed_into_ask_query() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("x", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let mut ask = Modifiers::new();
    ask.set_ask(true);
    let plan = PlanNode::conjunction(vec![
        leaf(&root, &[t1], &source("A")).with_modifiers(ask)?,
        leaf(&root, &[t2], &source("B")),
    ])?
    .with_added_filter(alice_filter("x"))?;

    let result = FilterPushDownRule::new().rewrite(&plan, &LockedNodes::new())?;

    assert!(result.children()[0].modifiers().filters().is_empty());
    assert_eq!(result.children()[1].modifiers().filters().len(), 1);
    Ok(())
}

/// The shape of a randomly generated plan. Inner nodes may carry a filter on one of their
/// variables, selected by index.
#[derive(Clone, Debug)]
enum Shape {
    Leaf { triple: usize, source: usize, limit: bool },
    Union(Vec<Shape>, Option<usize>),
    Conjunction(Vec<Shape>, Option<usize>),
    CartesianProduct(Vec<Shape>, Option<usize>),
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = (0..4usize, 0..2usize, prop::bool::weighted(0.2)).prop_map(
        |(triple, source, limit)| Shape::Leaf {
            triple,
            source,
            limit,
        },
    );
    leaf.prop_recursive(4, 24, 4, |inner| {
        let children = prop::collection::vec(inner, 1..4);
        let filter = prop::option::of(0..4usize);
        prop_oneof![
            (children.clone(), filter.clone()).prop_map(|(c, f)| Shape::Union(c, f)),
            (children.clone(), filter.clone()).prop_map(|(c, f)| Shape::Conjunction(c, f)),
            (children, filter).prop_map(|(c, f)| Shape::CartesianProduct(c, f)),
        ]
    })
}

fn build(shape: &Shape, root: &Query, sources: &[SourceRef]) -> PlanNodeRef {
    let children = |shapes: &[Shape]| {
        shapes
            .iter()
            .map(|s| build(s, root, sources))
            .collect::<Vec<_>>()
    };
    let (node, filter) = match shape {
        Shape::Leaf {
            triple,
            source,
            limit,
        } => {
            let node = leaf(root, &[root.triples()[*triple].clone()], &sources[*source]);
            let node = if *limit { limited(&node, 5).unwrap() } else { node };
            (node, None)
        }
        Shape::Union(shapes, filter) => (PlanNode::union(children(shapes)).unwrap(), *filter),
        Shape::Conjunction(shapes, filter) => {
            (PlanNode::conjunction(children(shapes)).unwrap(), *filter)
        }
        Shape::CartesianProduct(shapes, filter) => (
            PlanNode::cartesian_product(children(shapes)).unwrap(),
            *filter,
        ),
    };

    let variables = node.public_variables().iter().collect::<Vec<_>>();
    match filter {
        Some(index) if !variables.is_empty() => {
            let variable = variables[index % variables.len()].as_str().to_owned();
            node.with_added_filter(alice_filter(&variable)).unwrap()
        }
        _ => node,
    }
}

fn collect_nodes(node: &PlanNodeRef, nodes: &mut Vec<PlanNodeRef>) {
    nodes.push(Arc::clone(node));
    for child in node.children() {
        collect_nodes(child, nodes);
    }
}

proptest! {
    #[test]
    fn filters_only_reference_public_variables(shape in shape_strategy()) {
        let root = Query::new([
            triple("x", "p", "y"),
            triple("y", "q", "z"),
            triple("z", "r", "w"),
            triple("a", "s", "b"),
        ]);
        let sources = [source("A"), source("B")];
        let plan = build(&shape, &root, &sources);

        let result = FilterPushDownRule::new().rewrite(&plan, &LockedNodes::new()).unwrap();

        let mut nodes = Vec::new();
        collect_nodes(&result, &mut nodes);
        for node in &nodes {
            for filter in node.modifiers().filters() {
                prop_assert!(
                    filter.is_covered_by(node.public_variables()),
                    "{filter} is not covered by node {}", node.id()
                );
            }
            if node.modifiers().limit().is_some() {
                prop_assert!(node.modifiers().filters().is_empty());
            }
        }
        prop_assert_eq!(result.matched_triples(), plan.matched_triples());
    }
}
