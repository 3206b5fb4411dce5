use crate::test_utils::{cartesian_source, leaf, source, triple};
use proptest::prelude::*;
use rdf_federation_logical::plan::{LockedNodes, PlanNode, PlanNodeRef};
use rdf_federation_logical::rules::{FlattenRule, PlanRewriteRule};
use rdf_federation_model::{Modifiers, PlanResult, Query, SourceRef};
use std::sync::Arc;

#[test]
fn connected_same_source_leaves_are_merged() -> PlanResult<()> {
    let triples = [
        triple("x", "p", "y"),
        triple("y", "q", "z"),
        triple("z", "r", "w"),
    ];
    let root = Query::new(triples.clone());
    let a = source("A");
    let plan = PlanNode::conjunction(
        triples
            .iter()
            .map(|t| leaf(&root, &[t.clone()], &a))
            .collect(),
    )?;

    let result = FlattenRule::new().rewrite(&plan, &LockedNodes::new())?;

    insta::assert_snapshot!(result, @"Query[A]: ?x <http://ex/p> ?y . ?y <http://ex/q> ?z . ?z <http://ex/r> ?w");
    Ok(())
}

#[test]
fn disconnected_leaves_require_cartesian_support() -> PlanResult<()> {
    let lhs = triple("x", "p", "y");
    let rhs = triple("a", "q", "b");
    let root = Query::new([lhs.clone(), rhs.clone()]);

    let a = source("A");
    let plan = PlanNode::conjunction(vec![
        leaf(&root, &[lhs.clone()], &a),
        leaf(&root, &[rhs.clone()], &a),
    ])?;
    let result = FlattenRule::new().rewrite(&plan, &LockedNodes::new())?;
    assert!(Arc::ptr_eq(&plan, &result));

    let b = cartesian_source("B");
    let plan = PlanNode::conjunction(vec![leaf(&root, &[lhs], &b), leaf(&root, &[rhs], &b)])?;
    let result = FlattenRule::new().rewrite(&plan, &LockedNodes::new())?;
    insta::assert_snapshot!(result, @"Query[B]: ?x <http://ex/p> ?y . ?a <http://ex/q> ?b");
    Ok(())
}

#[test]
fn locked_leaves_are_not_merged() -> PlanResult<()> {
    let lhs = triple("x", "p", "y");
    let rhs = triple("y", "q", "z");
    let root = Query::new([lhs.clone(), rhs.clone()]);
    let a = source("A");
    let locked_leaf = leaf(&root, &[lhs], &a);
    let plan = PlanNode::conjunction(vec![Arc::clone(&locked_leaf), leaf(&root, &[rhs], &a)])?;

    let mut locked = LockedNodes::new();
    locked.lock(&locked_leaf);
    let result = FlattenRule::new().rewrite(&plan, &locked)?;

    assert!(Arc::ptr_eq(&plan, &result));
    Ok(())
}

#[test]
fn nested_conjunctions_are_spliced() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let t3 = triple("z", "r", "w");
    let root = Query::new([t1.clone(), t2.clone(), t3.clone()]);
    let (a, b, c) = (source("A"), source("B"), source("C"));
    let inner = PlanNode::conjunction(vec![leaf(&root, &[t2], &b), leaf(&root, &[t3], &c)])?;
    let plan = PlanNode::conjunction(vec![leaf(&root, &[t1], &a), inner])?;

    let result = FlattenRule::new().rewrite(&plan, &LockedNodes::new())?;

    insta::assert_snapshot!(result, @r"
    Conjunction
      Query[A]: ?x <http://ex/p> ?y
      Query[B]: ?y <http://ex/q> ?z
      Query[C]: ?z <http://ex/r> ?w
    ");
    Ok(())
}

#[test]
fn empty_branches_are_removed() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let universe = root.universe();
    let empty = PlanNode::empty(
        universe.clone(),
        universe.empty_triples(),
        universe.empty_variables(),
    )?;
    let union = PlanNode::union(vec![leaf(&root, &[t1.clone()], &source("A")), Arc::clone(&empty)])?;
    let result = FlattenRule::new().rewrite(&union, &LockedNodes::new())?;
    insta::assert_snapshot!(result, @"Query[A]: ?x <http://ex/p> ?y");

    let conjunction = PlanNode::conjunction(vec![leaf(&root, &[t2], &source("B")), empty])?;
    let result = FlattenRule::new().rewrite(&conjunction, &LockedNodes::new())?;
    insta::assert_snapshot!(result, @"Empty (?y ?z)");
    Ok(())
}

#[test]
fn optional_node_with_empty_child_is_kept() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let universe = root.universe();
    let empty = PlanNode::empty(
        universe.clone(),
        universe.empty_triples(),
        universe.empty_variables(),
    )?;
    let mut optional = Modifiers::new();
    optional.set_optional(true);
    let optional = PlanNode::conjunction(vec![empty, leaf(&root, &[t2], &source("B"))])?
        .with_modifiers(optional)?;
    let plan = PlanNode::join(leaf(&root, &[t1], &source("A")), optional)?;

    let result = FlattenRule::new().rewrite(&plan, &LockedNodes::new())?;

    assert!(Arc::ptr_eq(&plan, &result));
    assert!(result.children()[1].is_optional());
    Ok(())
}

#[test]
fn optional_union_of_empty_branches_is_kept() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let root = Query::new([t1.clone()]);
    let universe = root.universe();
    let empty = PlanNode::empty(
        universe.clone(),
        universe.empty_triples(),
        universe.empty_variables(),
    )?;
    let mut optional = Modifiers::new();
    optional.set_optional(true);
    let union = PlanNode::union(vec![Arc::clone(&empty), empty])?.with_modifiers(optional)?;
    let plan = PlanNode::join(leaf(&root, &[t1], &source("A")), union)?;

    let result = FlattenRule::new().rewrite(&plan, &LockedNodes::new())?;

    assert!(!result.is_empty_node());
    assert!(result.children()[1].is_optional());
    Ok(())
}

#[test]
fn single_child_receives_modifiers() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let root = Query::new([t1.clone()]);
    let mut modifiers = Modifiers::new();
    modifiers.set_distinct(true);
    let plan = PlanNode::conjunction(vec![leaf(&root, &[t1], &source("A"))])?
        .with_modifiers(modifiers)?;

    let result = FlattenRule::new().rewrite(&plan, &LockedNodes::new())?;

    insta::assert_snapshot!(result, @"Query[A]: ?x <http://ex/p> ?y [DISTINCT]");
    Ok(())
}

#[test]
fn single_locked_child_is_wrapped_into_pipe() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let root = Query::new([t1.clone()]);
    let child = leaf(&root, &[t1], &source("A"));
    let mut modifiers = Modifiers::new();
    modifiers.set_distinct(true);
    let plan = PlanNode::union(vec![Arc::clone(&child)])?.with_modifiers(modifiers)?;
    let mut locked = LockedNodes::new();
    locked.lock(&child);

    let result = FlattenRule::new().rewrite(&plan, &locked)?;

    insta::assert_snapshot!(result, @r"
    Pipe [DISTINCT]
      Query[A]: ?x <http://ex/p> ?y
    ");
    assert!(Arc::ptr_eq(&result.children()[0], &child));
    Ok(())
}

/// The shape of a randomly generated plan.
#[derive(Clone, Debug)]
enum Shape {
    Leaf(usize, usize),
    Empty,
    Union(Vec<Shape>),
    Conjunction(Vec<Shape>),
    CartesianProduct(Vec<Shape>),
}

fn shape_strategy() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        4 => (0..4usize, 0..3usize).prop_map(|(t, s)| Shape::Leaf(t, s)),
        1 => Just(Shape::Empty),
    ];
    leaf.prop_recursive(4, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4).prop_map(Shape::Union),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Shape::Conjunction),
            prop::collection::vec(inner, 1..4).prop_map(Shape::CartesianProduct),
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
    match shape {
        Shape::Leaf(triple, source) => leaf(
            root,
            &[root.triples()[*triple].clone()],
            &sources[*source],
        ),
        Shape::Empty => {
            let universe = root.universe();
            PlanNode::empty(
                universe.clone(),
                universe.empty_triples(),
                universe.empty_variables(),
            )
            .unwrap()
        }
        Shape::Union(shapes) => PlanNode::union(children(shapes)).unwrap(),
        Shape::Conjunction(shapes) => PlanNode::conjunction(children(shapes)).unwrap(),
        Shape::CartesianProduct(shapes) => {
            PlanNode::cartesian_product(children(shapes)).unwrap()
        }
    }
}

proptest! {
    #[test]
    fn flatten_is_idempotent(shape in shape_strategy()) {
        let root = Query::new([
            triple("x", "p", "y"),
            triple("y", "q", "z"),
            triple("z", "r", "w"),
            triple("a", "s", "b"),
        ]);
        let sources = [source("A"), source("B"), cartesian_source("C")];
        let plan = build(&shape, &root, &sources);
        let rule = FlattenRule::new();
        let locked = LockedNodes::new();

        let once = rule.rewrite(&plan, &locked).unwrap();
        let twice = rule.rewrite(&once, &locked).unwrap();

        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.matched_triples(), plan.matched_triples());
    }
}
