use crate::test_utils::{alice_filter, leaf, source, triple};
use rdf_federation_common::OptimizationLevel;
use rdf_federation_logical::plan::{LockedNodes, PlanNode, PlanNodeKind};
use rdf_federation_logical::{verify_plan, PlanRewriter};
use rdf_federation_model::{Modifiers, PlanResult, PlanningError, Query};
use std::sync::Arc;

#[test]
fn disconnected_query_becomes_cartesian_product() -> PlanResult<()> {
    let lhs = triple("x", "p", "y");
    let rhs = triple("a", "q", "b");
    let root = Query::new([lhs.clone(), rhs.clone()]);
    let plan = PlanNode::conjunction(vec![leaf(&root, &[lhs, rhs], &source("A"))])?;

    let result = PlanRewriter::new(OptimizationLevel::Full).rewrite(&plan, &LockedNodes::new())?;

    insta::assert_snapshot!(result, @r"
    CartesianProduct
      Query[A]: ?x <http://ex/p> ?y
      Query[A]: ?a <http://ex/q> ?b
    ");
    Ok(())
}

#[test]
fn free_query_is_distributed_into_union() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let t3 = triple("y", "r", "z");
    let root = Query::new([t1.clone(), t2.clone(), t3.clone()]);
    let a = source("A");
    let plan = PlanNode::conjunction(vec![
        leaf(&root, &[t1], &a),
        PlanNode::union(vec![leaf(&root, &[t2], &a), leaf(&root, &[t3], &a)])?,
    ])?;

    let result = PlanRewriter::new(OptimizationLevel::Full).rewrite(&plan, &LockedNodes::new())?;

    insta::assert_snapshot!(result, @r"
    Union
      Query[A]: ?x <http://ex/p> ?y . ?y <http://ex/q> ?z
      Query[A]: ?x <http://ex/p> ?y . ?y <http://ex/r> ?z
    ");
    verify_plan(&result)?;
    Ok(())
}

#[test]
fn leaves_of_different_sources_are_joined() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let plan = PlanNode::conjunction(vec![
        leaf(&root, &[t1], &source("A")),
        leaf(&root, &[t2], &source("B")),
    ])?;

    let result = PlanRewriter::new(OptimizationLevel::Full).rewrite(&plan, &LockedNodes::new())?;

    insta::assert_snapshot!(result, @r"
    Join
      Query[A]: ?x <http://ex/p> ?y
      Query[B]: ?y <http://ex/q> ?z
    ");
    verify_plan(&result)?;
    Ok(())
}

#[test]
fn filters_are_pushed_to_binding_leaf() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let plan = PlanNode::conjunction(vec![
        leaf(&root, &[t1], &source("A")),
        leaf(&root, &[t2], &source("B")),
    ])?
    .with_added_filter(alice_filter("x"))?;

    let result = PlanRewriter::new(OptimizationLevel::Full).rewrite(&plan, &LockedNodes::new())?;

    assert!(matches!(result.kind(), PlanNodeKind::Join));
    assert!(result.modifiers().filters().is_empty());
    assert_eq!(result.children()[0].modifiers().filters().len(), 1);
    assert!(result.children()[1].modifiers().filters().is_empty());
    Ok(())
}

#[test]
fn locked_leaf_receives_filter_through_pipe() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let locked_leaf = leaf(&root, &[t1], &source("A"));
    let plan = PlanNode::conjunction(vec![
        Arc::clone(&locked_leaf),
        leaf(&root, &[t2], &source("B")),
    ])?
    .with_added_filter(alice_filter("x"))?;
    let mut locked = LockedNodes::new();
    locked.lock(&locked_leaf);

    let result = PlanRewriter::new(OptimizationLevel::Full).rewrite(&plan, &locked)?;

    let pipe = &result.children()[0];
    assert!(matches!(pipe.kind(), PlanNodeKind::Pipe));
    assert_eq!(pipe.modifiers().filters().len(), 1);
    assert!(Arc::ptr_eq(&pipe.children()[0], &locked_leaf));
    assert!(locked_leaf.modifiers().is_empty());
    Ok(())
}

#[test]
fn distinct_union_marks_leaves_distinct() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let root = Query::new([t1.clone()]);
    let mut modifiers = Modifiers::new();
    modifiers.set_distinct(true);
    let plan = PlanNode::union(vec![
        leaf(&root, &[t1.clone()], &source("A")),
        leaf(&root, &[t1], &source("B")),
    ])?
    .with_modifiers(modifiers)?;

    let result = PlanRewriter::new(OptimizationLevel::Full).rewrite(&plan, &LockedNodes::new())?;

    insta::assert_snapshot!(result, @r"
    Union [DISTINCT]
      Query[A]: ?x <http://ex/p> ?y [DISTINCT]
      Query[B]: ?x <http://ex/p> ?y [DISTINCT]
    ");
    Ok(())
}

#[test]
fn no_optimization_only_orders_joins() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let a = source("A");
    let plan = PlanNode::conjunction(vec![leaf(&root, &[t1], &a), leaf(&root, &[t2], &a)])?;

    let rewriter = PlanRewriter::new(OptimizationLevel::None);
    let result = rewriter.rewrite(&plan, &LockedNodes::new())?;

    assert_eq!(rewriter.rules().len(), 1);
    insta::assert_snapshot!(result, @r"
    Join
      Query[A]: ?x <http://ex/p> ?y
      Query[A]: ?y <http://ex/q> ?z
    ");
    Ok(())
}

#[test]
fn locked_conjunction_is_rejected() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let root = Query::new([t1.clone(), t2.clone()]);
    let plan = PlanNode::conjunction(vec![
        leaf(&root, &[t1], &source("A")),
        leaf(&root, &[t2], &source("B")),
    ])?;
    let mut locked = LockedNodes::new();
    locked.lock(&plan);

    let result = PlanRewriter::new(OptimizationLevel::Full).rewrite(&plan, &locked);

    assert!(matches!(
        result,
        Err(PlanningError::UnorderedConjunction(id)) if id == plan.id().as_u64()
    ));
    Ok(())
}
