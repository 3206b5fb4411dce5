use crate::test_utils::{agglutinate, alternative, explain, source, triple};
use rdf_federation_common::{AgglutinationStrategy, PlannerOptions, SequentialParallelFor};
use rdf_federation_engine::{create_agglutinator, MatchResult};
use rdf_federation_model::{PlanResult, PlanningError, Query};
use std::sync::Arc;

#[test]
fn every_group_and_triple_becomes_a_leaf() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let t3 = triple("z", "r", "w");
    let query = Query::new([t1.clone(), t2.clone(), t3.clone()]);
    let results = vec![
        MatchResult::builder(query.clone(), source("A"))
            .add_exclusive_group([t1.clone(), t2.clone()])?
            .add_non_exclusive(&t3)?
            .build()?,
        MatchResult::builder(query.clone(), source("B"))
            .add_non_exclusive(&t2)?
            .add_non_exclusive(&t3)?
            .build()?,
    ];

    let leaves = agglutinate(&query, results, AgglutinationStrategy::Simple)?;

    insta::assert_snapshot!(explain(&leaves), @r"
    Query[A]: ?x <http://ex/p> ?y . ?y <http://ex/q> ?z
    Query[A]: ?z <http://ex/r> ?w
    Query[B]: ?y <http://ex/q> ?z
    Query[B]: ?z <http://ex/r> ?w
    ");
    Ok(())
}

#[test]
fn exclusive_triples_are_not_grouped() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let query = Query::new([t1.clone(), t2.clone()]);
    let results = vec![MatchResult::builder(query.clone(), source("A"))
        .add_non_exclusive(&t1)?
        .add_non_exclusive(&t2)?
        .build()?];

    let simple = agglutinate(&query, results.clone(), AgglutinationStrategy::Simple)?;
    let merging = agglutinate(&query, results, AgglutinationStrategy::Merging)?;

    assert_eq!(simple.len(), 2);
    assert_eq!(merging.len(), 1);
    Ok(())
}

#[test]
fn alternatives_become_union() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let query = Query::new([t1.clone()]);
    let results = vec![MatchResult::builder(query.clone(), source("A"))
        .add_non_exclusive(&t1)?
        .add_triple_alternatives(&t1, [alternative(&query, triple("x", "p1", "y"), &t1)])?
        .build()?];

    let leaves = agglutinate(&query, results, AgglutinationStrategy::Simple)?;

    insta::assert_snapshot!(explain(&leaves), @r"
    Union
      Query[A]: ?x <http://ex/p> ?y
      Query[A]: ?x <http://ex/p1> ?y
    ");
    Ok(())
}

#[test]
fn sources_without_result_contribute_no_leaves() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let query = Query::new([t1.clone()]);
    let options = PlannerOptions::default()
        .with_agglutination(AgglutinationStrategy::Simple)
        .with_verify(true);
    let agglutinator = create_agglutinator(&query, 3, &options, Arc::new(SequentialParallelFor));

    agglutinator.add_match(
        1,
        MatchResult::builder(query.clone(), source("B"))
            .add_non_exclusive(&t1)?
            .build()?,
    )?;
    let leaves = agglutinator.finalize()?;

    insta::assert_snapshot!(explain(&leaves), @"Query[B]: ?x <http://ex/p> ?y");
    Ok(())
}

#[test]
fn duplicate_match_is_rejected() -> PlanResult<()> {
    let query = Query::new([triple("x", "p", "y")]);
    let options = PlannerOptions::default().with_agglutination(AgglutinationStrategy::Simple);
    let agglutinator = create_agglutinator(&query, 1, &options, Arc::new(SequentialParallelFor));

    agglutinator.add_match(0, MatchResult::empty(query.clone(), source("A")))?;
    let result = agglutinator.add_match(0, MatchResult::empty(query.clone(), source("A")));

    assert!(matches!(result, Err(PlanningError::DuplicateMatch(name)) if name == "A"));
    Ok(())
}
