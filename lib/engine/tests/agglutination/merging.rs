use crate::test_utils::{
    agglutinate, alternative, cartesian_source, explain, iri, source, triple,
};
use proptest::prelude::*;
use rdf_federation_common::{
    AgglutinationStrategy, ParallelFor, PlannerOptions, RayonParallelFor,
};
use rdf_federation_engine::{create_agglutinator, MatchResult};
use rdf_federation_model::{
    PlanResult, PlanningError, Query, SourceRef, TriplePattern, Variable,
};
use std::sync::Arc;

#[test]
fn exclusive_and_non_exclusive_matches_of_same_triple() -> PlanResult<()> {
    let knows_alice = TriplePattern {
        subject: Variable::new_unchecked("x").into(),
        predicate: iri("knows").into(),
        object: iri("Alice").into(),
    };
    let query = Query::new([knows_alice.clone()]);
    let results = vec![
        MatchResult::builder(query.clone(), source("A"))
            .add_exclusive_group([knows_alice.clone()])?
            .build()?,
        MatchResult::builder(query.clone(), source("B"))
            .add_non_exclusive(&knows_alice)?
            .build()?,
    ];

    let leaves = agglutinate(&query, results, AgglutinationStrategy::Merging)?;

    insta::assert_snapshot!(explain(&leaves), @r"
    Query[A]: ?x <http://ex/knows> <http://ex/Alice>
    Query[B]: ?x <http://ex/knows> <http://ex/Alice>
    ");
    for leaf in &leaves {
        assert_eq!(leaf.matched_triples(), query.matched_triples());
    }
    Ok(())
}

#[test]
fn triples_of_a_single_source_become_one_group() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let query = Query::new([t1.clone(), t2.clone()]);
    let results = vec![
        MatchResult::builder(query.clone(), source("A"))
            .add_non_exclusive(&t1)?
            .add_non_exclusive(&t2)?
            .build()?,
        MatchResult::builder(query.clone(), source("B"))
            .add_non_exclusive(&t1)?
            .build()?,
    ];

    let leaves = agglutinate(&query, results, AgglutinationStrategy::Merging)?;

    insta::assert_snapshot!(explain(&leaves), @r"
    Query[A]: ?y <http://ex/q> ?z
    Query[A]: ?x <http://ex/p> ?y
    Query[B]: ?x <http://ex/p> ?y
    ");
    Ok(())
}

#[test]
fn single_ambiguous_triple_is_substituted() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let query = Query::new([t1.clone(), t2.clone()]);
    let alternatives = [
        alternative(&query, triple("y", "q1", "z"), &t2),
        alternative(&query, triple("y", "q2", "z"), &t2),
    ];
    let results = vec![MatchResult::builder(query.clone(), source("A"))
        .add_non_exclusive(&t1)?
        .add_non_exclusive(&t2)?
        .add_triple_alternatives(&t2, alternatives)?
        .build()?];

    let leaves = agglutinate(&query, results, AgglutinationStrategy::Merging)?;

    insta::assert_snapshot!(explain(&leaves), @r"
    Union
      Query[A]: ?x <http://ex/p> ?y . ?y <http://ex/q> ?z
      Query[A]: ?x <http://ex/p> ?y . ?y <http://ex/q1> ?z
      Query[A]: ?x <http://ex/p> ?y . ?y <http://ex/q2> ?z
    ");
    Ok(())
}

#[test]
fn ambiguous_triples_are_never_combined() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let t3 = triple("z", "r", "w");
    let query = Query::new([t1.clone(), t2.clone(), t3.clone()]);
    let results = vec![MatchResult::builder(query.clone(), source("A"))
        .add_non_exclusive(&t1)?
        .add_non_exclusive(&t2)?
        .add_non_exclusive(&t3)?
        .add_triple_alternatives(&t1, [alternative(&query, triple("x", "p1", "y"), &t1)])?
        .add_triple_alternatives(&t3, [alternative(&query, triple("z", "r1", "w"), &t3)])?
        .build()?];

    let leaves = agglutinate(&query, results, AgglutinationStrategy::Merging)?;

    insta::assert_snapshot!(explain(&leaves), @r"
    Union
      Query[A]: ?x <http://ex/p> ?y
      Query[A]: ?x <http://ex/p1> ?y
    Union
      Query[A]: ?z <http://ex/r> ?w
      Query[A]: ?z <http://ex/r1> ?w
    Query[A]: ?y <http://ex/q> ?z
    ");
    Ok(())
}

#[test]
fn connected_groups_of_a_source_are_merged() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("y", "q", "z");
    let query = Query::new([t1.clone(), t2.clone()]);
    let results = vec![MatchResult::builder(query.clone(), source("A"))
        .add_exclusive_group([t1])?
        .add_exclusive_group([t2])?
        .build()?];

    let leaves = agglutinate(&query, results, AgglutinationStrategy::Merging)?;

    insta::assert_snapshot!(explain(&leaves), @"Query[A]: ?x <http://ex/p> ?y . ?y <http://ex/q> ?z");
    Ok(())
}

#[test]
fn disconnected_groups_require_cartesian_support() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let t2 = triple("a", "q", "b");
    let query = Query::new([t1.clone(), t2.clone()]);
    let groups = |source: SourceRef| -> PlanResult<MatchResult> {
        MatchResult::builder(query.clone(), source)
            .add_exclusive_group([t1.clone()])?
            .add_exclusive_group([t2.clone()])?
            .build()
    };

    let plain = agglutinate(&query, vec![groups(source("A"))?], AgglutinationStrategy::Merging)?;
    let cartesian = agglutinate(
        &query,
        vec![groups(cartesian_source("B"))?],
        AgglutinationStrategy::Merging,
    )?;

    insta::assert_snapshot!(explain(&plain), @r"
    Query[A]: ?x <http://ex/p> ?y
    Query[A]: ?a <http://ex/q> ?b
    ");
    insta::assert_snapshot!(explain(&cartesian), @"Query[B]: ?x <http://ex/p> ?y . ?a <http://ex/q> ?b");
    Ok(())
}

#[test]
fn group_alternatives_become_union() -> PlanResult<()> {
    let t1 = triple("x", "p", "y");
    let query = Query::new([t1.clone()]);
    let results = vec![MatchResult::builder(query.clone(), source("A"))
        .add_exclusive_group([t1.clone()])?
        .add_group_alternatives(0, [alternative(&query, triple("x", "p1", "y"), &t1)])?
        .build()?];

    let leaves = agglutinate(&query, results, AgglutinationStrategy::Merging)?;

    insta::assert_snapshot!(explain(&leaves), @r"
    Union
      Query[A]: ?x <http://ex/p> ?y
      Query[A]: ?x <http://ex/p1> ?y
    ");
    Ok(())
}

#[test]
fn invalid_matches_are_rejected() {
    let t1 = triple("x", "p", "y");
    let query = Query::new([t1.clone()]);
    let unknown = triple("a", "q", "b");

    let empty_group = MatchResult::builder(query.clone(), source("A")).add_exclusive_group([]);
    let unknown_group =
        MatchResult::builder(query.clone(), source("A")).add_exclusive_group([unknown.clone()]);
    let unknown_triple =
        MatchResult::builder(query.clone(), source("A")).add_non_exclusive(&unknown);
    let wrong_alternative = MatchResult::builder(query.clone(), source("A"))
        .add_triple_alternatives(&t1, [Query::new([unknown])]);

    assert!(matches!(empty_group, Err(PlanningError::InvalidMatch(_))));
    assert!(matches!(unknown_group, Err(PlanningError::InvalidMatch(_))));
    assert!(matches!(unknown_triple, Err(PlanningError::InvalidMatch(_))));
    assert!(matches!(
        wrong_alternative,
        Err(PlanningError::UniverseMismatch(_))
    ));
}

#[test]
fn matches_can_be_added_concurrently() -> PlanResult<()> {
    let triples = (0..8)
        .map(|i| triple(&format!("v{i}"), &format!("p{i}"), &format!("v{}", i + 1)))
        .collect::<Vec<_>>();
    let query = Query::new(triples.clone());
    let parallel_for: Arc<dyn ParallelFor> = Arc::new(RayonParallelFor::try_new(4)?);
    let options = PlannerOptions::default().with_verify(true);
    let agglutinator =
        create_agglutinator(&query, triples.len(), &options, Arc::clone(&parallel_for));

    let shared = (&agglutinator, &query);
    std::thread::scope(|scope| {
        let handles = triples
            .iter()
            .enumerate()
            .map(|(i, triple)| {
                scope.spawn(move || {
                    let (agglutinator, query) = shared;
                    let result = MatchResult::builder(query.clone(), source(&format!("S{i}")))
                        .add_non_exclusive(triple)?
                        .build()?;
                    agglutinator.add_match(i, result)
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("matcher thread panicked"))
            .collect::<PlanResult<Vec<_>>>()
    })?;
    let leaves = agglutinator.finalize()?;

    assert_eq!(leaves.len(), triples.len());
    Ok(())
}

/// The claims of one source, as indices into the triples of the query.
#[derive(Clone, Debug)]
struct SourceClaims {
    groups: Vec<usize>,
    non_exclusive: Vec<usize>,
    cartesian: bool,
}

fn source_claims() -> impl Strategy<Value = SourceClaims> {
    (
        prop::collection::vec(0..4usize, 0..3),
        prop::collection::vec(0..4usize, 0..4),
        any::<bool>(),
    )
        .prop_map(|(groups, non_exclusive, cartesian)| SourceClaims {
            groups,
            non_exclusive,
            cartesian,
        })
}

proptest! {
    #[test]
    fn no_triple_is_lost(claims in prop::collection::vec(source_claims(), 1..4)) {
        let triples = [
            triple("x", "p", "y"),
            triple("y", "q", "z"),
            triple("z", "r", "w"),
            triple("a", "s", "b"),
        ];
        let query = Query::new(triples.clone());
        let mut relevant = query.universe().empty_triples();
        let mut results = Vec::new();
        for (i, claims) in claims.iter().enumerate() {
            let name = format!("S{i}");
            let source = if claims.cartesian { cartesian_source(&name) } else { source(&name) };
            let mut builder = MatchResult::builder(query.clone(), source);
            if !claims.groups.is_empty() {
                builder = builder
                    .add_exclusive_group(claims.groups.iter().map(|t| triples[*t].clone()))
                    .unwrap();
            }
            for t in &claims.non_exclusive {
                builder = builder.add_non_exclusive(&triples[*t]).unwrap();
            }
            let result = builder.build().unwrap();
            relevant.union_with(result.relevant_triples()).unwrap();
            results.push(result);
        }

        let leaves = agglutinate(&query, results, AgglutinationStrategy::Merging).unwrap();

        let mut covered = query.universe().empty_triples();
        for leaf in &leaves {
            covered.union_with(leaf.matched_triples()).unwrap();
        }
        prop_assert_eq!(covered, relevant);
    }
}
