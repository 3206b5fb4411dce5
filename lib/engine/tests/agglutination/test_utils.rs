use rdf_federation_common::{AgglutinationStrategy, PlannerOptions, SequentialParallelFor};
use rdf_federation_engine::{create_agglutinator, MatchResult};
use rdf_federation_logical::plan::PlanNodeRef;
use rdf_federation_model::{
    NamedNode, PlanResult, Query, SourceDescription, SourceRef, TriplePattern, Variable,
};
use std::sync::Arc;

pub fn iri(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://ex/{name}"))
}

/// Creates the triple pattern `?s <http://ex/p> ?o`.
pub fn triple(s: &str, p: &str, o: &str) -> TriplePattern {
    TriplePattern {
        subject: Variable::new_unchecked(s).into(),
        predicate: iri(p).into(),
        object: Variable::new_unchecked(o).into(),
    }
}

pub fn source(name: &str) -> SourceRef {
    SourceDescription::new(name).into_ref()
}

pub fn cartesian_source(name: &str) -> SourceRef {
    SourceDescription::new(name)
        .with_cartesian_support(true)
        .into_ref()
}

/// Creates an alternative of `matched` that consists of the single triple `rewritten`.
pub fn alternative(query: &Query, rewritten: TriplePattern, matched: &TriplePattern) -> Query {
    Query::builder_in(query.universe())
        .matched_triple(rewritten, matched.clone())
        .build()
        .unwrap()
}

/// Runs the given agglutination strategy over `results`. Verification is always enabled.
pub fn agglutinate(
    query: &Query,
    results: Vec<MatchResult>,
    strategy: AgglutinationStrategy,
) -> PlanResult<Vec<PlanNodeRef>> {
    let options = PlannerOptions::default()
        .with_agglutination(strategy)
        .with_verify(true);
    let agglutinator = create_agglutinator(
        query,
        results.len(),
        &options,
        Arc::new(SequentialParallelFor),
    );
    for (i, result) in results.into_iter().enumerate() {
        agglutinator.add_match(i, result)?;
    }
    agglutinator.finalize()
}

/// Renders a list of leaves, one per line.
pub fn explain(leaves: &[PlanNodeRef]) -> String {
    leaves
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
