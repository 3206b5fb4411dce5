//! Turns the match results of all sources into the leaves of a federated plan.
//!
//! An [Agglutinator] is created for a single decomposition of a query. It receives one
//! [MatchResult] per source (possibly concurrently) and is consumed by [Agglutinator::finalize],
//! which returns the leaves of the plan.

mod merging;
mod pool;
mod simple;
mod verify;

pub use merging::MergingAgglutinator;
pub use simple::SimpleAgglutinator;

use crate::MatchResult;
use rdf_federation_common::{AgglutinationStrategy, ParallelFor, PlannerOptions};
use rdf_federation_logical::plan::{PlanNode, PlanNodeRef};
use rdf_federation_model::{PlanResult, PlanningError, Query, SourceRef, TripleSet};
use std::fmt::Debug;
use std::iter::once;
use std::sync::Arc;

/// Collects the match results of a decomposition and creates the leaves of the plan.
pub trait Agglutinator: Debug + Send + Sync {
    /// Ingests the match result of the source at `source_index`.
    ///
    /// This method may be called concurrently for different sources.
    ///
    /// # Errors
    ///
    /// Fails if a result for the source was already ingested, if the index is out of range, or if
    /// the result was created for another query universe.
    fn add_match(&self, source_index: usize, result: MatchResult) -> PlanResult<()>;

    /// Consumes the agglutinator and returns the leaves of the plan in source order.
    fn finalize(self: Box<Self>) -> PlanResult<Vec<PlanNodeRef>>;
}

/// Creates the [Agglutinator] that is configured in `options`.
pub fn create_agglutinator(
    query: &Query,
    num_sources: usize,
    options: &PlannerOptions,
    parallel_for: Arc<dyn ParallelFor>,
) -> Box<dyn Agglutinator> {
    match options.agglutination {
        AgglutinationStrategy::Merging => Box::new(
            MergingAgglutinator::new(query.clone(), num_sources, parallel_for)
                .with_verification(options.verify),
        ),
        AgglutinationStrategy::Simple => Box::new(
            SimpleAgglutinator::new(query.clone(), num_sources).with_verification(options.verify),
        ),
    }
}

/// A sub-query that becomes one leaf of the plan, together with its alternative forms.
#[derive(Clone, Debug)]
struct LeafUnit {
    query: Query,
    alternatives: Vec<Query>,
}

impl LeafUnit {
    fn new(query: Query) -> Self {
        Self {
            query,
            alternatives: Vec::new(),
        }
    }

    fn with_alternatives(query: Query, alternatives: Vec<Query>) -> Self {
        Self {
            query,
            alternatives,
        }
    }

    /// Creates a leaf for `source`. A unit with alternatives becomes a union of one leaf per
    /// form.
    fn into_leaf(self, source: &SourceRef) -> PlanResult<PlanNodeRef> {
        if self.alternatives.is_empty() {
            return PlanNode::query(self.query, Arc::clone(source));
        }

        let leaves = once(self.query)
            .chain(self.alternatives)
            .map(|query| PlanNode::query(query, Arc::clone(source)))
            .collect::<PlanResult<Vec<_>>>()?;
        PlanNode::union(leaves)
    }
}

/// Checks whether `result` may be ingested for the source at `source_index`.
fn check_match(
    query: &Query,
    num_sources: usize,
    source_index: usize,
    result: &MatchResult,
) -> PlanResult<()> {
    if source_index >= num_sources {
        return Err(PlanningError::UnknownSource(source_index));
    }
    if !result.query().universe().is_same(query.universe()) {
        return Err(PlanningError::UniverseMismatch(format!(
            "Match result of source {} was created for another query",
            result.source().name()
        )));
    }
    Ok(())
}

/// Creates the sub-query of `query` that answers exactly the triples in `triples`.
fn restrict_to(query: &Query, triples: &TripleSet) -> PlanResult<Query> {
    let selected = query
        .triples()
        .iter()
        .filter(|t| query.matched_triple(t).is_some_and(|m| triples.contains(m)))
        .cloned()
        .collect::<Vec<_>>();
    query.restrict(&selected)
}

/// Creates one unit per non-exclusive triple in `triples`, in position order.
fn non_exclusive_units(result: &MatchResult, triples: &TripleSet) -> PlanResult<Vec<LeafUnit>> {
    let universe = result.query().universe().triples();
    triples
        .iter()
        .map(|triple| {
            let single = TripleSet::from_elements(universe, [triple])?;
            Ok(LeafUnit::with_alternatives(
                restrict_to(result.query(), &single)?,
                result.triple_alternatives(triple).to_vec(),
            ))
        })
        .collect()
}
