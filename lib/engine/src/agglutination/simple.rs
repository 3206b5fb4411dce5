use crate::agglutination::verify::verify_leaves;
use crate::agglutination::{check_match, non_exclusive_units, Agglutinator, LeafUnit};
use crate::MatchResult;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rdf_federation_logical::plan::PlanNodeRef;
use rdf_federation_model::{PlanResult, PlanningError, Query};

/// An [Agglutinator] that neither splits nor merges exclusive groups.
///
/// Every exclusive group and every non-exclusive triple of every source becomes its own leaf (or a
/// union of its alternatives). This trades plan compactness for a cheaper planning phase.
#[derive(Debug)]
pub struct SimpleAgglutinator {
    query: Query,
    num_sources: usize,
    results: DashMap<usize, MatchResult>,
    verify: bool,
}

impl SimpleAgglutinator {
    /// Creates a new [SimpleAgglutinator] for decomposing `query` over `num_sources` sources.
    pub fn new(query: Query, num_sources: usize) -> Self {
        Self {
            query,
            num_sources,
            results: DashMap::with_capacity(num_sources),
            verify: cfg!(debug_assertions),
        }
    }

    /// Enables or disables the consistency checks of the created leaves.
    #[must_use]
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }
}

impl Agglutinator for SimpleAgglutinator {
    fn add_match(&self, source_index: usize, result: MatchResult) -> PlanResult<()> {
        check_match(&self.query, self.num_sources, source_index, &result)?;
        match self.results.entry(source_index) {
            Entry::Occupied(_) => Err(PlanningError::DuplicateMatch(
                result.source().name().to_owned(),
            )),
            Entry::Vacant(entry) => {
                entry.insert(result);
                Ok(())
            }
        }
    }

    fn finalize(self: Box<Self>) -> PlanResult<Vec<PlanNodeRef>> {
        let Self {
            query,
            num_sources,
            results,
            verify,
        } = *self;
        let results = (0..num_sources)
            .map(|i| results.remove(&i).map(|(_, result)| result))
            .collect::<Vec<_>>();

        let mut leaves = Vec::with_capacity(num_sources);
        for result in &results {
            let Some(result) = result else {
                leaves.push(Vec::new());
                continue;
            };

            let groups = result.exclusive_groups().iter().map(|group| {
                LeafUnit::with_alternatives(group.query().clone(), group.alternatives().to_vec())
            });
            let source_leaves = groups
                .chain(non_exclusive_units(result, result.non_exclusive_triples())?)
                .map(|unit| unit.into_leaf(result.source()))
                .collect::<PlanResult<Vec<_>>>()?;
            leaves.push(source_leaves);
        }

        if verify {
            verify_leaves(&query, &results, &leaves)?;
        }

        let leaves = leaves.into_iter().flatten().collect::<Vec<_>>();
        tracing::debug!(leaves = leaves.len(), "Finished simple agglutination");
        Ok(leaves)
    }
}
