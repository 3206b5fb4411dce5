use crate::agglutination::pool::StatePool;
use crate::agglutination::verify::verify_leaves;
use crate::agglutination::{check_match, non_exclusive_units, restrict_to, Agglutinator, LeafUnit};
use crate::MatchResult;
use rdf_federation_common::{parallel_map, ParallelFor};
use rdf_federation_logical::plan::PlanNodeRef;
use rdf_federation_model::{PlanResult, PlanningError, Query, SourceRef, TripleSet};
use roaring::RoaringBitmap;
use std::sync::{Arc, OnceLock};

/// An [Agglutinator] that minimizes the number of leaves.
///
/// Finalization proceeds in the following steps:
/// 1. Triples that a single source claims non-exclusively, and that are neither claimed by another
///    source nor part of an exclusive group, are *truly exclusive* for that source.
/// 2. New exclusive groups are synthesized from the truly exclusive triples of each source. At most
///    one triple with alternatives is placed into a group, which avoids the cross product of the
///    alternatives of independent triples.
/// 3. Exclusive groups of the same source are merged if the source can evaluate the merged query.
/// 4. A leaf is created for every exclusive group and every remaining non-exclusive triple.
///
/// The first two steps are distributed over the sources with a [ParallelFor].
#[derive(Debug)]
pub struct MergingAgglutinator {
    query: Query,
    slots: Vec<OnceLock<MatchResult>>,
    parallel_for: Arc<dyn ParallelFor>,
    pool: &'static StatePool,
    verify: bool,
}

impl MergingAgglutinator {
    /// Creates a new [MergingAgglutinator] for decomposing `query` over `num_sources` sources.
    pub fn new(query: Query, num_sources: usize, parallel_for: Arc<dyn ParallelFor>) -> Self {
        Self {
            query,
            slots: (0..num_sources).map(|_| OnceLock::new()).collect(),
            parallel_for,
            pool: StatePool::global(),
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

impl Agglutinator for MergingAgglutinator {
    fn add_match(&self, source_index: usize, result: MatchResult) -> PlanResult<()> {
        check_match(&self.query, self.slots.len(), source_index, &result)?;
        let Some(slot) = self.slots.get(source_index) else {
            return Err(PlanningError::UnknownSource(source_index));
        };
        slot.set(result)
            .map_err(|result| PlanningError::DuplicateMatch(result.source().name().to_owned()))
    }

    fn finalize(self: Box<Self>) -> PlanResult<Vec<PlanNodeRef>> {
        let Self {
            query,
            slots,
            parallel_for,
            pool,
            verify,
        } = *self;
        let results = slots
            .into_iter()
            .map(OnceLock::into_inner)
            .collect::<Vec<_>>();
        tracing::debug!(
            sources = results.len(),
            triples = query.len(),
            "Agglutinating match results"
        );

        let mut state = pool.acquire();
        state.prepare(&results);
        let truly_exclusive = parallel_map(parallel_for.as_ref(), results.len(), |i| {
            state.truly_exclusive(i)
        })?;
        let units = parallel_map(parallel_for.as_ref(), results.len(), |i| {
            let (Some(result), Some(claims), Some(exclusive)) = (
                results.get(i).and_then(Option::as_ref),
                state.claims(i),
                truly_exclusive.get(i),
            ) else {
                return Ok(None);
            };
            split_exclusivity(result, claims, exclusive).map(Some)
        })?;
        pool.release(state);

        let mut leaves = Vec::with_capacity(results.len());
        for (result, units) in results.iter().zip(units) {
            let (Some(result), Some(units)) = (result, units?) else {
                leaves.push(Vec::new());
                continue;
            };

            let source = result.source();
            let groups = merge_groups(units.groups, source)?;
            let source_leaves = groups
                .into_iter()
                .chain(units.non_exclusive)
                .map(|unit| unit.into_leaf(source))
                .collect::<PlanResult<Vec<_>>>()?;
            leaves.push(source_leaves);
        }

        if verify {
            verify_leaves(&query, &results, &leaves)?;
        }

        let leaves = leaves.into_iter().flatten().collect::<Vec<_>>();
        tracing::debug!(leaves = leaves.len(), "Finished agglutination");
        Ok(leaves)
    }
}

/// The units of a single source after splitting off its truly exclusive triples.
#[derive(Debug)]
struct SourceUnits {
    groups: Vec<LeafUnit>,
    non_exclusive: Vec<LeafUnit>,
}

fn split_exclusivity(
    result: &MatchResult,
    claims: &RoaringBitmap,
    exclusive: &RoaringBitmap,
) -> PlanResult<SourceUnits> {
    let universe = result.query().universe().triples();
    tracing::trace!(
        source = result.source().name(),
        claimed = claims.len(),
        exclusive = exclusive.len(),
        "Computed exclusive triples"
    );

    let mut groups = result
        .exclusive_groups()
        .iter()
        .map(|group| {
            LeafUnit::with_alternatives(group.query().clone(), group.alternatives().to_vec())
        })
        .collect::<Vec<_>>();
    if !exclusive.is_empty() {
        let exclusive = TripleSet::from_bits(universe, exclusive.clone())?;
        groups.extend(synthesize_groups(result, &exclusive)?);
    }

    let shared = TripleSet::from_bits(universe, claims - exclusive)?;
    Ok(SourceUnits {
        groups,
        non_exclusive: non_exclusive_units(result, &shared)?,
    })
}

/// Creates exclusive groups from the truly exclusive triples of a source.
///
/// Two triples with alternatives are never placed into the same group, as the group would need an
/// alternative for every combination of their alternatives.
fn synthesize_groups(result: &MatchResult, exclusive: &TripleSet) -> PlanResult<Vec<LeafUnit>> {
    let query = result.query();
    let ambiguous = exclusive
        .iter()
        .filter(|t| !result.triple_alternatives(t).is_empty())
        .collect::<Vec<_>>();

    match ambiguous.as_slice() {
        [] => Ok(vec![LeafUnit::new(restrict_to(query, exclusive)?)]),
        [triple] => {
            let group = restrict_to(query, exclusive)?;
            let alternatives = result
                .triple_alternatives(triple)
                .iter()
                .map(|alternative| group.substitute(triple, alternative))
                .collect::<PlanResult<Vec<_>>>()?;
            Ok(vec![LeafUnit::with_alternatives(group, alternatives)])
        }
        _ => {
            let universe = query.universe().triples();
            let mut fixed = exclusive.clone();
            for triple in &ambiguous {
                fixed.remove(triple);
            }

            let mut groups = Vec::with_capacity(ambiguous.len() + 1);
            if !fixed.is_empty() {
                groups.push(LeafUnit::new(restrict_to(query, &fixed)?));
            }
            for triple in ambiguous {
                let single = TripleSet::from_elements(universe, [triple])?;
                groups.push(LeafUnit::with_alternatives(
                    restrict_to(query, &single)?,
                    result.triple_alternatives(triple).to_vec(),
                ));
            }
            Ok(groups)
        }
    }
}

/// Merges the exclusive groups of a single source.
///
/// Only groups that share no triple with another group of the source, have no input variables,
/// and have no alternatives are considered. Groups without a merge policy are first folded into
/// groups with a policy; the remaining ones are then folded into each other.
fn merge_groups(groups: Vec<LeafUnit>, source: &SourceRef) -> PlanResult<Vec<LeafUnit>> {
    let candidates = groups
        .iter()
        .enumerate()
        .map(|(i, group)| is_merge_candidate(i, group, &groups))
        .collect::<Vec<_>>();

    let mut fixed = Vec::new();
    let mut restricted = Vec::new();
    let mut unrestricted = Vec::new();
    for (group, candidate) in groups.into_iter().zip(candidates) {
        if !candidate {
            fixed.push(group);
        } else if group.query.merge_policy().is_some() {
            restricted.push(group.query);
        } else {
            unrestricted.push(group.query);
        }
    }

    let num_candidates = restricted.len() + unrestricted.len();
    let mut remaining = Vec::new();
    'unrestricted: for group in unrestricted {
        for target in &mut restricted {
            if let Some(merged) = try_merge(target, &group, source)? {
                *target = merged;
                continue 'unrestricted;
            }
        }
        remaining.push(group);
    }
    let remaining = fold_pairwise(remaining, source)?;

    if restricted.len() + remaining.len() < num_candidates {
        tracing::debug!(
            source = source.name(),
            before = num_candidates,
            after = restricted.len() + remaining.len(),
            "Merged exclusive groups"
        );
    }

    Ok(fixed
        .into_iter()
        .chain(restricted.into_iter().chain(remaining).map(LeafUnit::new))
        .collect())
}

fn is_merge_candidate(index: usize, group: &LeafUnit, groups: &[LeafUnit]) -> bool {
    group.alternatives.is_empty()
        && group.query.input_variables().is_empty()
        && groups.iter().enumerate().all(|(j, other)| {
            j == index
                || other
                    .query
                    .matched_triples()
                    .is_disjoint(group.query.matched_triples())
        })
}

/// Merges pairs of groups until no further pair can be merged.
fn fold_pairwise(mut groups: Vec<Query>, source: &SourceRef) -> PlanResult<Vec<Query>> {
    'search: loop {
        for i in 0..groups.len() {
            for j in (i + 1)..groups.len() {
                if let Some(merged) = try_merge(&groups[i], &groups[j], source)? {
                    groups[i] = merged;
                    groups.remove(j);
                    continue 'search;
                }
            }
        }
        return Ok(groups);
    }
}

/// Merges two groups of `source` if the merge policies allow it and the source can evaluate the
/// merged query.
fn try_merge(lhs: &Query, rhs: &Query, source: &SourceRef) -> PlanResult<Option<Query>> {
    if !lhs.allows_merge_with(rhs) {
        return Ok(None);
    }
    if !lhs.shares_variable(rhs) && !source.supports_cartesian() {
        return Ok(None);
    }
    lhs.merge(rhs)
}
