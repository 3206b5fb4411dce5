use crate::MatchResult;
use rdf_federation_logical::plan::{PlanNode, PlanNodeRef};
use rdf_federation_model::{internal_err, PlanResult, Query};

/// Checks that the leaves created for every source faithfully represent its match result.
///
/// - Every leaf shares the universe of `query` and only matches triples of `query`.
/// - No leaf matches a triple that its source did not claim.
/// - Every relevant triple, every exclusive group, and every declared alternative is represented
///   by a leaf of the source. Alternatives of triples within a declared exclusive group are
///   superseded by the alternatives of the group.
///
/// `leaves[i]` contains the leaves created for `results[i]`.
pub(super) fn verify_leaves(
    query: &Query,
    results: &[Option<MatchResult>],
    leaves: &[Vec<PlanNodeRef>],
) -> PlanResult<()> {
    for (result, leaves) in results.iter().zip(leaves) {
        let Some(result) = result else {
            if !leaves.is_empty() {
                internal_err!("Created leaves for a source without match result");
            }
            continue;
        };
        let source = result.source().name();

        let mut covered = query.universe().empty_triples();
        for leaf in leaves {
            if !leaf.universe().is_same(query.universe()) {
                internal_err!("Leaf {} of source {source} uses another universe", leaf.id());
            }
            if !leaf.matched_triples().is_subset(result.relevant_triples()) {
                internal_err!(
                    "Leaf {} matches triples that source {source} did not claim",
                    leaf.id()
                );
            }
            covered.union_with(leaf.matched_triples())?;
        }

        if !result.relevant_triples().is_subset(&covered) {
            internal_err!(
                "Lost triples of source {source}: {}",
                result.relevant_triples().difference(&covered)?
            );
        }
        for group in result.exclusive_groups() {
            if !leaves
                .iter()
                .any(|leaf| group.triples().is_subset(leaf.matched_triples()))
            {
                internal_err!("Lost exclusive group {} of source {source}", group.query());
            }
            for alternative in group.alternatives() {
                if !leaves.iter().any(|leaf| contains_query(leaf, alternative)) {
                    internal_err!("Lost alternative {alternative} of source {source}");
                }
            }
        }
        for (triple, alternatives) in result.all_triple_alternatives() {
            if !result.non_exclusive_triples().contains(triple) {
                continue;
            }
            for alternative in alternatives {
                if !leaves.iter().any(|leaf| contains_triples(leaf, alternative)) {
                    internal_err!(
                        "Lost alternative {alternative} of triple {triple} of source {source}"
                    );
                }
            }
        }
    }
    Ok(())
}

fn contains_query(node: &PlanNode, query: &Query) -> bool {
    node.as_query() == Some(query) || node.children().iter().any(|c| contains_query(c, query))
}

/// Returns whether a leaf below `node` evaluates all triples of `query`. Alternatives of a single
/// triple may be substituted into a larger query.
fn contains_triples(node: &PlanNode, query: &Query) -> bool {
    let contained = node.as_query().is_some_and(|leaf| {
        query
            .triples()
            .iter()
            .all(|triple| leaf.triples().contains(triple))
    });
    contained || node.children().iter().any(|c| contains_triples(c, query))
}
