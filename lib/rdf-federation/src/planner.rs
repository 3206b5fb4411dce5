//! API to decompose a conjunctive query over a set of sources.
//!
//! The entry point of the module is the [`FederatedPlanner`] struct.
//!
//! Usage example:
//! ```
//! use rdf_federation::engine::MatchResult;
//! use rdf_federation::model::*;
//! use rdf_federation::planner::{FederatedPlanner, SourceMatcher};
//! use rdf_federation::PlannerOptions;
//! use std::sync::Arc;
//!
//! /// Claims every triple of every query non-exclusively.
//! struct ClaimEverything;
//!
//! impl SourceMatcher for ClaimEverything {
//!     fn match_source(&self, query: &Query, source: &SourceRef) -> PlanResult<MatchResult> {
//!         query
//!             .triples()
//!             .iter()
//!             .try_fold(MatchResult::builder(query.clone(), Arc::clone(source)), |builder, triple| {
//!                 builder.add_non_exclusive(triple)
//!             })?
//!             .build()
//!     }
//! }
//!
//! let triple = TriplePattern {
//!     subject: Variable::new("s")?.into(),
//!     predicate: NamedNode::new("http://example.com/p")?.into(),
//!     object: Variable::new("o")?.into(),
//! };
//! let query = Query::new([triple]);
//! let sources = [
//!     SourceDescription::new("A").into_ref(),
//!     SourceDescription::new("B").into_ref(),
//! ];
//!
//! let planner = FederatedPlanner::try_new(PlannerOptions::default())?;
//! let plan = planner.plan(&query, &sources, &ClaimEverything)?;
//! assert_eq!(
//!     plan.to_string(),
//!     "Union\n  Query[A]: ?s <http://example.com/p> ?o\n  Query[B]: ?s <http://example.com/p> ?o"
//! );
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! ```

use rdf_federation_common::{
    parallel_map, ParallelFor, PlannerOptions, RayonParallelFor, SequentialParallelFor,
};
use rdf_federation_engine::{create_agglutinator, MatchResult};
use rdf_federation_logical::join::JoinOrderPlanner;
use rdf_federation_logical::plan::{LockedNodes, PlanNode, PlanNodeRef};
use rdf_federation_logical::{verify_plan, PlanRewriter};
use itertools::Itertools;
use rdf_federation_model::{PlanResult, Query, SourceRef, TripleSet};
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Decides which triples of a query a single source can answer.
///
/// Implementations are called concurrently for different sources of the same query.
pub trait SourceMatcher: Send + Sync {
    /// Matches `query` against `source`.
    ///
    /// The returned [MatchResult] must be created for `query` (i.e., share its universe).
    fn match_source(&self, query: &Query, source: &SourceRef) -> PlanResult<MatchResult>;
}

/// Plans conjunctive queries over a federation of sources.
///
/// Planning a query consists of three steps:
/// 1. Every source is matched against the query using a [SourceMatcher].
/// 2. The match results are *agglutinated* into the leaves of the plan.
/// 3. The initial plan, a conjunction of the leaves, is rewritten into an executable tree.
///
/// All steps can also be invoked separately via [Self::agglutinate] and [Self::rewrite].
#[derive(Debug)]
pub struct FederatedPlanner {
    options: PlannerOptions,
    parallel_for: Arc<dyn ParallelFor>,
    rewriter: PlanRewriter,
}

impl FederatedPlanner {
    /// Creates a new [FederatedPlanner].
    ///
    /// If `options.parallelism` is greater than one, a dedicated worker pool is created for this
    /// planner.
    ///
    /// # Errors
    ///
    /// Fails if the worker pool cannot be created.
    pub fn try_new(options: PlannerOptions) -> PlanResult<Self> {
        let parallel_for: Arc<dyn ParallelFor> = if options.parallelism > 1 {
            Arc::new(RayonParallelFor::try_new(options.parallelism)?)
        } else {
            Arc::new(SequentialParallelFor)
        };
        Ok(Self::with_parallel_for(options, parallel_for))
    }

    /// Creates a new [FederatedPlanner] that distributes work with `parallel_for`.
    ///
    /// The `parallelism` of `options` is ignored.
    pub fn with_parallel_for(options: PlannerOptions, parallel_for: Arc<dyn ParallelFor>) -> Self {
        let rewriter = PlanRewriter::new(options.optimization_level);
        Self {
            options,
            parallel_for,
            rewriter,
        }
    }

    /// Replaces the join order planner that is used for rewriting conjunctions.
    #[must_use]
    pub fn with_join_order_planner(
        mut self,
        join_order_planner: Arc<dyn JoinOrderPlanner>,
    ) -> Self {
        self.rewriter = PlanRewriter::with_join_order_planner(
            self.options.optimization_level,
            join_order_planner,
        );
        self
    }

    /// Returns the options of this planner.
    pub fn options(&self) -> &PlannerOptions {
        &self.options
    }

    /// Turns the match results of a decomposition of `query` into the leaves of a plan.
    ///
    /// `results[i]` is treated as the result of the `i`-th source.
    pub fn agglutinate(
        &self,
        query: &Query,
        results: Vec<MatchResult>,
    ) -> PlanResult<Vec<PlanNodeRef>> {
        let agglutinator = create_agglutinator(
            query,
            results.len(),
            &self.options,
            Arc::clone(&self.parallel_for),
        );
        for (i, result) in results.into_iter().enumerate() {
            agglutinator.add_match(i, result)?;
        }
        agglutinator.finalize()
    }

    /// Rewrites `plan` into an executable tree.
    pub fn rewrite(&self, plan: &PlanNodeRef) -> PlanResult<PlanNodeRef> {
        self.rewrite_with_locked(plan, &LockedNodes::new())
    }

    /// Rewrites `plan` into an executable tree without restructuring the nodes in `locked`.
    pub fn rewrite_with_locked(
        &self,
        plan: &PlanNodeRef,
        locked: &LockedNodes,
    ) -> PlanResult<PlanNodeRef> {
        let plan = self.rewriter.rewrite(plan, locked)?;
        if self.options.verify {
            verify_plan(&plan)?;
        }
        Ok(plan)
    }

    /// Plans `query` over `sources`.
    ///
    /// If a triple of the query cannot be answered by any source, the query has no solutions and
    /// an empty node is returned.
    pub fn plan(
        &self,
        query: &Query,
        sources: &[SourceRef],
        matcher: &dyn SourceMatcher,
    ) -> PlanResult<PlanNodeRef> {
        tracing::debug!(
            sources = sources.len(),
            triples = query.len(),
            "Planning federated query"
        );

        let agglutinator = create_agglutinator(
            query,
            sources.len(),
            &self.options,
            Arc::clone(&self.parallel_for),
        );
        parallel_map(self.parallel_for.as_ref(), sources.len(), |i| {
            let source = &sources[i];
            let result = matcher.match_source(query, source)?;
            tracing::trace!(
                source = source.name(),
                relevant = result.relevant_triples().len(),
                "Matched source"
            );
            agglutinator.add_match(i, result)
        })?
        .into_iter()
        .collect::<PlanResult<Vec<()>>>()?;
        let leaves = agglutinator.finalize()?;

        let mut covered = query.universe().empty_triples();
        for leaf in &leaves {
            covered.union_with(leaf.matched_triples())?;
        }
        if leaves.is_empty() || !query.matched_triples().is_subset(&covered) {
            tracing::debug!(
                uncovered = %query.matched_triples().difference(&covered)?,
                "Query cannot be answered by the sources"
            );
            return PlanNode::empty(
                query.universe().clone(),
                query.matched_triples().clone(),
                query.variables().clone(),
            );
        }

        let children = group_overlapping_leaves(leaves)?;
        let plan = PlanNode::conjunction(children)?.with_modifiers(query.modifiers().clone())?;
        self.rewrite(&plan)
    }
}

/// Combines the leaves into the children of the initial conjunction.
///
/// Leaves whose matched triples overlap answer the same part of the query and must never be
/// joined. Such leaves are grouped into a union. The branches of the union are the leaves that
/// cover all triples of the group and a conjunction of the remaining leaves, if these cover the
/// group as well. The order of the first occurrence is kept.
fn group_overlapping_leaves(leaves: Vec<PlanNodeRef>) -> PlanResult<Vec<PlanNodeRef>> {
    let mut children = Vec::new();
    for (triples, group) in overlapping_groups(leaves)? {
        if group.len() == 1 {
            children.extend(group);
            continue;
        }

        let (covers, rest): (Vec<_>, Vec<_>) = group
            .into_iter()
            .partition(|leaf| leaf.matched_triples() == &triples);
        if covers.is_empty() {
            // No leaf answers the whole group on its own.
            children.extend(group_by_matched_triples(rest)?);
            continue;
        }

        let mut branches = covers;
        if !rest.is_empty() {
            let mut covered = TripleSet::empty(triples.universe());
            for leaf in &rest {
                covered.union_with(leaf.matched_triples())?;
            }
            if covered == triples {
                branches.push(conjunction_or_single(group_overlapping_leaves(rest)?)?);
            } else {
                tracing::debug!(
                    leaves = rest.len(),
                    uncovered = %triples.difference(&covered)?,
                    "Dropped leaves that cannot be combined into a complete branch"
                );
            }
        }
        children.push(union_or_single(branches)?);
    }
    Ok(children)
}

/// Partitions `leaves` into groups whose matched triples are connected by overlaps. The triple
/// sets of the returned groups are pair-wise disjoint.
fn overlapping_groups(
    leaves: Vec<PlanNodeRef>,
) -> PlanResult<Vec<(TripleSet, Vec<PlanNodeRef>)>> {
    let mut groups = Vec::<(TripleSet, Vec<PlanNodeRef>)>::new();
    for leaf in leaves {
        let overlapping = groups
            .iter()
            .positions(|(triples, _)| !triples.is_disjoint(leaf.matched_triples()))
            .collect::<Vec<_>>();
        let Some((&first, others)) = overlapping.split_first() else {
            groups.push((leaf.matched_triples().clone(), vec![leaf]));
            continue;
        };

        let mut merged = others
            .iter()
            .rev()
            .map(|&i| groups.remove(i))
            .collect::<Vec<_>>();
        merged.reverse();
        let (triples, members) = &mut groups[first];
        for (other_triples, mut other_members) in merged {
            triples.union_with(&other_triples)?;
            members.append(&mut other_members);
        }
        triples.union_with(leaf.matched_triples())?;
        members.push(leaf);
    }
    Ok(groups)
}

/// Combines leaves that answer the same triples into a union. The order of the first occurrence
/// is kept.
fn group_by_matched_triples(leaves: Vec<PlanNodeRef>) -> PlanResult<Vec<PlanNodeRef>> {
    let mut positions = FxHashMap::<TripleSet, usize>::default();
    let mut groups = Vec::<Vec<PlanNodeRef>>::new();
    for leaf in leaves {
        match positions.get(leaf.matched_triples()) {
            Some(&position) => groups[position].push(leaf),
            None => {
                positions.insert(leaf.matched_triples().clone(), groups.len());
                groups.push(vec![leaf]);
            }
        }
    }
    groups.into_iter().map(union_or_single).collect()
}

fn union_or_single(nodes: Vec<PlanNodeRef>) -> PlanResult<PlanNodeRef> {
    match <[PlanNodeRef; 1]>::try_from(nodes) {
        Ok([node]) => Ok(node),
        Err(nodes) => PlanNode::union(nodes),
    }
}

fn conjunction_or_single(nodes: Vec<PlanNodeRef>) -> PlanResult<PlanNodeRef> {
    match <[PlanNodeRef; 1]>::try_from(nodes) {
        Ok([node]) => Ok(node),
        Err(nodes) => PlanNode::conjunction(nodes),
    }
}
