use crate::{Query, TriplePattern, Variable};
use rustc_hash::FxHashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Decides whether two exclusive groups of the same source may be merged into one query.
///
/// A policy is attached to a query by the matcher that created it. A merge only happens if the
/// policies of both queries allow it.
pub trait MergePolicy: Debug + Send + Sync {
    /// Returns whether `query` may be merged with `other`.
    fn allows_merge(&self, query: &Query, other: &Query) -> bool;
}

/// A [MergePolicy] that forbids all merges.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverMerge;

impl MergePolicy for NeverMerge {
    fn allows_merge(&self, _query: &Query, _other: &Query) -> bool {
        false
    }
}

/// Term and triple annotations of a [Query].
#[derive(Clone, Debug, Default)]
pub struct QueryAnnotations {
    /// Maps a rewritten triple to the triple of the original query it answers.
    pub(crate) matched: FxHashMap<TriplePattern, TriplePattern>,
    /// Variables that must be bound before the query can be sent to its source.
    pub(crate) input_variables: Vec<Variable>,
    /// Restricts merges with other queries.
    pub(crate) merge_policy: Option<Arc<dyn MergePolicy>>,
}

impl QueryAnnotations {
    /// Returns the triple of the original query that `triple` answers, if annotated.
    pub fn matched_triple(&self, triple: &TriplePattern) -> Option<&TriplePattern> {
        self.matched.get(triple)
    }

    /// Returns the required input variables.
    pub fn input_variables(&self) -> &[Variable] {
        &self.input_variables
    }

    /// Returns the merge policy, if any.
    pub fn merge_policy(&self) -> Option<&Arc<dyn MergePolicy>> {
        self.merge_policy.as_ref()
    }

    /// Combines the annotations of two queries that are merged.
    ///
    /// The merge policy of `self` takes precedence.
    pub(crate) fn merge(&self, other: &QueryAnnotations) -> QueryAnnotations {
        let mut matched = self.matched.clone();
        matched.extend(
            other
                .matched
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let mut input_variables = self.input_variables.clone();
        for var in &other.input_variables {
            if !input_variables.contains(var) {
                input_variables.push(var.clone());
            }
        }

        QueryAnnotations {
            matched,
            input_variables,
            merge_policy: self
                .merge_policy
                .clone()
                .or_else(|| other.merge_policy.clone()),
        }
    }
}

impl PartialEq for QueryAnnotations {
    fn eq(&self, other: &Self) -> bool {
        self.matched == other.matched && self.input_variables == other.input_variables
    }
}

impl Eq for QueryAnnotations {}
