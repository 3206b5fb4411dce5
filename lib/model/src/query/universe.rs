use crate::query::expression::triple_variables;
use crate::{
    IndexSubset, IndexUniverse, TripleSet, TriplePattern, TripleUniverse, Variable, VariableSet,
    VariableUniverse,
};
use std::sync::Arc;

/// The universes of triples and variables shared by all queries and plan nodes of one
/// decomposition.
///
/// The variable universe contains every variable of the triple universe plus additional variables
/// referenced by the root query's modifiers and annotations.
#[derive(Clone, Debug)]
pub struct QueryUniverse {
    triples: Arc<TripleUniverse>,
    variables: Arc<VariableUniverse>,
}

impl QueryUniverse {
    /// Creates the universe of a root query.
    pub fn new(
        triples: impl IntoIterator<Item = TriplePattern>,
        extra_variables: impl IntoIterator<Item = Variable>,
    ) -> Self {
        let triples = IndexUniverse::new(triples);
        let variables = IndexUniverse::new(
            triples
                .iter()
                .flat_map(triple_variables)
                .cloned()
                .chain(extra_variables),
        );
        Self { triples, variables }
    }

    /// Returns the triple universe.
    pub fn triples(&self) -> &Arc<TripleUniverse> {
        &self.triples
    }

    /// Returns the variable universe.
    pub fn variables(&self) -> &Arc<VariableUniverse> {
        &self.variables
    }

    /// Returns whether `self` and `other` are the same universes (by identity).
    pub fn is_same(&self, other: &QueryUniverse) -> bool {
        Arc::ptr_eq(&self.triples, &other.triples) && Arc::ptr_eq(&self.variables, &other.variables)
    }

    /// Returns an empty triple set of this universe.
    pub fn empty_triples(&self) -> TripleSet {
        IndexSubset::empty(&self.triples)
    }

    /// Returns the set of all triples of this universe.
    pub fn all_triples(&self) -> TripleSet {
        IndexSubset::full(&self.triples)
    }

    /// Returns an empty variable set of this universe.
    pub fn empty_variables(&self) -> VariableSet {
        IndexSubset::empty(&self.variables)
    }

    /// Returns the variables of `variables` that are part of this universe.
    pub fn variables_matching<'var>(
        &self,
        variables: impl IntoIterator<Item = &'var Variable>,
    ) -> VariableSet {
        IndexSubset::matching(&self.variables, variables)
    }
}
