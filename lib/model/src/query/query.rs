use crate::query::expression::triple_variables;
use crate::{
    MergePolicy, Modifiers, PlanResult, PlanningError, QueryAnnotations, QueryUniverse,
    SparqlFilter, TripleSet, TriplePattern, ValuesModifier, Variable, VariableSet,
};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Arc, OnceLock};

/// A conjunctive query: an ordered set of triple patterns plus modifiers and annotations.
///
/// Every query belongs to a [QueryUniverse]. Each of its triples either is part of the triple
/// universe or is annotated with the universe triple it answers (a *matched triple*). The latter
/// happens for semantic rewrites, where a triple of the original query is replaced by an
/// equivalent one.
///
/// The matched-triple set and the variable set are computed lazily and cached. Mutating methods
/// invalidate the cache.
#[derive(Clone)]
pub struct Query {
    universe: QueryUniverse,
    triples: Vec<TriplePattern>,
    modifiers: Modifiers,
    annotations: QueryAnnotations,
    views: QueryViews,
}

/// Cached, derived views of a [Query].
#[derive(Clone, Default)]
struct QueryViews {
    matched_triples: OnceLock<TripleSet>,
    variables: OnceLock<VariableSet>,
}

impl Query {
    /// Creates a root query from `triples`. A new universe is created for this query.
    pub fn new(triples: impl IntoIterator<Item = TriplePattern>) -> Self {
        let triples = triples.into_iter().unique().collect::<Vec<_>>();
        let universe = QueryUniverse::new(triples.iter().cloned(), []);
        Self {
            universe,
            triples,
            modifiers: Modifiers::default(),
            annotations: QueryAnnotations::default(),
            views: QueryViews::default(),
        }
    }

    /// Creates a builder for a root query. The universe is created when building the query.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new(None)
    }

    /// Creates a builder for a query of an existing universe.
    pub fn builder_in(universe: &QueryUniverse) -> QueryBuilder {
        QueryBuilder::new(Some(universe.clone()))
    }

    /// Returns the universe of this query.
    pub fn universe(&self) -> &QueryUniverse {
        &self.universe
    }

    /// Returns the triple patterns.
    pub fn triples(&self) -> &[TriplePattern] {
        &self.triples
    }

    /// Returns the number of triple patterns.
    pub fn len(&self) -> usize {
        self.triples.len()
    }

    /// Returns whether the query has no triple patterns.
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Returns the modifiers.
    pub fn modifiers(&self) -> &Modifiers {
        &self.modifiers
    }

    /// Returns a mutable reference to the modifiers. Invalidates cached views.
    pub fn modifiers_mut(&mut self) -> &mut Modifiers {
        self.views = QueryViews::default();
        &mut self.modifiers
    }

    /// Returns a copy of this query with the given modifiers.
    #[must_use]
    pub fn with_modifiers(&self, modifiers: Modifiers) -> Self {
        let mut result = self.clone();
        *result.modifiers_mut() = modifiers;
        result
    }

    /// Adds a filter. Returns false if the filter was already present.
    pub fn add_filter(&mut self, filter: SparqlFilter) -> bool {
        self.modifiers_mut().add_filter(filter)
    }

    /// Returns the annotations.
    pub fn annotations(&self) -> &QueryAnnotations {
        &self.annotations
    }

    /// Returns the merge policy, if any.
    pub fn merge_policy(&self) -> Option<&Arc<dyn MergePolicy>> {
        self.annotations.merge_policy()
    }

    /// Returns the universe triple answered by `triple`.
    ///
    /// Annotations take precedence over the triple itself being part of the universe.
    pub fn matched_triple<'q>(&'q self, triple: &'q TriplePattern) -> Option<&'q TriplePattern> {
        self.annotations.matched_triple(triple).or_else(|| {
            self.universe
                .triples()
                .contains(triple)
                .then_some(triple)
        })
    }

    /// Returns the set of universe triples answered by this query.
    pub fn matched_triples(&self) -> &TripleSet {
        self.views.matched_triples.get_or_init(|| {
            TripleSet::matching(
                self.universe.triples(),
                self.triples.iter().filter_map(|t| self.matched_triple(t)),
            )
        })
    }

    /// Returns the universe variables bound by this query (triples and value bindings).
    ///
    /// Variables outside the universe are private to this query and not part of the result.
    pub fn variables(&self) -> &VariableSet {
        self.views.variables.get_or_init(|| {
            self.universe.variables_matching(
                self.triples
                    .iter()
                    .flat_map(triple_variables)
                    .chain(self.modifiers.values().into_iter().flat_map(|v| v.variables())),
            )
        })
    }

    /// Returns the universe variables that must be bound before the query can be executed.
    pub fn input_variables(&self) -> VariableSet {
        self.universe
            .variables_matching(self.annotations.input_variables())
    }

    /// Returns all variables of the triple patterns, including private ones, in order of their
    /// first occurrence.
    pub fn local_variables(&self) -> Vec<&Variable> {
        self.triples
            .iter()
            .flat_map(triple_variables)
            .unique()
            .collect()
    }

    /// Returns whether the merge policies of both queries allow merging `self` with `other`.
    ///
    /// Queries without a merge policy can always be merged.
    pub fn allows_merge_with(&self, other: &Query) -> bool {
        self.merge_policy()
            .map_or(true, |policy| policy.allows_merge(self, other))
            && other
                .merge_policy()
                .map_or(true, |policy| policy.allows_merge(other, self))
    }

    /// Returns whether `self` and `other` share a (universe) variable.
    pub fn shares_variable(&self, other: &Query) -> bool {
        !self.variables().is_disjoint(other.variables())
    }

    /// Splits the triples into connected components.
    ///
    /// Two triples are adjacent if they share a variable. Components are returned in the order of
    /// their first triple, triples within a component keep their relative order.
    pub fn connected_components(&self) -> Vec<Vec<TriplePattern>> {
        let mut by_variable: FxHashMap<&Variable, Vec<usize>> = FxHashMap::default();
        for (i, triple) in self.triples.iter().enumerate() {
            for var in triple_variables(triple) {
                by_variable.entry(var).or_default().push(i);
            }
        }

        let mut component_of = vec![usize::MAX; self.triples.len()];
        let mut components = Vec::new();
        for start in 0..self.triples.len() {
            if component_of[start] != usize::MAX {
                continue;
            }

            let component = components.len();
            let mut members = Vec::new();
            let mut queue = VecDeque::from([start]);
            component_of[start] = component;
            while let Some(current) = queue.pop_front() {
                members.push(current);
                for var in triple_variables(&self.triples[current]) {
                    for &neighbour in by_variable.get(var).into_iter().flatten() {
                        if component_of[neighbour] == usize::MAX {
                            component_of[neighbour] = component;
                            queue.push_back(neighbour);
                        }
                    }
                }
            }
            members.sort_unstable();
            components.push(members);
        }

        components
            .into_iter()
            .map(|members| {
                members
                    .into_iter()
                    .map(|i| self.triples[i].clone())
                    .collect()
            })
            .collect()
    }

    /// Merges `self` and `other` into one conjunctive query.
    ///
    /// Returns [None] if the modifiers conflict.
    ///
    /// # Errors
    ///
    /// Fails if the queries do not share a universe.
    pub fn merge(&self, other: &Query) -> PlanResult<Option<Query>> {
        if !self.universe.is_same(&other.universe) {
            return Err(PlanningError::UniverseMismatch(
                "Cannot merge queries of different universes".to_owned(),
            ));
        }
        let Some(modifiers) = self.modifiers.merge(&other.modifiers) else {
            return Ok(None);
        };

        Ok(Some(Query {
            universe: self.universe.clone(),
            triples: self
                .triples
                .iter()
                .chain(other.triples.iter())
                .unique()
                .cloned()
                .collect(),
            modifiers,
            annotations: self.annotations.merge(&other.annotations),
            views: QueryViews::default(),
        }))
    }

    /// Creates a query that only contains the given triples of `self`.
    ///
    /// The result has no modifiers. Annotations and input variables are restricted to the selected
    /// triples.
    ///
    /// # Errors
    ///
    /// Fails if one of the triples is not part of `self`.
    pub fn restrict(&self, triples: &[TriplePattern]) -> PlanResult<Query> {
        if let Some(missing) = triples.iter().find(|t| !self.triples.contains(t)) {
            return Err(PlanningError::internal(format!(
                "Triple {missing} is not part of query {self}"
            )));
        }

        let variables = triples
            .iter()
            .flat_map(triple_variables)
            .collect::<FxHashSet<_>>();
        let annotations = QueryAnnotations {
            matched: self
                .annotations
                .matched
                .iter()
                .filter(|(k, _)| triples.contains(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            input_variables: self
                .annotations
                .input_variables
                .iter()
                .filter(|v| variables.contains(v))
                .cloned()
                .collect(),
            merge_policy: self.annotations.merge_policy.clone(),
        };

        Ok(Query {
            universe: self.universe.clone(),
            triples: triples.iter().unique().cloned().collect(),
            modifiers: Modifiers::default(),
            annotations,
            views: QueryViews::default(),
        })
    }

    /// Replaces every triple answering `original` by the triples of `alternative`.
    ///
    /// The triples of `alternative` that are not part of the universe are annotated with
    /// `original`. Filters of the alternative are added to the result.
    ///
    /// # Errors
    ///
    /// Fails if the queries do not share a universe or the modifiers conflict.
    pub fn substitute(&self, original: &TriplePattern, alternative: &Query) -> PlanResult<Query> {
        if !self.universe.is_same(&alternative.universe) {
            return Err(PlanningError::UniverseMismatch(
                "Alternatives must share the universe of the original query".to_owned(),
            ));
        }

        let mut builder = Query::builder_in(&self.universe)
            .modifiers(self.modifiers.clone())
            .input_variables(self.annotations.input_variables.iter().cloned());
        if let Some(policy) = self.merge_policy() {
            builder = builder.merge_policy(Arc::clone(policy));
        }

        for triple in &self.triples {
            if self.matched_triple(triple) == Some(original) {
                continue;
            }
            builder = match self.annotations.matched_triple(triple) {
                Some(matched) => builder.matched_triple(triple.clone(), matched.clone()),
                None => builder.triple(triple.clone()),
            };
        }
        for triple in &alternative.triples {
            let matched = alternative.matched_triple(triple).unwrap_or(original);
            builder = builder.matched_triple(triple.clone(), matched.clone());
        }
        for var in alternative.annotations.input_variables() {
            builder = builder.input_variable(var.clone());
        }

        let query = builder.build()?;
        let Some(modifiers) = query.modifiers.merge(&alternative.modifiers) else {
            return Err(PlanningError::invalid_match(format!(
                "Modifiers of alternative {alternative} conflict with {self}"
            )));
        };
        Ok(query.with_modifiers(modifiers))
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.triples == other.triples
            && self.modifiers == other.modifiers
            && self.annotations == other.annotations
    }
}

impl Eq for Query {}

impl Debug for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("triples", &self.triples)
            .field("modifiers", &self.modifiers)
            .field("annotations", &self.annotations)
            .finish_non_exhaustive()
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.triples.iter().join(" . "))
    }
}

/// Builds a [Query].
#[derive(Debug)]
pub struct QueryBuilder {
    universe: Option<QueryUniverse>,
    triples: Vec<TriplePattern>,
    modifiers: Modifiers,
    annotations: QueryAnnotations,
}

impl QueryBuilder {
    fn new(universe: Option<QueryUniverse>) -> Self {
        Self {
            universe,
            triples: Vec::new(),
            modifiers: Modifiers::default(),
            annotations: QueryAnnotations::default(),
        }
    }

    /// Adds a triple pattern.
    #[must_use]
    pub fn triple(mut self, triple: TriplePattern) -> Self {
        if !self.triples.contains(&triple) {
            self.triples.push(triple);
        }
        self
    }

    /// Adds several triple patterns.
    #[must_use]
    pub fn triples(self, triples: impl IntoIterator<Item = TriplePattern>) -> Self {
        triples.into_iter().fold(self, Self::triple)
    }

    /// Adds a triple pattern that answers the universe triple `matched`.
    #[must_use]
    pub fn matched_triple(mut self, triple: TriplePattern, matched: TriplePattern) -> Self {
        if triple != matched {
            self.annotations.matched.insert(triple.clone(), matched);
        }
        self.triple(triple)
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<SparqlFilter>) -> Self {
        self.modifiers.add_filter(filter.into());
        self
    }

    /// Sets the projection.
    #[must_use]
    pub fn projection(mut self, variables: impl IntoIterator<Item = Variable>) -> Self {
        self.modifiers
            .set_projection(Some(variables.into_iter().collect()));
        self
    }

    /// Sets the value bindings.
    #[must_use]
    pub fn values(mut self, values: ValuesModifier) -> Self {
        self.modifiers.set_values(Some(values));
        self
    }

    /// Marks the query as distinct.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.modifiers.set_distinct(true);
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.modifiers.set_limit(Some(limit));
        self
    }

    /// Marks the query as an ask query.
    #[must_use]
    pub fn ask(mut self) -> Self {
        self.modifiers.set_ask(true);
        self
    }

    /// Marks the query as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.modifiers.set_optional(true);
        self
    }

    /// Replaces all modifiers.
    #[must_use]
    pub fn modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Adds a required input variable.
    #[must_use]
    pub fn input_variable(mut self, variable: Variable) -> Self {
        if !self.annotations.input_variables.contains(&variable) {
            self.annotations.input_variables.push(variable);
        }
        self
    }

    /// Adds several required input variables.
    #[must_use]
    pub fn input_variables(self, variables: impl IntoIterator<Item = Variable>) -> Self {
        variables.into_iter().fold(self, Self::input_variable)
    }

    /// Sets the merge policy.
    #[must_use]
    pub fn merge_policy(mut self, policy: Arc<dyn MergePolicy>) -> Self {
        self.annotations.merge_policy = Some(policy);
        self
    }

    /// Builds the query.
    ///
    /// # Errors
    ///
    /// Fails if a triple is neither part of the universe nor annotated with a universe triple.
    pub fn build(self) -> PlanResult<Query> {
        let universe = match self.universe {
            Some(universe) => universe,
            None => QueryUniverse::new(
                self.triples.iter().cloned(),
                self.modifiers
                    .variables()
                    .chain(self.annotations.input_variables.iter())
                    .cloned()
                    .collect::<Vec<_>>(),
            ),
        };

        for triple in &self.triples {
            let matched = self.annotations.matched_triple(triple).unwrap_or(triple);
            if !universe.triples().contains(matched) {
                return Err(PlanningError::UnmatchedTriple {
                    triple: triple.to_string(),
                });
            }
        }

        Ok(Query {
            universe,
            triples: self.triples,
            modifiers: self.modifiers,
            annotations: self.annotations,
            views: QueryViews::default(),
        })
    }
}
