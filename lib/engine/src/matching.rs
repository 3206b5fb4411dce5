use rdf_federation_model::{
    PlanResult, PlanningError, Query, SourceRef, TriplePattern, TripleSet,
};
use rustc_hash::FxHashMap;

/// A set of triples that a source answers atomically, as a single sub-query.
#[derive(Clone, Debug)]
pub struct ExclusiveGroup {
    query: Query,
    alternatives: Vec<Query>,
}

impl ExclusiveGroup {
    /// Returns the sub-query of the group.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the matched triples of the group.
    pub fn triples(&self) -> &TripleSet {
        self.query.matched_triples()
    }

    /// Returns the declared alternatives of the group.
    pub fn alternatives(&self) -> &[Query] {
        &self.alternatives
    }
}

/// The result of matching a query against a single source.
///
/// A match result classifies the triples of the query into:
/// - *Exclusive groups*: connected sets of triples that the source answers atomically.
/// - *Non-exclusive* triples: triples that the source can only answer individually and that may
///   also be answered by other sources.
/// - Irrelevant triples: all other triples of the query.
///
/// Additionally, a matcher may declare *alternatives* for an exclusive group or a triple. An
/// alternative is a semantically equivalent query that is evaluated in addition to the original
/// form.
#[derive(Clone, Debug)]
pub struct MatchResult {
    query: Query,
    source: SourceRef,
    relevant: TripleSet,
    exclusive_groups: Vec<ExclusiveGroup>,
    non_exclusive: TripleSet,
    triple_alternatives: FxHashMap<TriplePattern, Vec<Query>>,
}

impl MatchResult {
    /// Creates a [MatchResultBuilder] for matching `query` against `source`.
    pub fn builder(query: Query, source: SourceRef) -> MatchResultBuilder {
        MatchResultBuilder::new(query, source)
    }

    /// Creates a match result that claims no triple of `query`.
    pub fn empty(query: Query, source: SourceRef) -> Self {
        let relevant = query.universe().empty_triples();
        Self {
            non_exclusive: relevant.clone(),
            relevant,
            query,
            source,
            exclusive_groups: Vec::new(),
            triple_alternatives: FxHashMap::default(),
        }
    }

    /// Returns the matched query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the source.
    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    /// Returns every triple that is part of an exclusive group or matched non-exclusively.
    pub fn relevant_triples(&self) -> &TripleSet {
        &self.relevant
    }

    /// Returns the triples of the query that the source cannot answer.
    pub fn irrelevant_triples(&self) -> PlanResult<TripleSet> {
        self.query.matched_triples().difference(&self.relevant)
    }

    /// Returns the exclusive groups.
    pub fn exclusive_groups(&self) -> &[ExclusiveGroup] {
        &self.exclusive_groups
    }

    /// Returns the relevant triples that are not part of an exclusive group of this result.
    pub fn non_exclusive_triples(&self) -> &TripleSet {
        &self.non_exclusive
    }

    /// Returns the alternatives of a single triple.
    pub fn triple_alternatives(&self, triple: &TriplePattern) -> &[Query] {
        self.triple_alternatives
            .get(triple)
            .map_or(&[], Vec::as_slice)
    }

    /// Returns every triple with declared alternatives together with these alternatives.
    pub fn all_triple_alternatives(&self) -> impl Iterator<Item = (&TriplePattern, &[Query])> {
        self.triple_alternatives
            .iter()
            .map(|(triple, alternatives)| (triple, alternatives.as_slice()))
    }

    /// Returns whether any triple has declared alternatives.
    pub fn has_triple_alternatives(&self) -> bool {
        !self.triple_alternatives.is_empty()
    }

    /// Returns whether the source claims no triple at all.
    pub fn is_empty(&self) -> bool {
        self.exclusive_groups.is_empty() && self.non_exclusive.is_empty()
    }
}

/// Builds a [MatchResult].
///
/// Every method validates its input against the matched query and fails with
/// [PlanningError::InvalidMatch] for triples or groups that are not drawn from the query.
#[derive(Debug)]
pub struct MatchResultBuilder {
    query: Query,
    source: SourceRef,
    exclusive_groups: Vec<ExclusiveGroup>,
    non_exclusive: TripleSet,
    triple_alternatives: FxHashMap<TriplePattern, Vec<Query>>,
}

impl MatchResultBuilder {
    fn new(query: Query, source: SourceRef) -> Self {
        let non_exclusive = query.universe().empty_triples();
        Self {
            query,
            source,
            exclusive_groups: Vec::new(),
            non_exclusive,
            triple_alternatives: FxHashMap::default(),
        }
    }

    /// Adds an exclusive group that consists of the given triples of the query.
    pub fn add_exclusive_group(
        self,
        triples: impl IntoIterator<Item = TriplePattern>,
    ) -> PlanResult<Self> {
        let triples = triples.into_iter().collect::<Vec<_>>();
        if let Some(unknown) = triples.iter().find(|t| !self.query.triples().contains(t)) {
            return Err(PlanningError::invalid_match(format!(
                "Triple {unknown} of an exclusive group is not part of the query"
            )));
        }
        let group = self.query.restrict(&triples)?;
        self.add_exclusive_group_query(group)
    }

    /// Adds an exclusive group that is described by a sub-query, e.g., a query with annotated
    /// triples.
    pub fn add_exclusive_group_query(mut self, group: Query) -> PlanResult<Self> {
        if group.is_empty() {
            return Err(PlanningError::invalid_match("An exclusive group must not be empty"));
        }
        self.check_drawn_from_query(&group)?;

        self.exclusive_groups.push(ExclusiveGroup {
            query: group,
            alternatives: Vec::new(),
        });
        Ok(self)
    }

    /// Adds a triple that the source can only answer individually.
    pub fn add_non_exclusive(mut self, triple: &TriplePattern) -> PlanResult<Self> {
        let matched = self
            .query
            .triples()
            .contains(triple)
            .then(|| self.query.matched_triple(triple))
            .flatten()
            .cloned();
        let Some(matched) = matched else {
            return Err(PlanningError::invalid_match(format!(
                "Non-exclusive triple {triple} is not part of the query"
            )));
        };
        self.non_exclusive.insert(&matched)?;
        Ok(self)
    }

    /// Declares alternatives for the exclusive group at `group_index`.
    ///
    /// Every alternative must match exactly the triples of the group.
    pub fn add_group_alternatives(
        mut self,
        group_index: usize,
        alternatives: impl IntoIterator<Item = Query>,
    ) -> PlanResult<Self> {
        let Some(group) = self.exclusive_groups.get(group_index) else {
            return Err(PlanningError::invalid_match(format!(
                "Unknown exclusive group {group_index}"
            )));
        };
        let triples = group.triples().clone();

        let alternatives = alternatives.into_iter().collect::<Vec<_>>();
        for alternative in &alternatives {
            self.check_alternative(alternative, &triples)?;
        }
        if let Some(group) = self.exclusive_groups.get_mut(group_index) {
            group.alternatives.extend(alternatives);
        }
        Ok(self)
    }

    /// Declares alternatives for a single triple of the query.
    ///
    /// Every alternative must match exactly `triple`.
    pub fn add_triple_alternatives(
        mut self,
        triple: &TriplePattern,
        alternatives: impl IntoIterator<Item = Query>,
    ) -> PlanResult<Self> {
        let Some(matched) = self.query.matched_triple(triple).cloned() else {
            return Err(PlanningError::invalid_match(format!(
                "Triple {triple} with alternatives is not part of the query"
            )));
        };
        let triples = TripleSet::from_elements(self.query.universe().triples(), [&matched])?;

        let alternatives = alternatives.into_iter().collect::<Vec<_>>();
        for alternative in &alternatives {
            self.check_alternative(alternative, &triples)?;
        }
        self.triple_alternatives
            .entry(matched)
            .or_default()
            .extend(alternatives);
        Ok(self)
    }

    /// Builds the [MatchResult].
    pub fn build(self) -> PlanResult<MatchResult> {
        let mut in_groups = self.query.universe().empty_triples();
        for group in &self.exclusive_groups {
            in_groups.union_with(group.triples())?;
        }

        let relevant = in_groups.union(&self.non_exclusive)?;
        let non_exclusive = self.non_exclusive.difference(&in_groups)?;

        Ok(MatchResult {
            query: self.query,
            source: self.source,
            relevant,
            exclusive_groups: self.exclusive_groups,
            non_exclusive,
            triple_alternatives: self.triple_alternatives,
        })
    }

    fn check_drawn_from_query(&self, query: &Query) -> PlanResult<()> {
        if !query.universe().is_same(self.query.universe()) {
            return Err(PlanningError::UniverseMismatch(format!(
                "Query {query} was not created for the matched query"
            )));
        }
        if !query.matched_triples().is_subset(self.query.matched_triples()) {
            return Err(PlanningError::invalid_match(format!(
                "Query {query} matches triples that are not part of the matched query"
            )));
        }
        Ok(())
    }

    fn check_alternative(&self, alternative: &Query, triples: &TripleSet) -> PlanResult<()> {
        self.check_drawn_from_query(alternative)?;
        if alternative.matched_triples() != triples {
            return Err(PlanningError::invalid_match(format!(
                "Alternative {alternative} must match exactly {triples}"
            )));
        }
        Ok(())
    }
}
