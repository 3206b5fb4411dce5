use crate::query::expression::expression_variables;
use crate::{Expression, GroundTerm, Variable, VariableSet};
use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// A `FILTER` modifier together with the variables it references.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SparqlFilter {
    expression: Expression,
    variables: Vec<Variable>,
}

impl SparqlFilter {
    /// Creates a new [SparqlFilter].
    pub fn new(expression: Expression) -> Self {
        let variables = expression_variables(&expression);
        Self {
            expression,
            variables,
        }
    }

    /// Returns the filter expression.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Returns the variables referenced by the filter.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Returns whether every variable of the filter is part of `variables`.
    pub fn is_covered_by(&self, variables: &VariableSet) -> bool {
        self.variables.iter().all(|v| variables.contains(v))
    }
}

impl From<Expression> for SparqlFilter {
    fn from(value: Expression) -> Self {
        Self::new(value)
    }
}

impl Display for SparqlFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FILTER({})", self.expression)
    }
}

/// A `VALUES` modifier that binds variables to a fixed table of terms.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValuesModifier {
    variables: Vec<Variable>,
    bindings: Vec<Vec<Option<GroundTerm>>>,
}

impl ValuesModifier {
    /// Creates a new [ValuesModifier].
    pub fn new(variables: Vec<Variable>, bindings: Vec<Vec<Option<GroundTerm>>>) -> Self {
        Self {
            variables,
            bindings,
        }
    }

    /// Returns the bound variables.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Returns the rows of the table.
    pub fn bindings(&self) -> &[Vec<Option<GroundTerm>>] {
        &self.bindings
    }

    /// Returns whether every variable of the table is part of `variables`.
    pub fn is_covered_by(&self, variables: &VariableSet) -> bool {
        self.variables.iter().all(|v| variables.contains(v))
    }
}

impl Display for ValuesModifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VALUES({}; {} rows)",
            self.variables.iter().join(" "),
            self.bindings.len()
        )
    }
}

/// The solution modifiers attached to a query or a plan node.
///
/// Filters are kept in insertion order and never duplicated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Modifiers {
    filters: Vec<SparqlFilter>,
    projection: Option<Vec<Variable>>,
    values: Option<ValuesModifier>,
    distinct: bool,
    limit: Option<usize>,
    ask: bool,
    optional: bool,
}

impl Modifiers {
    /// Creates an empty set of modifiers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether no modifier is set.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty() && self.only_filters()
    }

    /// Returns whether filters are the only modifiers.
    pub fn only_filters(&self) -> bool {
        self.projection.is_none()
            && self.values.is_none()
            && !self.distinct
            && self.limit.is_none()
            && !self.ask
            && !self.optional
    }

    /// Returns the filters.
    pub fn filters(&self) -> &[SparqlFilter] {
        &self.filters
    }

    /// Adds a filter. Returns false if the filter was already present.
    pub fn add_filter(&mut self, filter: SparqlFilter) -> bool {
        if self.filters.contains(&filter) {
            return false;
        }
        self.filters.push(filter);
        true
    }

    /// Removes and returns all filters.
    pub fn take_filters(&mut self) -> Vec<SparqlFilter> {
        std::mem::take(&mut self.filters)
    }

    /// Returns the projection, if any.
    pub fn projection(&self) -> Option<&[Variable]> {
        self.projection.as_deref()
    }

    /// Sets the projection.
    pub fn set_projection(&mut self, projection: Option<Vec<Variable>>) {
        self.projection = projection.map(|p| p.into_iter().unique().collect());
    }

    /// Returns the values modifier, if any.
    pub fn values(&self) -> Option<&ValuesModifier> {
        self.values.as_ref()
    }

    /// Sets the values modifier.
    pub fn set_values(&mut self, values: Option<ValuesModifier>) {
        self.values = values;
    }

    /// Removes and returns the values modifier.
    pub fn take_values(&mut self) -> Option<ValuesModifier> {
        self.values.take()
    }

    /// Returns whether duplicates must be removed.
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Sets the distinct flag.
    pub fn set_distinct(&mut self, distinct: bool) {
        self.distinct = distinct;
    }

    /// Returns the limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Sets the limit.
    pub fn set_limit(&mut self, limit: Option<usize>) {
        self.limit = limit;
    }

    /// Returns whether only the existence of a solution is of interest.
    pub fn is_ask(&self) -> bool {
        self.ask
    }

    /// Sets the ask flag.
    pub fn set_ask(&mut self, ask: bool) {
        self.ask = ask;
    }

    /// Returns whether the node is the optional side of a left join.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Sets the optional flag.
    pub fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    /// Returns all variables referenced by the modifiers.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.filters
            .iter()
            .flat_map(|f| f.variables())
            .chain(self.projection.iter().flatten())
            .chain(self.values.iter().flat_map(|v| v.variables()))
    }

    /// Merges `self` with `other`.
    ///
    /// Returns [None] if the modifiers conflict: both have a projection, a value table or a limit
    /// and these differ, or exactly one of them is optional or an ask query.
    #[must_use]
    pub fn merge(&self, other: &Modifiers) -> Option<Modifiers> {
        fn merge_option<T: Clone + PartialEq>(
            lhs: Option<&T>,
            rhs: Option<&T>,
        ) -> Result<Option<T>, ()> {
            match (lhs, rhs) {
                (Some(lhs), Some(rhs)) if lhs != rhs => Err(()),
                (lhs, rhs) => Ok(lhs.or(rhs).cloned()),
            }
        }

        if self.ask != other.ask || self.optional != other.optional {
            return None;
        }

        let mut result = self.clone();
        result.projection =
            merge_option(self.projection.as_ref(), other.projection.as_ref()).ok()?;
        result.values = merge_option(self.values.as_ref(), other.values.as_ref()).ok()?;
        result.limit = merge_option(self.limit.as_ref(), other.limit.as_ref()).ok()?;
        result.distinct |= other.distinct;
        for filter in &other.filters {
            result.add_filter(filter.clone());
        }
        Some(result)
    }
}

impl Display for Modifiers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.ask {
            parts.push("ASK".to_owned());
        }
        if self.distinct {
            parts.push("DISTINCT".to_owned());
        }
        if self.optional {
            parts.push("OPTIONAL".to_owned());
        }
        if let Some(projection) = &self.projection {
            parts.push(format!("PROJECT({})", projection.iter().join(" ")));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("LIMIT {limit}"));
        }
        if let Some(values) = &self.values {
            parts.push(values.to_string());
        }
        parts.extend(self.filters.iter().map(ToString::to_string));
        write!(f, "{}", parts.join(", "))
    }
}
