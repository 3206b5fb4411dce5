use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;

/// A reference to a [Source].
pub type SourceRef = Arc<dyn Source>;

/// An independently queryable data source (e.g., a SPARQL endpoint).
///
/// The planner only needs to know the capabilities of a source. Sources are identified by their
/// name.
pub trait Source: Debug + Send + Sync {
    /// The name of the source.
    fn name(&self) -> &str;

    /// Returns whether the source can evaluate queries whose triples do not share a variable.
    fn supports_cartesian(&self) -> bool {
        false
    }
}

/// Returns whether `lhs` and `rhs` refer to the same source.
pub fn same_source(lhs: &dyn Source, rhs: &dyn Source) -> bool {
    lhs.name() == rhs.name()
}

/// A plain [Source] that is fully described by its name and capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceDescription {
    name: String,
    supports_cartesian: bool,
}

impl SourceDescription {
    /// Creates a new [SourceDescription] that does not support cartesian products.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supports_cartesian: false,
        }
    }

    /// Sets whether the source supports cartesian products.
    #[must_use]
    pub fn with_cartesian_support(mut self, supports_cartesian: bool) -> Self {
        self.supports_cartesian = supports_cartesian;
        self
    }

    /// Wraps this description into a [SourceRef].
    pub fn into_ref(self) -> SourceRef {
        Arc::new(self)
    }
}

impl Source for SourceDescription {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_cartesian(&self) -> bool {
        self.supports_cartesian
    }
}

impl Display for SourceDescription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}
