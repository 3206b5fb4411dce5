use thiserror::Error;

/// The result type used throughout the planner.
pub type PlanResult<T> = Result<T, PlanningError>;

/// An error raised while decomposing a query or rewriting a federated plan.
///
/// Most variants indicate a programming error in a collaborator (e.g., a matcher that reports a
/// triple that is not part of the query) and are raised as early as possible. Unsafe rewrite
/// opportunities are *not* errors; rules simply keep the input plan in these cases.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlanningError {
    /// A set operation referenced an element that is not part of the shared universe.
    #[error("Element {element} is not part of the universe")]
    ElementNotInUniverse {
        /// The element, formatted for display.
        element: String,
    },
    /// A match result violates its construction invariants.
    #[error("Invalid match result: {0}")]
    InvalidMatch(String),
    /// A triple of a query is neither part of the universe nor annotated with a matched triple.
    #[error("Triple {triple} matches no triple of the query universe")]
    UnmatchedTriple {
        /// The triple, formatted for display.
        triple: String,
    },
    /// Two match results were ingested for the same source.
    #[error("A match result for source {0} was already ingested")]
    DuplicateMatch(String),
    /// A source index is out of range for the current decomposition.
    #[error("Unknown source index {0}")]
    UnknownSource(usize),
    /// Two objects that must share a universe do not.
    #[error("Universe mismatch: {0}")]
    UniverseMismatch(String),
    /// A plan node could not be constructed.
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),
    /// The rewriting pipeline ended with a conjunction that was not replaced by a join tree.
    #[error("The plan still contains an unordered conjunction (node {0})")]
    UnorderedConjunction(u64),
    /// The worker pool used for parallel agglutination could not be created.
    #[error("Could not create worker pool: {0}")]
    ThreadPool(String),
    /// An internal invariant was violated. This indicates a bug in the planner.
    #[error("Internal planner error: {0}")]
    Internal(String),
}

impl PlanningError {
    /// Creates a [PlanningError::ElementNotInUniverse] for the given element.
    pub fn not_in_universe(element: &impl std::fmt::Display) -> Self {
        Self::ElementNotInUniverse {
            element: element.to_string(),
        }
    }

    /// Creates a [PlanningError::InvalidMatch] from a printable message.
    pub fn invalid_match(msg: impl Into<String>) -> Self {
        Self::InvalidMatch(msg.into())
    }

    /// Creates a [PlanningError::Internal] from a printable message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Returns early with a [PlanningError::Internal] error.
#[macro_export]
macro_rules! internal_err {
    ($($arg:tt)*) => {
        return Err($crate::PlanningError::Internal(format!($($arg)*)))
    };
}

/// Returns early with a [PlanningError::InvalidPlan] error.
#[macro_export]
macro_rules! plan_err {
    ($($arg:tt)*) => {
        return Err($crate::PlanningError::InvalidPlan(format!($($arg)*)))
    };
}
