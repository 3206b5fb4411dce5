//! The decomposition engine of the federated planner.
//!
//! A [MatchResult] describes which triples of a query a single source can answer. An
//! [Agglutinator] combines the match results of all sources into the leaves of a federated plan.
//! Two strategies exist:
//! - [MergingAgglutinator] splits off the triples that only one source can answer and merges
//!   exclusive groups of the same source, yielding few, large leaves.
//! - [SimpleAgglutinator] creates one leaf per exclusive group and non-exclusive triple.

mod agglutination;
mod matching;

pub use agglutination::{
    create_agglutinator, Agglutinator, MergingAgglutinator, SimpleAgglutinator,
};
pub use matching::{ExclusiveGroup, MatchResult, MatchResultBuilder};
