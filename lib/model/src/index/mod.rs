//! Indexed universes and bitset-backed subsets.
//!
//! Federated queries are small (tens to low hundreds of triples), but the planner recomputes
//! matched-triple and variable sets for many candidate plan shapes. Every element of a
//! decomposition is therefore assigned a stable position in an [IndexUniverse] and sets are
//! represented as bitsets over these positions ([IndexSubset]).

mod subset;
mod universe;

pub use subset::*;
pub use universe::*;

use crate::{TriplePattern, Variable};

/// A universe of triple patterns.
pub type TripleUniverse = IndexUniverse<TriplePattern>;
/// A set of triple patterns backed by a [TripleUniverse].
pub type TripleSet = IndexSubset<TriplePattern>;
/// A universe of variables.
pub type VariableUniverse = IndexUniverse<Variable>;
/// A set of variables backed by a [VariableUniverse].
pub type VariableSet = IndexSubset<Variable>;
