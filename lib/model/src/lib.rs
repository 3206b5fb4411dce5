//! The data model of the federated planner.
//!
//! RDF terms, triple patterns and expressions are re-exported from Oxigraph's data model. On top
//! of these, this crate defines the shared universe index ([IndexUniverse], [IndexSubset]), the
//! conjunctive [Query] that is sent to a source, and the [Source] capability description.

mod error;
mod index;
mod query;
mod source;

pub use error::*;
pub use index::*;
pub use query::*;
pub use source::*;

// Re-export some oxrdf and spargebra types.
pub use oxrdf::{BlankNode, Literal, NamedNode, Variable, VariableNameParseError};
pub use spargebra::algebra::{Expression, Function, GraphPattern};
pub use spargebra::term::{GroundTerm, NamedNodePattern, TermPattern, TriplePattern};
