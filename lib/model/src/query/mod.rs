mod annotations;
mod expression;
mod modifiers;
#[allow(clippy::module_inception, reason = "Query is the central type of this module")]
mod query;
mod universe;

pub use annotations::*;
pub use expression::*;
pub use modifiers::*;
pub use query::*;
pub use universe::*;
