//! The algebra of federated query plans and the rules that rewrite them.
//!
//! A plan is a tree of [PlanNode](plan::PlanNode)s. Its leaves are queries that are sent to a
//! source, while inner nodes combine their solutions. The [PlanRewriter] turns the initial plan of
//! a decomposition, a conjunction of leaves, into an executable tree of joins, unions, and
//! cartesian products.

pub mod join;
pub mod plan;
mod rewriter;
pub mod rules;
mod verify;

pub use rewriter::{create_rewrite_rules, PlanRewriter};
pub use verify::verify_plan;
