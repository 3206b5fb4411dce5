mod explain;
mod locked;
mod node;
mod transform;

pub use locked::LockedNodes;
pub use node::{NodeId, PlanNode, PlanNodeKind, PlanNodeRef};
pub(crate) use transform::rewrite_children;
pub use transform::{transform_down, transform_up};
