use crate::plan::{PlanNode, PlanNodeKind};
use itertools::Itertools;
use std::fmt::{Display, Formatter};

/// Writes a multi-line, indented representation of `node`.
///
/// ```text
/// Conjunction [DISTINCT]
///   Query[A]: ?x <http://ex/p> ?y
///   Union
///     Query[B]: ?y <http://ex/q> ?z
///     Query[C]: ?y <http://ex/q> ?z
/// ```
fn fmt_indented(node: &PlanNode, f: &mut Formatter<'_>, depth: usize) -> std::fmt::Result {
    write!(f, "{:indent$}", "", indent = depth * 2)?;
    match node.kind() {
        PlanNodeKind::Query { query, source } => {
            write!(f, "Query[{}]: {}", source.name(), query)?;
        }
        PlanNodeKind::UnassignedQuery { query } => write!(f, "Query[?]: {query}")?,
        PlanNodeKind::Empty { variables, .. } => {
            write!(f, "Empty ({})", variables.iter().join(" "))?;
        }
        kind => f.write_str(kind.name())?,
    }

    if !node.modifiers().is_empty() {
        write!(f, " [{}]", node.modifiers())?;
    }

    for child in node.children() {
        writeln!(f)?;
        fmt_indented(child, f, depth + 1)?;
    }
    Ok(())
}

impl Display for PlanNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fmt_indented(self, f, 0)
    }
}
