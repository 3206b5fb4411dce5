use rdf_federation_logical::plan::{PlanNode, PlanNodeRef};
use rdf_federation_model::{
    Expression, NamedNode, Query, SourceDescription, SourceRef, SparqlFilter, TriplePattern,
    Variable,
};
use std::sync::Arc;

pub fn iri(name: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://ex/{name}"))
}

/// Creates the triple pattern `?s <http://ex/p> ?o`.
pub fn triple(s: &str, p: &str, o: &str) -> TriplePattern {
    TriplePattern {
        subject: Variable::new_unchecked(s).into(),
        predicate: iri(p).into(),
        object: Variable::new_unchecked(o).into(),
    }
}

pub fn source(name: &str) -> SourceRef {
    SourceDescription::new(name).into_ref()
}

pub fn cartesian_source(name: &str) -> SourceRef {
    SourceDescription::new(name)
        .with_cartesian_support(true)
        .into_ref()
}

/// Creates a leaf that evaluates `triples` of `root` at `source`.
pub fn leaf(root: &Query, triples: &[TriplePattern], source: &SourceRef) -> PlanNodeRef {
    PlanNode::query(root.restrict(triples).unwrap(), Arc::clone(source)).unwrap()
}

/// Creates the filter `sameTerm(?variable, <http://ex/Alice>)`.
pub fn alice_filter(variable: &str) -> SparqlFilter {
    SparqlFilter::new(Expression::SameTerm(
        Box::new(Expression::Variable(Variable::new_unchecked(variable))),
        Box::new(Expression::NamedNode(iri("Alice"))),
    ))
}
