use crate::{NamedNodePattern, TermPattern, TriplePattern, Variable};
use spargebra::algebra::Expression;

/// Returns the variables of a triple pattern in subject, predicate, object order.
///
/// Blank nodes are treated as constants.
pub fn triple_variables(triple: &TriplePattern) -> impl Iterator<Item = &Variable> {
    let subject = match &triple.subject {
        TermPattern::Variable(v) => Some(v),
        _ => None,
    };
    let predicate = match &triple.predicate {
        NamedNodePattern::Variable(v) => Some(v),
        NamedNodePattern::NamedNode(_) => None,
    };
    let object = match &triple.object {
        TermPattern::Variable(v) => Some(v),
        _ => None,
    };
    subject.into_iter().chain(predicate).chain(object)
}

/// Returns the variables referenced by `expression` in order of their first occurrence.
///
/// Variables that are in scope of an `EXISTS` pattern are included.
pub fn expression_variables(expression: &Expression) -> Vec<Variable> {
    let mut variables = Vec::new();
    collect_variables(expression, &mut variables);
    variables
}

fn collect_variables(expression: &Expression, variables: &mut Vec<Variable>) {
    match expression {
        Expression::NamedNode(_) | Expression::Literal(_) => {}
        Expression::Variable(var) | Expression::Bound(var) => push_unique(variables, var),
        Expression::Or(lhs, rhs)
        | Expression::And(lhs, rhs)
        | Expression::Equal(lhs, rhs)
        | Expression::SameTerm(lhs, rhs)
        | Expression::Greater(lhs, rhs)
        | Expression::GreaterOrEqual(lhs, rhs)
        | Expression::Less(lhs, rhs)
        | Expression::LessOrEqual(lhs, rhs)
        | Expression::Add(lhs, rhs)
        | Expression::Subtract(lhs, rhs)
        | Expression::Multiply(lhs, rhs)
        | Expression::Divide(lhs, rhs) => {
            collect_variables(lhs, variables);
            collect_variables(rhs, variables);
        }
        Expression::In(lhs, rhs) => {
            collect_variables(lhs, variables);
            for arg in rhs {
                collect_variables(arg, variables);
            }
        }
        Expression::UnaryPlus(inner) | Expression::UnaryMinus(inner) | Expression::Not(inner) => {
            collect_variables(inner, variables);
        }
        Expression::Exists(pattern) => {
            let mut in_scope = Vec::new();
            pattern.on_in_scope_variable(|v| in_scope.push(v.clone()));
            for var in &in_scope {
                push_unique(variables, var);
            }
        }
        Expression::If(test, if_true, if_false) => {
            collect_variables(test, variables);
            collect_variables(if_true, variables);
            collect_variables(if_false, variables);
        }
        Expression::Coalesce(args) | Expression::FunctionCall(_, args) => {
            for arg in args {
                collect_variables(arg, variables);
            }
        }
    }
}

fn push_unique(variables: &mut Vec<Variable>, variable: &Variable) {
    if !variables.contains(variable) {
        variables.push(variable.clone());
    }
}
