//! Static analysis: constant folding values, equivalence and dependency.
//!
//! `equivalent_to` must never report two expressions as equivalent when they
//! can evaluate differently. When in doubt it answers `false`.

use chrono::{DateTime, Utc};

use crate::error::ExprResult;
use crate::value::Value;

use super::ast::Expression;
use super::context::{parse_path, Context};
use super::evaluate::EvalScope;
use super::subquery::Subquery;

/// Context for folding static subtrees. Carries no caches and allocates
/// nothing; static subtrees never read the clock or run a subquery.
struct FoldContext;

impl Context for FoldContext {
    fn now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::default()
    }

    fn parse(&self, text: &str) -> ExprResult<Expression> {
        parse_path(text)
    }

    fn evaluate_subquery(&self, subquery: &Subquery, scope: &EvalScope<'_>) -> ExprResult<Value> {
        subquery.execute(scope, self)
    }
}

impl Expression {
    /// True when the subtree depends on neither the input item nor any
    /// volatile source.
    pub fn is_static(&self) -> bool {
        match self {
            Expression::Constant(_) => true,
            Expression::Identifier(_) | Expression::SelfRef | Expression::Subquery(_) => false,
            Expression::Function(call) if call.spec().volatile => false,
            _ => self.children().iter().all(|c| c.is_static()),
        }
    }

    /// The value this node always produces, if it can be known before
    /// evaluation.
    ///
    /// A MISSING constant operand decides the result of a node that propagates
    /// MISSING even when other operands are data-dependent.
    pub fn static_value(&self) -> Option<Value> {
        match self {
            Expression::Constant(v) => return Some(v.clone()),
            Expression::Identifier(_) | Expression::SelfRef | Expression::Subquery(_) => {
                return None
            }
            Expression::Function(call) if call.spec().volatile => return None,
            _ => {}
        }

        // one evaluation per maximal static subtree
        if self.is_static() {
            return self.evaluate(&Value::Missing, &FoldContext).ok();
        }

        let propagates_missing = self.propagates_missing();
        let mut unknown = false;
        for child in self.children() {
            match child.static_value() {
                None => unknown = true,
                Some(Value::Missing) if propagates_missing => return Some(Value::Missing),
                Some(_) => {}
            }
        }
        if unknown {
            return None;
        }
        self.evaluate(&Value::Missing, &FoldContext).ok()
    }

    /// Conservative semantic equality between two expressions.
    pub fn equivalent_to(&self, other: &Expression) -> bool {
        if let (Some(a), Some(b)) = (self.static_value(), other.static_value()) {
            return a.equivalent_to(&b);
        }

        let same_shape = match (self, other) {
            (Expression::Identifier(a), Expression::Identifier(b)) => {
                return a.name == b.name && a.case_insensitive == b.case_insensitive
            }
            (Expression::SelfRef, Expression::SelfRef) => return true,
            (Expression::Subquery(_), _) | (_, Expression::Subquery(_)) => return false,
            (Expression::Field(_, a), Expression::Field(_, b)) => a == b,
            (Expression::Element(..), Expression::Element(..)) => true,
            (Expression::ArrayConstruct(_), Expression::ArrayConstruct(_)) => true,
            (Expression::ObjectConstruct(a), Expression::ObjectConstruct(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|((x, _), (y, _))| x == y)
            }
            (
                Expression::BinaryOp { op: a, .. },
                Expression::BinaryOp { op: b, .. },
            ) => a == b,
            (Expression::UnaryOp { op: a, .. }, Expression::UnaryOp { op: b, .. }) => a == b,
            (Expression::And(_), Expression::And(_)) | (Expression::Or(_), Expression::Or(_)) => {
                true
            }
            (Expression::Like(a), Expression::Like(b)) => {
                a.escape().is_some() == b.escape().is_some()
            }
            (Expression::Between { .. }, Expression::Between { .. }) => true,
            (
                Expression::Case {
                    operand: oa,
                    when_clauses: wa,
                    else_clause: ea,
                },
                Expression::Case {
                    operand: ob,
                    when_clauses: wb,
                    else_clause: eb,
                },
            ) => {
                oa.is_some() == ob.is_some()
                    && wa.len() == wb.len()
                    && ea.is_some() == eb.is_some()
            }
            (Expression::Comprehension(a), Expression::Comprehension(b)) => {
                a.kind == b.kind
                    && a.when.is_some() == b.when.is_some()
                    && a.name_mapping.is_some() == b.name_mapping.is_some()
                    && a.bindings.len() == b.bindings.len()
                    && a.bindings.iter().zip(&b.bindings).all(|(x, y)| {
                        x.variable == y.variable
                            && x.name_variable == y.name_variable
                            && x.is_static == y.is_static
                    })
            }
            (Expression::Exists(_), Expression::Exists(_)) => true,
            (Expression::Function(a), Expression::Function(b)) => {
                a.name() == b.name() && !a.spec().volatile
            }
            _ => false,
        };

        if !same_shape {
            return false;
        }
        let (ca, cb) = (self.children(), other.children());
        ca.len() == cb.len() && ca.iter().zip(cb.iter()).all(|(x, y)| x.equivalent_to(y))
    }

    /// True when `other` occurs in this tree (up to equivalence). Static
    /// expressions are never dependencies.
    pub fn depends_on(&self, other: &Expression) -> bool {
        if other.static_value().is_some() {
            return false;
        }
        self.equivalent_to(other) || self.children().iter().any(|c| c.depends_on(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::bindings::Binding;
    use serde_json::json;

    #[test]
    fn test_static_value() {
        let expr = Expression::add(Expression::constant(1i64), Expression::constant(2i64));
        assert_eq!(expr.static_value(), Some(Value::from(3i64)));
        assert!(expr.is_static());

        let expr = Expression::add(Expression::ident("a"), Expression::constant(2i64));
        assert_eq!(expr.static_value(), None);
        assert!(!expr.is_static());
    }

    #[test]
    fn test_static_missing_short_circuits() {
        let expr = Expression::add(Expression::ident("a"), Expression::missing());
        assert_eq!(expr.static_value(), Some(Value::Missing));

        // conditional nodes do not short-circuit
        let expr = Expression::or(vec![Expression::ident("a"), Expression::missing()]);
        assert_eq!(expr.static_value(), None);
    }

    #[test]
    fn test_fold_context_parses_paths() {
        let expr = Expression::function(
            "OBJECT_PATH",
            vec![
                Expression::constant(Value::from(json!({"a": {"b": 7}}))),
                Expression::constant("a.b"),
            ],
        )
        .unwrap();
        assert_eq!(expr.static_value(), Some(Value::from(7i64)));
    }

    #[test]
    fn test_volatile_never_static() {
        let now = Expression::function("NOW_MILLIS", vec![]).unwrap();
        assert_eq!(now.static_value(), None);
        assert!(!now.is_static());
        assert!(!now.equivalent_to(&now.clone()));
    }

    #[test]
    fn test_equivalence_of_constants() {
        let a = Expression::add(Expression::constant(1i64), Expression::constant(1i64));
        let b = Expression::constant(2.0);
        assert!(a.equivalent_to(&b));
        assert!(!a.equivalent_to(&Expression::constant(3i64)));
    }

    #[test]
    fn test_structural_equivalence() {
        let a = Expression::eq(
            Expression::field(Expression::ident("b"), "x"),
            Expression::constant(1i64),
        );
        let b = Expression::eq(
            Expression::field(Expression::ident("b"), "x"),
            Expression::constant(1.0),
        );
        let c = Expression::eq(
            Expression::field(Expression::ident("b"), "y"),
            Expression::constant(1i64),
        );
        let d = Expression::lt(
            Expression::field(Expression::ident("b"), "x"),
            Expression::constant(1i64),
        );
        assert!(a.equivalent_to(&b));
        assert!(!a.equivalent_to(&c));
        assert!(!a.equivalent_to(&d));
    }

    #[test]
    fn test_comprehension_equivalence_checks_bindings() {
        let body = Expression::gt(Expression::ident("v"), Expression::constant(1i64));
        let a = Expression::any(vec![Binding::new("v", Expression::ident("arr"))], body.clone());
        let b = Expression::any(vec![Binding::new("w", Expression::ident("arr"))], body.clone());
        let c = Expression::every(vec![Binding::new("v", Expression::ident("arr"))], body);
        assert!(a.equivalent_to(&a.clone()));
        assert!(!a.equivalent_to(&b));
        assert!(!a.equivalent_to(&c));
    }

    #[test]
    fn test_subqueries_never_equivalent() {
        use crate::expression::subquery::Subquery;
        let sq = Expression::subquery(Subquery::new(
            Expression::ident("s"),
            Expression::constant(Value::from(json!([1]))),
            "s",
        ));
        assert!(!sq.equivalent_to(&sq.clone()));
    }

    #[test]
    fn test_depends_on() {
        let term = Expression::field(Expression::ident("b"), "x");
        let expr = Expression::and(vec![
            Expression::eq(term.clone(), Expression::constant(1i64)),
            Expression::ident("c"),
        ]);
        assert!(expr.depends_on(&term));
        assert!(!expr.depends_on(&Expression::field(Expression::ident("b"), "y")));
        assert!(!expr.depends_on(&Expression::constant(1i64)));
    }
}
