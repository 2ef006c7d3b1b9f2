//! Traversal and rewriting.
//!
//! [`Visitor`] is read-only double dispatch: one method per node kind,
//! selected by [`Expression::accept`]. [`Mapper`] consumes a tree and returns
//! a rewritten one; every hook defaults to rebuilding the node from its mapped
//! children, so an implementation overrides only the kinds it cares about.

use crate::error::ExprResult;
use crate::value::Value;

use super::ast::{
    BinaryOperator, Comprehension, Expression, FieldName, FunctionCall, Identifier,
    UnaryOperator,
};
use super::like::Like;
use super::subquery::Subquery;

pub trait Visitor {
    type Output;

    fn visit_constant(&mut self, value: &Value) -> ExprResult<Self::Output>;
    fn visit_identifier(&mut self, ident: &Identifier) -> ExprResult<Self::Output>;
    fn visit_self(&mut self) -> ExprResult<Self::Output>;
    fn visit_field(&mut self, base: &Expression, name: &FieldName) -> ExprResult<Self::Output>;
    fn visit_element(&mut self, base: &Expression, index: &Expression)
        -> ExprResult<Self::Output>;
    fn visit_array_construct(&mut self, elements: &[Expression]) -> ExprResult<Self::Output>;
    fn visit_object_construct(
        &mut self,
        members: &[(String, Expression)],
    ) -> ExprResult<Self::Output>;
    fn visit_binary(
        &mut self,
        op: BinaryOperator,
        left: &Expression,
        right: &Expression,
    ) -> ExprResult<Self::Output>;
    fn visit_unary(&mut self, op: UnaryOperator, operand: &Expression)
        -> ExprResult<Self::Output>;
    fn visit_and(&mut self, terms: &[Expression]) -> ExprResult<Self::Output>;
    fn visit_or(&mut self, terms: &[Expression]) -> ExprResult<Self::Output>;
    fn visit_like(&mut self, like: &Like) -> ExprResult<Self::Output>;
    fn visit_between(
        &mut self,
        item: &Expression,
        low: &Expression,
        high: &Expression,
    ) -> ExprResult<Self::Output>;
    fn visit_case(
        &mut self,
        operand: Option<&Expression>,
        when_clauses: &[(Expression, Expression)],
        else_clause: Option<&Expression>,
    ) -> ExprResult<Self::Output>;
    fn visit_comprehension(&mut self, comprehension: &Comprehension)
        -> ExprResult<Self::Output>;
    fn visit_exists(&mut self, operand: &Expression) -> ExprResult<Self::Output>;
    fn visit_function(&mut self, call: &FunctionCall) -> ExprResult<Self::Output>;
    fn visit_subquery(&mut self, subquery: &Subquery) -> ExprResult<Self::Output>;
}

impl Expression {
    pub fn accept<V: Visitor + ?Sized>(&self, visitor: &mut V) -> ExprResult<V::Output> {
        match self {
            Expression::Constant(v) => visitor.visit_constant(v),
            Expression::Identifier(ident) => visitor.visit_identifier(ident),
            Expression::SelfRef => visitor.visit_self(),
            Expression::Field(base, name) => visitor.visit_field(base, name),
            Expression::Element(base, index) => visitor.visit_element(base, index),
            Expression::ArrayConstruct(elements) => visitor.visit_array_construct(elements),
            Expression::ObjectConstruct(members) => visitor.visit_object_construct(members),
            Expression::BinaryOp { left, op, right } => visitor.visit_binary(*op, left, right),
            Expression::UnaryOp { op, operand } => visitor.visit_unary(*op, operand),
            Expression::And(terms) => visitor.visit_and(terms),
            Expression::Or(terms) => visitor.visit_or(terms),
            Expression::Like(like) => visitor.visit_like(like),
            Expression::Between { item, low, high } => visitor.visit_between(item, low, high),
            Expression::Case {
                operand,
                when_clauses,
                else_clause,
            } => visitor.visit_case(operand.as_deref(), when_clauses, else_clause.as_deref()),
            Expression::Comprehension(c) => visitor.visit_comprehension(c),
            Expression::Exists(operand) => visitor.visit_exists(operand),
            Expression::Function(call) => visitor.visit_function(call),
            Expression::Subquery(sq) => visitor.visit_subquery(sq),
        }
    }
}

/// Whole-tree rewrite pass.
pub trait Mapper {
    fn map(&mut self, expr: Expression) -> ExprResult<Expression> {
        match expr {
            Expression::Constant(v) => self.map_constant(v),
            Expression::Identifier(ident) => self.map_identifier(ident),
            Expression::SelfRef => self.map_self(),
            Expression::Like(like) => self.map_like(*like),
            Expression::Comprehension(c) => self.map_comprehension(*c),
            Expression::Function(call) => self.map_function(call),
            Expression::Subquery(sq) => self.map_subquery(*sq),
            other => self.map_operator(other),
        }
    }

    fn map_constant(&mut self, value: Value) -> ExprResult<Expression> {
        Ok(Expression::Constant(value))
    }

    fn map_identifier(&mut self, ident: Identifier) -> ExprResult<Expression> {
        Ok(Expression::Identifier(ident))
    }

    fn map_self(&mut self) -> ExprResult<Expression> {
        Ok(Expression::SelfRef)
    }

    fn map_like(&mut self, like: Like) -> ExprResult<Expression> {
        like.map_children(self)
    }

    fn map_comprehension(&mut self, comprehension: Comprehension) -> ExprResult<Expression> {
        comprehension.map_children(self)
    }

    fn map_function(&mut self, call: FunctionCall) -> ExprResult<Expression> {
        call.map_children(self)
    }

    /// Subqueries own their scope; the default pass leaves them alone.
    fn map_subquery(&mut self, subquery: Subquery) -> ExprResult<Expression> {
        Ok(Expression::Subquery(Box::new(subquery)))
    }

    /// Every remaining node kind.
    fn map_operator(&mut self, expr: Expression) -> ExprResult<Expression> {
        expr.map_children(self)
    }
}

/// Outcome of a per-node rewrite function.
pub enum Rewrite {
    /// Use this node as-is and do not descend into it.
    Replace(Expression),
    /// Keep this node and continue into its children.
    Descend(Expression),
}

/// Mapper driven by a closure invoked on every node, top down.
pub struct FnMapper<F> {
    rewrite: F,
}

impl<F> FnMapper<F>
where
    F: FnMut(Expression) -> ExprResult<Rewrite>,
{
    pub fn new(rewrite: F) -> Self {
        Self { rewrite }
    }
}

impl<F> Mapper for FnMapper<F>
where
    F: FnMut(Expression) -> ExprResult<Rewrite>,
{
    fn map(&mut self, expr: Expression) -> ExprResult<Expression> {
        match (self.rewrite)(expr)? {
            Rewrite::Replace(e) => Ok(e),
            Rewrite::Descend(e) => e.map_children(self),
        }
    }
}

/// Replace every subtree with a known static value by that constant.
pub fn fold_constants(expr: Expression) -> ExprResult<Expression> {
    let mut folder = FnMapper::new(|expr: Expression| {
        if matches!(expr, Expression::Constant(_)) {
            return Ok(Rewrite::Replace(expr));
        }
        match expr.static_value() {
            Some(v) => Ok(Rewrite::Replace(Expression::Constant(v))),
            None => Ok(Rewrite::Descend(expr)),
        }
    });
    folder.map(expr)
}
