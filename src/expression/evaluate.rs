//! Expression evaluation.
//!
//! Evaluation walks the tree against one input item under three-valued
//! semantics: MISSING and NULL are ordinary results, never errors. Errors are
//! reserved for failures such as a malformed dynamic LIKE pattern.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde_json::Number;

use crate::error::ExprResult;
use crate::value::{number_from_f64, Value};

use super::ast::{BinaryOperator, Comprehension, ComprehensionKind, Expression, UnaryOperator};
use super::builtins;
use super::context::Context;

/// Variable frame for one level of evaluation.
///
/// The root frame holds the input item; comprehensions and subqueries push
/// child frames carrying their bound variables.
#[derive(Debug)]
pub struct EvalScope<'a> {
    item: &'a Value,
    variables: Vec<(String, Value)>,
    parent: Option<&'a EvalScope<'a>>,
}

impl<'a> EvalScope<'a> {
    pub fn root(item: &'a Value) -> Self {
        Self {
            item,
            variables: Vec::new(),
            parent: None,
        }
    }

    pub fn child(parent: &'a EvalScope<'a>) -> Self {
        Self {
            item: parent.item,
            variables: Vec::new(),
            parent: Some(parent),
        }
    }

    pub fn item(&self) -> &'a Value {
        self.item
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.variables.push((name.into(), value));
    }

    /// Innermost binding for `name`, if any frame declares it.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.parent.and_then(|p| p.variable(name)))
    }

    /// Resolve a bare name: bound variables first, then fields of the item.
    pub fn lookup(&self, name: &str, case_insensitive: bool) -> Value {
        if let Some(v) = self.variable(name) {
            return v.clone();
        }
        if case_insensitive {
            self.item.field_case_insensitive(name)
        } else {
            self.item.field(name)
        }
    }
}

impl Expression {
    /// Evaluate against `item` with no bound variables.
    pub fn evaluate(&self, item: &Value, ctx: &dyn Context) -> ExprResult<Value> {
        let scope = EvalScope::root(item);
        self.eval(&scope, ctx)
    }

    /// Evaluate within an existing variable scope.
    pub fn eval(&self, scope: &EvalScope<'_>, ctx: &dyn Context) -> ExprResult<Value> {
        match self {
            Expression::Constant(v) => Ok(v.clone()),
            Expression::Identifier(ident) => Ok(scope.lookup(&ident.name, ident.case_insensitive)),
            Expression::SelfRef => Ok(scope.item().clone()),
            Expression::Field(base, name) => {
                let base = base.eval(scope, ctx)?;
                Ok(if name.case_insensitive {
                    base.field_case_insensitive(&name.name)
                } else {
                    base.field(&name.name)
                })
            }
            Expression::Element(base, index) => {
                let base = base.eval(scope, ctx)?;
                let index = index.eval(scope, ctx)?;
                Ok(element(&base, &index))
            }
            Expression::ArrayConstruct(elements) => {
                let mut out = Vec::with_capacity(elements.len());
                for e in elements {
                    match e.eval(scope, ctx)? {
                        Value::Missing => out.push(Value::Null),
                        v => out.push(v),
                    }
                }
                Ok(Value::Array(out))
            }
            Expression::ObjectConstruct(members) => {
                let mut out = BTreeMap::new();
                for (name, e) in members {
                    let v = e.eval(scope, ctx)?;
                    if !v.is_missing() {
                        out.insert(name.clone(), v);
                    }
                }
                Ok(Value::Object(out))
            }
            Expression::BinaryOp { left, op, right } => {
                let l = left.eval(scope, ctx)?;
                let r = right.eval(scope, ctx)?;
                Ok(binary(*op, &l, &r))
            }
            Expression::UnaryOp { op, operand } => {
                let v = operand.eval(scope, ctx)?;
                Ok(unary(*op, v))
            }
            Expression::And(terms) => eval_and(terms, scope, ctx),
            Expression::Or(terms) => eval_or(terms, scope, ctx),
            Expression::Like(like) => like.eval(scope, ctx),
            Expression::Between { item, low, high } => {
                let item = item.eval(scope, ctx)?;
                let low = low.eval(scope, ctx)?;
                let high = high.eval(scope, ctx)?;
                Ok(between(&item, &low, &high))
            }
            Expression::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let operand = match operand {
                    Some(op) => Some(op.eval(scope, ctx)?),
                    None => None,
                };
                for (when, then) in when_clauses {
                    let w = when.eval(scope, ctx)?;
                    let hit = match &operand {
                        Some(op) => op.equals(&w) == Value::Boolean(true),
                        None => w.truth(),
                    };
                    if hit {
                        return then.eval(scope, ctx);
                    }
                }
                match else_clause {
                    Some(e) => e.eval(scope, ctx),
                    None => Ok(Value::Null),
                }
            }
            Expression::Comprehension(c) => eval_comprehension(c, scope, ctx),
            Expression::Exists(operand) => Ok(match operand.eval(scope, ctx)? {
                Value::Missing => Value::Missing,
                Value::Array(a) => Value::Boolean(!a.is_empty()),
                _ => Value::Null,
            }),
            Expression::Function(call) => builtins::evaluate(call, scope, ctx),
            Expression::Subquery(sq) => ctx.evaluate_subquery(sq, scope),
        }
    }
}

fn element(base: &Value, index: &Value) -> Value {
    match (base, index) {
        (Value::Missing, _) | (_, Value::Missing) => Value::Missing,
        (Value::Array(_), Value::Number(n)) => match n.as_i64() {
            Some(i) => base.index(i),
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 => base.index(f as i64),
                _ => Value::Null,
            },
        },
        (Value::Object(_), Value::String(name)) => base.field(name),
        (Value::Array(_), _) | (Value::Object(_), _) => Value::Null,
        _ => Value::Missing,
    }
}

fn unary(op: UnaryOperator, v: Value) -> Value {
    match op {
        UnaryOperator::Not => match v {
            Value::Missing | Value::Null => v,
            other => Value::Boolean(!other.truth()),
        },
        UnaryOperator::Negate => match v {
            Value::Missing | Value::Null => v,
            Value::Number(n) => match n.as_i64() {
                Some(i) => match i.checked_neg() {
                    Some(neg) => Value::Number(Number::from(neg)),
                    None => Value::Number(number_from_f64(-(i as f64))),
                },
                None => Value::Number(number_from_f64(-n.as_f64().unwrap_or(0.0))),
            },
            _ => Value::Null,
        },
        UnaryOperator::IsMissing => Value::Boolean(v.is_missing()),
        UnaryOperator::IsNotMissing => Value::Boolean(!v.is_missing()),
        UnaryOperator::IsNull => match v {
            Value::Missing => Value::Missing,
            other => Value::Boolean(other.is_null()),
        },
        UnaryOperator::IsNotNull => match v {
            Value::Missing => Value::Missing,
            other => Value::Boolean(!other.is_null()),
        },
        UnaryOperator::IsValued => Value::Boolean(!v.is_unknown()),
        UnaryOperator::IsNotValued => Value::Boolean(v.is_unknown()),
    }
}

pub(crate) fn binary(op: BinaryOperator, l: &Value, r: &Value) -> Value {
    if l.is_missing() || r.is_missing() {
        return Value::Missing;
    }

    match op {
        BinaryOperator::In | BinaryOperator::NotIn => {
            let found = match (l, r) {
                (_, Value::Array(items)) if !l.is_null() => {
                    items.iter().any(|item| l.equivalent_to(item))
                }
                _ => return Value::Null,
            };
            Value::Boolean(if op == BinaryOperator::In { found } else { !found })
        }
        _ if l.is_null() || r.is_null() => Value::Null,
        BinaryOperator::Equal => Value::Boolean(l.collate(r) == Ordering::Equal),
        BinaryOperator::NotEqual => Value::Boolean(l.collate(r) != Ordering::Equal),
        BinaryOperator::LessThan => Value::Boolean(l.collate(r) == Ordering::Less),
        BinaryOperator::LessThanOrEqual => Value::Boolean(l.collate(r) != Ordering::Greater),
        BinaryOperator::GreaterThan => Value::Boolean(l.collate(r) == Ordering::Greater),
        BinaryOperator::GreaterThanOrEqual => Value::Boolean(l.collate(r) != Ordering::Less),
        BinaryOperator::Concat => match (l, r) {
            (Value::String(a), Value::String(b)) => Value::String(format!("{}{}", a, b)),
            _ => Value::Null,
        },
        BinaryOperator::Add
        | BinaryOperator::Subtract
        | BinaryOperator::Multiply
        | BinaryOperator::Divide
        | BinaryOperator::Modulus => match (l, r) {
            (Value::Number(a), Value::Number(b)) => arithmetic(op, a, b),
            _ => Value::Null,
        },
    }
}

fn arithmetic(op: BinaryOperator, a: &Number, b: &Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        let exact = match op {
            BinaryOperator::Add => x.checked_add(y),
            BinaryOperator::Subtract => x.checked_sub(y),
            BinaryOperator::Multiply => x.checked_mul(y),
            BinaryOperator::Modulus => {
                if y == 0 {
                    return Value::Null;
                }
                x.checked_rem(y)
            }
            BinaryOperator::Divide => {
                if y == 0 {
                    return Value::Null;
                }
                // i64::MIN / -1 overflows both; either failing falls back to f64
                match (x.checked_rem(y), x.checked_div(y)) {
                    (Some(0), Some(q)) => Some(q),
                    _ => None,
                }
            }
            _ => None,
        };
        if let Some(n) = exact {
            return Value::Number(Number::from(n));
        }
    }

    let x = a.as_f64().unwrap_or(0.0);
    let y = b.as_f64().unwrap_or(0.0);
    let result = match op {
        BinaryOperator::Add => x + y,
        BinaryOperator::Subtract => x - y,
        BinaryOperator::Multiply => x * y,
        BinaryOperator::Divide | BinaryOperator::Modulus if y == 0.0 => return Value::Null,
        BinaryOperator::Divide => x / y,
        BinaryOperator::Modulus => x % y,
        _ => return Value::Null,
    };
    Value::Number(number_from_f64(result))
}

fn between(item: &Value, low: &Value, high: &Value) -> Value {
    if item.is_missing() || low.is_missing() || high.is_missing() {
        return Value::Missing;
    }
    if item.is_null() || low.is_null() || high.is_null() {
        return Value::Null;
    }
    Value::Boolean(item.collate(low) != Ordering::Less && item.collate(high) != Ordering::Greater)
}

/// FALSE dominates, then MISSING, then NULL.
fn eval_and(terms: &[Expression], scope: &EvalScope<'_>, ctx: &dyn Context) -> ExprResult<Value> {
    let mut missing = false;
    let mut null = false;
    for term in terms {
        match term.eval(scope, ctx)? {
            Value::Missing => missing = true,
            Value::Null => null = true,
            v if !v.truth() => return Ok(Value::Boolean(false)),
            _ => {}
        }
    }
    Ok(if missing {
        Value::Missing
    } else if null {
        Value::Null
    } else {
        Value::Boolean(true)
    })
}

/// TRUE dominates, then NULL, then MISSING.
fn eval_or(terms: &[Expression], scope: &EvalScope<'_>, ctx: &dyn Context) -> ExprResult<Value> {
    let mut missing = false;
    let mut null = false;
    for term in terms {
        match term.eval(scope, ctx)? {
            Value::Missing => missing = true,
            Value::Null => null = true,
            v if v.truth() => return Ok(Value::Boolean(true)),
            _ => {}
        }
    }
    Ok(if null {
        Value::Null
    } else if missing {
        Value::Missing
    } else {
        Value::Boolean(false)
    })
}

fn eval_comprehension(
    c: &Comprehension,
    scope: &EvalScope<'_>,
    ctx: &dyn Context,
) -> ExprResult<Value> {
    let mut sources = Vec::with_capacity(c.bindings.len());
    for binding in &c.bindings {
        match binding.expression.eval(scope, ctx)? {
            Value::Array(items) => sources.push(items),
            Value::Missing => return Ok(Value::Missing),
            _ => return Ok(Value::Null),
        }
    }
    // bindings advance in lockstep; the shortest source bounds the iteration
    let rows = sources.iter().map(|s| s.len()).min().unwrap_or(0);

    let row_scope = |i: usize| {
        let mut child = EvalScope::child(scope);
        for (binding, items) in c.bindings.iter().zip(&sources) {
            child.bind(binding.variable.clone(), items[i].clone());
            if let Some(name) = &binding.name_variable {
                child.bind(name.clone(), Value::from(i as i64));
            }
        }
        child
    };

    let passes_when = |row: &EvalScope<'_>| -> ExprResult<bool> {
        match &c.when {
            Some(when) => Ok(when.eval(row, ctx)?.truth()),
            None => Ok(true),
        }
    };

    match c.kind {
        ComprehensionKind::Any => {
            for i in 0..rows {
                let row = row_scope(i);
                if c.mapping.eval(&row, ctx)?.truth() {
                    return Ok(Value::Boolean(true));
                }
            }
            Ok(Value::Boolean(false))
        }
        ComprehensionKind::Every | ComprehensionKind::AnyEvery => {
            if rows == 0 && c.kind == ComprehensionKind::AnyEvery {
                return Ok(Value::Boolean(false));
            }
            for i in 0..rows {
                let row = row_scope(i);
                if !c.mapping.eval(&row, ctx)?.truth() {
                    return Ok(Value::Boolean(false));
                }
            }
            Ok(Value::Boolean(true))
        }
        ComprehensionKind::Array => {
            let mut out = Vec::with_capacity(rows);
            for i in 0..rows {
                let row = row_scope(i);
                if !passes_when(&row)? {
                    continue;
                }
                let v = c.mapping.eval(&row, ctx)?;
                if !v.is_missing() {
                    out.push(v);
                }
            }
            Ok(Value::Array(out))
        }
        ComprehensionKind::First => {
            for i in 0..rows {
                let row = row_scope(i);
                if !passes_when(&row)? {
                    continue;
                }
                let v = c.mapping.eval(&row, ctx)?;
                if !v.is_missing() {
                    return Ok(v);
                }
            }
            Ok(Value::Missing)
        }
        ComprehensionKind::Object => {
            let mut out = BTreeMap::new();
            for i in 0..rows {
                let row = row_scope(i);
                if !passes_when(&row)? {
                    continue;
                }
                let name = match &c.name_mapping {
                    Some(name) => name.eval(&row, ctx)?,
                    None => Value::Missing,
                };
                let Value::String(name) = name else {
                    continue;
                };
                let v = c.mapping.eval(&row, ctx)?;
                if !v.is_missing() {
                    out.insert(name, v);
                }
            }
            Ok(Value::Object(out))
        }
    }
}
