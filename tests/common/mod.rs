//! Common test utilities for expression tests
//!
//! Provides shared helpers for:
//! - Installing a tracing subscriber once per test binary
//! - Building documents and formalized expressions
//! - Evaluating expressions against a fresh execution context
#![allow(dead_code)]

use docql::expression::{Binding, Bindings};
use docql::{ExecutionContext, ExprResult, Expression, Formalizer, Value};
use tracing_subscriber::EnvFilter;

/// Route engine logs to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docql=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn doc(json: serde_json::Value) -> Value {
    Value::from(json)
}

/// A row of a keyspace scan: the document under its alias.
pub fn keyspace_row(alias: &str, json: serde_json::Value) -> Value {
    let mut row = serde_json::Map::new();
    row.insert(alias.to_string(), json);
    Value::from(serde_json::Value::Object(row))
}

pub fn formalize(keyspace: &str, expr: Expression) -> ExprResult<Expression> {
    Formalizer::new(keyspace, None).formalize(expr)
}

pub fn eval(expr: &Expression, item: &Value) -> Value {
    let ctx = ExecutionContext::new();
    expr.evaluate(item, &ctx).expect("evaluation failed")
}

pub fn binding(variable: &str, source: Expression) -> Bindings {
    vec![Binding::new(variable, source)]
}

pub fn numbers(values: &[i64]) -> Expression {
    Expression::array(values.iter().map(|v| Expression::constant(*v)).collect())
}
