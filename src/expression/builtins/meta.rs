//! Document metadata accessors: META, SEARCH_META, SEARCH_SCORE.
//!
//! Metadata travels with a document as attachments: `@meta` for document
//! metadata and `@smeta` for full-text search metadata. Formalization turns
//! the zero-argument forms into calls on the keyspace alias.

use crate::error::ExprResult;
use crate::expression::evaluate::EvalScope;
use crate::value::Value;

pub const META_ATTACHMENT: &str = "@meta";
pub const SEARCH_META_ATTACHMENT: &str = "@smeta";

pub fn evaluate(name: &str, args: &[Value], scope: &EvalScope<'_>) -> ExprResult<Option<Value>> {
    let target = || args.first().unwrap_or(scope.item());

    let result = match name {
        "META" => attachment(target(), META_ATTACHMENT),
        "SEARCH_META" => attachment(target(), SEARCH_META_ATTACHMENT),
        "SEARCH_SCORE" => match attachment(target(), SEARCH_META_ATTACHMENT) {
            smeta @ Value::Object(_) => smeta.field("score"),
            other => other,
        },
        _ => return Ok(None),
    };
    Ok(Some(result))
}

fn attachment(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(o) => o.get(key).cloned().unwrap_or(Value::Missing),
        Value::Missing => Value::Missing,
        _ => Value::Null,
    }
}
