//! String functions: LOWER, UPPER, LENGTH.

use crate::error::ExprResult;
use crate::value::Value;

pub fn evaluate(name: &str, args: &[Value]) -> ExprResult<Option<Value>> {
    let result = match name {
        "LOWER" => match &args[0] {
            Value::String(s) => Value::String(s.to_lowercase()),
            _ => Value::Null,
        },
        "UPPER" => match &args[0] {
            Value::String(s) => Value::String(s.to_uppercase()),
            _ => Value::Null,
        },
        "LENGTH" => match &args[0] {
            Value::String(s) => Value::from(s.chars().count() as i64),
            _ => Value::Null,
        },
        _ => return Ok(None),
    };
    Ok(Some(result))
}
