//! Object functions: OBJECT_ADD, OBJECT_PUT, OBJECT_PATH.
//!
//! OBJECT_ADD and OBJECT_PUT see MISSING/NULL operands themselves: a MISSING
//! value argument means "no value" rather than "no result".

use crate::error::ExprResult;
use crate::expression::context::Context;
use crate::value::Value;

pub fn evaluate(name: &str, args: &[Value], ctx: &dyn Context) -> ExprResult<Option<Value>> {
    let result = match name {
        "OBJECT_ADD" => {
            let mut object = match object_and_key(&args[0], &args[1]) {
                Ok(object) => object,
                Err(v) => return Ok(Some(v)),
            };
            let key = args[1].as_str().unwrap_or_default();
            // existing attributes are never overwritten
            if !args[2].is_missing() && !object.contains_key(key) {
                object.insert(key.to_string(), args[2].clone());
            }
            Value::Object(object)
        }
        "OBJECT_PUT" => {
            let mut object = match object_and_key(&args[0], &args[1]) {
                Ok(object) => object,
                Err(v) => return Ok(Some(v)),
            };
            let key = args[1].as_str().unwrap_or_default();
            if args[2].is_missing() {
                object.remove(key);
            } else {
                object.insert(key.to_string(), args[2].clone());
            }
            Value::Object(object)
        }
        "OBJECT_PATH" => match (&args[0], &args[1]) {
            (Value::Object(_), Value::String(path)) => {
                let expr = ctx.parse(path)?;
                expr.evaluate(&args[0], ctx)?
            }
            _ => Value::Null,
        },
        _ => return Ok(None),
    };
    Ok(Some(result))
}

type Object = std::collections::BTreeMap<String, Value>;

fn object_and_key(object: &Value, key: &Value) -> Result<Object, Value> {
    if object.is_missing() || key.is_missing() {
        return Err(Value::Missing);
    }
    match (object, key) {
        (Value::Object(o), Value::String(_)) => Ok(o.clone()),
        _ => Err(Value::Null),
    }
}
