//! Miscellaneous functions: IFMISSING, NOW_MILLIS.

use crate::error::ExprResult;
use crate::expression::context::Context;
use crate::value::Value;

pub fn evaluate(name: &str, args: &[Value], ctx: &dyn Context) -> ExprResult<Option<Value>> {
    match name {
        // First non-MISSING argument
        "IFMISSING" => Ok(Some(
            args.iter()
                .find(|v| !v.is_missing())
                .cloned()
                .unwrap_or(Value::Null),
        )),
        "NOW_MILLIS" => Ok(Some(Value::from(ctx.now().timestamp_millis()))),
        _ => Ok(None),
    }
}
