//! Index-range helpers derived from a LIKE pattern: LIKE_PREFIX, LIKE_SUFFIX,
//! LIKE_STOP.
//!
//! LIKE_PREFIX and LIKE_STOP bound a range scan: every string matching the
//! pattern sorts in `[prefix, stop)`. An empty array stop means "no upper
//! bound".

use crate::error::ExprResult;
use crate::expression::context::Context;
use crate::expression::like::{escape_char, like_compile_with};
use crate::value::Value;

pub fn evaluate(name: &str, args: &[Value], ctx: &dyn Context) -> ExprResult<Option<Value>> {
    if !matches!(name, "LIKE_PREFIX" | "LIKE_SUFFIX" | "LIKE_STOP") {
        return Ok(None);
    }

    let Value::String(pattern) = &args[0] else {
        return Ok(Some(Value::Null));
    };
    let escape = match args.get(1) {
        None => ctx.config().default_like_escape,
        Some(Value::String(e)) => escape_char(e)?,
        Some(_) => return Ok(Some(Value::Null)),
    };
    let compiled = like_compile_with(pattern, escape, ctx.config())?;

    let result = match name {
        "LIKE_PREFIX" => Value::from(compiled.literal_prefix()),
        "LIKE_SUFFIX" => Value::from(compiled.literal_suffix()),
        _ => like_stop(compiled.literal_prefix(), compiled.is_complete()),
    };
    Ok(Some(result))
}

fn like_stop(prefix: &str, complete: bool) -> Value {
    if complete {
        return Value::String(format!("{}\u{0}", prefix));
    }

    let mut chars: Vec<char> = prefix.chars().collect();
    match chars.pop() {
        Some(last) => match next_char(last) {
            Some(next) => {
                chars.push(next);
                Value::String(chars.into_iter().collect())
            }
            None => Value::Array(Vec::new()),
        },
        None => Value::Array(Vec::new()),
    }
}

fn next_char(c: char) -> Option<char> {
    let mut code = c as u32 + 1;
    // skip the surrogate range
    if (0xD800..=0xDFFF).contains(&code) {
        code = 0xE000;
    }
    char::from_u32(code)
}
