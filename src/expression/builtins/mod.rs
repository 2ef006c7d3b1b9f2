//! Built-in function registry.
//!
//! The registry is an immutable, uppercase-keyed table built once per
//! process. Each entry describes arity, result type, volatility and how
//! MISSING/NULL operands propagate. Evaluation is split by category:
//! - string: LOWER, UPPER, LENGTH
//! - pattern: LIKE_PREFIX, LIKE_SUFFIX, LIKE_STOP
//! - object: OBJECT_ADD, OBJECT_PUT, OBJECT_PATH
//! - meta: META, SEARCH_META, SEARCH_SCORE
//! - misc: IFMISSING, NOW_MILLIS

pub mod meta;
pub mod misc;
pub mod object;
pub mod pattern;
pub mod string;

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::error::{ExprError, ExprResult};
use crate::value::{Value, ValueType};

use super::ast::FunctionCall;
use super::context::Context;
use super::evaluate::EvalScope;

/// Upper bound used for variadic functions.
pub const VARIADIC: usize = usize::MAX;

pub struct FunctionSpec {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub result_type: ValueType,
    /// May return different results for identical input
    pub volatile: bool,
    pub propagates_missing: bool,
    pub propagates_null: bool,
}

impl FunctionSpec {
    const fn new(name: &'static str, min_args: usize, max_args: usize, result_type: ValueType) -> Self {
        Self {
            name,
            min_args,
            max_args,
            result_type,
            volatile: false,
            propagates_missing: true,
            propagates_null: true,
        }
    }

    const fn volatile(mut self) -> Self {
        self.volatile = true;
        self
    }

    /// The function handles MISSING and NULL operands itself.
    const fn conditional(mut self) -> Self {
        self.propagates_missing = false;
        self.propagates_null = false;
        self
    }

    pub fn check_arity(&self, actual: usize) -> ExprResult<()> {
        if actual < self.min_args || actual > self.max_args {
            return Err(ExprError::InvalidArgumentCount {
                name: self.name.to_string(),
                min: self.min_args,
                max: self.max_args,
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for FunctionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionSpec")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("volatile", &self.volatile)
            .finish()
    }
}

static REGISTRY: Lazy<HashMap<&'static str, FunctionSpec>> = Lazy::new(|| {
    let specs = [
        FunctionSpec::new("META", 0, 1, ValueType::Object),
        FunctionSpec::new("SEARCH_META", 0, 1, ValueType::Object),
        FunctionSpec::new("SEARCH_SCORE", 0, 1, ValueType::Number),
        FunctionSpec::new("LOWER", 1, 1, ValueType::String),
        FunctionSpec::new("UPPER", 1, 1, ValueType::String),
        FunctionSpec::new("LENGTH", 1, 1, ValueType::Number),
        FunctionSpec::new("LIKE_PREFIX", 1, 2, ValueType::String),
        FunctionSpec::new("LIKE_SUFFIX", 1, 2, ValueType::String),
        FunctionSpec::new("LIKE_STOP", 1, 2, ValueType::Json),
        FunctionSpec::new("OBJECT_ADD", 3, 3, ValueType::Object).conditional(),
        FunctionSpec::new("OBJECT_PUT", 3, 3, ValueType::Object).conditional(),
        FunctionSpec::new("OBJECT_PATH", 2, 2, ValueType::Json),
        FunctionSpec::new("IFMISSING", 2, VARIADIC, ValueType::Json).conditional(),
        FunctionSpec::new("NOW_MILLIS", 0, 0, ValueType::Number).volatile(),
    ];
    specs.into_iter().map(|s| (s.name, s)).collect()
});

/// Look up a function by name, case-insensitively.
pub fn lookup(name: &str) -> Option<&'static FunctionSpec> {
    REGISTRY.get(name.to_uppercase().as_str())
}

/// Names of all registered functions, sorted.
pub fn function_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = REGISTRY.keys().copied().collect();
    names.sort_unstable();
    names
}

/// Evaluate a resolved function call.
pub(crate) fn evaluate(
    call: &FunctionCall,
    scope: &EvalScope<'_>,
    ctx: &dyn Context,
) -> ExprResult<Value> {
    let spec = call.spec();
    let args = call
        .operands()
        .iter()
        .map(|arg| arg.eval(scope, ctx))
        .collect::<ExprResult<Vec<_>>>()?;

    if spec.propagates_missing && args.iter().any(Value::is_missing) {
        return Ok(Value::Missing);
    }
    if spec.propagates_null && args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }

    let name = spec.name;
    if let Some(v) = string::evaluate(name, &args)? {
        return Ok(v);
    }
    if let Some(v) = pattern::evaluate(name, &args, ctx)? {
        return Ok(v);
    }
    if let Some(v) = object::evaluate(name, &args, ctx)? {
        return Ok(v);
    }
    if let Some(v) = meta::evaluate(name, &args, scope)? {
        return Ok(v);
    }
    if let Some(v) = misc::evaluate(name, &args, ctx)? {
        return Ok(v);
    }

    Err(ExprError::UnknownFunction {
        name: name.to_string(),
        location: call.location,
    })
}
