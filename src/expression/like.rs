//! LIKE pattern compilation and the LIKE operator node.
//!
//! A pattern is scanned rune by rune: `%` becomes `(.*)` (adjacent ones
//! collapse), `_` becomes `(.)`, the escape rune forces the next rune to be
//! literal, and every literal run is regex-quoted. Two regexes come out:
//! `part` (unanchored, used to derive index-range keys) and `full`
//! (`(?s)^part$`, used for matching).
//!
//! Patterns that are constant when the node is built are compiled once and
//! stored on the node. The stored regex is only reused when the executing
//! context agrees on the escape rune and its limits admit it; otherwise, and
//! for data-dependent patterns, compilation goes through the execution
//! context's [`LikeContext`] cache, keyed by node identity and
//! `escape + pattern`.

use std::sync::Arc;

use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};

use crate::config::EngineConfig;
use crate::error::{ExprError, ExprResult};
use crate::value::Value;

use super::ast::{Expression, NodeId};
use super::context::Context;
use super::evaluate::EvalScope;
use super::visitor::Mapper;

const ANY_RUN: &str = "(.*)";
const ANY_ONE: &str = "(.)";

/// Regex pair produced from one `(escape, pattern)`.
#[derive(Debug)]
pub struct CompiledLike {
    escape: char,
    pattern: String,
    part: Regex,
    full: Regex,
    prefix: String,
    suffix: String,
    complete: bool,
    size_limit: usize,
}

impl CompiledLike {
    pub fn escape(&self) -> char {
        self.escape
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn part(&self) -> &Regex {
        &self.part
    }

    pub fn full(&self) -> &Regex {
        &self.full
    }

    /// Literal text before the first wildcard.
    pub fn literal_prefix(&self) -> &str {
        &self.prefix
    }

    /// Literal text after the last wildcard.
    pub fn literal_suffix(&self) -> &str {
        &self.suffix
    }

    /// True when the pattern has no wildcard at all.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_match(&self, s: &str) -> bool {
        self.full.is_match(s)
    }

    /// Cache key for this compilation.
    pub fn key(&self) -> String {
        cache_key(self.escape, &self.pattern)
    }

    /// True when `config` would have accepted this compilation.
    pub fn fits(&self, config: &EngineConfig) -> bool {
        self.full.as_str().len() <= config.max_like_pattern_len
            && self.size_limit <= config.regex_size_limit
    }
}

fn cache_key(escape: char, pattern: &str) -> String {
    let mut key = String::with_capacity(pattern.len() + escape.len_utf8());
    key.push(escape);
    key.push_str(pattern);
    key
}

/// Compile a LIKE pattern with the process-wide default limits.
pub fn like_compile(pattern: &str, escape: char) -> ExprResult<CompiledLike> {
    like_compile_with(pattern, escape, EngineConfig::global_default())
}

pub fn like_compile_with(
    pattern: &str,
    escape: char,
    config: &EngineConfig,
) -> ExprResult<CompiledLike> {
    let mut out = String::with_capacity(pattern.len() * 2);
    let mut literal = String::new();
    let mut prefix = String::new();
    let mut suffix = String::new();
    let mut escaped = false;
    let mut wildcard_seen = false;

    for c in pattern.chars() {
        if !escaped && c == escape {
            escaped = true;
            continue;
        }

        if !escaped && (c == '%' || c == '_') {
            flush_literal(&mut out, &mut literal);
            wildcard_seen = true;
            suffix.clear();
            if c == '%' {
                if !out.ends_with(ANY_RUN) {
                    out.push_str(ANY_RUN);
                }
            } else {
                out.push_str(ANY_ONE);
            }
            continue;
        }

        escaped = false;
        literal.push(c);
        suffix.push(c);
        if !wildcard_seen {
            prefix.push(c);
        }
    }

    if escaped {
        return Err(ExprError::LikeTrailingEscape {
            pattern: pattern.to_string(),
        });
    }
    flush_literal(&mut out, &mut literal);

    let full_pattern = format!("(?s)^{}$", out);
    if full_pattern.len() > config.max_like_pattern_len {
        return Err(ExprError::PatternTooLong {
            len: full_pattern.len(),
            max: config.max_like_pattern_len,
        });
    }

    let part = build_regex(&out, config)?;
    let full = build_regex(&full_pattern, config)?;
    tracing::trace!(pattern, regex = %full_pattern, "compiled LIKE pattern");

    Ok(CompiledLike {
        escape,
        pattern: pattern.to_string(),
        part,
        full,
        prefix,
        suffix,
        complete: !wildcard_seen,
        size_limit: config.regex_size_limit,
    })
}

fn flush_literal(out: &mut String, literal: &mut String) {
    if !literal.is_empty() {
        out.push_str(&regex::escape(literal));
        literal.clear();
    }
}

fn build_regex(pattern: &str, config: &EngineConfig) -> ExprResult<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(config.regex_size_limit)
        .build()
        .map_err(ExprError::from)
}

/// Single-character escape from an ESCAPE operand value.
pub fn escape_char(escape: &str) -> ExprResult<char> {
    let mut chars = escape.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(ExprError::InvalidLikeEscape(format!(
            "'{}' must be a single character",
            escape
        ))),
    }
}

/// `first LIKE pattern [ESCAPE escape]`
#[derive(Debug, Clone)]
pub struct Like {
    id: NodeId,
    first: Expression,
    pattern: Expression,
    escape: Option<Expression>,
    compiled: OnceCell<Arc<CompiledLike>>,
}

impl PartialEq for Like {
    fn eq(&self, other: &Self) -> bool {
        self.first == other.first && self.pattern == other.pattern && self.escape == other.escape
    }
}

impl Like {
    /// Build the node. A constant pattern is compiled now. With a constant
    /// ESCAPE operand a malformed pattern is reported before any document is
    /// evaluated; without one the escape rune belongs to the executing
    /// context, so errors wait for evaluation.
    pub fn new(
        first: Expression,
        pattern: Expression,
        escape: Option<Expression>,
    ) -> ExprResult<Self> {
        Self::with_id(NodeId::next(), first, pattern, escape)
    }

    fn with_id(
        id: NodeId,
        first: Expression,
        pattern: Expression,
        escape: Option<Expression>,
    ) -> ExprResult<Self> {
        let like = Self {
            id,
            first,
            pattern,
            escape,
            compiled: OnceCell::new(),
        };
        like.precompile()?;
        Ok(like)
    }

    fn precompile(&self) -> ExprResult<()> {
        let pattern = match self.pattern.static_value() {
            Some(Value::String(s)) => s,
            _ => return Ok(()),
        };
        let (escape, explicit) = match &self.escape {
            None => (EngineConfig::global_default().default_like_escape, false),
            Some(expr) => match expr.static_value() {
                Some(Value::String(s)) => (escape_char(&s)?, true),
                _ => return Ok(()),
            },
        };
        match like_compile(&pattern, escape) {
            Ok(compiled) => {
                // write-once; a concurrent initializer produced the same artifact
                let _ = self.compiled.set(Arc::new(compiled));
                Ok(())
            }
            // limits are re-checked against the executing context's config
            Err(ExprError::PatternTooLong { .. } | ExprError::InvalidRegex(_)) => Ok(()),
            Err(err) if explicit => Err(err),
            Err(err) => {
                tracing::debug!(%pattern, error = %err, "LIKE pattern left for evaluation");
                Ok(())
            }
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn first(&self) -> &Expression {
        &self.first
    }

    pub fn pattern(&self) -> &Expression {
        &self.pattern
    }

    pub fn escape(&self) -> Option<&Expression> {
        self.escape.as_ref()
    }

    /// Pattern compiled at construction, if the operands were constant.
    pub fn precompiled(&self) -> Option<&Arc<CompiledLike>> {
        self.compiled.get()
    }

    pub(crate) fn children(&self) -> Vec<&Expression> {
        let mut children = vec![&self.first, &self.pattern];
        if let Some(escape) = &self.escape {
            children.push(escape);
        }
        children
    }

    /// Rebuild with mapped operands, keeping the node identity.
    pub fn map_children<M: Mapper + ?Sized>(self, mapper: &mut M) -> ExprResult<Expression> {
        let first = mapper.map(self.first)?;
        let pattern = mapper.map(self.pattern)?;
        let escape = match self.escape {
            Some(e) => Some(mapper.map(e)?),
            None => None,
        };
        let like = Like::with_id(self.id, first, pattern, escape)?;
        Ok(Expression::Like(Box::new(like)))
    }

    pub(crate) fn eval(&self, scope: &EvalScope<'_>, ctx: &dyn Context) -> ExprResult<Value> {
        let first = self.first.eval(scope, ctx)?;
        let pattern = self.pattern.eval(scope, ctx)?;
        let escape = match &self.escape {
            Some(e) => e.eval(scope, ctx)?,
            None => Value::String(ctx.config().default_like_escape.to_string()),
        };

        if first.is_missing() || pattern.is_missing() || escape.is_missing() {
            return Ok(Value::Missing);
        }
        let (Value::String(s), Value::String(p), Value::String(e)) = (&first, &pattern, &escape)
        else {
            return Ok(Value::Null);
        };

        let escape = escape_char(e)?;
        let compiled = self.regex_for(p, escape, ctx)?;
        Ok(Value::Boolean(compiled.is_match(s)))
    }

    fn regex_for(
        &self,
        pattern: &str,
        escape: char,
        ctx: &dyn Context,
    ) -> ExprResult<Arc<CompiledLike>> {
        if let Some(compiled) = self.compiled.get() {
            if compiled.escape == escape
                && compiled.pattern == pattern
                && compiled.fits(ctx.config())
            {
                return Ok(compiled.clone());
            }
        }

        let key = cache_key(escape, pattern);
        let like_ctx = ctx.like_context();
        if let Some(cache) = like_ctx {
            if let Some(compiled) = cache.get_like_regex(self.id, &key) {
                return Ok(compiled);
            }
        }

        let compiled = Arc::new(like_compile_with(pattern, escape, ctx.config())?);
        if let Some(cache) = like_ctx {
            cache.cache_like_regex(self.id, &key, compiled.clone());
        }
        Ok(compiled)
    }
}
