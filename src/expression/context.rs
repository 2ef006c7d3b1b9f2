//! Execution context boundary.
//!
//! The evaluator never reaches for process state directly; time, parsing,
//! subquery execution and per-execution caches are all supplied through
//! [`Context`]. [`ExecutionContext`] is the in-process implementation: one
//! instance per statement execution, owned by a single evaluator.

use std::cell::{Cell, RefCell};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lru::LruCache;

use crate::config::EngineConfig;
use crate::error::{ExprError, ExprResult};
use crate::value::Value;

use super::ast::{Expression, NodeId};
use super::evaluate::EvalScope;
use super::like::CompiledLike;
use super::subquery::Subquery;

pub trait Context {
    /// Statement time; stable for the whole execution.
    fn now(&self) -> DateTime<Utc>;

    fn config(&self) -> &EngineConfig {
        EngineConfig::global_default()
    }

    /// Parse expression text (used by dynamic field-path functions).
    fn parse(&self, text: &str) -> ExprResult<Expression> {
        Err(ExprError::ParseError(format!(
            "parsing is not supported by this context: {}",
            text
        )))
    }

    /// Run a nested query block for the current row.
    fn evaluate_subquery(&self, subquery: &Subquery, scope: &EvalScope<'_>) -> ExprResult<Value>;

    /// Optional LIKE regex cache capability.
    fn like_context(&self) -> Option<&dyn LikeContext> {
        None
    }

    fn query_context(&self) -> &str {
        ""
    }

    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// Cache of compiled LIKE patterns keyed by `(node, escape + pattern)`.
pub trait LikeContext {
    fn get_like_regex(&self, node: NodeId, key: &str) -> Option<Arc<CompiledLike>>;
    fn cache_like_regex(&self, node: NodeId, key: &str, regex: Arc<CompiledLike>);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LikeCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

type LikeCache = LruCache<(NodeId, String), Arc<CompiledLike>>;
type PathCache = LruCache<String, Expression>;

/// Per-statement context. Not shared between threads; each execution gets
/// its own instance and the caches die with it.
pub struct ExecutionContext {
    config: EngineConfig,
    now: DateTime<Utc>,
    query_context: String,
    timeout: Option<Duration>,
    like_cache: Option<RefCell<LikeCache>>,
    like_hits: Cell<u64>,
    like_misses: Cell<u64>,
    paths: Option<RefCell<PathCache>>,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::global_default().clone())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let like_cache = NonZeroUsize::new(config.like_cache_capacity)
            .map(|cap| RefCell::new(LruCache::new(cap)));
        let paths = NonZeroUsize::new(config.path_cache_capacity)
            .map(|cap| RefCell::new(LruCache::new(cap)));
        Self {
            config,
            now: Utc::now(),
            query_context: String::new(),
            timeout: None,
            like_cache,
            like_hits: Cell::new(0),
            like_misses: Cell::new(0),
            paths,
        }
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_query_context(mut self, query_context: impl Into<String>) -> Self {
        self.query_context = query_context.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Parsed field paths currently held by this execution.
    pub fn cached_paths(&self) -> usize {
        self.paths.as_ref().map(|c| c.borrow().len()).unwrap_or(0)
    }

    pub fn like_cache_stats(&self) -> LikeCacheStats {
        LikeCacheStats {
            hits: self.like_hits.get(),
            misses: self.like_misses.get(),
            entries: self
                .like_cache
                .as_ref()
                .map(|c| c.borrow().len())
                .unwrap_or(0),
        }
    }
}

impl Context for ExecutionContext {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn parse(&self, text: &str) -> ExprResult<Expression> {
        let Some(paths) = &self.paths else {
            return parse_path(text);
        };
        if let Some(expr) = paths.borrow_mut().get(text) {
            return Ok(expr.clone());
        }
        let expr = parse_path(text)?;
        paths.borrow_mut().put(text.to_string(), expr.clone());
        Ok(expr)
    }

    fn evaluate_subquery(&self, subquery: &Subquery, scope: &EvalScope<'_>) -> ExprResult<Value> {
        subquery.execute(scope, self)
    }

    fn like_context(&self) -> Option<&dyn LikeContext> {
        if self.like_cache.is_some() {
            Some(self)
        } else {
            None
        }
    }

    fn query_context(&self) -> &str {
        &self.query_context
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl LikeContext for ExecutionContext {
    fn get_like_regex(&self, node: NodeId, key: &str) -> Option<Arc<CompiledLike>> {
        let cache = self.like_cache.as_ref()?;
        let hit = cache.borrow_mut().get(&(node, key.to_string())).cloned();
        match &hit {
            Some(_) => {
                self.like_hits.set(self.like_hits.get() + 1);
                tracing::trace!(%node, key, "LIKE cache hit");
            }
            None => {
                self.like_misses.set(self.like_misses.get() + 1);
                tracing::trace!(%node, key, "LIKE cache miss");
            }
        }
        hit
    }

    fn cache_like_regex(&self, node: NodeId, key: &str, regex: Arc<CompiledLike>) {
        if let Some(cache) = &self.like_cache {
            cache.borrow_mut().put((node, key.to_string()), regex);
        }
    }
}

/// Parse a field path such as `a.b[2].c` or `` `odd name`.x ``.
pub(super) fn parse_path(text: &str) -> ExprResult<Expression> {
    let mut chars = text.trim().chars().peekable();
    let mut expr: Option<Expression> = None;
    let mut after_dot = false;
    let invalid = || ExprError::ParseError(format!("invalid path '{}'", text));

    loop {
        match chars.peek() {
            None => break,
            Some('[') => {
                if after_dot {
                    return Err(invalid());
                }
                chars.next();
                let mut digits = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    digits.push(c);
                }
                let index: i64 = digits.trim().parse().map_err(|_| {
                    ExprError::ParseError(format!("invalid array index in path '{}'", text))
                })?;
                let base = expr.take().ok_or_else(|| {
                    ExprError::ParseError(format!("path '{}' cannot start with an index", text))
                })?;
                expr = Some(Expression::element(base, Expression::constant(index)));
            }
            Some('.') => {
                if expr.is_none() || after_dot {
                    return Err(invalid());
                }
                after_dot = true;
                chars.next();
            }
            Some(_) => {
                if expr.is_some() && !after_dot {
                    return Err(invalid());
                }
                after_dot = false;
                let name = if chars.peek() == Some(&'`') {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '`' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(ExprError::ParseError(format!(
                            "unterminated quoted name in path '{}'",
                            text
                        )));
                    }
                    name
                } else {
                    let mut name = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_alphanumeric() || c == '_' || c == '$' {
                            name.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    name
                };
                if name.is_empty() {
                    return Err(invalid());
                }
                expr = Some(match expr.take() {
                    None => Expression::ident(name),
                    Some(base) => Expression::field(base, name),
                });
            }
        }
    }

    if after_dot {
        return Err(invalid());
    }
    expr.ok_or_else(|| ExprError::ParseError("empty path".to_string()))
}
