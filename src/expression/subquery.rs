//! Nested query block: `SELECT RAW projection FROM source AS alias [WHERE filter]`.
//!
//! The block resolves its own names against a child formalizer; anything it
//! references from enclosing scopes is reported back to the parent as a free
//! variable and marks the block as correlated.

use crate::error::ExprResult;
use crate::formalizer::{Formalizer, IdentFlags};
use crate::value::Value;

use super::ast::Expression;
use super::context::Context;
use super::evaluate::EvalScope;
use super::visitor::Mapper;

#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    projection: Expression,
    source: Expression,
    alias: String,
    filter: Option<Expression>,
    correlated: bool,
}

impl Subquery {
    pub fn new(projection: Expression, source: Expression, alias: impl Into<String>) -> Self {
        Self {
            projection,
            source,
            alias: alias.into(),
            filter: None,
            correlated: false,
        }
    }

    pub fn with_filter(mut self, filter: Expression) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn projection(&self) -> &Expression {
        &self.projection
    }

    pub fn source(&self) -> &Expression {
        &self.source
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn filter(&self) -> Option<&Expression> {
        self.filter.as_ref()
    }

    /// Set by formalization when the block references enclosing names.
    pub fn is_correlated(&self) -> bool {
        self.correlated
    }

    /// Resolve names in this block against a scope nested in `parent`.
    pub fn formalize(&mut self, parent: &mut Formalizer) -> ExprResult<()> {
        // FROM is resolved in the enclosing scope
        let source = std::mem::take(&mut self.source);
        self.source = parent.map(source)?;

        let mut child = Formalizer::new(self.alias.clone(), Some(&*parent));
        let projection = std::mem::take(&mut self.projection);
        self.projection = child.map(projection)?;
        if let Some(filter) = self.filter.take() {
            self.filter = Some(child.map(filter)?);
        }

        let mut correlated = false;
        for (name, flags) in child.free_identifiers() {
            if !flags.contains(IdentFlags::IS_WITH_ALIAS) {
                correlated = true;
            }
            parent.record_identifier(&name, flags);
        }
        self.correlated = correlated;
        tracing::debug!(alias = %self.alias, correlated, "formalized subquery");
        Ok(())
    }

    /// Run the block for the current row.
    pub fn execute(&self, scope: &EvalScope<'_>, ctx: &dyn Context) -> ExprResult<Value> {
        let rows = match self.source.eval(scope, ctx)? {
            Value::Array(rows) => rows,
            Value::Missing | Value::Null => return Ok(Value::Array(Vec::new())),
            single => vec![single],
        };

        let mut results = Vec::new();
        for row in rows {
            let mut row_scope = EvalScope::child(scope);
            row_scope.bind(self.alias.clone(), row);
            if let Some(filter) = &self.filter {
                if !filter.eval(&row_scope, ctx)?.truth() {
                    continue;
                }
            }
            let v = self.projection.eval(&row_scope, ctx)?;
            if !v.is_missing() {
                results.push(v);
            }
        }
        Ok(Value::Array(results))
    }
}
