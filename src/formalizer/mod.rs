//! Scope resolution for expression trees.
//!
//! The formalizer rewrites bare identifiers into fully qualified form: a
//! name that is not a keyspace alias, a bound variable or another allowed
//! alias becomes a field of the current keyspace (`x` => `b.x`). It also
//! owns the variable scopes opened by comprehensions and reports free
//! identifiers so enclosing blocks can detect correlation.

pub mod scope;

pub use scope::{IdentFlags, ScopeFrame, ScopeStack};

use std::collections::HashSet;

use crate::error::{ExprError, ExprResult};
use crate::expression::{
    Bindings, Comprehension, Expression, FieldName, FunctionCall, Identifier, Mapper, Subquery,
};

/// Field holding the search-index output on a keyspace document.
const SEARCH_OUTPUT_FIELD: &str = "out";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FormalizerFlags {
    map_self: bool,
    map_keyspace: bool,
    index_scope: bool,
}

#[derive(Debug, Clone)]
pub struct Formalizer {
    keyspace: String,
    allowed: ScopeStack,
    identifiers: ScopeStack,
    aliases: ScopeStack,
    withs: HashSet<String>,
    flags: FormalizerFlags,
}

impl Formalizer {
    pub fn new(keyspace: impl Into<String>, parent: Option<&Formalizer>) -> Self {
        Self::with_flags(keyspace.into(), parent, false, false)
    }

    /// Formalizer that maps SELF to the keyspace alias (index sarging).
    pub fn new_self_mapped(keyspace: impl Into<String>, parent: Option<&Formalizer>) -> Self {
        Self::with_flags(keyspace.into(), parent, true, false)
    }

    /// Formalizer that maps the keyspace alias to SELF (index creation).
    pub fn new_keyspace_mapped(keyspace: impl Into<String>, parent: Option<&Formalizer>) -> Self {
        Self::with_flags(keyspace.into(), parent, false, true)
    }

    fn with_flags(
        keyspace: String,
        parent: Option<&Formalizer>,
        map_self: bool,
        map_keyspace: bool,
    ) -> Self {
        let (allowed, aliases, withs, flags) = match parent {
            Some(p) => (
                ScopeStack::chained(&p.allowed),
                ScopeStack::chained(&p.aliases),
                p.withs.clone(),
                FormalizerFlags {
                    map_self: map_self || p.flags.map_self,
                    map_keyspace: map_keyspace || p.flags.map_keyspace,
                    index_scope: false,
                },
            ),
            None => (
                ScopeStack::new(),
                ScopeStack::new(),
                HashSet::new(),
                FormalizerFlags {
                    map_self,
                    map_keyspace,
                    index_scope: false,
                },
            ),
        };

        let mut formalizer = Self {
            keyspace: String::new(),
            allowed,
            identifiers: ScopeStack::new(),
            aliases,
            withs,
            flags,
        };
        formalizer.set_keyspace(keyspace);
        formalizer
    }

    /// Independent snapshot of this formalizer's scopes and flags.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Formalize a whole expression.
    pub fn formalize(&mut self, expr: Expression) -> ExprResult<Expression> {
        self.map(expr)
    }

    pub fn set_keyspace(&mut self, keyspace: impl Into<String>) {
        self.keyspace = keyspace.into();
        if !self.flags.map_keyspace && !self.keyspace.is_empty() {
            let keyspace = self.keyspace.clone();
            self.set_allowed_alias(keyspace, true);
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn allowed(&self) -> &ScopeStack {
        &self.allowed
    }

    pub fn identifiers(&self) -> &ScopeStack {
        &self.identifiers
    }

    pub fn aliases(&self) -> &ScopeStack {
        &self.aliases
    }

    /// Register a term alias (keyspace, subquery or expression term).
    pub fn set_alias(&mut self, alias: impl Into<String>) {
        let alias = alias.into();
        if !alias.is_empty() {
            self.aliases.set(alias, IdentFlags::IS_KEYSPACE);
        }
    }

    pub fn set_allowed_alias(&mut self, alias: impl Into<String>, is_keyspace: bool) {
        let flags = if is_keyspace {
            IdentFlags::IS_KEYSPACE
        } else {
            IdentFlags::IS_UNKNOWN
        };
        self.allowed.set(alias, flags);
    }

    pub fn set_allowed_unnest_alias(&mut self, alias: impl Into<String>) {
        self.allowed
            .set(alias, IdentFlags::IS_KEYSPACE | IdentFlags::IS_UNNEST_ALIAS);
    }

    pub fn set_allowed_expr_term_alias(&mut self, alias: impl Into<String>) {
        self.allowed
            .set(alias, IdentFlags::IS_KEYSPACE | IdentFlags::IS_EXPR_TERM);
    }

    pub fn set_allowed_subq_term_alias(&mut self, alias: impl Into<String>) {
        self.allowed
            .set(alias, IdentFlags::IS_KEYSPACE | IdentFlags::IS_SUBQ_TERM);
    }

    /// Mark the variables of a WITH clause. The bindings themselves are
    /// installed with `push_bindings(.., false)`.
    pub fn set_withs(&mut self, withs: &Bindings) {
        for binding in withs {
            self.withs
                .extend(binding.variables().map(|name| name.to_string()));
        }
    }

    pub fn save_withs(&mut self) -> HashSet<String> {
        std::mem::take(&mut self.withs)
    }

    pub fn restore_withs(&mut self, withs: HashSet<String>) {
        self.withs = withs;
    }

    pub fn with_alias(&self, name: &str) -> bool {
        self.withs.contains(name)
    }

    pub fn set_index_scope(&mut self) {
        self.flags.index_scope = true;
    }

    pub fn clear_index_scope(&mut self) {
        self.flags.index_scope = false;
    }

    pub fn index_scope(&self) -> bool {
        self.flags.index_scope
    }

    pub fn map_self_enabled(&self) -> bool {
        self.flags.map_self
    }

    pub fn map_keyspace_enabled(&self) -> bool {
        self.flags.map_keyspace
    }

    /// Record a reference in the current identifiers frame.
    pub(crate) fn record_identifier(&mut self, name: &str, flags: IdentFlags) {
        self.identifiers.set(name, flags);
    }

    /// Identifiers referenced at the top level of this formalizer that it
    /// does not define itself.
    pub fn free_identifiers(&self) -> Vec<(String, IdentFlags)> {
        let mut free: Vec<(String, IdentFlags)> = self
            .identifiers
            .current()
            .iter()
            .filter(|(name, _)| self.allowed.lookup_local(name).is_none())
            .map(|(name, flags)| (name.to_string(), flags))
            .collect();
        free.sort_by(|a, b| a.0.cmp(&b.0));
        free
    }

    /// Declare the variables of `bindings` and formalize their sources.
    ///
    /// With `push`, the variables live in a new scope level that must be
    /// closed by `pop_bindings`; otherwise they are installed in the current
    /// level. Sources are always resolved against the enclosing scope.
    pub fn push_bindings(&mut self, bindings: &mut Bindings, push: bool) -> ExprResult<()> {
        let mut allowed_frame = ScopeFrame::default();
        let mut aliases_frame = ScopeFrame::default();

        for binding in bindings.iter_mut() {
            let names: Vec<String> = binding.variables().map(str::to_string).collect();
            for name in names {
                let existing = if push {
                    allowed_frame.get(&name)
                } else {
                    self.allowed.current().get(&name)
                };
                let mut flags = match existing {
                    // a variable may coincide with a keyspace-only alias when
                    // formalizing index keys
                    Some(f) if self.flags.index_scope && f.is_keyspace_only() => f,
                    Some(_) => {
                        return Err(ExprError::duplicate_variable(name, binding.location))
                    }
                    None => IdentFlags::NONE,
                };
                flags |= IdentFlags::IS_VARIABLE;
                if binding.is_static {
                    flags |= IdentFlags::IS_STATIC_VAR;
                }

                if push {
                    allowed_frame.insert(name.clone(), flags);
                    aliases_frame.insert(name, flags);
                } else {
                    self.allowed.set(name.clone(), flags);
                    self.aliases.set(name, flags);
                }
            }

            let source = std::mem::take(&mut binding.expression);
            binding.expression = self.map(source)?;
        }

        if push {
            self.allowed.push_frame(allowed_frame);
            self.identifiers.push_frame(ScopeFrame::default());
            self.aliases.push_frame(aliases_frame);
        }
        Ok(())
    }

    /// Close the level opened by `push_bindings(.., true)`.
    ///
    /// References made at the closed level to names it did not define are
    /// re-recorded one level up.
    pub fn pop_bindings(&mut self) {
        let (Some(allowed), Some(identifiers)) =
            (self.allowed.pop_frame(), self.identifiers.pop_frame())
        else {
            tracing::warn!(keyspace = %self.keyspace, "pop_bindings without matching push");
            return;
        };
        self.aliases.pop_frame();

        for (name, flags) in identifiers.iter() {
            if !allowed.contains(name) {
                self.identifiers.set(name, flags);
            }
        }
    }

    fn keyspace_identifier(&self) -> Identifier {
        Identifier::keyspace_alias(self.keyspace.clone())
    }

    /// SEARCH_META(x) / SEARCH_SCORE(x) read the search output under `x`.
    fn search_target(&self, arg: &Expression) -> bool {
        let Expression::Identifier(ident) = arg else {
            return false;
        };
        if self.keyspace.is_empty() {
            self.aliases.lookup(&ident.name).is_some() || self.allowed.lookup(&ident.name).is_some()
        } else {
            ident.name == self.keyspace
        }
    }
}

impl Mapper for Formalizer {
    fn map_identifier(&mut self, mut ident: Identifier) -> ExprResult<Expression> {
        if let Some(mut flags) = self.allowed.lookup(&ident.name) {
            // Index keys never resolve to a bare keyspace alias unless the
            // node was already resolved as one.
            if !self.flags.index_scope || !flags.is_keyspace_only() || ident.is_keyspace_alias() {
                if self.withs.contains(&ident.name) {
                    flags |= IdentFlags::IS_WITH_ALIAS;
                }
                self.identifiers.set(ident.name.clone(), flags);
                ident.mark(flags);
                return Ok(Expression::Identifier(ident));
            }
        }

        if self.keyspace.is_empty() {
            return Err(ExprError::ambiguous_reference(ident.name, ident.location));
        }

        if self.flags.map_keyspace {
            if ident.name == self.keyspace {
                return Ok(Expression::SelfRef);
            }
            return Ok(Expression::Identifier(ident));
        }

        tracing::trace!(keyspace = %self.keyspace, name = %ident.name, "qualified identifier");
        Ok(Expression::Field(
            Box::new(Expression::Identifier(self.keyspace_identifier())),
            FieldName {
                name: ident.name,
                case_insensitive: ident.case_insensitive,
            },
        ))
    }

    fn map_self(&mut self) -> ExprResult<Expression> {
        if self.flags.map_self {
            return Ok(Expression::Identifier(self.keyspace_identifier()));
        }
        Ok(Expression::SelfRef)
    }

    fn map_function(&mut self, call: FunctionCall) -> ExprResult<Expression> {
        if self.flags.map_keyspace {
            return call.map_children(self);
        }

        match (call.name(), call.operands().len()) {
            ("META", 0) | ("SEARCH_META", 0) | ("SEARCH_SCORE", 0) => {
                if self.keyspace.is_empty() {
                    return Err(ExprError::AmbiguousMeta {
                        location: call.location,
                    });
                }
                let keyspace = Expression::Identifier(self.keyspace_identifier());
                let arg = if call.name() == "META" {
                    keyspace
                } else {
                    Expression::field(keyspace, SEARCH_OUTPUT_FIELD)
                };
                Ok(Expression::Function(call.with_operands(vec![arg])))
            }
            ("SEARCH_META", 1) | ("SEARCH_SCORE", 1) if self.search_target(&call.operands()[0]) => {
                let arg = Expression::field(call.operands()[0].clone(), SEARCH_OUTPUT_FIELD);
                call.with_operands(vec![arg]).map_children(self)
            }
            _ => call.map_children(self),
        }
    }

    fn map_comprehension(&mut self, mut comprehension: Comprehension) -> ExprResult<Expression> {
        self.push_bindings(&mut comprehension.bindings, true)?;
        let mapped = comprehension.map_body(self);
        self.pop_bindings();
        Ok(Expression::Comprehension(Box::new(mapped?)))
    }

    fn map_subquery(&mut self, mut subquery: Subquery) -> ExprResult<Expression> {
        subquery.formalize(self)?;
        Ok(Expression::Subquery(Box::new(subquery)))
    }
}
