use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ExprError, ExprResult, Location};
use crate::formalizer::IdentFlags;
use crate::value::{Value, ValueType};

use super::bindings::Bindings;
use super::builtins::{self, FunctionSpec};
use super::like::Like;
use super::subquery::Subquery;
use super::visitor::Mapper;

/// Identity of an expression node, stable across rewrites of its children.
///
/// Used to key per-execution caches (e.g. compiled LIKE patterns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Expression tree node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Literal value
    Constant(Value),

    /// Bare or qualified name (keyspace alias, variable, field of the current item)
    Identifier(Identifier),

    /// The current item itself
    SelfRef,

    /// Field access (e.g., b.name)
    Field(Box<Expression>, FieldName),

    /// Array element access (e.g., arr[0])
    Element(Box<Expression>, Box<Expression>),

    /// Array construction
    ArrayConstruct(Vec<Expression>),

    /// Object construction
    ObjectConstruct(Vec<(String, Expression)>),

    /// Binary operation
    BinaryOp {
        left: Box<Expression>,
        op: BinaryOperator,
        right: Box<Expression>,
    },

    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expression>,
    },

    /// Conjunction of two or more terms
    And(Vec<Expression>),

    /// Disjunction of two or more terms
    Or(Vec<Expression>),

    /// LIKE with optional ESCAPE; NOT LIKE is `UnaryOp { op: Not, .. }` over this
    Like(Box<Like>),

    /// item BETWEEN low AND high
    Between {
        item: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
    },

    /// CASE expression
    /// Simple form: CASE expr WHEN val1 THEN res1 ... ELSE default END
    /// Searched form: CASE WHEN cond1 THEN res1 ... ELSE default END
    Case {
        operand: Option<Box<Expression>>,
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Box<Expression>>,
    },

    /// ANY / EVERY / ARRAY / FIRST / OBJECT over bindings
    Comprehension(Box<Comprehension>),

    /// EXISTS operand
    Exists(Box<Expression>),

    /// Builtin function call
    Function(FunctionCall),

    /// Nested query block
    Subquery(Box<Subquery>),
}

impl Default for Expression {
    fn default() -> Self {
        Expression::Constant(Value::Missing)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
    pub case_insensitive: bool,
    /// Classification recorded by formalization
    pub flags: IdentFlags,
    pub location: Location,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            case_insensitive: false,
            flags: IdentFlags::NONE,
            location: Location::unknown(),
        }
    }

    /// An identifier explicitly naming a keyspace alias.
    pub fn keyspace_alias(name: impl Into<String>) -> Self {
        let mut ident = Self::new(name);
        ident.flags = IdentFlags::IS_KEYSPACE;
        ident
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn case_insensitive(mut self) -> Self {
        self.case_insensitive = true;
        self
    }

    pub fn is_keyspace_alias(&self) -> bool {
        self.flags.contains(IdentFlags::IS_KEYSPACE)
    }

    pub fn is_binding_variable(&self) -> bool {
        self.flags.contains(IdentFlags::IS_VARIABLE)
    }

    pub fn is_static_variable(&self) -> bool {
        self.flags.contains(IdentFlags::IS_STATIC_VAR)
    }

    pub fn is_unnest_alias(&self) -> bool {
        self.flags.contains(IdentFlags::IS_UNNEST_ALIAS)
    }

    pub fn is_expr_term_alias(&self) -> bool {
        self.flags.contains(IdentFlags::IS_EXPR_TERM)
    }

    pub fn is_subq_term_alias(&self) -> bool {
        self.flags.contains(IdentFlags::IS_SUBQ_TERM)
    }

    pub fn is_with_alias(&self) -> bool {
        self.flags.contains(IdentFlags::IS_WITH_ALIAS)
    }

    /// Merge classification bits; bits already set stay set.
    pub fn mark(&mut self, flags: IdentFlags) {
        self.flags |= flags & IdentFlags::CLASSIFICATION;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldName {
    pub name: String,
    pub case_insensitive: bool,
}

impl FieldName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            case_insensitive: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulus,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Collections
    In,
    NotIn,

    // String
    Concat,
}

impl BinaryOperator {
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Add
                | BinaryOperator::Subtract
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulus
        )
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulus => "%",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::In => "in",
            BinaryOperator::NotIn => "not in",
            BinaryOperator::Concat => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Negate,
    IsMissing,
    IsNotMissing,
    IsNull,
    IsNotNull,
    IsValued,
    IsNotValued,
}

impl UnaryOperator {
    /// IS [NOT] MISSING / NULL / VALUED never propagate unknowns.
    pub fn is_type_test(&self) -> bool {
        !matches!(self, UnaryOperator::Not | UnaryOperator::Negate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComprehensionKind {
    Any,
    Every,
    AnyEvery,
    Array,
    First,
    Object,
}

impl ComprehensionKind {
    pub fn is_predicate(&self) -> bool {
        matches!(
            self,
            ComprehensionKind::Any | ComprehensionKind::Every | ComprehensionKind::AnyEvery
        )
    }
}

/// Range predicate or collection transform over one or more bindings.
///
/// For ANY/EVERY the condition is `mapping` and `when` is unused. For
/// ARRAY/FIRST/OBJECT `mapping` produces each element and `when` filters.
/// OBJECT additionally evaluates `name_mapping` for each member name.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub kind: ComprehensionKind,
    pub bindings: Bindings,
    pub mapping: Expression,
    pub name_mapping: Option<Expression>,
    pub when: Option<Expression>,
}

impl Comprehension {
    pub fn new(kind: ComprehensionKind, bindings: Bindings, mapping: Expression) -> Self {
        Self {
            kind,
            bindings,
            mapping,
            name_mapping: None,
            when: None,
        }
    }

    pub fn with_when(mut self, when: Expression) -> Self {
        self.when = Some(when);
        self
    }

    pub fn with_name_mapping(mut self, name: Expression) -> Self {
        self.name_mapping = Some(name);
        self
    }

    /// Map the clauses evaluated inside the bindings' scope, leaving the
    /// binding sources untouched.
    pub fn map_body<M: Mapper + ?Sized>(mut self, mapper: &mut M) -> ExprResult<Self> {
        self.mapping = mapper.map(self.mapping)?;
        if let Some(name) = self.name_mapping.take() {
            self.name_mapping = Some(mapper.map(name)?);
        }
        if let Some(when) = self.when.take() {
            self.when = Some(mapper.map(when)?);
        }
        Ok(self)
    }

    pub fn map_children<M: Mapper + ?Sized>(mut self, mapper: &mut M) -> ExprResult<Expression> {
        for binding in self.bindings.iter_mut() {
            let source = std::mem::take(&mut binding.expression);
            binding.expression = mapper.map(source)?;
        }
        let mapped = self.map_body(mapper)?;
        Ok(Expression::Comprehension(Box::new(mapped)))
    }

    fn children(&self) -> Vec<&Expression> {
        let mut children: Vec<&Expression> =
            self.bindings.iter().map(|b| &b.expression).collect();
        if let Some(when) = &self.when {
            children.push(when);
        }
        if let Some(name) = &self.name_mapping {
            children.push(name);
        }
        children.push(&self.mapping);
        children
    }
}

/// Call of a registered builtin function.
#[derive(Clone)]
pub struct FunctionCall {
    spec: &'static FunctionSpec,
    operands: Vec<Expression>,
    pub location: Location,
}

impl FunctionCall {
    /// Resolve `name` in the builtin registry and check the argument count.
    pub fn new(name: &str, operands: Vec<Expression>) -> ExprResult<Self> {
        let spec = builtins::lookup(name).ok_or_else(|| ExprError::UnknownFunction {
            name: name.to_uppercase(),
            location: Location::unknown(),
        })?;
        spec.check_arity(operands.len())?;
        Ok(Self {
            spec,
            operands,
            location: Location::unknown(),
        })
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    pub fn name(&self) -> &'static str {
        self.spec.name
    }

    pub fn spec(&self) -> &'static FunctionSpec {
        self.spec
    }

    pub fn operands(&self) -> &[Expression] {
        &self.operands
    }

    /// Same function with a replacement operand list.
    pub(crate) fn with_operands(&self, operands: Vec<Expression>) -> Self {
        Self {
            spec: self.spec,
            operands,
            location: self.location,
        }
    }

    pub fn map_children<M: Mapper + ?Sized>(self, mapper: &mut M) -> ExprResult<Expression> {
        let operands = self
            .operands
            .into_iter()
            .map(|op| mapper.map(op))
            .collect::<ExprResult<Vec<_>>>()?;
        Ok(Expression::Function(FunctionCall {
            spec: self.spec,
            operands,
            location: self.location,
        }))
    }
}

impl PartialEq for FunctionCall {
    fn eq(&self, other: &Self) -> bool {
        self.spec.name == other.spec.name && self.operands == other.operands
    }
}

impl fmt::Debug for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCall")
            .field("name", &self.spec.name)
            .field("operands", &self.operands)
            .finish()
    }
}

// Builders, mostly used by callers that assemble trees without a parser.
impl Expression {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expression::Constant(value.into())
    }

    pub fn missing() -> Self {
        Expression::Constant(Value::Missing)
    }

    pub fn null() -> Self {
        Expression::Constant(Value::Null)
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier(Identifier::new(name))
    }

    pub fn keyspace(name: impl Into<String>) -> Self {
        Expression::Identifier(Identifier::keyspace_alias(name))
    }

    pub fn field(base: Expression, name: impl Into<String>) -> Self {
        Expression::Field(Box::new(base), FieldName::new(name))
    }

    pub fn element(base: Expression, index: Expression) -> Self {
        Expression::Element(Box::new(base), Box::new(index))
    }

    pub fn array(elements: Vec<Expression>) -> Self {
        Expression::ArrayConstruct(elements)
    }

    pub fn object(members: Vec<(String, Expression)>) -> Self {
        Expression::ObjectConstruct(members)
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOperator, operand: Expression) -> Self {
        Expression::UnaryOp {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn add(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Add, left, right)
    }

    pub fn eq(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Equal, left, right)
    }

    pub fn lt(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::LessThan, left, right)
    }

    pub fn gt(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::GreaterThan, left, right)
    }

    pub fn not(operand: Expression) -> Self {
        Self::unary(UnaryOperator::Not, operand)
    }

    pub fn and(terms: Vec<Expression>) -> Self {
        Expression::And(terms)
    }

    pub fn or(terms: Vec<Expression>) -> Self {
        Expression::Or(terms)
    }

    /// `first LIKE pattern [ESCAPE escape]`; static patterns compile here.
    pub fn like(
        first: Expression,
        pattern: Expression,
        escape: Option<Expression>,
    ) -> ExprResult<Self> {
        Ok(Expression::Like(Box::new(Like::new(first, pattern, escape)?)))
    }

    pub fn not_like(
        first: Expression,
        pattern: Expression,
        escape: Option<Expression>,
    ) -> ExprResult<Self> {
        Ok(Self::not(Self::like(first, pattern, escape)?))
    }

    pub fn between(item: Expression, low: Expression, high: Expression) -> Self {
        Expression::Between {
            item: Box::new(item),
            low: Box::new(low),
            high: Box::new(high),
        }
    }

    pub fn searched_case(
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Expression>,
    ) -> Self {
        Expression::Case {
            operand: None,
            when_clauses,
            else_clause: else_clause.map(Box::new),
        }
    }

    pub fn simple_case(
        operand: Expression,
        when_clauses: Vec<(Expression, Expression)>,
        else_clause: Option<Expression>,
    ) -> Self {
        Expression::Case {
            operand: Some(Box::new(operand)),
            when_clauses,
            else_clause: else_clause.map(Box::new),
        }
    }

    pub fn any(bindings: Bindings, satisfies: Expression) -> Self {
        Expression::Comprehension(Box::new(Comprehension::new(
            ComprehensionKind::Any,
            bindings,
            satisfies,
        )))
    }

    pub fn every(bindings: Bindings, satisfies: Expression) -> Self {
        Expression::Comprehension(Box::new(Comprehension::new(
            ComprehensionKind::Every,
            bindings,
            satisfies,
        )))
    }

    pub fn any_every(bindings: Bindings, satisfies: Expression) -> Self {
        Expression::Comprehension(Box::new(Comprehension::new(
            ComprehensionKind::AnyEvery,
            bindings,
            satisfies,
        )))
    }

    pub fn array_for(mapping: Expression, bindings: Bindings, when: Option<Expression>) -> Self {
        let mut c = Comprehension::new(ComprehensionKind::Array, bindings, mapping);
        c.when = when;
        Expression::Comprehension(Box::new(c))
    }

    pub fn first_for(mapping: Expression, bindings: Bindings, when: Option<Expression>) -> Self {
        let mut c = Comprehension::new(ComprehensionKind::First, bindings, mapping);
        c.when = when;
        Expression::Comprehension(Box::new(c))
    }

    pub fn object_for(
        name_mapping: Expression,
        value_mapping: Expression,
        bindings: Bindings,
        when: Option<Expression>,
    ) -> Self {
        let mut c = Comprehension::new(ComprehensionKind::Object, bindings, value_mapping)
            .with_name_mapping(name_mapping);
        c.when = when;
        Expression::Comprehension(Box::new(c))
    }

    pub fn exists(operand: Expression) -> Self {
        Expression::Exists(Box::new(operand))
    }

    pub fn function(name: &str, operands: Vec<Expression>) -> ExprResult<Self> {
        Ok(Expression::Function(FunctionCall::new(name, operands)?))
    }

    pub fn subquery(block: Subquery) -> Self {
        Expression::Subquery(Box::new(block))
    }
}

impl Expression {
    /// Ordered operands of this node.
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Constant(_)
            | Expression::Identifier(_)
            | Expression::SelfRef
            | Expression::Subquery(_) => Vec::new(),
            Expression::Field(base, _) => vec![base.as_ref()],
            Expression::Element(base, index) => vec![base.as_ref(), index.as_ref()],
            Expression::ArrayConstruct(elements) => elements.iter().collect(),
            Expression::ObjectConstruct(members) => members.iter().map(|(_, e)| e).collect(),
            Expression::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expression::UnaryOp { operand, .. } => vec![operand.as_ref()],
            Expression::And(terms) | Expression::Or(terms) => terms.iter().collect(),
            Expression::Like(like) => like.children(),
            Expression::Between { item, low, high } => {
                vec![item.as_ref(), low.as_ref(), high.as_ref()]
            }
            Expression::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let mut children = Vec::with_capacity(when_clauses.len() * 2 + 2);
                if let Some(operand) = operand {
                    children.push(operand.as_ref());
                }
                for (when, then) in when_clauses {
                    children.push(when);
                    children.push(then);
                }
                if let Some(else_clause) = else_clause {
                    children.push(else_clause.as_ref());
                }
                children
            }
            Expression::Comprehension(c) => c.children(),
            Expression::Exists(operand) => vec![operand.as_ref()],
            Expression::Function(call) => call.operands.iter().collect(),
        }
    }

    /// Rebuild this node with every child passed through `mapper`.
    pub fn map_children<M: Mapper + ?Sized>(self, mapper: &mut M) -> ExprResult<Expression> {
        Ok(match self {
            Expression::Constant(_)
            | Expression::Identifier(_)
            | Expression::SelfRef
            | Expression::Subquery(_) => self,
            Expression::Field(base, name) => Expression::Field(Box::new(mapper.map(*base)?), name),
            Expression::Element(base, index) => Expression::Element(
                Box::new(mapper.map(*base)?),
                Box::new(mapper.map(*index)?),
            ),
            Expression::ArrayConstruct(elements) => {
                Expression::ArrayConstruct(map_all(elements, mapper)?)
            }
            Expression::ObjectConstruct(members) => {
                let mut mapped = Vec::with_capacity(members.len());
                for (name, expr) in members {
                    mapped.push((name, mapper.map(expr)?));
                }
                Expression::ObjectConstruct(mapped)
            }
            Expression::BinaryOp { left, op, right } => Expression::BinaryOp {
                left: Box::new(mapper.map(*left)?),
                op,
                right: Box::new(mapper.map(*right)?),
            },
            Expression::UnaryOp { op, operand } => Expression::UnaryOp {
                op,
                operand: Box::new(mapper.map(*operand)?),
            },
            Expression::And(terms) => Expression::And(map_all(terms, mapper)?),
            Expression::Or(terms) => Expression::Or(map_all(terms, mapper)?),
            Expression::Like(like) => return (*like).map_children(mapper),
            Expression::Between { item, low, high } => Expression::Between {
                item: Box::new(mapper.map(*item)?),
                low: Box::new(mapper.map(*low)?),
                high: Box::new(mapper.map(*high)?),
            },
            Expression::Case {
                operand,
                when_clauses,
                else_clause,
            } => {
                let operand = match operand {
                    Some(op) => Some(Box::new(mapper.map(*op)?)),
                    None => None,
                };
                let mut whens = Vec::with_capacity(when_clauses.len());
                for (when, then) in when_clauses {
                    whens.push((mapper.map(when)?, mapper.map(then)?));
                }
                let else_clause = match else_clause {
                    Some(e) => Some(Box::new(mapper.map(*e)?)),
                    None => None,
                };
                Expression::Case {
                    operand,
                    when_clauses: whens,
                    else_clause,
                }
            }
            Expression::Comprehension(c) => return (*c).map_children(mapper),
            Expression::Exists(operand) => Expression::Exists(Box::new(mapper.map(*operand)?)),
            Expression::Function(call) => return call.map_children(mapper),
        })
    }

    /// Result type known without evaluating; `Json` when it depends on data.
    pub fn value_type(&self) -> ValueType {
        match self {
            Expression::Constant(v) => v.value_type(),
            Expression::Identifier(_)
            | Expression::SelfRef
            | Expression::Field(..)
            | Expression::Element(..)
            | Expression::Case { .. } => ValueType::Json,
            Expression::ArrayConstruct(_) | Expression::Subquery(_) => ValueType::Array,
            Expression::ObjectConstruct(_) => ValueType::Object,
            Expression::BinaryOp { op, .. } => {
                if op.is_arithmetic() {
                    ValueType::Number
                } else if *op == BinaryOperator::Concat {
                    ValueType::String
                } else {
                    ValueType::Boolean
                }
            }
            Expression::UnaryOp { op, .. } => match op {
                UnaryOperator::Negate => ValueType::Number,
                _ => ValueType::Boolean,
            },
            Expression::And(_)
            | Expression::Or(_)
            | Expression::Like(_)
            | Expression::Between { .. }
            | Expression::Exists(_) => ValueType::Boolean,
            Expression::Comprehension(c) => match c.kind {
                ComprehensionKind::Array => ValueType::Array,
                ComprehensionKind::Object => ValueType::Object,
                ComprehensionKind::First => ValueType::Json,
                _ => ValueType::Boolean,
            },
            Expression::Function(call) => call.spec.result_type,
        }
    }

    /// A volatile subtree may yield different values for the same input.
    pub fn is_volatile(&self) -> bool {
        match self {
            Expression::Function(call) if call.spec.volatile => true,
            Expression::Subquery(_) => true,
            _ => self.children().iter().any(|c| c.is_volatile()),
        }
    }

    /// Whether a MISSING operand makes this node MISSING.
    pub fn propagates_missing(&self) -> bool {
        match self {
            Expression::Case { .. }
            | Expression::And(_)
            | Expression::Or(_)
            | Expression::ArrayConstruct(_)
            | Expression::ObjectConstruct(_)
            | Expression::Comprehension(_)
            | Expression::Subquery(_) => false,
            Expression::UnaryOp { op, .. } if op.is_type_test() => false,
            Expression::Function(call) if !call.spec.propagates_missing => false,
            _ => self.children().iter().all(|c| c.propagates_missing()),
        }
    }

    /// Whether a NULL operand makes this node NULL.
    pub fn propagates_null(&self) -> bool {
        match self {
            Expression::Case { .. }
            | Expression::And(_)
            | Expression::Or(_)
            | Expression::ArrayConstruct(_)
            | Expression::ObjectConstruct(_)
            | Expression::Comprehension(_)
            | Expression::Subquery(_)
            | Expression::Field(..) => false,
            Expression::UnaryOp { op, .. } if op.is_type_test() => false,
            Expression::Function(call) if !call.spec.propagates_null => false,
            _ => self.children().iter().all(|c| c.propagates_null()),
        }
    }
}

fn map_all<M: Mapper + ?Sized>(
    exprs: Vec<Expression>,
    mapper: &mut M,
) -> ExprResult<Vec<Expression>> {
    exprs.into_iter().map(|e| mapper.map(e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::bindings::Binding;

    #[test]
    fn test_node_ids_are_unique() {
        let a = NodeId::next();
        let b = NodeId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_identifier_marks_are_idempotent() {
        let mut ident = Identifier::new("v");
        ident.mark(IdentFlags::IS_VARIABLE | IdentFlags::IS_UNKNOWN);
        ident.mark(IdentFlags::IS_VARIABLE);
        assert!(ident.is_binding_variable());
        assert!(!ident.is_keyspace_alias());
        assert!(!ident.flags.contains(IdentFlags::IS_UNKNOWN));
    }

    #[test]
    fn test_children_order() {
        let expr = Expression::searched_case(
            vec![(Expression::ident("a"), Expression::constant(1i64))],
            Some(Expression::constant(2i64)),
        );
        let children = expr.children();
        assert_eq!(children.len(), 3);
        assert_eq!(children[0], &Expression::ident("a"));
        assert_eq!(children[2], &Expression::constant(2i64));
    }

    #[test]
    fn test_comprehension_children_include_sources() {
        let expr = Expression::any(
            vec![Binding::new("v", Expression::ident("arr"))],
            Expression::gt(Expression::ident("v"), Expression::constant(1i64)),
        );
        let children = expr.children();
        assert_eq!(children[0], &Expression::ident("arr"));
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn test_value_types() {
        assert_eq!(Expression::constant("x").value_type(), ValueType::String);
        assert_eq!(
            Expression::add(Expression::ident("a"), Expression::constant(1i64)).value_type(),
            ValueType::Number
        );
        assert_eq!(
            Expression::eq(Expression::ident("a"), Expression::constant(1i64)).value_type(),
            ValueType::Boolean
        );
        assert_eq!(Expression::ident("a").value_type(), ValueType::Json);
    }

    #[test]
    fn test_unknown_function_rejected() {
        let err = Expression::function("NO_SUCH_FN", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid function NO_SUCH_FN");
    }

    #[test]
    fn test_function_arity_checked() {
        let err = Expression::function("lower", vec![]).unwrap_err();
        assert!(matches!(err, ExprError::InvalidArgumentCount { .. }));
        let ok = Expression::function("lower", vec![Expression::constant("A")]).unwrap();
        match ok {
            Expression::Function(call) => assert_eq!(call.name(), "LOWER"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_propagation_flags() {
        let cmp = Expression::eq(Expression::ident("a"), Expression::constant(1i64));
        assert!(cmp.propagates_missing());
        assert!(cmp.propagates_null());

        let test = Expression::unary(UnaryOperator::IsMissing, Expression::ident("a"));
        assert!(!test.propagates_missing());

        let and = Expression::and(vec![Expression::ident("a"), Expression::ident("b")]);
        assert!(!and.propagates_missing());

        let obj = Expression::function(
            "OBJECT_ADD",
            vec![
                Expression::ident("o"),
                Expression::constant("k"),
                Expression::constant(1i64),
            ],
        )
        .unwrap();
        assert!(!obj.propagates_missing());
        assert!(!obj.propagates_null());
    }

    #[test]
    fn test_volatility() {
        let now = Expression::function("NOW_MILLIS", vec![]).unwrap();
        assert!(now.is_volatile());
        assert!(Expression::add(now, Expression::constant(1i64)).is_volatile());
        assert!(!Expression::ident("a").is_volatile());
    }
}
