//! Expression evaluation and scope resolution for a JSON query language.
//!
//! Parsed expressions are first passed through a [`Formalizer`], which
//! qualifies bare identifiers against the keyspace and variable scopes of
//! the enclosing query block. The formalized tree is then evaluated per
//! document under MISSING/NULL three-valued semantics.

pub mod config;
pub mod error;
pub mod expression;
pub mod formalizer;
pub mod value;

pub use config::EngineConfig;
pub use error::{ExprError, ExprResult, Location};
pub use expression::{Context, ExecutionContext, Expression, Mapper, Visitor};
pub use formalizer::{Formalizer, IdentFlags};
pub use value::{Value, ValueType};
