pub mod ast;
pub mod bindings;
pub mod builtins;
pub mod context;
pub mod equivalence;
pub mod evaluate;
pub mod like;
pub mod remover;
pub mod stringer;
pub mod subquery;
pub mod visitor;

pub use ast::*;
pub use bindings::{Binding, Bindings};
pub use builtins::{lookup as lookup_function, FunctionSpec};
pub use context::{Context, ExecutionContext, LikeCacheStats, LikeContext};
pub use evaluate::EvalScope;
pub use like::{escape_char, like_compile, like_compile_with, CompiledLike, Like};
pub use remover::remove_expr;
pub use stringer::Stringer;
pub use subquery::Subquery;
pub use visitor::{fold_constants, FnMapper, Mapper, Rewrite, Visitor};
