// src/lib.rs
pub use ast::{BinaryOp, Expr, Pattern, PatternElem, UnaryOp, Var};
pub use authorizer::{CompiledPolicy, authorize, compile_set};
pub use batch::{
    BatchOptions, BatchRequest, BatchResult, BatchStats, CancelToken, ExpansionOrder, SearchConfig,
};
pub use engine::PolicyEngine;
pub use error::{EvalError, PolicyError};
pub use eval::{Environment, Evaluator, compile, evaluate};
pub use extensions::ExtensionFn;
pub use fold::fold;
pub use hierarchy::HierarchyCache;
pub use partial::{PartialEnvironment, Term, partial, partial_policy};
pub use types::*;

mod ast;
mod authorizer;
mod batch;
mod engine;
mod error;
mod eval;
mod extensions;
mod fold;
mod hierarchy;
mod partial;
mod timers;
mod types;
