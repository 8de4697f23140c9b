//! Expression trees and the `like` pattern language.

mod expr;
mod pattern;

pub use expr::{BinaryOp, Expr, UnaryOp, Var};
pub use pattern::{Pattern, PatternElem};
