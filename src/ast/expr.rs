//! The expression tree.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use itertools::Itertools;
use strum_macros::{Display as StrumDisplay, EnumString};

use crate::error::EvalError;
use crate::extensions::ExtensionFn;
use crate::types::{EntityType, EntityUid, Value};

use super::Pattern;

/// The four request variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, StrumDisplay, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Var {
    Principal,
    Action,
    Resource,
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay)]
pub enum UnaryOp {
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "isEmpty")]
    IsEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay)]
pub enum BinaryOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "<=")]
    LessEq,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = ">=")]
    GreaterEq,
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "contains")]
    Contains,
    #[strum(serialize = "containsAll")]
    ContainsAll,
    #[strum(serialize = "containsAny")]
    ContainsAny,
    #[strum(serialize = "getTag")]
    GetTag,
    #[strum(serialize = "hasTag")]
    HasTag,
}

impl BinaryOp {
    /// Operators whose result depends on the entity store.
    pub fn reads_entities(self) -> bool {
        matches!(self, BinaryOp::In | BinaryOp::GetTag | BinaryOp::HasTag)
    }

    fn is_method(self) -> bool {
        matches!(
            self,
            BinaryOp::Contains
                | BinaryOp::ContainsAll
                | BinaryOp::ContainsAny
                | BinaryOp::GetTag
                | BinaryOp::HasTag
        )
    }
}

/// An immutable expression node. Children sit behind [`Arc`]s, so cloning a
/// tree is cheap and rewritten trees share every untouched sub-tree with the
/// original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Value(Value),
    Var(Var),
    /// An evaluation error discovered while partially evaluating; raised when
    /// the node is finally evaluated.
    Error(EvalError),
    Unary {
        op: UnaryOp,
        arg: Arc<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    And {
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    Or {
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    If {
        cond: Arc<Expr>,
        then_expr: Arc<Expr>,
        else_expr: Arc<Expr>,
    },
    GetAttr {
        expr: Arc<Expr>,
        attr: String,
    },
    HasAttr {
        expr: Arc<Expr>,
        attr: String,
    },
    Like {
        expr: Arc<Expr>,
        pattern: Pattern,
    },
    Is {
        expr: Arc<Expr>,
        entity_type: EntityType,
    },
    IsIn {
        expr: Arc<Expr>,
        entity_type: EntityType,
        target: Arc<Expr>,
    },
    Set(Arc<Vec<Expr>>),
    /// Record literal; fields are evaluated in order and a repeated key keeps
    /// its last value.
    Record(Arc<Vec<(String, Expr)>>),
    Call {
        func: ExtensionFn,
        args: Arc<Vec<Expr>>,
    },
}

impl Expr {
    pub fn val(v: impl Into<Value>) -> Self {
        Expr::Value(v.into())
    }

    pub fn var(v: Var) -> Self {
        Expr::Var(v)
    }

    pub fn principal() -> Self {
        Expr::Var(Var::Principal)
    }

    pub fn action() -> Self {
        Expr::Var(Var::Action)
    }

    pub fn resource() -> Self {
        Expr::Var(Var::Resource)
    }

    pub fn context() -> Self {
        Expr::Var(Var::Context)
    }

    pub fn entity(uid: EntityUid) -> Self {
        Expr::Value(Value::EntityUid(uid))
    }

    pub fn unary(op: UnaryOp, arg: Expr) -> Self {
        Expr::Unary {
            op,
            arg: Arc::new(arg),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Arc::new(lhs),
            rhs: Arc::new(rhs),
        }
    }

    pub fn not(arg: Expr) -> Self {
        Expr::unary(UnaryOp::Not, arg)
    }

    pub fn neg(arg: Expr) -> Self {
        Expr::unary(UnaryOp::Neg, arg)
    }

    pub fn is_empty(arg: Expr) -> Self {
        Expr::unary(UnaryOp::IsEmpty, arg)
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Self {
        Expr::And {
            lhs: Arc::new(lhs),
            rhs: Arc::new(rhs),
        }
    }

    pub fn or(lhs: Expr, rhs: Expr) -> Self {
        Expr::Or {
            lhs: Arc::new(lhs),
            rhs: Arc::new(rhs),
        }
    }

    pub fn ite(cond: Expr, then_expr: Expr, else_expr: Expr) -> Self {
        Expr::If {
            cond: Arc::new(cond),
            then_expr: Arc::new(then_expr),
            else_expr: Arc::new(else_expr),
        }
    }

    pub fn eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Eq, lhs, rhs)
    }

    pub fn not_eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::NotEq, lhs, rhs)
    }

    pub fn less(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Less, lhs, rhs)
    }

    pub fn less_eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::LessEq, lhs, rhs)
    }

    pub fn greater(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Greater, lhs, rhs)
    }

    pub fn greater_eq(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::GreaterEq, lhs, rhs)
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Mul, lhs, rhs)
    }

    pub fn is_in(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::In, lhs, rhs)
    }

    pub fn contains(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::Contains, lhs, rhs)
    }

    pub fn contains_all(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::ContainsAll, lhs, rhs)
    }

    pub fn contains_any(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::ContainsAny, lhs, rhs)
    }

    pub fn get_tag(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::GetTag, lhs, rhs)
    }

    pub fn has_tag(lhs: Expr, rhs: Expr) -> Self {
        Expr::binary(BinaryOp::HasTag, lhs, rhs)
    }

    pub fn get_attr(expr: Expr, attr: impl Into<String>) -> Self {
        Expr::GetAttr {
            expr: Arc::new(expr),
            attr: attr.into(),
        }
    }

    pub fn has_attr(expr: Expr, attr: impl Into<String>) -> Self {
        Expr::HasAttr {
            expr: Arc::new(expr),
            attr: attr.into(),
        }
    }

    pub fn like(expr: Expr, pattern: Pattern) -> Self {
        Expr::Like {
            expr: Arc::new(expr),
            pattern,
        }
    }

    pub fn is_entity_type(expr: Expr, entity_type: impl Into<EntityType>) -> Self {
        Expr::Is {
            expr: Arc::new(expr),
            entity_type: entity_type.into(),
        }
    }

    pub fn is_entity_type_in(expr: Expr, entity_type: impl Into<EntityType>, target: Expr) -> Self {
        Expr::IsIn {
            expr: Arc::new(expr),
            entity_type: entity_type.into(),
            target: Arc::new(target),
        }
    }

    pub fn set(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Set(Arc::new(items.into_iter().collect()))
    }

    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Expr::Record(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Builds an extension call by name, checking the name and arity.
    pub fn call(name: &str, args: impl IntoIterator<Item = Expr>) -> Result<Self, EvalError> {
        let func = ExtensionFn::lookup(name)?;
        Expr::call_fn(func, args)
    }

    pub fn call_fn(func: ExtensionFn, args: impl IntoIterator<Item = Expr>) -> Result<Self, EvalError> {
        let args: Vec<Expr> = args.into_iter().collect();
        func.check_arity(args.len())?;
        Ok(Expr::Call {
            func,
            args: Arc::new(args),
        })
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Expr::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Value(v)
    }
}

fn write_call(f: &mut Formatter<'_>, name: &str, args: &[&Expr], method: bool) -> FmtResult {
    match args.split_first() {
        Some((receiver, rest)) if method => {
            write!(f, "{receiver}.{name}({})", rest.iter().join(", "))
        }
        _ => write!(f, "{name}({})", args.iter().join(", ")),
    }
}

/// Renders a fully parenthesized, policy-like text form for logs and errors.
impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Expr::Value(v) => write!(f, "{v}"),
            Expr::Var(v) => write!(f, "{v}"),
            Expr::Error(err) => write!(f, "error(\"{}\")", err.to_string().escape_debug()),
            Expr::Unary {
                op: UnaryOp::IsEmpty,
                arg,
            } => write!(f, "{arg}.isEmpty()"),
            Expr::Unary { op, arg } => write!(f, "{op}({arg})"),
            Expr::Binary { op, lhs, rhs } if op.is_method() => {
                write_call(f, &op.to_string(), &[&**lhs, &**rhs], true)
            }
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expr::And { lhs, rhs } => write!(f, "({lhs} && {rhs})"),
            Expr::Or { lhs, rhs } => write!(f, "({lhs} || {rhs})"),
            Expr::If {
                cond,
                then_expr,
                else_expr,
            } => write!(f, "(if {cond} then {then_expr} else {else_expr})"),
            Expr::GetAttr { expr, attr } => write!(f, "{expr}[\"{}\"]", attr.escape_debug()),
            Expr::HasAttr { expr, attr } => write!(f, "({expr} has \"{}\")", attr.escape_debug()),
            Expr::Like { expr, pattern } => write!(f, "({expr} like \"{pattern}\")"),
            Expr::Is { expr, entity_type } => write!(f, "({expr} is {entity_type})"),
            Expr::IsIn {
                expr,
                entity_type,
                target,
            } => write!(f, "({expr} is {entity_type} in {target})"),
            Expr::Set(items) => write!(f, "[{}]", items.iter().join(", ")),
            Expr::Record(fields) => write!(
                f,
                "{{{}}}",
                fields
                    .iter()
                    .map(|(k, v)| format!("\"{}\": {v}", k.escape_debug()))
                    .join(", ")
            ),
            Expr::Call { func, args } => {
                let args: Vec<&Expr> = args.iter().collect();
                write_call(f, func.name(), &args, !func.is_constructor())
            }
        }
    }
}
