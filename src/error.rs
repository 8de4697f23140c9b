use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{EntityUid, Type};

/// Failure while evaluating a single expression.
///
/// The first error raised anywhere in an expression aborts the walk. At the
/// policy level these are caught and reported in diagnostics instead.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum EvalError {
    #[error("type error: expected {}, got {actual}", .expected.iter().join(" or "))]
    TypeError { expected: Vec<Type>, actual: Type },

    #[error("integer overflow while evaluating `{op}` on {}", .operands.iter().join(", "))]
    Overflow { op: String, operands: Vec<i64> },

    #[error("attribute `{attr}` does not exist on {on}")]
    AttributeAccess { attr: String, on: String },

    #[error("tag `{tag}` does not exist on {entity}")]
    TagAccess { tag: String, entity: EntityUid },

    #[error("entity {0} does not exist")]
    EntityNotExist(EntityUid),

    #[error("cannot access attribute `{attr}` of an unspecified entity")]
    UnspecifiedEntity { attr: String },

    #[error("unknown extension function `{0}`")]
    UnknownExtensionFunction(String),

    #[error("`{function}` takes {expected} argument(s), got {actual}")]
    Arity {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("values of type {lhs} and {rhs} are not comparable")]
    NotComparable { lhs: Type, rhs: Type },

    #[error("invalid argument to `{function}`: {message}")]
    InvalidExtensionArgument { function: String, message: String },
}

impl EvalError {
    pub(crate) fn type_error(expected: &[Type], actual: Type) -> Self {
        EvalError::TypeError {
            expected: expected.to_vec(),
            actual,
        }
    }

    pub(crate) fn overflow(op: &str, operands: &[i64]) -> Self {
        EvalError::Overflow {
            op: op.to_string(),
            operands: operands.to_vec(),
        }
    }
}

/// Engine-level failures surfaced to callers of [`crate::PolicyEngine`].
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum PolicyError {
    #[error("evaluation error: {0}")]
    EvalError(#[from] EvalError),

    #[error("malformed request: {0}")]
    RequestTypeError(String),

    #[error("duplicate policy id: {0}")]
    DuplicatePolicyId(String),

    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),

    #[error("batch request references variable `{0}` without candidate values")]
    UnboundVariable(String),

    #[error("batch authorization cancelled")]
    Cancelled,

    #[error("Poisoned lock error: {0}")]
    PoisonedLockError(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

impl<T> From<std::sync::PoisonError<T>> for PolicyError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        PolicyError::PoisonedLockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_error_display() {
        let err = EvalError::type_error(&[Type::Long, Type::Decimal], Type::String);
        assert_eq!(
            err.to_string(),
            "type error: expected long or decimal, got string"
        );
    }

    #[test]
    fn test_overflow_display() {
        let err = EvalError::overflow("+", &[i64::MAX, 1]);
        assert_eq!(
            err.to_string(),
            "integer overflow while evaluating `+` on 9223372036854775807, 1"
        );
    }

    #[test]
    fn test_policy_error_from_eval_error() {
        let err: PolicyError = EvalError::EntityNotExist(EntityUid::new("User", "alice")).into();
        assert!(matches!(err, PolicyError::EvalError(EvalError::EntityNotExist(_))));
        assert_eq!(
            err.to_string(),
            r#"evaluation error: entity User::"alice" does not exist"#
        );
    }

    #[test]
    fn test_eval_error_serialization() {
        let err = EvalError::Arity {
            function: "ip".to_string(),
            expected: 1,
            actual: 2,
        };
        let serialized = serde_json::to_value(&err).unwrap();
        let deserialized: EvalError = serde_json::from_value(serialized).unwrap();
        assert_eq!(err, deserialized);
    }
}
