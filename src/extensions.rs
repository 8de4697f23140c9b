//! Extension functions: a fixed registry of named functions and methods over
//! IP addresses, decimals, datetimes and durations.

use std::str::FromStr;

use strum::EnumIter;
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::error::EvalError;
use crate::types::{Decimal, IpAddr, Value};

/// Every extension function the evaluator knows about.
///
/// Calls are looked up by name once, when the expression is built, so an
/// unknown name or a wrong argument count never reaches evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum ExtensionFn {
    Ip,
    Decimal,
    Datetime,
    Duration,
    IsIpv4,
    IsIpv6,
    IsLoopback,
    IsMulticast,
    IsInRange,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Offset,
    DurationSince,
    ToDate,
    ToTime,
    ToDays,
    ToHours,
    ToMinutes,
    ToSeconds,
    ToMilliseconds,
}

impl ExtensionFn {
    /// Resolves a function by name.
    pub fn lookup(name: &str) -> Result<Self, EvalError> {
        ExtensionFn::from_str(name)
            .map_err(|_| EvalError::UnknownExtensionFunction(name.to_string()))
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Number of arguments, counting the receiver of method-style calls.
    pub fn arity(self) -> usize {
        use ExtensionFn as F;
        match self {
            F::IsInRange
            | F::LessThan
            | F::LessThanOrEqual
            | F::GreaterThan
            | F::GreaterThanOrEqual
            | F::Offset
            | F::DurationSince => 2,
            _ => 1,
        }
    }

    /// Constructors parse a string literal into an extension value.
    pub fn is_constructor(self) -> bool {
        matches!(
            self,
            ExtensionFn::Ip | ExtensionFn::Decimal | ExtensionFn::Datetime | ExtensionFn::Duration
        )
    }

    pub fn check_arity(self, actual: usize) -> Result<(), EvalError> {
        if actual == self.arity() {
            Ok(())
        } else {
            Err(EvalError::Arity {
                function: self.name().to_string(),
                expected: self.arity(),
                actual,
            })
        }
    }

    /// Applies the function to already-evaluated arguments.
    pub fn apply(self, args: &[Value]) -> Result<Value, EvalError> {
        use ExtensionFn as F;
        self.check_arity(args.len())?;
        let value = match self {
            F::Ip => Value::IpAddr(args[0].as_str()?.parse::<IpAddr>()?),
            F::Decimal => Value::Decimal(args[0].as_str()?.parse::<Decimal>()?),
            F::Datetime => Value::Datetime(args[0].as_str()?.parse()?),
            F::Duration => Value::Duration(args[0].as_str()?.parse()?),
            F::IsIpv4 => Value::Bool(args[0].as_ipaddr()?.is_ipv4()),
            F::IsIpv6 => Value::Bool(args[0].as_ipaddr()?.is_ipv6()),
            F::IsLoopback => Value::Bool(args[0].as_ipaddr()?.is_loopback()),
            F::IsMulticast => Value::Bool(args[0].as_ipaddr()?.is_multicast()),
            F::IsInRange => Value::Bool(args[0].as_ipaddr()?.is_in_range(args[1].as_ipaddr()?)),
            F::LessThan => {
                let (a, b) = decimals(args)?;
                Value::Bool(a < b)
            }
            F::LessThanOrEqual => {
                let (a, b) = decimals(args)?;
                Value::Bool(a <= b)
            }
            F::GreaterThan => {
                let (a, b) = decimals(args)?;
                Value::Bool(a > b)
            }
            F::GreaterThanOrEqual => {
                let (a, b) = decimals(args)?;
                Value::Bool(a >= b)
            }
            F::Offset => Value::Datetime(args[0].as_datetime()?.offset(args[1].as_duration()?)?),
            F::DurationSince => {
                Value::Duration(args[0].as_datetime()?.duration_since(args[1].as_datetime()?)?)
            }
            F::ToDate => Value::Datetime(args[0].as_datetime()?.to_date()?),
            F::ToTime => Value::Duration(args[0].as_datetime()?.to_time()),
            F::ToDays => Value::Long(args[0].as_duration()?.to_days()),
            F::ToHours => Value::Long(args[0].as_duration()?.to_hours()),
            F::ToMinutes => Value::Long(args[0].as_duration()?.to_minutes()),
            F::ToSeconds => Value::Long(args[0].as_duration()?.to_seconds()),
            F::ToMilliseconds => Value::Long(args[0].as_duration()?.to_milliseconds()),
        };
        Ok(value)
    }
}

fn decimals(args: &[Value]) -> Result<(Decimal, Decimal), EvalError> {
    Ok((args[0].as_decimal()?, args[1].as_decimal()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;
    use crate::types::Type;
    use yare::parameterized;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
        ExtensionFn::lookup(name)?.apply(args)
    }

    #[parameterized(
        ip = { "ip", ExtensionFn::Ip, 1 },
        is_in_range = { "isInRange", ExtensionFn::IsInRange, 2 },
        less_than_or_equal = { "lessThanOrEqual", ExtensionFn::LessThanOrEqual, 2 },
        duration_since = { "durationSince", ExtensionFn::DurationSince, 2 },
        to_milliseconds = { "toMilliseconds", ExtensionFn::ToMilliseconds, 1 },
    )]
    fn test_lookup(name: &str, expected: ExtensionFn, arity: usize) {
        let func = ExtensionFn::lookup(name).unwrap();
        assert_eq!(func, expected);
        assert_eq!(func.arity(), arity);
        assert_eq!(func.name(), name);
    }

    #[test]
    fn test_unknown_function() {
        assert_eq!(
            ExtensionFn::lookup("frobnicate").unwrap_err(),
            EvalError::UnknownExtensionFunction("frobnicate".to_string())
        );
    }

    #[test]
    fn test_arity_checked() {
        let err = call("ip", &[s("10.0.0.1"), s("10.0.0.2")]).unwrap_err();
        assert_eq!(
            err,
            EvalError::Arity {
                function: "ip".to_string(),
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn test_ip_predicates() {
        let addr = call("ip", &[s("192.168.0.1")]).unwrap();
        let range = call("ip", &[s("192.168.0.0/16")]).unwrap();
        assert_eq!(call("isIpv4", &[addr.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(call("isIpv6", &[addr.clone()]).unwrap(), Value::Bool(false));
        assert_eq!(call("isInRange", &[addr, range]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_decimal_comparisons() {
        let a = call("decimal", &[s("1.23")]).unwrap();
        let b = call("decimal", &[s("1.2301")]).unwrap();
        assert_eq!(call("lessThan", &[a.clone(), b.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(call("greaterThanOrEqual", &[a.clone(), a.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(call("greaterThan", &[a, b]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_argument_type_checked() {
        let err = call("isIpv4", &[s("10.0.0.1")]).unwrap_err();
        assert_eq!(
            err,
            EvalError::TypeError {
                expected: vec![Type::Ipaddr],
                actual: Type::String
            }
        );
        assert!(matches!(
            call("decimal", &[s("abc")]),
            Err(EvalError::InvalidExtensionArgument { .. })
        ));
    }

    #[test]
    fn test_datetime_functions() {
        let dt = call("datetime", &[s("2024-10-15T11:38:02Z")]).unwrap();
        let day = call("duration", &[s("1d")]).unwrap();
        let next = call("offset", &[dt.clone(), day]).unwrap();
        let since = call("durationSince", &[next, dt.clone()]).unwrap();
        assert_eq!(call("toHours", &[since]).unwrap(), Value::Long(24));
        assert_eq!(
            call("toDate", &[dt.clone()]).unwrap(),
            call("datetime", &[s("2024-10-15")]).unwrap()
        );
        let time = call("toTime", &[dt]).unwrap();
        assert_eq!(call("toSeconds", &[time]).unwrap(), Value::Long(41_882));
    }

    #[test]
    fn test_registry_complete() {
        let names: Vec<&str> = ExtensionFn::iter().map(ExtensionFn::name).collect();
        assert_eq!(names.len(), 22);
        for name in names {
            assert!(ExtensionFn::lookup(name).is_ok());
        }
    }
}
