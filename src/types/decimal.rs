//! Fixed-point decimals with four fractional digits.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::EvalError;

const SCALE: i64 = 10_000;
const DIGITS: usize = 4;

static DECIMAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(-?)([0-9]+)\.([0-9]{1,4})$").expect("decimal pattern must compile")
});

/// A signed decimal stored as an integer count of 1/10000ths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Decimal(i64);

impl Decimal {
    pub fn from_raw(raw: i64) -> Self {
        Decimal(raw)
    }

    pub fn raw(&self) -> i64 {
        self.0
    }
}

fn invalid(input: &str, message: &str) -> EvalError {
    EvalError::InvalidExtensionArgument {
        function: "decimal".to_string(),
        message: format!("{input:?}: {message}"),
    }
}

impl FromStr for Decimal {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DECIMAL_RE
            .captures(s)
            .ok_or_else(|| invalid(s, "expected digits, a dot and 1 to 4 fractional digits"))?;
        let negative = !caps[1].is_empty();
        let whole: i64 = caps[2]
            .parse()
            .map_err(|_| invalid(s, "value out of range"))?;
        let frac_text = &caps[3];
        let frac: i64 = format!("{frac_text:0<DIGITS$}")
            .parse()
            .map_err(|_| invalid(s, "value out of range"))?;

        let magnitude = whole
            .checked_mul(SCALE)
            .ok_or_else(|| invalid(s, "value out of range"))?;
        // Accumulate with the sign applied so i64::MIN / SCALE stays representable.
        let raw = if negative {
            magnitude
                .checked_neg()
                .and_then(|m| m.checked_sub(frac))
        } else {
            magnitude.checked_add(frac)
        };
        raw.map(Decimal)
            .ok_or_else(|| invalid(s, "value out of range"))
    }
}

impl Display for Decimal {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = SCALE as u64;
        write!(f, "{sign}{}.{:04}", abs / scale, abs % scale)
    }
}
