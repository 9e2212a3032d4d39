//! Resource quantities
//!
//! Kubernetes expresses resource amounts as strings (`"2"`, `"50Mi"`, `"100m"`).
//! [`Quantity`] is the wire form stored in the CRD; [`QuantityValue`] is the
//! parsed, exact value used for comparisons.
//!
//! Values are held as a count of nano-units in an `i128`, so every quantity
//! Kubernetes can express (up to the exa range) is represented exactly.
//! Fractions finer than one nano-unit round away from zero, matching the
//! API server's rounding.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Mapping of resource name (`cpu`, `memory`, `pods`, `nvidia.com/gpu`, ...) to quantity.
pub type ResourceList = BTreeMap<String, Quantity>;

/// A resource quantity in its Kubernetes string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Quantity(pub String);

impl Quantity {
    /// Wraps a quantity string without validating it.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses the quantity into an exact value.
    pub fn value(&self) -> Result<QuantityValue, QuantityError> {
        self.0.parse()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Quantity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&k8s_openapi::apimachinery::pkg::api::resource::Quantity> for Quantity {
    fn from(value: &k8s_openapi::apimachinery::pkg::api::resource::Quantity) -> Self {
        Self(value.0.clone())
    }
}

impl From<&Quantity> for k8s_openapi::apimachinery::pkg::api::resource::Quantity {
    fn from(value: &Quantity) -> Self {
        Self(value.0.clone())
    }
}

/// Errors produced when parsing a quantity string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QuantityError {
    /// The string was empty
    #[error("empty quantity")]
    Empty,

    /// The string is not a valid Kubernetes quantity
    #[error("invalid quantity {0:?}")]
    Invalid(String),

    /// The value cannot be represented at nano precision
    #[error("quantity {0:?} is out of range")]
    OutOfRange(String),
}

/// Exact decimal quantity, stored as nano-units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QuantityValue {
    nanos: i128,
}

impl QuantityValue {
    /// The zero quantity.
    pub const ZERO: Self = Self { nanos: 0 };

    /// Builds a value from a count of nano-units.
    #[must_use]
    pub const fn from_nanos(nanos: i128) -> Self {
        Self { nanos }
    }

    /// Returns the value as a count of nano-units.
    #[must_use]
    pub const fn nanos(self) -> i128 {
        self.nanos
    }

    /// True when the value is exactly zero.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.nanos == 0
    }

    /// True when the value is strictly below zero.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.nanos < 0
    }

    /// True when the value is strictly above zero.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.nanos > 0
    }

    /// Adds two values, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.nanos.checked_add(other.nanos).map(Self::from_nanos)
    }
}

impl FromStr for QuantityValue {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(QuantityError::Empty);
        }
        let invalid = || QuantityError::Invalid(s.to_string());
        let out_of_range = || QuantityError::OutOfRange(s.to_string());

        let (negative, rest) = if let Some(rest) = input.strip_prefix('-') {
            (true, rest)
        } else {
            (false, input.strip_prefix('+').unwrap_or(input))
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }

        let mut mantissa: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(out_of_range)?;
        }

        let (multiplier, suffix_exponent) = parse_suffix(suffix).ok_or_else(invalid)?;
        let exponent = i32::try_from(fraction.len())
            .ok()
            .and_then(|digits| suffix_exponent.checked_add(9)?.checked_sub(digits))
            .ok_or_else(out_of_range)?;

        let magnitude = scale(mantissa, multiplier, exponent).ok_or_else(out_of_range)?;
        Ok(Self::from_nanos(if negative { -magnitude } else { magnitude }))
    }
}

/// Maps a suffix to `(binary multiplier, decimal exponent)`.
fn parse_suffix(suffix: &str) -> Option<(i128, i32)> {
    let parsed = match suffix {
        "" => (1, 0),
        "Ki" => (1 << 10, 0),
        "Mi" => (1 << 20, 0),
        "Gi" => (1 << 30, 0),
        "Ti" => (1 << 40, 0),
        "Pi" => (1 << 50, 0),
        "Ei" => (1 << 60, 0),
        "n" => (1, -9),
        "u" => (1, -6),
        "m" => (1, -3),
        "k" => (1, 3),
        "M" => (1, 6),
        "G" => (1, 9),
        "T" => (1, 12),
        "P" => (1, 15),
        "E" => (1, 18),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            (1, exponent.parse::<i32>().ok()?)
        }
    };
    Some(parsed)
}

fn scale(mantissa: i128, multiplier: i128, exponent: i32) -> Option<i128> {
    let value = mantissa.checked_mul(multiplier)?;
    if value == 0 {
        return Some(0);
    }
    if exponent >= 0 {
        return value.checked_mul(10_i128.checked_pow(exponent.unsigned_abs())?);
    }
    match 10_i128.checked_pow(exponent.unsigned_abs()) {
        Some(divisor) => Some(value / divisor + i128::from(value % divisor != 0)),
        // Anything this small rounds up to a single nano-unit
        None => Some(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NANOS: i128 = 1_000_000_000;

    fn parse(s: &str) -> QuantityValue {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_plain_integers() {
        assert_eq!(parse("2").nanos(), 2 * NANOS);
        assert_eq!(parse("110").nanos(), 110 * NANOS);
        assert_eq!(parse("0"), QuantityValue::ZERO);
    }

    #[test]
    fn test_parse_binary_suffixes() {
        assert_eq!(parse("50Mi").nanos(), 50 * 1_048_576 * NANOS);
        assert_eq!(parse("1Ki").nanos(), 1024 * NANOS);
        assert_eq!(parse("1.5Gi").nanos(), 1_610_612_736 * NANOS);
    }

    #[test]
    fn test_parse_decimal_suffixes_and_exponents() {
        assert_eq!(parse("100m").nanos(), NANOS / 10);
        assert_eq!(parse("1k").nanos(), 1000 * NANOS);
        assert_eq!(parse("1e3"), parse("1k"));
        assert_eq!(parse("1E-3"), parse("1m"));
        assert_eq!(parse("1000m"), parse("1"));
        assert_eq!(parse("5n").nanos(), 5);
    }

    #[test]
    fn test_exa_suffix_is_not_an_exponent() {
        assert_eq!(parse("2E").nanos(), 2 * 10_i128.pow(18) * NANOS);
    }

    #[test]
    fn test_sub_nano_fractions_round_up() {
        assert_eq!(parse("0.1n").nanos(), 1);
        assert_eq!(parse("1.0000000001").nanos(), NANOS + 1);
    }

    #[test]
    fn test_sign_handling() {
        assert!(parse("-1").is_negative());
        assert!(parse("+1").is_positive());
        assert!(parse("-0").is_zero());
    }

    #[test]
    fn test_invalid_quantities() {
        assert_eq!("".parse::<QuantityValue>(), Err(QuantityError::Empty));
        assert!(matches!("abc".parse::<QuantityValue>(), Err(QuantityError::Invalid(_))));
        assert!(matches!("1Zi".parse::<QuantityValue>(), Err(QuantityError::Invalid(_))));
        assert!(matches!("1.2.3".parse::<QuantityValue>(), Err(QuantityError::Invalid(_))));
        assert!(matches!("1e".parse::<QuantityValue>(), Err(QuantityError::Invalid(_))));
        assert!(matches!("-".parse::<QuantityValue>(), Err(QuantityError::Invalid(_))));
    }

    #[test]
    fn test_out_of_range() {
        assert!(matches!("1e40".parse::<QuantityValue>(), Err(QuantityError::OutOfRange(_))));
    }

    #[test]
    fn test_ordering_is_exact() {
        assert!(parse("1Gi") > parse("1G"));
        assert!(parse("999m") < parse("1"));
        assert_eq!(parse("1").checked_add(parse("500m")), Some(parse("1.5")));
    }

    #[test]
    fn test_quantity_wire_form() {
        let quantity = Quantity::from("80Mi");
        assert_eq!(serde_json::to_string(&quantity).unwrap(), "\"80Mi\"");
        assert_eq!(quantity.value().unwrap(), parse("80Mi"));
    }
}
