//! Fixed-point conversion of exchange numeric fields.
//!
//! Values are truncated to 4 decimal digits and stored as the decimal value
//! times [`FIXED_POINT_SCALE`], so the sink never sees floating point.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{ConversionError, QuoteError};

pub const FIXED_POINT_SCALE: u64 = 10_000;
const SCALE_DIGITS: u32 = 4;

/// Converts a decimal string such as `"7617.1"` or `"1.5e-3"`.
pub fn to_fixed_point(raw: &str) -> Result<u64, ConversionError> {
    let trimmed = raw.trim();
    let decimal = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| ConversionError::Unparseable(raw.to_string()))?;

    scale(decimal, raw)
}

/// Converts a JSON number. The shortest decimal representation of the float
/// is used, so `7617.1` becomes exactly `76171000`.
pub fn float_to_fixed_point(value: f64) -> Result<u64, ConversionError> {
    if !value.is_finite() {
        return Err(ConversionError::Unparseable(value.to_string()));
    }
    if value < 0.0 {
        return Err(ConversionError::Negative(value.to_string()));
    }
    if value >= (u64::MAX / FIXED_POINT_SCALE) as f64 {
        return Err(ConversionError::OutOfRange(value.to_string()));
    }

    to_fixed_point(&value.to_string())
}

/// Converts a JSON value that is either a number or a numeric string.
pub fn value_to_fixed_point(value: &Value) -> Result<u64, ConversionError> {
    match value {
        Value::Number(number) => match number.as_f64() {
            Some(float) => float_to_fixed_point(float),
            None => Err(ConversionError::Unparseable(number.to_string())),
        },
        Value::String(raw) => to_fixed_point(raw),
        other => Err(ConversionError::Unparseable(other.to_string())),
    }
}

/// Inverse of the conversion, used when reading quotes back.
pub fn from_fixed_point(value: u64) -> Decimal {
    Decimal::from_i128_with_scale(value as i128, SCALE_DIGITS)
}

/// Tags a conversion failure with the field it came from.
pub(crate) fn field(name: &'static str, result: Result<u64, ConversionError>) -> Result<u64, QuoteError> {
    result.map_err(|source| QuoteError::Conversion {
        field: name,
        source,
    })
}

fn scale(decimal: Decimal, raw: &str) -> Result<u64, ConversionError> {
    if decimal.is_sign_negative() && !decimal.is_zero() {
        return Err(ConversionError::Negative(raw.to_string()));
    }

    decimal
        .checked_mul(Decimal::from(FIXED_POINT_SCALE))
        .map(|scaled| scaled.trunc())
        .and_then(|scaled| scaled.to_u64())
        .ok_or_else(|| ConversionError::OutOfRange(raw.to_string()))
}
