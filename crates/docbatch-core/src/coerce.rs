//! Value coercion: raw descriptor strings to typed keyword values.
//!
//! [`coerce`] is a total function over [`KeywordDataType`] with no I/O.
//! Every parse rule is locale-invariant: `.` is the only decimal
//! separator, no digit grouping is accepted, and slash dates are read
//! month-first.
//!
//! | Data type | Representation | Rule |
//! |-----------|----------------|------|
//! | `AlphaNumeric` | [`KeywordValue::Text`] | pass-through |
//! | `Currency`, `SpecificCurrency`, `Numeric20` | [`KeywordValue::Decimal`] | arbitrary-precision decimal |
//! | `Date`, `DateTime` | [`KeywordValue::DateTime`] | date-time; `Date` drops the time of day |
//! | `FloatingPoint` | [`KeywordValue::Float`] | finite 64-bit float |
//! | `Numeric9` | [`KeywordValue::Integer`] | 64-bit integer |

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use thiserror::Error;

use crate::error::BatchError;
use crate::models::{KeywordDataType, KeywordType, KeywordValue, TypedKeyword};

/// A raw value that does not parse under the target rule.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot read '{raw}' as {data_type}: {reason}")]
pub struct CoercionError {
    pub raw: String,
    pub data_type: KeywordDataType,
    pub reason: String,
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Convert `raw` into the representation required by `data_type`.
pub fn coerce(raw: &str, data_type: KeywordDataType) -> Result<KeywordValue, CoercionError> {
    let fail = |reason: &str| CoercionError {
        raw: raw.to_string(),
        data_type,
        reason: reason.to_string(),
    };

    match data_type {
        KeywordDataType::AlphaNumeric => Ok(KeywordValue::Text(raw.to_string())),
        KeywordDataType::Currency
        | KeywordDataType::SpecificCurrency
        | KeywordDataType::Numeric20 => {
            let trimmed = non_empty(raw).ok_or_else(|| fail("empty value"))?;
            BigDecimal::from_str(trimmed)
                .map(KeywordValue::Decimal)
                .map_err(|e| fail(&e.to_string()))
        }
        KeywordDataType::Numeric9 => {
            let trimmed = non_empty(raw).ok_or_else(|| fail("empty value"))?;
            trimmed
                .parse::<i64>()
                .map(KeywordValue::Integer)
                .map_err(|e| fail(&e.to_string()))
        }
        KeywordDataType::FloatingPoint => {
            let trimmed = non_empty(raw).ok_or_else(|| fail("empty value"))?;
            let value = trimmed
                .parse::<f64>()
                .map_err(|e| fail(&e.to_string()))?;
            if !value.is_finite() {
                return Err(fail("value is not finite"));
            }
            Ok(KeywordValue::Float(value))
        }
        KeywordDataType::DateTime => {
            let trimmed = non_empty(raw).ok_or_else(|| fail("empty value"))?;
            parse_date_time(trimmed)
                .map(KeywordValue::DateTime)
                .ok_or_else(|| fail("unrecognized date/time format"))
        }
        KeywordDataType::Date => {
            let trimmed = non_empty(raw).ok_or_else(|| fail("empty value"))?;
            parse_date_time(trimmed)
                .map(|dt| KeywordValue::DateTime(dt.date().and_time(NaiveTime::MIN)))
                .ok_or_else(|| fail("unrecognized date format"))
        }
    }
}

impl KeywordType {
    /// Coerce `raw` under this keyword's declared data type.
    pub fn coerce(&self, raw: &str) -> Result<TypedKeyword, BatchError> {
        coerce(raw, self.data_type)
            .map(|value| TypedKeyword {
                keyword_type: self.clone(),
                value,
            })
            .map_err(|e| BatchError::Coercion {
                keyword: self.name.clone(),
                raw: e.raw,
                data_type: e.data_type,
                reason: e.reason,
            })
    }
}

fn non_empty(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    // Offsets are accepted but the wall-clock time is kept as written.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
