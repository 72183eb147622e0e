//! Decoded column values and the per-type cell codec.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

use crate::registry::LogicalType;

/// A decoded result value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i32),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Varchar(String),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn logical_type(&self) -> LogicalType {
        match self {
            Value::Null => LogicalType::Null,
            Value::Integer(_) => LogicalType::Integer,
            Value::Long(_) => LogicalType::Long,
            Value::Double(_) => LogicalType::Double,
            Value::Boolean(_) => LogicalType::Boolean,
            Value::Varchar(_) => LogicalType::Varchar,
            Value::Timestamp(_) => LogicalType::Timestamp,
            Value::Date(_) => LogicalType::Date,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Varchar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Varchar(v) => f.write_str(v),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.3f")),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
        }
    }
}

// 1970-01-01
fn epoch_date() -> NaiveDate {
    NaiveDate::default()
}

fn fixed<const N: usize>(bytes: &[u8]) -> Result<[u8; N], String> {
    bytes
        .try_into()
        .map_err(|_| format!("expected {} bytes, got {}", N, bytes.len()))
}

/// Decode one non-null cell. `Unknown` never reaches this point in practice;
/// it is rejected here as well so the match stays exhaustive.
pub fn decode_cell(logical: LogicalType, bytes: &[u8]) -> Result<Value, String> {
    match logical {
        LogicalType::Integer => Ok(Value::Integer(i32::from_le_bytes(fixed::<4>(bytes)?))),
        LogicalType::Long => Ok(Value::Long(i64::from_le_bytes(fixed::<8>(bytes)?))),
        LogicalType::Double => Ok(Value::Double(f64::from_le_bytes(fixed::<8>(bytes)?))),
        LogicalType::Boolean => match fixed::<1>(bytes)? {
            [0] => Ok(Value::Boolean(false)),
            [1] => Ok(Value::Boolean(true)),
            [b] => Err(format!("invalid boolean byte 0x{:02x}", b)),
        },
        LogicalType::Varchar => String::from_utf8(bytes.to_vec())
            .map(Value::Varchar)
            .map_err(|e| format!("invalid UTF-8: {}", e)),
        LogicalType::Timestamp => {
            let micros = i64::from_le_bytes(fixed::<8>(bytes)?);
            DateTime::from_timestamp_micros(micros)
                .map(|dt| Value::Timestamp(dt.naive_utc()))
                .ok_or_else(|| format!("timestamp {}us out of range", micros))
        }
        LogicalType::Date => {
            let days = i32::from_le_bytes(fixed::<4>(bytes)?);
            epoch_date()
                .checked_add_signed(chrono::Duration::days(i64::from(days)))
                .map(Value::Date)
                .ok_or_else(|| format!("date {} days out of range", days))
        }
        LogicalType::Null => {
            if bytes.is_empty() {
                Ok(Value::Null)
            } else {
                Err(format!("{} bytes in a NULL-typed column", bytes.len()))
            }
        }
        LogicalType::Unknown => Err("no decoder for unrecognized type".to_string()),
    }
}

/// Encode a value into its wire cell; `None` for SQL NULL.
pub fn encode_cell(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Null => None,
        Value::Integer(v) => Some(v.to_le_bytes().to_vec()),
        Value::Long(v) => Some(v.to_le_bytes().to_vec()),
        Value::Double(v) => Some(v.to_le_bytes().to_vec()),
        Value::Boolean(v) => Some(vec![u8::from(*v)]),
        Value::Varchar(v) => Some(v.as_bytes().to_vec()),
        Value::Timestamp(v) => Some(v.and_utc().timestamp_micros().to_le_bytes().to_vec()),
        Value::Date(v) => {
            // exact for every NaiveDate: both operands are i32 day counts
            let days = v.num_days_from_ce() - epoch_date().num_days_from_ce();
            Some(days.to_le_bytes().to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_family_decodes_native() {
        let cell = encode_cell(&Value::Integer(-42)).unwrap();
        assert_eq!(
            decode_cell(LogicalType::Integer, &cell).unwrap(),
            Value::Integer(-42)
        );
    }

    #[test]
    fn test_wide_integer_needs_eight_bytes() {
        let err = decode_cell(LogicalType::Long, &[1, 2, 3, 4]).unwrap_err();
        assert!(err.contains("expected 8 bytes"), "{}", err);
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        assert!(decode_cell(LogicalType::Varchar, &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_temporal_values() {
        let ts = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_milli_opt(13, 45, 7, 250)
            .unwrap();
        let cell = encode_cell(&Value::Timestamp(ts)).unwrap();
        assert_eq!(
            decode_cell(LogicalType::Timestamp, &cell).unwrap(),
            Value::Timestamp(ts)
        );

        let d = NaiveDate::from_ymd_opt(1969, 12, 31).unwrap();
        let cell = encode_cell(&Value::Date(d)).unwrap();
        assert_eq!(cell, (-1i32).to_le_bytes().to_vec());
        assert_eq!(decode_cell(LogicalType::Date, &cell).unwrap(), Value::Date(d));
    }

    #[test]
    fn test_date_range_extremes() {
        for d in [NaiveDate::MIN, NaiveDate::MAX, NaiveDate::default()] {
            let cell = encode_cell(&Value::Date(d)).unwrap();
            assert_eq!(decode_cell(LogicalType::Date, &cell).unwrap(), Value::Date(d));
        }
        let epoch = encode_cell(&Value::Date(NaiveDate::default())).unwrap();
        assert_eq!(epoch, 0i32.to_le_bytes().to_vec());
    }

    #[test]
    fn test_boolean_strictness() {
        assert_eq!(
            decode_cell(LogicalType::Boolean, &[1]).unwrap(),
            Value::Boolean(true)
        );
        assert!(decode_cell(LogicalType::Boolean, &[2]).is_err());
    }

    #[test]
    fn test_unknown_never_decodes() {
        assert!(decode_cell(LogicalType::Unknown, &[]).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Varchar("x".into()).to_string(), "x");
        let d = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(Value::Date(d).to_string(), "2024-01-05");
    }
}
