//! Client-side parameter substitution (`pyformat` style) and identifier
//! quoting.
//!
//! The engine has no bind parameters, so values are rendered as SQL literals
//! with quote escaping before the statement text leaves the client.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ClientError, ClientResult};

/// A value bound into statement text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    List(Vec<SqlParam>),
}

impl From<bool> for SqlParam {
    fn from(v: bool) -> Self {
        SqlParam::Bool(v)
    }
}

impl From<i32> for SqlParam {
    fn from(v: i32) -> Self {
        SqlParam::Int(i64::from(v))
    }
}

impl From<i64> for SqlParam {
    fn from(v: i64) -> Self {
        SqlParam::Int(v)
    }
}

impl From<f64> for SqlParam {
    fn from(v: f64) -> Self {
        SqlParam::Float(v)
    }
}

impl From<&str> for SqlParam {
    fn from(v: &str) -> Self {
        SqlParam::Str(v.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(v: String) -> Self {
        SqlParam::Str(v)
    }
}

impl From<NaiveDate> for SqlParam {
    fn from(v: NaiveDate) -> Self {
        SqlParam::Date(v)
    }
}

impl From<NaiveDateTime> for SqlParam {
    fn from(v: NaiveDateTime) -> Self {
        SqlParam::Timestamp(v)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlParam::Null)
    }
}

impl<T: Into<SqlParam>> From<Vec<T>> for SqlParam {
    fn from(v: Vec<T>) -> Self {
        SqlParam::List(v.into_iter().map(Into::into).collect())
    }
}

/// Parameters for one statement: `%s` placeholders take positional values,
/// `%(name)s` placeholders take named ones.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<SqlParam>),
    Named(HashMap<String, SqlParam>),
}

impl Params {
    pub fn positional<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlParam>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, T>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
        T: Into<SqlParam>,
    {
        Params::Named(
            values
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

fn escape_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Render one parameter as a SQL literal.
pub fn escape(param: &SqlParam) -> ClientResult<String> {
    Ok(match param {
        SqlParam::Null => "NULL".to_string(),
        SqlParam::Bool(true) => "TRUE".to_string(),
        SqlParam::Bool(false) => "FALSE".to_string(),
        SqlParam::Int(v) => v.to_string(),
        SqlParam::Float(v) => {
            if !v.is_finite() {
                return Err(ClientError::InvalidArgument(format!(
                    "cannot bind non-finite float {}",
                    v
                )));
            }
            // keep a decimal point so the engine reads a double, not an integer
            if v.fract() == 0.0 && v.abs() < 1e16 {
                format!("{:.1}", v)
            } else {
                v.to_string()
            }
        }
        SqlParam::Str(s) => escape_string(s),
        SqlParam::Date(d) => format!("date '{}'", d.format("%Y-%m-%d")),
        SqlParam::Timestamp(ts) => {
            format!("timestamp '{}'", ts.format("%Y-%m-%d %H:%M:%S%.3f"))
        }
        SqlParam::List(items) => {
            let rendered = items.iter().map(escape).collect::<ClientResult<Vec<_>>>()?;
            format!("({})", rendered.join(", "))
        }
    })
}

/// Substitute `params` into `sql`. `%%` is a literal percent sign; without
/// parameters the text is passed through untouched.
pub fn substitute(sql: &str, params: Option<&Params>) -> ClientResult<String> {
    let params = match params {
        Some(p) => p,
        None => return Ok(sql.to_string()),
    };

    let mut out = String::with_capacity(sql.len() + 16);
    let mut chars = sql.char_indices().peekable();
    let mut next_positional = 0usize;

    while let Some((pos, ch)) = chars.next() {
        if ch != '%' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some((_, '%')) => out.push('%'),
            Some((_, 's')) => {
                let values = match params {
                    Params::Positional(v) => v,
                    Params::Named(_) => {
                        return Err(ClientError::InvalidArgument(format!(
                            "positional placeholder at offset {} with named parameters",
                            pos
                        )))
                    }
                };
                let value = values.get(next_positional).ok_or_else(|| {
                    ClientError::InvalidArgument(format!(
                        "not enough parameters: placeholder #{} has no value",
                        next_positional + 1
                    ))
                })?;
                out.push_str(&escape(value)?);
                next_positional += 1;
            }
            Some((start, '(')) => {
                let name_start = start + 1;
                let mut name_end = None;
                for (i, c) in chars.by_ref() {
                    if c == ')' {
                        name_end = Some(i);
                        break;
                    }
                }
                let name_end = name_end.ok_or_else(|| {
                    ClientError::InvalidArgument(format!(
                        "unterminated placeholder at offset {}",
                        pos
                    ))
                })?;
                if !matches!(chars.next(), Some((_, 's'))) {
                    return Err(ClientError::InvalidArgument(format!(
                        "placeholder at offset {} must end with 's'",
                        pos
                    )));
                }
                let name = &sql[name_start..name_end];
                let values = match params {
                    Params::Named(v) => v,
                    Params::Positional(_) => {
                        return Err(ClientError::InvalidArgument(format!(
                            "named placeholder '{}' with positional parameters",
                            name
                        )))
                    }
                };
                let value = values.get(name).ok_or_else(|| {
                    ClientError::InvalidArgument(format!("missing parameter '{}'", name))
                })?;
                out.push_str(&escape(value)?);
            }
            other => {
                return Err(ClientError::InvalidArgument(format!(
                    "unsupported format character {:?} at offset {}",
                    other.map(|(_, c)| c),
                    pos
                )))
            }
        }
    }

    if let Params::Positional(values) = params {
        if next_positional != values.len() {
            return Err(ClientError::InvalidArgument(format!(
                "{} parameters supplied but statement uses {}",
                values.len(),
                next_positional
            )));
        }
    }
    Ok(out)
}

/// Quote an identifier for embedding in generated SQL. Every identifier is
/// quoted, so reserved words and mixed case are always preserved.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
