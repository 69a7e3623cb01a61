//! The runtime value type and the (lossy-but-total) coercion rules used for
//! host function arguments.

use crate::ast::Literal;
use chrono::{DateTime, Utc};
use derive_more::From;
use indexmap::IndexMap;
use itertools::Itertools;
use std::fmt::{self, Display};

/// A dynamically-typed runtime value. Every template expression evaluates to
/// one of these.
#[derive(Clone, Debug, Default, From, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    #[from(skip)]
    Array(Vec<Self>),
    #[from(skip)]
    Object(IndexMap<String, Self>),
    Instant(DateTime<Utc>),
}

pub const NULL: &str = "";
pub const TRUE: &str = "true";
pub const FALSE: &str = "false";

impl Value {
    /// Truthiness, per the engine's rules: `nil` is false, zero/empty is
    /// false, everything else is true.
    pub fn to_bool(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty() && s != "0" && s != "false",
            Self::Array(a) => !a.is_empty(),
            Self::Object(o) => !o.is_empty(),
            Self::Instant(_) => true,
        }
    }

    /// Stringify for concatenation, echo, and templated output. Total: every
    /// value has a string form.
    pub fn stringify(&self) -> String {
        match self {
            Self::Null => NULL.to_owned(),
            Self::Bool(true) => TRUE.to_owned(),
            Self::Bool(false) => FALSE.to_owned(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Array(_) | Self::Object(_) => self.to_string(),
            Self::Instant(dt) => dt.to_rfc3339(),
        }
    }

    /// Best-effort conversion to a float. Used for arithmetic operand
    /// coercion; returns `None` when the value has no sensible numeric
    /// reading.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Best-effort conversion to an integer, truncating floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) => Some(*f as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::String(s) => s
                .trim()
                .parse()
                .ok()
                .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
            _ => None,
        }
    }

    /// Whether this value "looks like" a number for the purposes of
    /// arithmetic-result type preservation (int vs float).
    pub fn is_int_like(&self) -> bool {
        matches!(self, Self::Int(_))
            || matches!(self, Self::Bool(_))
            || matches!(self, Self::String(s) if s.trim().parse::<i64>().is_ok())
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::Array(a) => Some(a.len()),
            Self::Object(o) => Some(o.len()),
            _ => None,
        }
    }
}

impl From<&Literal> for Value {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::Null => Self::Null,
            Literal::Bool(b) => Self::Bool(*b),
            Literal::Int(i) => Self::Int(*i),
            Literal::Float(f) => Self::Float(*f),
            Literal::Str(s) => Self::String(s.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl<T> From<Vec<T>> for Value
where
    Value: From<T>,
{
    fn from(value: Vec<T>) -> Self {
        Self::Array(value.into_iter().map(Self::from).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(a) => {
                Self::Array(a.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(o) => Self::Object(
                o.into_iter().map(|(k, v)| (k, Self::from(v))).collect(),
            ),
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Int(i) => Self::Number(i.into()),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Self::Number)
                .unwrap_or(Self::Null),
            Value::String(s) => Self::String(s),
            Value::Array(a) => {
                Self::Array(a.into_iter().map(Self::from).collect())
            }
            Value::Object(o) => Self::Object(
                o.into_iter().map(|(k, v)| (k, Self::from(v))).collect(),
            ),
            Value::Instant(dt) => Self::String(dt.to_rfc3339()),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Array(a) => write!(f, "[{}]", a.iter().format(", ")),
            Self::Object(o) => write!(
                f,
                "{{{}}}",
                o.iter()
                    .format_with(", ", |(k, v), fmt| fmt(&format_args!(
                        "{k}: {v}"
                    )))
            ),
            Self::Instant(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

/// Convert a [Value] into a host-function argument type. Unlike the generic
/// Rust `TryFrom`, this conversion is total: a value that doesn't fit the
/// target type degrades to that type's zero value rather than producing an
/// error. This mirrors the reflection-based coercion described for dynamic
/// host languages, where a function call should never blow up just because
/// a template passed the "wrong" type.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Self;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Self {
        value.clone()
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Self {
        value.to_bool()
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Self {
        value.as_i64().unwrap_or_default()
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Self {
        value.as_f64().unwrap_or_default()
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Self {
        value.stringify()
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Array(items) => items.iter().map(T::from_value).collect(),
            Value::Null => Vec::new(),
            other => vec![T::from_value(other)],
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => None,
            other => Some(T::from_value(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.to_bool());
        assert!(!Value::Int(0).to_bool());
        assert!(Value::Int(-1).to_bool());
        assert!(!Value::Float(0.0).to_bool());
        assert!(!Value::String(String::new()).to_bool());
        assert!(!Value::String("0".into()).to_bool());
        assert!(!Value::String("false".into()).to_bool());
        assert!(Value::String("0.0".into()).to_bool());
        assert!(!Value::Array(Vec::new()).to_bool());
        assert!(Value::Array(vec![Value::Null]).to_bool());
    }

    #[test]
    fn test_stringify() {
        assert_eq!(Value::Null.stringify(), "");
        assert_eq!(Value::Bool(true).stringify(), "true");
        assert_eq!(Value::Int(42).stringify(), "42");
        assert_eq!(Value::String("hi".into()).stringify(), "hi");
    }

    #[test]
    fn test_from_value_total_coercion_never_fails() {
        assert_eq!(i64::from_value(&Value::String("not a number".into())), 0);
        assert_eq!(f64::from_value(&Value::Null), 0.0);
        assert!(!bool::from_value(&Value::Array(Vec::new())));
        assert_eq!(
            Vec::<i64>::from_value(&Value::Int(5)),
            vec![5],
            "a scalar coerces to a single-element vec"
        );
        assert_eq!(Vec::<i64>::from_value(&Value::Null), Vec::<i64>::new());
    }

    #[test]
    fn test_as_i64_truncates_float_strings() {
        assert_eq!(Value::String("3.9".into()).as_i64(), Some(3));
        assert_eq!(Value::Float(3.9).as_i64(), Some(3));
    }

    #[test]
    fn test_is_int_like() {
        assert!(Value::Int(1).is_int_like());
        assert!(Value::String("12".into()).is_int_like());
        assert!(!Value::String("12.5".into()).is_int_like());
        assert!(!Value::Float(1.0).is_int_like());
    }
}
