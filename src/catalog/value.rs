//! Literal and Value types for TableDB
//!
//! Literals are the raw constants produced by the parser. Values are the typed
//! data stored in rows. `coerce` is the only way a literal becomes a value.

use super::types::DataType;
use crate::error::{Error, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A literal constant as written in a statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// NULL
    Null,
    /// TRUE or FALSE
    Boolean(bool),
    /// Numeric literal, kept as its source text
    Number(String),
    /// Single-quoted string, with `''` escapes resolved
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "NULL"),
            Literal::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Literal::Number(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// Calendar date. Fields are range-checked but not validated against the
/// calendar, so `2023-02-31` is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl Date {
    pub fn new(year: u16, month: u8, day: u8) -> Option<Self> {
        if year > 9999 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return None;
        }
        Some(Self { year, month, day })
    }
}

impl FromStr for Date {
    type Err = ();

    /// Parse an ISO `YYYY-MM-DD` literal
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        let mut parts = s.split('-');
        let (year, month, day) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(y), Some(m), Some(d), None) => (y, m, d),
            _ => return Err(()),
        };

        let digits = |part: &str, width: usize| {
            part.len() == width && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(year, 4) || !digits(month, 2) || !digits(day, 2) {
            return Err(());
        }

        let year = year.parse().map_err(|_| ())?;
        let month = month.parse().map_err(|_| ())?;
        let day = day.parse().map_err(|_| ())?;
        Date::new(year, month, day).ok_or(())
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

impl Serialize for Date {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| de::Error::custom(format!("invalid date '{}'", s)))
    }
}

/// A value in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Integer value (64-bit)
    Integer(i64),
    /// Text value (VARCHAR and TEXT columns)
    Text(String),
    /// Boolean value
    Boolean(bool),
    /// Decimal value
    Decimal(f64),
    /// Date value
    Date(Date),
}

// Structural equality, used for storage round-trips. Decimals compare bitwise
// so that Value can be Eq and Hash; SQL comparison lives in `sql_eq`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a.to_bits() == b.to_bits(),
            (Value::Date(a), Value::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Integer(v) => v.hash(state),
            Value::Text(v) => v.hash(state),
            Value::Boolean(v) => v.hash(state),
            Value::Decimal(v) => v.to_bits().hash(state),
            Value::Date(v) => v.hash(state),
        }
    }
}

impl Value {
    /// Check if this value is NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL `=`: exact type and value equality. NULL equals nothing, itself
    /// included.
    pub fn sql_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (a, b) => a == b,
        }
    }

    /// Ordering used by ORDER BY. NULL sorts before everything else; values
    /// of different types are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Check whether this value may be stored in a column of the given type
    pub fn fits(&self, data_type: &DataType) -> bool {
        match (self, data_type) {
            (Value::Null, _) => true,
            (Value::Integer(_), DataType::Int) => true,
            (Value::Text(s), DataType::Varchar(n)) => s.chars().count() <= *n,
            (Value::Text(_), DataType::Text) => true,
            (Value::Boolean(_), DataType::Boolean) => true,
            (Value::Decimal(_), DataType::Decimal) => true,
            (Value::Date(_), DataType::Date) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::Decimal(n) => write!(f, "{}", n),
            Value::Date(d) => write!(f, "{}", d),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Date> for Value {
    fn from(v: Date) -> Self {
        Value::Date(v)
    }
}

/// Convert a literal into a value of the given column type.
///
/// NULL coerces to `Value::Null` for every type; nullability is checked by the
/// caller. Quoted text holding a well-formed number converts to INT and
/// DECIMAL, and numbers convert to TEXT and VARCHAR as written. VARCHAR values
/// longer than the declared length are rejected, never truncated.
pub fn coerce(literal: &Literal, data_type: &DataType) -> Result<Value> {
    let mismatch = || Error::TypeMismatch {
        expected: data_type.to_string(),
        found: describe(literal),
    };

    match (literal, data_type) {
        (Literal::Null, _) => Ok(Value::Null),

        (Literal::Number(raw), DataType::Int) => {
            if raw.contains(|c| matches!(c, '.' | 'e' | 'E')) {
                return Err(Error::TypeMismatch {
                    expected: data_type.to_string(),
                    found: format!("fractional number {}", raw),
                });
            }
            raw.parse::<i64>().map(Value::Integer).map_err(|_| mismatch())
        }
        (Literal::Number(raw), DataType::Decimal) => match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(Value::Decimal(n)),
            _ => Err(mismatch()),
        },

        (Literal::String(s), DataType::Int | DataType::Decimal) => {
            if !is_numeric(s) {
                return Err(mismatch());
            }
            coerce(&Literal::Number(s.clone()), data_type)
        }

        (Literal::Boolean(b), DataType::Boolean) => Ok(Value::Boolean(*b)),
        (Literal::String(s), DataType::Boolean) => match s.to_lowercase().as_str() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            _ => Err(mismatch()),
        },

        (Literal::String(s), DataType::Date) => {
            s.parse::<Date>().map(Value::Date).map_err(|_| mismatch())
        }

        (Literal::String(s) | Literal::Number(s), DataType::Varchar(max)) => {
            let length = s.chars().count();
            if length > *max {
                return Err(Error::ValueTooLong {
                    data_type: data_type.to_string(),
                    length,
                });
            }
            Ok(Value::Text(s.clone()))
        }
        (Literal::String(s) | Literal::Number(s), DataType::Text) => Ok(Value::Text(s.clone())),

        _ => Err(mismatch()),
    }
}

/// `-?digits[.digits][(e|E)[+-]digits]`, the shape the lexer accepts for
/// number tokens
fn is_numeric(text: &str) -> bool {
    fn digits(bytes: &[u8]) -> usize {
        bytes.iter().take_while(|b| b.is_ascii_digit()).count()
    }

    let bytes = text.as_bytes();
    let mut pos = usize::from(bytes.first() == Some(&b'-'));

    let whole = digits(&bytes[pos..]);
    if whole == 0 {
        return false;
    }
    pos += whole;

    if bytes.get(pos) == Some(&b'.') {
        let fraction = digits(&bytes[pos + 1..]);
        if fraction == 0 {
            return false;
        }
        pos += 1 + fraction;
    }

    if matches!(bytes.get(pos), Some(b'e' | b'E')) {
        pos += 1;
        if matches!(bytes.get(pos), Some(b'+' | b'-')) {
            pos += 1;
        }
        let exponent = digits(&bytes[pos..]);
        if exponent == 0 {
            return false;
        }
        pos += exponent;
    }

    pos == bytes.len()
}

fn describe(literal: &Literal) -> String {
    match literal {
        Literal::Null => "NULL".to_string(),
        Literal::Boolean(_) => format!("boolean {}", literal),
        Literal::Number(_) => format!("number {}", literal),
        Literal::String(_) => format!("string {}", literal),
    }
}
