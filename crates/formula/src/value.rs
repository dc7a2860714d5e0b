//! The resolved value model.
//!
//! Every formula resolves to a [`Value`]: a tagged variant carrying its own
//! coercion rules. Coercions are total except for text-to-number, which
//! fails with [`ResolveError::NotANumber`] when the text does not parse.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ResolveError;

/// A dice-roll quantity such as `2d6`.
///
/// Rolls are never sampled; the numeric view is the expectation
/// `count * (sides + 1) / 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roll {
    pub count: i64,
    pub sides: i64,
}

impl Roll {
    /// Expected value of the roll. Computed in floats; large counts and
    /// side counts lose precision instead of overflowing.
    #[inline]
    pub fn expectation(&self) -> f64 {
        self.count as f64 * (self.sides as f64 + 1.0) / 2.0
    }
}

impl fmt::Display for Roll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)
    }
}

/// A resolved formula value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// The absent value. Coerces to `""`, `0` and `false`.
    #[default]
    Null,
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    /// An ordered collection. Most scalar coercions collapse a list to its
    /// last element.
    List(Vec<Value>),
    /// A dice roll; numeric coercions use its expectation.
    Roll(Roll),
    /// A value decorated with a `[label]` comment. Coerces like its inner
    /// value.
    Named { value: Box<Value>, label: String },
    /// A quoted text literal that remembers its original delimiters so
    /// formula rendering can reproduce them. Coerces like its inner value.
    Quoted {
        value: Box<Value>,
        prefix: String,
        suffix: String,
    },
}

impl Value {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn roll(count: i64, sides: i64) -> Self {
        Self::Roll(Roll { count, sides })
    }

    pub fn named(value: Value, label: impl Into<String>) -> Self {
        Self::Named {
            value: Box::new(value),
            label: label.into(),
        }
    }

    pub fn quoted(value: Value, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::Quoted {
            value: Box::new(value),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Strips `Named` and `Quoted` decorations.
    fn inner(&self) -> &Value {
        match self {
            Self::Named { value, .. } | Self::Quoted { value, .. } => value.inner(),
            other => other,
        }
    }

    /// Whether this carries an actual value. Only `Null` (possibly behind
    /// decorations) does not.
    pub fn has_value(&self) -> bool {
        !matches!(self.inner(), Self::Null)
    }

    /// Text view. Total: `Null` becomes the empty string, booleans become
    /// `true`/`false`, lists collapse to their last element.
    pub fn as_text(&self) -> String {
        match self.inner() {
            Self::Null => String::new(),
            Self::Text(text) => text.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Decimal(d) => d.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::List(items) => items.last().map(Value::as_text).unwrap_or_default(),
            Self::Roll(roll) => roll.to_string(),
            Self::Named { .. } | Self::Quoted { .. } => unreachable!("stripped by inner()"),
        }
    }

    /// Integer view. Decimals truncate toward zero; text must parse.
    pub fn as_number(&self) -> Result<i64, ResolveError> {
        match self.inner() {
            Self::Null => Ok(0),
            Self::Text(text) => text
                .parse()
                .map_err(|_| ResolveError::NotANumber(text.clone())),
            Self::Integer(n) => Ok(*n),
            Self::Decimal(d) => Ok(*d as i64),
            Self::Boolean(b) => Ok(i64::from(*b)),
            Self::List(items) => items.last().map_or(Ok(0), Value::as_number),
            Self::Roll(roll) => Ok(roll.expectation() as i64),
            Self::Named { .. } | Self::Quoted { .. } => unreachable!("stripped by inner()"),
        }
    }

    /// Decimal view. Text must parse; rolls use their expectation.
    pub fn as_decimal(&self) -> Result<f64, ResolveError> {
        match self.inner() {
            Self::Null => Ok(0.0),
            Self::Text(text) => text
                .parse()
                .map_err(|_| ResolveError::NotANumber(text.clone())),
            Self::Integer(n) => Ok(*n as f64),
            Self::Decimal(d) => Ok(*d),
            Self::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Self::List(items) => items.last().map_or(Ok(0.0), Value::as_decimal),
            Self::Roll(roll) => Ok(roll.expectation()),
            Self::Named { .. } | Self::Quoted { .. } => unreachable!("stripped by inner()"),
        }
    }

    /// Boolean view. Total: for text only `true`/`yes` (case-insensitive)
    /// are true; numbers are true when nonzero.
    pub fn as_boolean(&self) -> bool {
        match self.inner() {
            Self::Null => false,
            Self::Text(text) => {
                matches!(text.to_ascii_lowercase().as_str(), "true" | "yes")
            }
            Self::Integer(n) => *n != 0,
            Self::Decimal(d) => *d != 0.0,
            Self::Boolean(b) => *b,
            Self::List(items) => items.last().is_some_and(Value::as_boolean),
            Self::Roll(roll) => roll.count != 0 && roll.sides != 0,
            Self::Named { .. } | Self::Quoted { .. } => unreachable!("stripped by inner()"),
        }
    }

    /// List view: lists yield their elements, `Null` is empty, any other
    /// value becomes a single-element list.
    pub fn as_list(&self) -> Vec<Value> {
        match self.inner() {
            Self::List(items) => items.clone(),
            Self::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// Non-failing decimal view used by equality: `None` when the value has
    /// no numeric reading.
    fn decimal_view(&self) -> Option<f64> {
        match self.inner() {
            Self::Null => Some(0.0),
            Self::Text(text) => text.parse().ok(),
            Self::Integer(n) => Some(*n as f64),
            Self::Decimal(d) => Some(*d),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::List(items) => items.last().map_or(Some(0.0), Value::decimal_view),
            Self::Roll(roll) => Some(roll.expectation()),
            Self::Named { .. } | Self::Quoted { .. } => unreachable!("stripped by inner()"),
        }
    }
}

/// Equality dispatches on the left operand's kind: booleans compare boolean
/// views, numbers compare decimal views, text compares text views.
///
/// Two lists compare by their collapsed decimal view (the last element).
/// `[1, 2] == [5, 2]` is therefore true; kept as documented behaviour.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match self.inner() {
            Self::Null => !other.has_value(),
            Self::Boolean(b) => other.has_value() && *b == other.as_boolean(),
            Self::Integer(_) | Self::Decimal(_) | Self::Roll(_) => {
                other.has_value()
                    && match (self.decimal_view(), other.decimal_view()) {
                        (Some(lhs), Some(rhs)) => lhs == rhs,
                        _ => false,
                    }
            }
            Self::Text(text) => other.has_value() && *text == other.as_text(),
            Self::List(_) => match (self.decimal_view(), other.decimal_view()) {
                (Some(lhs), Some(rhs)) => lhs == rhs,
                _ => false,
            },
            Self::Named { .. } | Self::Quoted { .. } => unreachable!("stripped by inner()"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Self::Decimal(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Decimal(n.as_f64().unwrap_or(0.0)), Self::Integer),
            serde_json::Value::String(text) => Self::Text(text),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            // No structured variant for objects; keep the JSON spelling.
            object @ serde_json::Value::Object(_) => Self::Text(object.to_string()),
        }
    }
}
