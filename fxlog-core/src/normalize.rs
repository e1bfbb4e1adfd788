//! Record normalization: storage-safe attribute values.
//!
//! Every real number is converted to an exact decimal through its canonical
//! text form: `f64` → shortest round-trip string → `Decimal`. Going straight
//! from binary floating point to decimal would encode representation error
//! (`0.1` would become `0.1000000000000000055511151231257827021181583404541015625`).
//! Values with more fractional digits than a `Decimal` carries (float residue
//! such as `2.2e-16`) are rounded at scale 28. Only magnitudes beyond the
//! `Decimal` range are rejected.
//!
//! The conversion recurses through lists and maps, so the rule holds for any
//! record shape. Non-numeric values pass through unchanged.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

const MAX_SCALE: u32 = 28;
const MIN_SCALED: f64 = 1e-28;

/// A stored item: attribute name → value.
pub type Item = BTreeMap<String, AttributeValue>;

/// Heterogeneous input value, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Decimal(Decimal),
    Text(String),
    List(Vec<RawValue>),
    Map(BTreeMap<String, RawValue>),
}

/// Storage representation. Numbers are exact decimals only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    #[serde(rename = "S")]
    S(String),
    #[serde(rename = "N")]
    N(Decimal),
    #[serde(rename = "BOOL")]
    Bool(bool),
    #[serde(rename = "NULL")]
    Null,
    #[serde(rename = "L")]
    L(Vec<AttributeValue>),
    #[serde(rename = "M")]
    M(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::N(d) => Some(*d),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizationError {
    #[error("non-finite number at '{path}': {value}")]
    NonFinite { path: String, value: f64 },

    #[error("number at '{path}' has no exact decimal form: {text}")]
    Unrepresentable { path: String, text: String },

    #[error("expected a map at the top level of a record")]
    NotAMap,
}

/// Exact decimal for a finite `f64`, via its canonical decimal text.
pub fn to_decimal(x: f64) -> Result<Decimal, NormalizationError> {
    real_to_decimal(x, "$")
}

/// Re-canonicalize an existing decimal through its text form.
///
/// Scale and digits are preserved, so this is the identity on well-formed values.
pub fn canonical_decimal(d: Decimal) -> Result<Decimal, NormalizationError> {
    text_to_decimal(&d.to_string(), "$")
}

/// Normalize any value tree.
pub fn normalize(value: &RawValue) -> Result<AttributeValue, NormalizationError> {
    normalize_at(value, "$")
}

/// Normalize a top-level map into a storable item.
pub fn normalize_item(value: &RawValue) -> Result<Item, NormalizationError> {
    match normalize(value)? {
        AttributeValue::M(map) => Ok(map),
        _ => Err(NormalizationError::NotAMap),
    }
}

fn normalize_at(value: &RawValue, path: &str) -> Result<AttributeValue, NormalizationError> {
    Ok(match value {
        RawValue::Null => AttributeValue::Null,
        RawValue::Bool(b) => AttributeValue::Bool(*b),
        RawValue::Text(s) => AttributeValue::S(s.clone()),
        RawValue::Integer(i) => AttributeValue::N(Decimal::from(*i)),
        RawValue::Real(x) => AttributeValue::N(real_to_decimal(*x, path)?),
        RawValue::Decimal(d) => AttributeValue::N(text_to_decimal(&d.to_string(), path)?),
        RawValue::List(items) => AttributeValue::L(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| normalize_at(v, &format!("{path}[{i}]")))
                .collect::<Result<_, _>>()?,
        ),
        RawValue::Map(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| {
                    normalize_at(v, &format!("{path}.{k}")).map(|normalized| (k.clone(), normalized))
                })
                .collect::<Result<_, _>>()?,
        ),
    })
}

fn real_to_decimal(x: f64, path: &str) -> Result<Decimal, NormalizationError> {
    if !x.is_finite() {
        return Err(NormalizationError::NonFinite {
            path: path.to_string(),
            value: x,
        });
    }
    // `Display` for f64 yields the shortest string that round-trips, without exponent.
    let text = x.to_string();
    if let Ok(d) = Decimal::from_str_exact(&text) {
        return Ok(d);
    }
    if x.abs() < MIN_SCALED {
        // Below one unit at the finest scale: round to 0 or the smallest step.
        return Ok(Decimal::new((x * 1e28).round() as i64, MAX_SCALE));
    }
    // More fractional digits than a Decimal holds; round the excess at scale 28.
    Decimal::from_scientific_lossy(&format!("{x:e}"))
        .map(|d| d.normalize())
        .map_err(|_| NormalizationError::Unrepresentable {
            path: path.to_string(),
            text,
        })
}

fn text_to_decimal(text: &str, path: &str) -> Result<Decimal, NormalizationError> {
    Decimal::from_str_exact(text).map_err(|_| NormalizationError::Unrepresentable {
        path: path.to_string(),
        text: text.to_string(),
    })
}

impl From<AttributeValue> for RawValue {
    fn from(value: AttributeValue) -> Self {
        match value {
            AttributeValue::S(s) => RawValue::Text(s),
            AttributeValue::N(d) => RawValue::Decimal(d),
            AttributeValue::Bool(b) => RawValue::Bool(b),
            AttributeValue::Null => RawValue::Null,
            AttributeValue::L(items) => RawValue::List(items.into_iter().map(Into::into).collect()),
            AttributeValue::M(map) => {
                RawValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => RawValue::Null,
            Value::Bool(b) => RawValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Integer(i),
                None => RawValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => RawValue::Text(s),
            Value::Array(items) => RawValue::List(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                RawValue::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}
