//! Metadata maps attached to catalogs and columns.

use std::collections::BTreeMap;
use std::fmt;

use pcat_result::{Error, Result};
use serde::{Deserialize, Serialize};

/// Prefix marking an attribute value stored in its JSON-encoded fallback form.
pub const JSON_PREFIX: &str = "json://";

/// String-keyed metadata map. Cloning produces an independent map.
pub type Attrs = BTreeMap<String, AttrValue>;

/// An arbitrary metadata value: scalars, strings, or nested lists and maps.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AttrValue::Null => "null",
            AttrValue::Bool(_) => "bool",
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Str(_) => "string",
            AttrValue::List(_) => "list",
            AttrValue::Map(_) => "map",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Int(v) => Some(*v as f64),
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            AttrValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(v) => Some(v),
            _ => None,
        }
    }

    /// A bare number (broadcast to every axis) or a list of exactly `N` numbers.
    pub fn as_f64_array<const N: usize>(&self) -> Option<[f64; N]> {
        match self {
            AttrValue::List(items) if items.len() == N => {
                let mut out = [0.0; N];
                for (slot, item) in out.iter_mut().zip(items) {
                    *slot = item.as_f64()?;
                }
                Some(out)
            }
            AttrValue::List(_) => None,
            scalar => scalar.as_f64().map(|v| [v; N]),
        }
    }

    /// Whether this is a scalar or string (no nesting).
    pub fn is_scalar(&self) -> bool {
        !matches!(self, AttrValue::List(_) | AttrValue::Map(_))
    }

    /// The `json://`-prefixed string form used when a writer cannot store the
    /// value natively.
    pub fn encode_fallback(&self) -> Result<String> {
        Ok(format!("{JSON_PREFIX}{}", serde_json::to_string(self)?))
    }

    /// Inverse of [`AttrValue::encode_fallback`]; plain strings are returned as-is.
    pub fn decode_fallback(raw: &str) -> Result<AttrValue> {
        match raw.strip_prefix(JSON_PREFIX) {
            Some(json) => serde_json::from_str(json).map_err(Error::from),
            None => Ok(AttrValue::Str(raw.to_string())),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(s) => f.write_str(s),
            other => match serde_json::to_string(other) {
                Ok(json) => f.write_str(&json),
                Err(_) => Err(fmt::Error),
            },
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i32> for AttrValue {
    fn from(v: i32) -> Self {
        AttrValue::Int(v as i64)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<u64> for AttrValue {
    fn from(v: u64) -> Self {
        match i64::try_from(v) {
            Ok(v) => AttrValue::Int(v),
            Err(_) => AttrValue::Float(v as f64),
        }
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::from(v as u64)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(v: Vec<T>) -> Self {
        AttrValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<AttrValue>, const N: usize> From<[T; N]> for AttrValue {
    fn from(v: [T; N]) -> Self {
        AttrValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, AttrValue>> for AttrValue {
    fn from(v: BTreeMap<String, AttrValue>) -> Self {
        AttrValue::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_encoding_round_trips_nested_values() {
        let mut cosmo = BTreeMap::new();
        cosmo.insert("h".to_string(), AttrValue::Float(0.7));
        cosmo.insert("names".to_string(), AttrValue::from(vec!["a", "b"]));
        let value = AttrValue::Map(cosmo);

        let encoded = value.encode_fallback().unwrap();
        assert!(encoded.starts_with(JSON_PREFIX));
        assert_eq!(AttrValue::decode_fallback(&encoded).unwrap(), value);
        assert_eq!(
            AttrValue::decode_fallback("plain").unwrap(),
            AttrValue::Str("plain".into())
        );
    }

    #[test]
    fn vectors_broadcast_from_scalars() {
        assert_eq!(AttrValue::Int(64).as_f64_array::<3>(), Some([64.0; 3]));
        assert_eq!(
            AttrValue::from([1.0, 2.0, 3.0]).as_f64_array::<3>(),
            Some([1.0, 2.0, 3.0])
        );
        assert_eq!(AttrValue::from([1.0, 2.0]).as_f64_array::<3>(), None);
        assert_eq!(AttrValue::from("x").as_f64_array::<3>(), None);
    }
}
