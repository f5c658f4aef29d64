//! Node representation: tracked individuals and their property values

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;

/// Concrete identifier of a tracked individual
///
/// Issued once at deploy time and strictly increasing per tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Typed property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

/// Free-form attribute mapping attached to nodes and edges
pub type Attributes = BTreeMap<String, PropertyValue>;

impl PropertyValue {
    /// True for bool, int, float and string values
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Map(_))
    }

    /// True if this value can be stored by a backend without nesting:
    /// a scalar or a list of scalars.
    pub fn is_flat(&self) -> bool {
        match self {
            Self::List(items) => items.iter().all(PropertyValue::is_scalar),
            Self::Map(_) => false,
            _ => true,
        }
    }

    /// Deterministic single-line encoding.
    ///
    /// Lists render as `[a, b]`, maps as `{k: v}` in key order. Two equal
    /// values always produce the same string.
    pub fn compact(&self) -> String {
        let mut out = String::new();
        self.write_compact(&mut out);
        out
    }

    fn write_compact(&self, out: &mut String) {
        match self {
            Self::Str(s) => out.push_str(s),
            Self::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            Self::Float(f) => {
                let _ = write!(out, "{}", f);
            }
            Self::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_compact(out);
                }
                out.push(']');
            }
            Self::Map(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(key);
                    out.push_str(": ");
                    value.write_compact(out);
                }
                out.push('}');
            }
        }
    }

    /// Replace a nested value by its compact string; flat values pass through.
    pub fn flattened(&self) -> PropertyValue {
        if self.is_flat() {
            self.clone()
        } else {
            Self::Str(self.compact())
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Flatten every nested value of an attribute mapping
pub fn flatten_attributes(attrs: &Attributes) -> Attributes {
    attrs
        .iter()
        .map(|(key, value)| (key.clone(), value.flattened()))
        .collect()
}

/// Name of the first nested value, if any
pub(crate) fn first_nested_key(attrs: &Attributes) -> Option<&str> {
    attrs
        .iter()
        .find(|(_, value)| !value.is_flat())
        .map(|(key, _)| key.as_str())
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Int(value as i64)
    }
}

impl From<u8> for PropertyValue {
    fn from(value: u8) -> Self {
        Self::Int(value as i64)
    }
}

impl From<usize> for PropertyValue {
    fn from(value: usize) -> Self {
        Self::Int(value as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// Conversion of an EA individual into the gene stored on its node
///
/// Sets are emitted in sorted order so equal sets always encode identically.
pub trait Genome {
    fn to_gene(&self) -> PropertyValue;
}

impl<T: Into<PropertyValue> + Clone> Genome for [T] {
    fn to_gene(&self) -> PropertyValue {
        PropertyValue::List(self.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<PropertyValue> + Clone> Genome for Vec<T> {
    fn to_gene(&self) -> PropertyValue {
        self.as_slice().to_gene()
    }
}

impl<T: Into<PropertyValue> + Clone, const N: usize> Genome for [T; N] {
    fn to_gene(&self) -> PropertyValue {
        self.as_slice().to_gene()
    }
}

impl<T: Into<PropertyValue> + Clone + Ord> Genome for BTreeSet<T> {
    fn to_gene(&self) -> PropertyValue {
        PropertyValue::List(self.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<PropertyValue> + Clone + Ord, S> Genome for HashSet<T, S> {
    fn to_gene(&self) -> PropertyValue {
        let mut items: Vec<T> = self.iter().cloned().collect();
        items.sort();
        PropertyValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl Genome for str {
    fn to_gene(&self) -> PropertyValue {
        PropertyValue::Str(self.to_string())
    }
}

impl Genome for String {
    fn to_gene(&self) -> PropertyValue {
        PropertyValue::Str(self.clone())
    }
}

impl Genome for PropertyValue {
    fn to_gene(&self) -> PropertyValue {
        self.clone()
    }
}

/// Serde helpers that keep non-finite floats.
///
/// JSON has no NaN or infinity, so those are written as the strings
/// `"NaN"`, `"inf"` and `"-inf"`; finite values stay numbers.
pub(crate) mod float_repr {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    impl From<f64> for Repr {
        fn from(value: f64) -> Self {
            if value.is_finite() {
                Self::Number(value)
            } else if value.is_nan() {
                Self::Text("NaN".into())
            } else if value > 0.0 {
                Self::Text("inf".into())
            } else {
                Self::Text("-inf".into())
            }
        }
    }

    impl Repr {
        fn decode<E: Error>(self) -> Result<f64, E> {
            match self {
                Self::Number(value) => Ok(value),
                Self::Text(text) => match text.as_str() {
                    "NaN" => Ok(f64::NAN),
                    "inf" => Ok(f64::INFINITY),
                    "-inf" => Ok(f64::NEG_INFINITY),
                    other => Err(E::custom(format!("invalid float `{}`", other))),
                },
            }
        }
    }

    fn encode_all(values: &[f64]) -> Vec<Repr> {
        values.iter().copied().map(Repr::from).collect()
    }

    fn decode_all<E: Error>(reprs: Vec<Repr>) -> Result<Vec<f64>, E> {
        reprs.into_iter().map(Repr::decode).collect()
    }

    pub fn serialize_opt<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
        value.map(Repr::from).serialize(serializer)
    }

    pub fn deserialize_opt<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Option::<Repr>::deserialize(deserializer)?
            .map(Repr::decode)
            .transpose()
    }

    pub fn serialize_opt_vec<S: Serializer>(
        value: &Option<Vec<f64>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.as_deref().map(encode_all).serialize(serializer)
    }

    pub fn deserialize_opt_vec<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<f64>>, D::Error> {
        Option::<Vec<Repr>>::deserialize(deserializer)?
            .map(decode_all)
            .transpose()
    }

    /// JSON text for a database column
    pub fn to_json(value: f64) -> serde_json::Result<String> {
        serde_json::to_string(&Repr::from(value))
    }

    pub fn from_json(text: &str) -> serde_json::Result<f64> {
        serde_json::from_str::<Repr>(text)?.decode()
    }

    /// Number when finite, marker string otherwise
    pub fn to_value(value: f64) -> serde_json::Value {
        match Repr::from(value) {
            Repr::Number(n) => serde_json::Value::from(n),
            Repr::Text(text) => serde_json::Value::String(text),
        }
    }

    pub fn from_value(value: serde_json::Value) -> serde_json::Result<f64> {
        serde_json::from_value::<Repr>(value)?.decode()
    }

    pub fn vec_to_json(values: &[f64]) -> serde_json::Result<String> {
        serde_json::to_string(&encode_all(values))
    }

    pub fn vec_from_json(text: &str) -> serde_json::Result<Vec<f64>> {
        decode_all(serde_json::from_str(text)?)
    }
}

/// A node as read back from a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,
    pub gene: PropertyValue,
    pub generation: u32,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "float_repr::serialize_opt_vec",
        deserialize_with = "float_repr::deserialize_opt_vec"
    )]
    pub fitness: Option<Vec<f64>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "float_repr::serialize_opt",
        deserialize_with = "float_repr::deserialize_opt"
    )]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attributes,
}

impl NodeRecord {
    /// A freshly deployed, unevaluated node
    pub fn new(id: NodeId, gene: PropertyValue, generation: u32) -> Self {
        Self {
            id,
            gene,
            generation,
            fitness: None,
            score: None,
            attrs: Attributes::new(),
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    /// True once a fitness vector has been recorded
    pub fn is_evaluated(&self) -> bool {
        self.fitness.is_some()
    }
}
