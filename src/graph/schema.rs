//! Typed property schema for property-graph backends
//!
//! Type names follow graph-tool's property map vocabulary (`int`, `long`,
//! `vector<bool>`, ...) so existing experiment configs keep working.

use super::error::{LineageError, LineageResult};
use super::node::{Attributes, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GENE_KEY: &str = "gene";
pub const FITNESS_KEY: &str = "fitness";
pub const SCORE_KEY: &str = "score";
pub const LABEL_KEY: &str = "label";
pub const ID_KEY: &str = "id";
pub const SOURCE_KEY: &str = "source";
pub const TARGET_KEY: &str = "target";
pub use super::edge::GENERATION_KEY;

/// Node keys that are only written through their dedicated operations
pub const RESERVED_NODE_KEYS: [&str; 4] = [GENE_KEY, GENERATION_KEY, FITNESS_KEY, SCORE_KEY];

/// Keys a node extra may not use: the dedicated ones plus the GML node id
pub const RESERVED_NODE_EXTRAS: [&str; 5] = [GENE_KEY, GENERATION_KEY, FITNESS_KEY, SCORE_KEY, ID_KEY];

/// Keys an edge extra may not use; GML reads them as edge structure
pub const RESERVED_EDGE_EXTRAS: [&str; 4] = [ID_KEY, SOURCE_KEY, TARGET_KEY, LABEL_KEY];

/// Declared value type of a property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    #[serde(rename = "bool")]
    Bool,
    #[serde(rename = "int", alias = "long", alias = "int64_t")]
    Int,
    #[serde(rename = "float", alias = "double", alias = "long double")]
    Float,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "vector<bool>")]
    BoolVec,
    #[serde(rename = "vector<int>", alias = "vector<long>", alias = "vector<int64_t>")]
    IntVec,
    #[serde(rename = "vector<float>", alias = "vector<double>")]
    FloatVec,
    #[serde(rename = "vector<string>")]
    StringVec,
}

impl PropertyType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::BoolVec => "vector<bool>",
            Self::IntVec => "vector<int>",
            Self::FloatVec => "vector<float>",
            Self::StringVec => "vector<string>",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(name.to_string())).ok()
    }

    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            Self::BoolVec | Self::IntVec | Self::FloatVec | Self::StringVec
        )
    }

    fn element(&self) -> Self {
        match self {
            Self::BoolVec => Self::Bool,
            Self::IntVec => Self::Int,
            Self::FloatVec => Self::Float,
            Self::StringVec => Self::String,
            scalar => *scalar,
        }
    }

    /// Convert `value` into the canonical representation of this type.
    ///
    /// Widening is allowed (int to float, 0/1 to bool); anything lossy is
    /// rejected.
    pub fn coerce(&self, key: &str, value: &PropertyValue) -> LineageResult<PropertyValue> {
        if self.is_vector() {
            let PropertyValue::List(items) = value else {
                return Err(mismatch(key, *self, value));
            };
            let element = self.element();
            let coerced = items
                .iter()
                .map(|item| element.coerce_scalar(key, item))
                .collect::<LineageResult<Vec<_>>>()
                .map_err(|_| mismatch(key, *self, value))?;
            return Ok(PropertyValue::List(coerced));
        }
        self.coerce_scalar(key, value)
    }

    fn coerce_scalar(&self, key: &str, value: &PropertyValue) -> LineageResult<PropertyValue> {
        let coerced = match (self, value) {
            (Self::Bool, PropertyValue::Bool(b)) => Some(PropertyValue::Bool(*b)),
            (Self::Bool, PropertyValue::Int(i)) if *i == 0 || *i == 1 => {
                Some(PropertyValue::Bool(*i == 1))
            }
            (Self::Int, v) => v.as_i64().map(PropertyValue::Int),
            (Self::Float, v) => v.as_f64().map(PropertyValue::Float),
            (Self::String, PropertyValue::Str(s)) => Some(PropertyValue::Str(s.clone())),
            _ => None,
        };
        coerced.ok_or_else(|| mismatch(key, *self, value))
    }
}

fn mismatch(key: &str, expected: PropertyType, value: &PropertyValue) -> LineageError {
    LineageError::InvalidAttribute(format!(
        "`{}` expects {}, got {}",
        key,
        expected.name(),
        value.compact()
    ))
}

/// Mapping of attribute name to declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(BTreeMap<String, PropertyType>);

impl Schema {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with(mut self, key: impl Into<String>, ty: PropertyType) -> Self {
        self.0.insert(key.into(), ty);
        self
    }

    /// Default node schema: bit-string genes, float fitness vectors
    pub fn default_nodes() -> Self {
        Self::new()
            .with(GENE_KEY, PropertyType::BoolVec)
            .with(GENERATION_KEY, PropertyType::Int)
            .with(FITNESS_KEY, PropertyType::FloatVec)
            .with(SCORE_KEY, PropertyType::Float)
    }

    pub fn default_edges() -> Self {
        Self::new()
            .with(LABEL_KEY, PropertyType::String)
            .with(GENERATION_KEY, PropertyType::Int)
    }

    pub fn get(&self, key: &str) -> Option<PropertyType> {
        self.0.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyType)> {
        self.0.iter()
    }

    /// Coerce a single declared property
    pub fn coerce(&self, key: &str, value: &PropertyValue) -> LineageResult<PropertyValue> {
        match self.get(key) {
            Some(ty) => ty.coerce(key, value),
            None => Err(undeclared(key)),
        }
    }

    /// Validate an extras mapping: every key declared, none reserved,
    /// every value of its declared type. Returns the coerced mapping.
    pub fn coerce_extras(&self, attrs: &Attributes, reserved: &[&str]) -> LineageResult<Attributes> {
        let mut out = Attributes::new();
        for (key, value) in attrs {
            if reserved.contains(&key.as_str()) {
                return Err(LineageError::InvalidAttribute(format!(
                    "`{}` is reserved and cannot be set as an extra attribute",
                    key
                )));
            }
            out.insert(key.clone(), self.coerce(key, value)?);
        }
        Ok(out)
    }

    /// Check that the mandatory keys are declared
    pub fn require(&self, keys: &[&str]) -> LineageResult<()> {
        match keys.iter().find(|key| !self.contains(key)) {
            Some(missing) => Err(LineageError::Config(format!(
                "schema must declare `{}`",
                missing
            ))),
            None => Ok(()),
        }
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<(String, PropertyType)> for Schema {
    fn from_iter<I: IntoIterator<Item = (String, PropertyType)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn undeclared(key: &str) -> LineageError {
    LineageError::InvalidAttribute(format!("`{}` is not declared in the schema", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_tool_aliases_parse() {
        assert_eq!(PropertyType::parse("long"), Some(PropertyType::Int));
        assert_eq!(PropertyType::parse("vector<long>"), Some(PropertyType::IntVec));
        assert_eq!(PropertyType::parse("vector<bool>"), Some(PropertyType::BoolVec));
        assert_eq!(PropertyType::parse("matrix"), None);
    }

    #[test]
    fn coercion_widens_but_never_truncates() {
        let float = PropertyType::FloatVec
            .coerce("fitness", &PropertyValue::from(vec![1, 2]))
            .unwrap();
        assert_eq!(float, PropertyValue::from(vec![1.0, 2.0]));

        let bits = PropertyType::BoolVec
            .coerce("gene", &PropertyValue::from(vec![1, 0]))
            .unwrap();
        assert_eq!(bits, PropertyValue::from(vec![true, false]));

        let err = PropertyType::Int
            .coerce("generation", &PropertyValue::Float(1.5))
            .unwrap_err();
        assert!(matches!(err, LineageError::InvalidAttribute(_)));
    }

    #[test]
    fn undeclared_and_reserved_keys_are_rejected() {
        let schema = Schema::default_nodes().with("operator", PropertyType::String);
        let mut attrs = Attributes::new();
        attrs.insert("operator".into(), "mutate".into());
        assert!(schema.coerce_extras(&attrs, &RESERVED_NODE_KEYS).is_ok());

        attrs.insert("colour".into(), "red".into());
        assert!(schema.coerce_extras(&attrs, &RESERVED_NODE_KEYS).is_err());

        let mut reserved = Attributes::new();
        reserved.insert(SCORE_KEY.into(), PropertyValue::Float(1.0));
        assert!(schema.coerce_extras(&reserved, &RESERVED_NODE_KEYS).is_err());
    }

    #[test]
    fn schema_deserializes_from_yaml() {
        let schema: Schema = serde_yaml::from_str(
            "gene: vector<long>\ngeneration: int\nfitness: vector<double>\nscore: long\n",
        )
        .unwrap();
        assert_eq!(schema.get("gene"), Some(PropertyType::IntVec));
        assert_eq!(schema.get("score"), Some(PropertyType::Int));
    }
}
