//! Edge attribute payloads for `set_parents`

use crate::graph::{Attributes, LineageError, LineageResult};
use serde_json::Value;

/// Attributes for the PARENT_OF edges of one child
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeAttrs {
    /// One mapping applied to every edge
    Shared(Attributes),
    /// One mapping per parent, aligned with the parent list
    PerParent(Vec<Attributes>),
}

impl Default for EdgeAttrs {
    fn default() -> Self {
        Self::Shared(Attributes::new())
    }
}

impl EdgeAttrs {
    /// No extra attributes
    pub fn none() -> Self {
        Self::default()
    }

    /// Attributes for each of `parents` edges, in parent order.
    ///
    /// Fails with `AttributeShape` if a per-parent list has the wrong length.
    pub fn resolve(&self, parents: usize) -> LineageResult<Vec<&Attributes>> {
        match self {
            Self::Shared(attrs) => Ok(vec![attrs; parents]),
            Self::PerParent(list) if list.len() == parents => Ok(list.iter().collect()),
            Self::PerParent(list) => Err(LineageError::AttributeShape {
                expected: format!("{} attribute mappings", parents),
                found: format!("{} attribute mappings", list.len()),
            }),
        }
    }
}

impl From<Attributes> for EdgeAttrs {
    fn from(attrs: Attributes) -> Self {
        Self::Shared(attrs)
    }
}

impl From<Vec<Attributes>> for EdgeAttrs {
    fn from(list: Vec<Attributes>) -> Self {
        Self::PerParent(list)
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn to_attributes(value: Value) -> LineageResult<Attributes> {
    serde_json::from_value(value)
        .map_err(|err| LineageError::InvalidAttribute(format!("unsupported attribute value: {}", err)))
}

/// Dynamic payloads: an object is shared, an array of objects is per-parent,
/// anything else is an `AttributeShape` error.
impl TryFrom<Value> for EdgeAttrs {
    type Error = LineageError;

    fn try_from(value: Value) -> LineageResult<Self> {
        match value {
            Value::Object(_) => Ok(Self::Shared(to_attributes(value)?)),
            Value::Array(items) => {
                if let Some(bad) = items.iter().find(|item| !item.is_object()) {
                    return Err(LineageError::AttributeShape {
                        expected: "an array of objects".into(),
                        found: format!("an array containing {}", describe(bad)),
                    });
                }
                items
                    .into_iter()
                    .map(to_attributes)
                    .collect::<LineageResult<Vec<_>>>()
                    .map(Self::PerParent)
            }
            other => Err(LineageError::AttributeShape {
                expected: "an object or an array of objects".into(),
                found: describe(&other).into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PropertyValue;
    use serde_json::json;

    #[test]
    fn shared_repeats_for_every_parent() {
        let mut attrs = Attributes::new();
        attrs.insert("op".into(), "cx".into());
        let shared = EdgeAttrs::from(attrs.clone());
        assert_eq!(shared.resolve(3).unwrap(), vec![&attrs, &attrs, &attrs]);
        assert!(EdgeAttrs::none().resolve(0).unwrap().is_empty());
    }

    #[test]
    fn per_parent_length_must_match() {
        let list = EdgeAttrs::from(vec![Attributes::new()]);
        let err = list.resolve(2).unwrap_err();
        assert!(matches!(err, LineageError::AttributeShape { .. }));
    }

    #[test]
    fn json_object_and_array_convert() {
        let shared = EdgeAttrs::try_from(json!({"op": "mutate", "rate": 0.1})).unwrap();
        let EdgeAttrs::Shared(map) = shared else {
            panic!("expected shared attributes");
        };
        assert_eq!(map.get("rate"), Some(&PropertyValue::Float(0.1)));

        let per = EdgeAttrs::try_from(json!([{"side": "left"}, {"side": "right"}])).unwrap();
        assert_eq!(per.resolve(2).unwrap().len(), 2);
    }

    #[test]
    fn json_scalars_are_shape_errors() {
        for value in [json!(42), json!("attrs"), json!(null), json!([1, 2])] {
            assert!(matches!(
                EdgeAttrs::try_from(value),
                Err(LineageError::AttributeShape { .. })
            ));
        }
    }
}
