//! Persisted tree wire format.
//!
//! The on-disk shape is ordinary JSON with two reserved marker shapes:
//!
//! ```json
//! { "$class": "build.Module", "$props": { "id": 1 } }
//! { "$ref": "$.modules[0]" }
//! ```
//!
//! Everything else is primitives, arrays, and objects. Parsing is strict
//! about the markers: a `$ref` must be a single-key object holding a path
//! string, and `$class`/`$props` must appear together with nothing else.
//! Anything violating those shapes is a corrupt tree, which the orchestrator
//! treats as a cold start.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::registry::QualifiedName;
use crate::types::path::TreePath;
use crate::types::value::Scalar;

/// Marker key for a tagged instance's class name.
pub const MARKER_CLASS: &str = "$class";
/// Marker key for a tagged instance's encoded members.
pub const MARKER_PROPS: &str = "$props";
/// Marker key for a compaction path reference.
pub const MARKER_REF: &str = "$ref";

/// One node of the strictly acyclic persisted tree.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistedNode {
    /// Primitive leaf.
    Scalar(Scalar),
    /// Ordered sequence.
    Seq(Vec<PersistedNode>),
    /// Plain keyed mapping.
    Map(BTreeMap<String, PersistedNode>),
    /// Tagged class instance.
    Instance {
        /// Registry-stable name of the class.
        class: QualifiedName,
        /// Encoded own members.
        props: BTreeMap<String, PersistedNode>,
    },
    /// Reference to a node emitted earlier in pre-order.
    Ref(TreePath),
}

/// Error reading or writing the persisted tree.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The blob is not valid JSON at all.
    #[error("persisted cache is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The JSON is well-formed but a marker shape is malformed.
    #[error("persisted cache has a malformed shape: {0}")]
    CorruptTree(String),
}

impl PersistedNode {
    /// Convert to a JSON value.
    ///
    /// Non-finite floats have no JSON representation and persist as null.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Scalar(scalar) => scalar_to_json(scalar),
            Self::Seq(items) => Json::Array(items.iter().map(PersistedNode::to_json).collect()),
            Self::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(key, member)| (key.clone(), member.to_json()))
                    .collect(),
            ),
            Self::Instance { class, props } => {
                let mut marker = serde_json::Map::with_capacity(2);
                marker.insert(
                    MARKER_CLASS.to_string(),
                    Json::String(class.as_str().to_string()),
                );
                marker.insert(
                    MARKER_PROPS.to_string(),
                    Json::Object(
                        props
                            .iter()
                            .map(|(key, member)| (key.clone(), member.to_json()))
                            .collect(),
                    ),
                );
                Json::Object(marker)
            }
            Self::Ref(path) => {
                let mut marker = serde_json::Map::with_capacity(1);
                marker.insert(MARKER_REF.to_string(), Json::String(path.render()));
                Json::Object(marker)
            }
        }
    }

    /// Parse a JSON value.
    pub fn from_json(value: &Json) -> Result<Self, PersistError> {
        match value {
            Json::Null => Ok(Self::Scalar(Scalar::Null)),
            Json::Bool(b) => Ok(Self::Scalar(Scalar::Bool(*b))),
            Json::Number(number) => {
                if let Some(int) = number.as_i64() {
                    Ok(Self::Scalar(Scalar::Int(int)))
                } else if let Some(float) = number.as_f64() {
                    Ok(Self::Scalar(Scalar::Float(float)))
                } else {
                    Err(PersistError::CorruptTree(format!(
                        "number {} fits neither i64 nor f64",
                        number
                    )))
                }
            }
            Json::String(text) => Ok(Self::Scalar(Scalar::Text(text.clone()))),
            Json::Array(items) => Ok(Self::Seq(
                items
                    .iter()
                    .map(PersistedNode::from_json)
                    .collect::<Result<_, _>>()?,
            )),
            Json::Object(entries) => Self::from_json_object(entries),
        }
    }

    fn from_json_object(entries: &serde_json::Map<String, Json>) -> Result<Self, PersistError> {
        if entries.contains_key(MARKER_REF) {
            if entries.len() != 1 {
                return Err(PersistError::CorruptTree(format!(
                    "{} marker with extra members",
                    MARKER_REF
                )));
            }
            let Some(Json::String(text)) = entries.get(MARKER_REF) else {
                return Err(PersistError::CorruptTree(format!(
                    "{} marker is not a string",
                    MARKER_REF
                )));
            };
            let path = TreePath::parse(text)
                .map_err(|err| PersistError::CorruptTree(err.to_string()))?;
            return Ok(Self::Ref(path));
        }

        if entries.contains_key(MARKER_CLASS) || entries.contains_key(MARKER_PROPS) {
            let Some(Json::String(class)) = entries.get(MARKER_CLASS) else {
                return Err(PersistError::CorruptTree(format!(
                    "{} marker is missing or not a string",
                    MARKER_CLASS
                )));
            };
            let Some(Json::Object(props)) = entries.get(MARKER_PROPS) else {
                return Err(PersistError::CorruptTree(format!(
                    "{} marker is missing or not a mapping",
                    MARKER_PROPS
                )));
            };
            if entries.len() != 2 {
                return Err(PersistError::CorruptTree(format!(
                    "{}/{} marker with extra members",
                    MARKER_CLASS, MARKER_PROPS
                )));
            }
            return Ok(Self::Instance {
                class: QualifiedName::new(class.as_str()),
                props: parse_entries(props)?,
            });
        }

        Ok(Self::Map(parse_entries(entries)?))
    }

    /// Serialize to pretty-printed JSON text.
    pub fn to_text(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(&self.to_json())?)
    }

    /// Parse JSON text.
    pub fn from_text(text: &str) -> Result<Self, PersistError> {
        let value: Json = serde_json::from_str(text)?;
        Self::from_json(&value)
    }
}

fn parse_entries(
    entries: &serde_json::Map<String, Json>,
) -> Result<BTreeMap<String, PersistedNode>, PersistError> {
    entries
        .iter()
        .map(|(key, member)| Ok((key.clone(), PersistedNode::from_json(member)?)))
        .collect()
}

fn scalar_to_json(scalar: &Scalar) -> Json {
    match scalar {
        Scalar::Null => Json::Null,
        Scalar::Bool(b) => Json::Bool(*b),
        Scalar::Int(int) => Json::Number((*int).into()),
        Scalar::Float(float) => serde_json::Number::from_f64(*float)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Scalar::Text(text) => Json::String(text.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_roundtrip(node: &PersistedNode) -> PersistedNode {
        let text = node.to_text().unwrap();
        PersistedNode::from_text(&text).unwrap()
    }

    #[test]
    fn test_scalars_roundtrip() {
        let node = PersistedNode::Seq(vec![
            PersistedNode::Scalar(Scalar::Null),
            PersistedNode::Scalar(Scalar::Bool(true)),
            PersistedNode::Scalar(Scalar::Int(-3)),
            PersistedNode::Scalar(Scalar::Float(1.5)),
            PersistedNode::Scalar(Scalar::Text("x".to_string())),
        ]);
        assert_eq!(text_roundtrip(&node), node);
    }

    #[test]
    fn test_int_and_float_stay_distinct() {
        let node = PersistedNode::Seq(vec![
            PersistedNode::Scalar(Scalar::Int(1)),
            PersistedNode::Scalar(Scalar::Float(1.0)),
        ]);
        assert_eq!(text_roundtrip(&node), node);
    }

    #[test]
    fn test_instance_marker_shape() {
        let node = PersistedNode::Instance {
            class: QualifiedName::new("build.Module"),
            props: [(
                "id".to_string(),
                PersistedNode::Scalar(Scalar::Int(1)),
            )]
            .into_iter()
            .collect(),
        };

        let json = node.to_json();
        assert_eq!(json["$class"], "build.Module");
        assert_eq!(json["$props"]["id"], 1);
        assert_eq!(text_roundtrip(&node), node);
    }

    #[test]
    fn test_ref_marker_shape() {
        let node = PersistedNode::Ref(TreePath::root().child("a").child(0usize));

        let json = node.to_json();
        assert_eq!(json["$ref"], "$.a[0]");
        assert_eq!(text_roundtrip(&node), node);
    }

    #[test]
    fn test_plain_dollar_keys_are_not_markers() {
        let node = PersistedNode::Map(
            [(
                "$weird".to_string(),
                PersistedNode::Scalar(Scalar::Int(1)),
            )]
            .into_iter()
            .collect(),
        );
        assert_eq!(text_roundtrip(&node), node);
    }

    #[test]
    fn test_rejects_ref_with_extra_members() {
        let text = r#"{"$ref": "$.a", "extra": 1}"#;
        assert!(matches!(
            PersistedNode::from_text(text),
            Err(PersistError::CorruptTree(_))
        ));
    }

    #[test]
    fn test_rejects_non_string_ref() {
        let text = r#"{"$ref": 3}"#;
        assert!(matches!(
            PersistedNode::from_text(text),
            Err(PersistError::CorruptTree(_))
        ));
    }

    #[test]
    fn test_rejects_class_without_props() {
        let text = r#"{"$class": "build.Module"}"#;
        assert!(matches!(
            PersistedNode::from_text(text),
            Err(PersistError::CorruptTree(_))
        ));
    }

    #[test]
    fn test_rejects_unparsable_ref_path() {
        let text = r#"{"$ref": "not-a-path"}"#;
        assert!(matches!(
            PersistedNode::from_text(text),
            Err(PersistError::CorruptTree(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_json() {
        assert!(matches!(
            PersistedNode::from_text("{{{"),
            Err(PersistError::Json(_))
        ));
    }

    #[test]
    fn test_nonfinite_float_persists_as_null() {
        let node = PersistedNode::Scalar(Scalar::Float(f64::NAN));
        assert_eq!(node.to_json(), Json::Null);
    }
}
