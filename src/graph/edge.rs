//! Edge representation: reproduction and mirror events

use super::error::{LineageError, LineageResult};
use super::node::{Attributes, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute key carrying the generation an edge was created in
pub const GENERATION_KEY: &str = "generation";

/// Concrete identifier of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(u64);

impl EdgeId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EdgeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Kind of lineage event an edge records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeTag {
    /// Parent to child, produced by a reproduction operator
    #[serde(rename = "PARENT_OF")]
    ParentOf,
    /// Earlier to later observation of the same gene
    #[serde(rename = "MIRROR")]
    Mirror,
}

impl EdgeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentOf => "PARENT_OF",
            Self::Mirror => "MIRROR",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "PARENT_OF" => Some(Self::ParentOf),
            // older graphs labelled the deduplication chain EVOLVE
            "MIRROR" | "EVOLVE" => Some(Self::Mirror),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An edge as read back from a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: EdgeId,
    pub tag: EdgeTag,
    pub source: NodeId,
    pub target: NodeId,
    pub generation: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: Attributes,
}

impl EdgeRecord {
    /// Build a record from contract-level attributes, lifting the
    /// `generation` key into its own field. A generation that is not an
    /// integer in `u32` range is an `InvalidAttribute`.
    pub fn from_attrs(
        id: EdgeId,
        tag: EdgeTag,
        source: NodeId,
        target: NodeId,
        attrs: Option<&Attributes>,
    ) -> LineageResult<Self> {
        let mut extras = attrs.cloned().unwrap_or_default();
        let generation = match extras.remove(GENERATION_KEY) {
            Some(value) => value
                .as_i64()
                .and_then(|g| u32::try_from(g).ok())
                .ok_or_else(|| {
                    LineageError::InvalidAttribute(format!(
                        "`{}` must be a generation number, got {}",
                        GENERATION_KEY,
                        value.compact()
                    ))
                })?,
            None => 0,
        };
        Ok(Self {
            id,
            tag,
            source,
            target,
            generation,
            attrs: extras,
        })
    }
}
