//! Errors raised while tracking lineage

use super::edge::EdgeId;
use super::node::NodeId;
use thiserror::Error;

/// Errors that can occur in tracker, hub and adapter operations
#[derive(Debug, Error)]
pub enum LineageError {
    /// Attribute payload is nested, undeclared, reserved or of the wrong type
    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    /// Per-edge attributes do not line up with the parent list
    #[error("Attribute shape mismatch: expected {expected}, found {found}")]
    AttributeShape { expected: String, found: String },

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Edge not found: {0}")]
    EdgeNotFound(EdgeId),

    /// Edge endpoint was never produced by deploy
    #[error("Unregistered identity: {0} was never deployed")]
    UnregisteredIdentity(NodeId),

    #[error("Backend transport error: {0}")]
    Transport(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Saved graph could not be parsed
    #[error("Format error: {0}")]
    Format(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for LineageError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_yaml::Error> for LineageError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for lineage operations
pub type LineageResult<T> = Result<T, LineageError>;
