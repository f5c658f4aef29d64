//! Core lineage graph data structures

mod edge;
mod error;
mod node;
pub mod schema;


pub use edge::{EdgeId, EdgeRecord, EdgeTag, GENERATION_KEY};
pub use error::{LineageError, LineageResult};
pub use node::{flatten_attributes, Attributes, Genome, NodeId, NodeRecord, PropertyValue};
pub use schema::{PropertyType, Schema};

pub(crate) use node::{first_nested_key, float_repr};
