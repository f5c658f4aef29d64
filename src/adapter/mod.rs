//! Storage adapters for lineage graphs
//!
//! An adapter turns tracker calls into backend writes. Three backends ship
//! with the crate: [`NullAdapter`] (ids only), [`PropertyGraphAdapter`]
//! (in memory, saved to GML or JSON) and [`GraphDbAdapter`] (rows in a
//! graph database through a `GraphSession`).

pub mod gml;
mod graphdb;
mod memory;
mod null;
mod traits;

pub use graphdb::GraphDbAdapter;
pub use memory::{
    GraphConfig, GraphFormat, GraphMetadata, GraphSnapshot, PropertyGraphAdapter,
    DEFAULT_OUTPUT_DIR,
};
pub use null::NullAdapter;
pub use traits::{Adapter, SaveLocation};
