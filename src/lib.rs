//! evotrace: lineage tracking for evolutionary algorithms
//!
//! Records which individuals an evolutionary algorithm creates, how they
//! score and which parents produced them, as a directed lineage graph.
//!
//! # Core Concepts
//!
//! - **Nodes**: one per deployed individual, carrying its gene, generation,
//!   fitness vector and score
//! - **Edges**: PARENT_OF from parent to child; MIRROR between repeated
//!   observations of the same gene
//! - **Adapters**: storage backends behind one contract (null, in-memory
//!   property graph, graph databases)
//! - **Trackers**: the interface the EA loop talks to
//!
//! # Example
//!
//! ```
//! use evotrace::{EdgeAttrs, NullAdapter, Tracker};
//!
//! let tracker = Tracker::new(NullAdapter::new());
//! let parent = tracker.deploy(&vec![true, false], 0).unwrap();
//! let child = tracker.deploy(&vec![true, true], 1).unwrap();
//! tracker.set_parents(child, &[parent], 1, &EdgeAttrs::none()).unwrap();
//! ```

pub mod adapter;
pub mod config;
mod graph;
pub mod storage;
pub mod tracker;

pub use adapter::{
    Adapter, GraphConfig, GraphDbAdapter, GraphFormat, GraphMetadata, GraphSnapshot,
    NullAdapter, PropertyGraphAdapter, SaveLocation,
};
pub use config::{BackendConfig, RunConfig, RunSection};
pub use graph::schema;
pub use graph::{
    flatten_attributes, Attributes, EdgeId, EdgeRecord, EdgeTag, Genome, LineageError,
    LineageResult, NodeId, NodeRecord, PropertyType, PropertyValue, Schema, GENERATION_KEY,
};
pub use storage::{CypherConfig, CypherSession, GraphSession, OpenSession, SqliteSession};
pub use tracker::{
    EdgeAttrs, GephiConfig, GephiTransport, HubConfig, HubEntry, LineageTracker,
    RecordingTransport, StreamEvent, StreamTransport, Tracked, Tracker, TrackerHub,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
