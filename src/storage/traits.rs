//! Session trait for graph-database backends

use crate::graph::{EdgeId, EdgeRecord, EdgeTag, LineageResult, NodeId, NodeRecord, PropertyValue};
use std::path::Path;

/// A connection to a graph database holding one or more runs.
///
/// Every row is keyed by `(run, id)`, so merging the same record twice
/// leaves one row. Attribute values reaching a session are already flat.
/// Implementations must be thread-safe (Send + Sync).
pub trait GraphSession: Send + Sync {
    // === Writes ===

    /// Insert or update a node. Fitness and score of an existing row are
    /// left untouched.
    fn merge_node(&self, run: &str, node: &NodeRecord) -> LineageResult<()>;

    /// Insert or update an edge
    fn merge_edge(&self, run: &str, edge: &EdgeRecord) -> LineageResult<()>;

    /// Replace the fitness of a node. Returns false if the node is absent.
    fn set_fitness(&self, run: &str, id: NodeId, fitness: &[f64]) -> LineageResult<bool>;

    /// Replace the score of a node. Returns false if the node is absent.
    fn set_score(&self, run: &str, id: NodeId, score: f64) -> LineageResult<bool>;

    // === Reads ===

    fn fetch_node(&self, run: &str, id: NodeId) -> LineageResult<Option<NodeRecord>>;

    fn fetch_edge(&self, run: &str, id: EdgeId) -> LineageResult<Option<EdgeRecord>>;

    fn contains_node(&self, run: &str, id: NodeId) -> LineageResult<bool> {
        Ok(self.fetch_node(run, id)?.is_some())
    }

    /// Latest node with `gene`: highest generation, then highest id.
    /// `before` excludes ids at or above it.
    fn find_by_gene(
        &self,
        run: &str,
        gene: &PropertyValue,
        before: Option<NodeId>,
    ) -> LineageResult<Option<NodeId>>;

    /// Targets of `tag` edges leaving `source`, newest edge first
    fn out_targets(&self, run: &str, tag: EdgeTag, source: NodeId) -> LineageResult<Vec<NodeId>>;

    fn count_nodes(&self, run: &str) -> LineageResult<usize>;

    fn count_edges(&self, run: &str) -> LineageResult<usize>;

    fn max_node_id(&self, run: &str) -> LineageResult<Option<NodeId>>;

    fn max_edge_id(&self, run: &str) -> LineageResult<Option<EdgeId>>;

    // === Lifecycle ===

    /// Flush and release the connection. Later calls are no-ops.
    fn close(&self) -> LineageResult<()>;

    /// Human-readable location of the data (file path or server URL)
    fn locator(&self) -> String;
}

/// Extension trait for sessions backed by a local file
pub trait OpenSession: GraphSession + Sized {
    /// Open or create a database at the given path
    fn open(path: impl AsRef<Path>) -> LineageResult<Self>;

    /// Create an in-memory database (useful for testing)
    fn open_in_memory() -> LineageResult<Self>;
}

/// Key used to index genes: the compact encoding of the value
pub fn gene_key(gene: &PropertyValue) -> String {
    gene.compact()
}
