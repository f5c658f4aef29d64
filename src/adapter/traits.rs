//! Adapter trait, the contract every graph backend implements
//!
//! The tracker treats ids returned here as opaque and stable. Methods take
//! `&self`: implementations synchronize their own counters and handles so a
//! tracker can be shared across evaluation threads.

use crate::graph::{
    Attributes, EdgeId, EdgeRecord, EdgeTag, LineageResult, NodeId, NodeRecord, PropertyValue,
};
use std::path::PathBuf;

/// Where a backend put the graph on `save()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveLocation {
    /// Written to a local file
    File(PathBuf),
    /// Persisted by a remote service (database URL, stream endpoint)
    Remote(String),
    /// Nothing was persisted
    Nowhere,
}

impl std::fmt::Display for SaveLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Remote(locator) => write!(f, "{}", locator),
            Self::Nowhere => write!(f, "<not persisted>"),
        }
    }
}

/// Storage contract for lineage graphs.
///
/// Preconditions and postconditions shared by all backends:
/// - `attrs` is always a mapping or absent; `None` never fails.
/// - `add_node` returns ids strictly increasing per adapter instance.
/// - `add_edge` rejects endpoints it never issued with
///   `UnregisteredIdentity` and rejects nested attributes with
///   `InvalidAttribute`; a failed call creates nothing.
/// - reads of unknown ids fail with `NodeNotFound` / `EdgeNotFound`.
pub trait Adapter: Send + Sync {
    /// Create a node for `gene` born in `generation`
    fn add_node(
        &self,
        gene: PropertyValue,
        generation: u32,
        attrs: Option<&Attributes>,
    ) -> LineageResult<NodeId>;

    /// Create a directed edge. The edge generation travels in `attrs`
    /// under the `generation` key.
    fn add_edge(
        &self,
        tag: EdgeTag,
        source: NodeId,
        target: NodeId,
        attrs: Option<&Attributes>,
    ) -> LineageResult<EdgeId>;

    fn get_node(&self, id: NodeId) -> LineageResult<NodeRecord>;

    fn get_edge(&self, id: EdgeId) -> LineageResult<EdgeRecord>;

    /// Latest node carrying `gene`: highest generation first, then most
    /// recently inserted. `before` restricts candidates to older ids.
    ///
    /// Backends without gene lookup report no match.
    fn find_node_by_gene(
        &self,
        _gene: &PropertyValue,
        _before: Option<NodeId>,
    ) -> LineageResult<Option<NodeId>> {
        Ok(None)
    }

    /// Follow out-edges tagged `tag` from `start` to the end of the chain.
    ///
    /// Backends without traversal treat every node as its own chain tail.
    fn walk_edge(&self, _tag: EdgeTag, start: NodeId) -> LineageResult<NodeId> {
        Ok(start)
    }

    /// Replace the fitness vector of a node
    fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()>;

    fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()>;

    /// Flush or persist. Safe to call repeatedly.
    fn save(&self) -> LineageResult<SaveLocation>;

    fn num_nodes(&self) -> LineageResult<usize>;

    fn num_edges(&self) -> LineageResult<usize>;
}

impl<A: Adapter + ?Sized> Adapter for Box<A> {
    fn add_node(
        &self,
        gene: PropertyValue,
        generation: u32,
        attrs: Option<&Attributes>,
    ) -> LineageResult<NodeId> {
        (**self).add_node(gene, generation, attrs)
    }

    fn add_edge(
        &self,
        tag: EdgeTag,
        source: NodeId,
        target: NodeId,
        attrs: Option<&Attributes>,
    ) -> LineageResult<EdgeId> {
        (**self).add_edge(tag, source, target, attrs)
    }

    fn get_node(&self, id: NodeId) -> LineageResult<NodeRecord> {
        (**self).get_node(id)
    }

    fn get_edge(&self, id: EdgeId) -> LineageResult<EdgeRecord> {
        (**self).get_edge(id)
    }

    fn find_node_by_gene(
        &self,
        gene: &PropertyValue,
        before: Option<NodeId>,
    ) -> LineageResult<Option<NodeId>> {
        (**self).find_node_by_gene(gene, before)
    }

    fn walk_edge(&self, tag: EdgeTag, start: NodeId) -> LineageResult<NodeId> {
        (**self).walk_edge(tag, start)
    }

    fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()> {
        (**self).update_fitness(id, fitness)
    }

    fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()> {
        (**self).update_score(id, score)
    }

    fn save(&self) -> LineageResult<SaveLocation> {
        (**self).save()
    }

    fn num_nodes(&self) -> LineageResult<usize> {
        (**self).num_nodes()
    }

    fn num_edges(&self) -> LineageResult<usize> {
        (**self).num_edges()
    }
}
