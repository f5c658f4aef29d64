//! Graph-database adapter
//!
//! Writes every node and edge through a [`GraphSession`] as soon as it is
//! created. Ids come from counters owned by the adapter, seeded past the
//! highest id already stored for the run, so reopening a run continues its
//! numbering.

use super::traits::{Adapter, SaveLocation};
use crate::graph::{
    flatten_attributes, Attributes, EdgeId, EdgeRecord, EdgeTag, LineageError,
    LineageResult, NodeId, NodeRecord, PropertyValue,
};
use crate::storage::GraphSession;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub struct GraphDbAdapter<S: GraphSession> {
    session: S,
    run: String,
    next_node: AtomicU64,
    next_edge: AtomicU64,
    closed: AtomicBool,
}

impl<S: GraphSession> GraphDbAdapter<S> {
    /// Bind `session` to the run labelled `run`
    pub fn new(session: S, run: impl Into<String>) -> LineageResult<Self> {
        let run = run.into();
        let next_node = session.max_node_id(&run)?.map_or(0, |id| id.as_u64() + 1);
        let next_edge = session.max_edge_id(&run)?.map_or(0, |id| id.as_u64() + 1);
        if next_node > 0 {
            tracing::info!(%run, next_node, next_edge, "resuming stored run");
        }
        Ok(Self {
            session,
            run,
            next_node: AtomicU64::new(next_node),
            next_edge: AtomicU64::new(next_edge),
            closed: AtomicBool::new(false),
        })
    }

    pub fn run(&self) -> &str {
        &self.run
    }

    pub fn session(&self) -> &S {
        &self.session
    }
}

impl<S: GraphSession> Adapter for GraphDbAdapter<S> {
    fn add_node(
        &self,
        gene: PropertyValue,
        generation: u32,
        attrs: Option<&Attributes>,
    ) -> LineageResult<NodeId> {
        let attrs = attrs.map(flatten_attributes).unwrap_or_default();
        let id = NodeId::new(self.next_node.fetch_add(1, Ordering::SeqCst));
        let node = NodeRecord::new(id, gene.flattened(), generation).with_attrs(attrs);
        self.session.merge_node(&self.run, &node)?;
        tracing::debug!(run = %self.run, node = %id, generation, "node merged");
        Ok(id)
    }

    /// Nested values are flattened to compact strings before writing.
    fn add_edge(
        &self,
        tag: EdgeTag,
        source: NodeId,
        target: NodeId,
        attrs: Option<&Attributes>,
    ) -> LineageResult<EdgeId> {
        for endpoint in [source, target] {
            if !self.session.contains_node(&self.run, endpoint)? {
                return Err(LineageError::UnregisteredIdentity(endpoint));
            }
        }
        let attrs = attrs.map(flatten_attributes);
        let mut edge = EdgeRecord::from_attrs(EdgeId::new(0), tag, source, target, attrs.as_ref())?;
        let id = EdgeId::new(self.next_edge.fetch_add(1, Ordering::SeqCst));
        edge.id = id;
        self.session.merge_edge(&self.run, &edge)?;
        tracing::debug!(run = %self.run, edge = %id, %tag, %source, %target, "edge merged");
        Ok(id)
    }

    fn get_node(&self, id: NodeId) -> LineageResult<NodeRecord> {
        self.session
            .fetch_node(&self.run, id)?
            .ok_or(LineageError::NodeNotFound(id))
    }

    fn get_edge(&self, id: EdgeId) -> LineageResult<EdgeRecord> {
        self.session
            .fetch_edge(&self.run, id)?
            .ok_or(LineageError::EdgeNotFound(id))
    }

    fn find_node_by_gene(
        &self,
        gene: &PropertyValue,
        before: Option<NodeId>,
    ) -> LineageResult<Option<NodeId>> {
        self.session.find_by_gene(&self.run, &gene.flattened(), before)
    }

    fn walk_edge(&self, tag: EdgeTag, start: NodeId) -> LineageResult<NodeId> {
        if !self.session.contains_node(&self.run, start)? {
            return Err(LineageError::NodeNotFound(start));
        }
        let mut current = start;
        let mut visited = HashSet::from([start]);
        while let Some(next) = self
            .session
            .out_targets(&self.run, tag, current)?
            .into_iter()
            .next()
        {
            if !visited.insert(next) {
                break;
            }
            current = next;
        }
        Ok(current)
    }

    fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()> {
        if self.session.set_fitness(&self.run, id, fitness)? {
            Ok(())
        } else {
            Err(LineageError::NodeNotFound(id))
        }
    }

    fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()> {
        if self.session.set_score(&self.run, id, score)? {
            Ok(())
        } else {
            Err(LineageError::NodeNotFound(id))
        }
    }

    /// Rows are already written; saving closes the session.
    fn save(&self) -> LineageResult<SaveLocation> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.session.close()?;
            tracing::info!(run = %self.run, locator = %self.session.locator(), "session closed");
        }
        Ok(SaveLocation::Remote(self.session.locator()))
    }

    fn num_nodes(&self) -> LineageResult<usize> {
        self.session.count_nodes(&self.run)
    }

    fn num_edges(&self) -> LineageResult<usize> {
        self.session.count_edges(&self.run)
    }
}
