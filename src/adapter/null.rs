//! NullAdapter: tracking effectively disabled
//!
//! Issues ids and checks edge endpoints so callers still see the tracking
//! contract, but stores nothing.

use super::traits::{Adapter, SaveLocation};
use crate::graph::{
    first_nested_key, Attributes, EdgeId, EdgeRecord, EdgeTag, LineageError, LineageResult,
    NodeId, NodeRecord, PropertyValue,
};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct NullAdapter {
    next_node: AtomicU64,
    next_edge: AtomicU64,
}

impl NullAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_issued(&self, id: NodeId) -> bool {
        id.as_u64() < self.next_node.load(Ordering::SeqCst)
    }
}

impl Adapter for NullAdapter {
    fn add_node(
        &self,
        _gene: PropertyValue,
        _generation: u32,
        _attrs: Option<&Attributes>,
    ) -> LineageResult<NodeId> {
        Ok(NodeId::new(self.next_node.fetch_add(1, Ordering::SeqCst)))
    }

    fn add_edge(
        &self,
        _tag: EdgeTag,
        source: NodeId,
        target: NodeId,
        attrs: Option<&Attributes>,
    ) -> LineageResult<EdgeId> {
        if let Some(key) = attrs.and_then(first_nested_key) {
            return Err(LineageError::InvalidAttribute(format!(
                "`{}` is nested; flatten it before writing",
                key
            )));
        }
        for endpoint in [source, target] {
            if !self.is_issued(endpoint) {
                return Err(LineageError::UnregisteredIdentity(endpoint));
            }
        }
        Ok(EdgeId::new(self.next_edge.fetch_add(1, Ordering::SeqCst)))
    }

    fn get_node(&self, id: NodeId) -> LineageResult<NodeRecord> {
        Err(LineageError::NodeNotFound(id))
    }

    fn get_edge(&self, id: EdgeId) -> LineageResult<EdgeRecord> {
        Err(LineageError::EdgeNotFound(id))
    }

    fn update_fitness(&self, _id: NodeId, _fitness: &[f64]) -> LineageResult<()> {
        Ok(())
    }

    fn update_score(&self, _id: NodeId, _score: f64) -> LineageResult<()> {
        Ok(())
    }

    fn save(&self) -> LineageResult<SaveLocation> {
        Ok(SaveLocation::Nowhere)
    }

    /// Number of ids issued; nothing is stored behind them.
    fn num_nodes(&self) -> LineageResult<usize> {
        Ok(self.next_node.load(Ordering::SeqCst) as usize)
    }

    fn num_edges(&self) -> LineageResult<usize> {
        Ok(self.next_edge.load(Ordering::SeqCst) as usize)
    }
}
