//! TrackerHub: streams lineage to a visualization service
//!
//! The hub keeps its own identity registry instead of a queryable adapter.
//! Every mutation is pushed as it happens; a failed push is logged and
//! counted but never surfaces as an error.

use super::attrs::EdgeAttrs;
use super::stream::{StreamEvent, StreamTransport};
use super::traits::LineageTracker;
use crate::adapter::SaveLocation;
use crate::graph::schema::{FITNESS_KEY, GENE_KEY, LABEL_KEY, SCORE_KEY};
use crate::graph::{
    flatten_attributes, Attributes, EdgeId, Genome, LineageError, LineageResult, NodeId,
    PropertyValue, GENERATION_KEY,
};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Layout settings for streamed nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Nodes without `x`/`y` are placed uniformly in `[0, extent)`
    pub extent: f64,
    pub node_size: f64,
    /// Seed for node placement; random when absent
    pub seed: Option<u64>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            extent: 1000.0,
            node_size: 20.0,
            seed: None,
        }
    }
}

impl HubConfig {
    /// `extent` and `node_size` must be finite and positive
    pub fn validate(&self) -> LineageResult<()> {
        for (key, value) in [("extent", self.extent), ("node_size", self.node_size)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(LineageError::Config(format!(
                    "{} must be a finite positive number, got {}",
                    key, value
                )));
            }
        }
        Ok(())
    }
}

/// What the hub remembers about a deployed individual
#[derive(Debug, Clone, PartialEq)]
pub struct HubEntry {
    /// Birth generation, raised when `set_parents` links the individual
    /// at a later one
    pub generation: u32,
    pub parents: Vec<NodeId>,
    pub fitness: Option<Vec<f64>>,
    pub score: Option<f64>,
}

impl HubEntry {
    fn new(generation: u32) -> Self {
        Self {
            generation,
            parents: Vec::new(),
            fitness: None,
            score: None,
        }
    }
}

/// Streaming tracker with a local identity registry
pub struct TrackerHub {
    transport: Box<dyn StreamTransport>,
    config: HubConfig,
    next_index: AtomicU64,
    next_edge: AtomicU64,
    registry: DashMap<NodeId, HubEntry>,
    rng: Mutex<StdRng>,
    failures: AtomicUsize,
}

impl TrackerHub {
    pub fn new(transport: Box<dyn StreamTransport>) -> Self {
        Self::build(transport, HubConfig::default())
    }

    pub fn with_config(
        transport: Box<dyn StreamTransport>,
        config: HubConfig,
    ) -> LineageResult<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: Box<dyn StreamTransport>, config: HubConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            transport,
            config,
            next_index: AtomicU64::new(0),
            next_edge: AtomicU64::new(0),
            registry: DashMap::new(),
            rng: Mutex::new(rng),
            failures: AtomicUsize::new(0),
        }
    }

    /// Register an individual and stream its node.
    ///
    /// `attrs` may carry `x`/`y`; otherwise a random position is used.
    pub fn deploy_with(
        &self,
        individual: &dyn Genome,
        generation: u32,
        attrs: Option<&Attributes>,
    ) -> LineageResult<NodeId> {
        let id = NodeId::new(self.next_index.fetch_add(1, Ordering::SeqCst));
        self.registry.insert(id, HubEntry::new(generation));

        let mut payload = attrs.map(flatten_attributes).unwrap_or_default();
        if !payload.contains_key("x") || !payload.contains_key("y") {
            let (x, y) = self.random_position();
            payload.entry("x".into()).or_insert(PropertyValue::Float(x));
            payload.entry("y".into()).or_insert(PropertyValue::Float(y));
        }
        payload
            .entry("size".into())
            .or_insert(PropertyValue::Float(self.config.node_size));
        payload.insert(LABEL_KEY.into(), PropertyValue::Str(id.to_string()));
        payload.insert(GENE_KEY.into(), individual.to_gene().flattened());
        payload.insert(GENERATION_KEY.into(), PropertyValue::from(generation));

        self.emit(StreamEvent::AddNode {
            id: id.to_string(),
            attrs: payload,
        });
        tracing::debug!(node = %id, generation, "individual registered");
        Ok(id)
    }

    /// `set_parents` at one past the latest parent generation
    pub fn set_parents_inferred(
        &self,
        child: NodeId,
        parents: &[NodeId],
        attrs: &EdgeAttrs,
    ) -> LineageResult<Vec<EdgeId>> {
        let latest = parents
            .iter()
            .map(|parent| self.entry(*parent).map(|entry| entry.generation))
            .collect::<LineageResult<Vec<_>>>()?
            .into_iter()
            .max();
        let generation = match latest {
            Some(g) => g + 1,
            None => self.entry(child)?.generation,
        };
        self.set_parents(child, parents, generation, attrs)
    }

    /// Registry entry of `id`
    pub fn get(&self, id: NodeId) -> Option<HubEntry> {
        self.registry.get(&id).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Number of events the transport failed to deliver
    pub fn delivery_failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    fn entry(&self, id: NodeId) -> LineageResult<HubEntry> {
        self.get(id).ok_or(LineageError::UnregisteredIdentity(id))
    }

    fn random_position(&self) -> (f64, f64) {
        let extent = self.config.extent;
        let mut rng = self.rng.lock().unwrap();
        (rng.gen_range(0.0..extent), rng.gen_range(0.0..extent))
    }

    fn emit(&self, event: StreamEvent) {
        if let Err(err) = self.transport.send(&event) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            tracing::warn!(
                event = event.kind(),
                id = event.id(),
                locator = %self.transport.locator(),
                error = %err,
                "stream delivery failed"
            );
        }
    }

    fn change_node(&self, id: NodeId, key: &str, value: PropertyValue) {
        let mut attrs = Attributes::new();
        attrs.insert(key.to_string(), value);
        self.emit(StreamEvent::ChangeNode {
            id: id.to_string(),
            attrs,
        });
    }
}

impl LineageTracker for TrackerHub {
    fn deploy(&self, individual: &dyn Genome, generation: u32) -> LineageResult<NodeId> {
        self.deploy_with(individual, generation, None)
    }

    fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()> {
        self.registry
            .get_mut(&id)
            .ok_or(LineageError::NodeNotFound(id))?
            .fitness = Some(fitness.to_vec());
        self.change_node(id, FITNESS_KEY, PropertyValue::from(fitness.to_vec()));
        Ok(())
    }

    fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()> {
        self.registry
            .get_mut(&id)
            .ok_or(LineageError::NodeNotFound(id))?
            .score = Some(score);
        self.change_node(id, SCORE_KEY, PropertyValue::Float(score));
        Ok(())
    }

    /// Stream one edge per parent, directed parent to child, with id
    /// `"{child}>{parent}"`. A child registered at an earlier generation
    /// is moved up to `generation` and a `cn` event carries the change.
    fn set_parents(
        &self,
        child: NodeId,
        parents: &[NodeId],
        generation: u32,
        attrs: &EdgeAttrs,
    ) -> LineageResult<Vec<EdgeId>> {
        let per_edge = attrs.resolve(parents.len())?;
        self.entry(child)?;
        for parent in parents {
            let entry = self.entry(*parent)?;
            if generation < entry.generation {
                return Err(LineageError::InvalidAttribute(format!(
                    "generation {} precedes parent {} born in generation {}",
                    generation, parent, entry.generation
                )));
            }
        }

        // a child is never older than the edges that produced it
        let raised = match self.registry.get_mut(&child) {
            Some(mut entry) => {
                entry.parents = parents.to_vec();
                let raised = generation > entry.generation;
                if raised {
                    entry.generation = generation;
                }
                raised
            }
            None => return Err(LineageError::UnregisteredIdentity(child)),
        };
        if raised {
            self.change_node(child, GENERATION_KEY, PropertyValue::from(generation));
        }

        let mut edges = Vec::with_capacity(parents.len());
        for (parent, attrs) in parents.iter().zip(per_edge) {
            let mut payload = flatten_attributes(attrs);
            payload.insert(GENERATION_KEY.into(), PropertyValue::from(generation));
            self.emit(StreamEvent::AddEdge {
                id: format!("{}>{}", child, parent),
                source: parent.to_string(),
                target: child.to_string(),
                directed: true,
                attrs: payload,
            });
            edges.push(EdgeId::new(self.next_edge.fetch_add(1, Ordering::SeqCst)));
        }
        Ok(edges)
    }

    /// Events are pushed as they happen; nothing is buffered.
    fn save(&self) -> LineageResult<SaveLocation> {
        tracing::info!(
            individuals = self.len(),
            failures = self.delivery_failures(),
            locator = %self.transport.locator(),
            "stream finished"
        );
        Ok(SaveLocation::Remote(self.transport.locator()))
    }

    fn num_nodes(&self) -> LineageResult<usize> {
        Ok(self.len())
    }
}
