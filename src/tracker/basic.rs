//! Tracker: records lineage through a single adapter

use super::attrs::EdgeAttrs;
use super::traits::LineageTracker;
use crate::adapter::{Adapter, SaveLocation};
use crate::graph::{
    Attributes, EdgeId, EdgeRecord, EdgeTag, Genome, LineageResult, NodeId, NodeRecord,
    PropertyValue, GENERATION_KEY,
};
use std::ops::Deref;

/// An individual paired with the id it was deployed under
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<G> {
    pub individual: G,
    pub id: NodeId,
}

impl<G> Tracked<G> {
    pub fn new(individual: G, id: NodeId) -> Self {
        Self { individual, id }
    }
}

impl<G> Deref for Tracked<G> {
    type Target = G;

    fn deref(&self) -> &G {
        &self.individual
    }
}

/// Backend-agnostic lineage recorder
///
/// Binds individuals to node ids, records PARENT_OF edges and forwards
/// evaluation results. Adapter errors are returned unchanged; the only
/// check done here is the shape of [`EdgeAttrs`].
pub struct Tracker<A: Adapter = Box<dyn Adapter>> {
    adapter: A,
}

impl<A: Adapter> Tracker<A> {
    pub fn new(adapter: A) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn into_adapter(self) -> A {
        self.adapter
    }

    /// Create a node for `individual` and return its id
    pub fn deploy<G: Genome + ?Sized>(&self, individual: &G, generation: u32) -> LineageResult<NodeId> {
        self.adapter.add_node(individual.to_gene(), generation, None)
    }

    /// Deploy with extra node attributes
    pub fn deploy_with<G: Genome + ?Sized>(
        &self,
        individual: &G,
        generation: u32,
        attrs: &Attributes,
    ) -> LineageResult<NodeId> {
        self.adapter
            .add_node(individual.to_gene(), generation, Some(attrs))
    }

    pub fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()> {
        self.adapter.update_fitness(id, fitness)
    }

    pub fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()> {
        self.adapter.update_score(id, score)
    }

    /// Link every parent to `child` with a PARENT_OF edge.
    ///
    /// `attrs` is checked against the parent count before anything is
    /// written. Each edge carries `generation`, replacing any caller value.
    pub fn set_parents(
        &self,
        child: NodeId,
        parents: &[NodeId],
        generation: u32,
        attrs: &EdgeAttrs,
    ) -> LineageResult<Vec<EdgeId>> {
        let per_edge = attrs.resolve(parents.len())?;
        parents
            .iter()
            .zip(per_edge)
            .map(|(&parent, attrs)| {
                self.add_edge(EdgeTag::ParentOf, parent, child, generation, Some(attrs))
            })
            .collect()
    }

    /// Link an earlier node with the same gene to `new_id`.
    ///
    /// Looks up the latest older node carrying the gene, follows its MIRROR
    /// chain to the tail and adds a MIRROR edge from the tail to `new_id`.
    /// Returns `None` if the gene was never seen before.
    pub fn check_and_add_mirror<G: Genome + ?Sized>(
        &self,
        new_id: NodeId,
        individual: &G,
        generation: u32,
        attrs: Option<&Attributes>,
    ) -> LineageResult<Option<EdgeId>> {
        let gene = individual.to_gene();
        let Some(old_id) = self.adapter.find_node_by_gene(&gene, Some(new_id))? else {
            return Ok(None);
        };
        let tail = self.adapter.walk_edge(EdgeTag::Mirror, old_id)?;
        if tail == new_id {
            return Ok(None);
        }
        self.add_edge(EdgeTag::Mirror, tail, new_id, generation, attrs)
            .map(Some)
    }

    pub fn get_raw_node(&self, id: NodeId) -> LineageResult<NodeRecord> {
        self.adapter.get_node(id)
    }

    pub fn get_raw_edge(&self, id: EdgeId) -> LineageResult<EdgeRecord> {
        self.adapter.get_edge(id)
    }

    pub fn save(&self) -> LineageResult<SaveLocation> {
        let location = self.adapter.save()?;
        tracing::info!(%location, "graph saved");
        Ok(location)
    }

    /// Nodes in the adapter, which can differ from individuals evaluated
    pub fn num_nodes(&self) -> LineageResult<usize> {
        self.adapter.num_nodes()
    }

    /// Run a reproduction operator and record its offspring.
    ///
    /// Every child is deployed at `generation` and linked to all parents.
    pub fn breed<G, F>(
        &self,
        parents: &[Tracked<G>],
        generation: u32,
        attrs: &EdgeAttrs,
        operator: F,
    ) -> LineageResult<Vec<Tracked<G>>>
    where
        G: Genome + Clone,
        F: FnOnce(Vec<G>) -> Vec<G>,
    {
        attrs.resolve(parents.len())?;
        let parent_ids: Vec<NodeId> = parents.iter().map(|p| p.id).collect();
        let offspring = operator(parents.iter().map(|p| p.individual.clone()).collect());

        offspring
            .into_iter()
            .map(|child| {
                let id = self.deploy(&child, generation)?;
                self.set_parents(id, &parent_ids, generation, attrs)?;
                Ok(Tracked::new(child, id))
            })
            .collect()
    }

    fn add_edge(
        &self,
        tag: EdgeTag,
        source: NodeId,
        target: NodeId,
        generation: u32,
        attrs: Option<&Attributes>,
    ) -> LineageResult<EdgeId> {
        let mut attrs = attrs.cloned().unwrap_or_default();
        attrs.insert(GENERATION_KEY.to_string(), PropertyValue::from(generation));
        self.adapter.add_edge(tag, source, target, Some(&attrs))
    }
}

impl<A: Adapter> LineageTracker for Tracker<A> {
    fn deploy(&self, individual: &dyn Genome, generation: u32) -> LineageResult<NodeId> {
        Tracker::deploy(self, individual, generation)
    }

    fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()> {
        Tracker::update_fitness(self, id, fitness)
    }

    fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()> {
        Tracker::update_score(self, id, score)
    }

    fn set_parents(
        &self,
        child: NodeId,
        parents: &[NodeId],
        generation: u32,
        attrs: &EdgeAttrs,
    ) -> LineageResult<Vec<EdgeId>> {
        Tracker::set_parents(self, child, parents, generation, attrs)
    }

    fn save(&self) -> LineageResult<SaveLocation> {
        Tracker::save(self)
    }

    fn num_nodes(&self) -> LineageResult<usize> {
        Tracker::num_nodes(self)
    }
}
