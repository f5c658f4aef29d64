//! LineageTracker trait, the surface an EA loop records lineage through

use super::attrs::EdgeAttrs;
use crate::adapter::SaveLocation;
use crate::graph::{EdgeId, Genome, LineageResult, NodeId};

/// Operations shared by [`Tracker`](super::Tracker) and
/// [`TrackerHub`](super::TrackerHub), so a run can pick either at startup.
pub trait LineageTracker: Send + Sync {
    /// Register an individual born in `generation` and return its id
    fn deploy(&self, individual: &dyn Genome, generation: u32) -> LineageResult<NodeId>;

    fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()>;

    fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()>;

    /// Record one PARENT_OF edge per parent
    fn set_parents(
        &self,
        child: NodeId,
        parents: &[NodeId],
        generation: u32,
        attrs: &EdgeAttrs,
    ) -> LineageResult<Vec<EdgeId>>;

    fn save(&self) -> LineageResult<SaveLocation>;

    fn num_nodes(&self) -> LineageResult<usize>;
}

impl<T: LineageTracker + ?Sized> LineageTracker for Box<T> {
    fn deploy(&self, individual: &dyn Genome, generation: u32) -> LineageResult<NodeId> {
        (**self).deploy(individual, generation)
    }

    fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()> {
        (**self).update_fitness(id, fitness)
    }

    fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()> {
        (**self).update_score(id, score)
    }

    fn set_parents(
        &self,
        child: NodeId,
        parents: &[NodeId],
        generation: u32,
        attrs: &EdgeAttrs,
    ) -> LineageResult<Vec<EdgeId>> {
        (**self).set_parents(child, parents, generation, attrs)
    }

    fn save(&self) -> LineageResult<SaveLocation> {
        (**self).save()
    }

    fn num_nodes(&self) -> LineageResult<usize> {
        (**self).num_nodes()
    }
}
