//! In-memory property-graph adapter with file persistence
//!
//! Every property is declared up front in a node or edge [`Schema`]. Writes
//! are coerced to the declared type; keys missing from the schema are
//! rejected rather than dropped.

use super::gml;
use super::traits::{Adapter, SaveLocation};
use crate::graph::schema::{
    FITNESS_KEY, GENE_KEY, LABEL_KEY, RESERVED_EDGE_EXTRAS, RESERVED_NODE_EXTRAS, RESERVED_NODE_KEYS,
    SCORE_KEY,
};
use crate::graph::{
    Attributes, EdgeId, EdgeRecord, EdgeTag, LineageError, LineageResult, NodeId, NodeRecord,
    PropertyValue, Schema, GENERATION_KEY,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use uuid::Uuid;

/// Default directory saved graphs are written to
pub const DEFAULT_OUTPUT_DIR: &str = "graphs";

/// On-disk graph format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    #[default]
    Gml,
    Json,
}

impl GraphFormat {
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Gml => "gml",
            Self::Json => "json",
        }
    }

    /// Guess the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "gml" => Some(Self::Gml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Graph-level metadata written alongside the lineage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Run name, also the file stem
    pub name: String,
    /// Seed of the run's random generator, to tell runs apart
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<String>,
    pub run_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl GraphMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: None,
            run_id: Uuid::new_v4(),
            saved_at: None,
        }
    }
}

/// Everything needed to write and reload a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub metadata: GraphMetadata,
    pub node_schema: Schema,
    pub edge_schema: Schema,
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

/// Construction parameters for [`PropertyGraphAdapter`]
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub name: String,
    pub seed: Option<String>,
    pub format: GraphFormat,
    pub output_dir: PathBuf,
    pub node_schema: Schema,
    pub edge_schema: Schema,
}

impl GraphConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: None,
            format: GraphFormat::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            node_schema: Schema::default_nodes(),
            edge_schema: Schema::default_edges(),
        }
    }

    pub fn with_seed(mut self, seed: impl ToString) -> Self {
        self.seed = Some(seed.to_string());
        self
    }

    pub fn with_format(mut self, format: GraphFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_node_schema(mut self, schema: Schema) -> Self {
        self.node_schema = schema;
        self
    }

    pub fn with_edge_schema(mut self, schema: Schema) -> Self {
        self.edge_schema = schema;
        self
    }

    /// `<output_dir>/<name>.<suffix>`
    pub fn file_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.{}", self.name, self.format.suffix()))
    }
}

/// Node and edge storage. Ids are positions in the vectors.
#[derive(Debug, Default)]
struct PropertyGraph {
    nodes: Vec<NodeRecord>,
    edges: Vec<EdgeRecord>,
    /// Out-edge ids per node, in insertion order
    outgoing: Vec<Vec<EdgeId>>,
}

impl PropertyGraph {
    fn node(&self, id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(id.as_u64() as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> LineageResult<&mut NodeRecord> {
        self.nodes
            .get_mut(id.as_u64() as usize)
            .ok_or(LineageError::NodeNotFound(id))
    }
}

/// Embedded property graph adapter
pub struct PropertyGraphAdapter {
    config: GraphConfig,
    metadata: RwLock<GraphMetadata>,
    graph: RwLock<PropertyGraph>,
}

impl PropertyGraphAdapter {
    /// Create an empty graph. The node schema must declare `gene`,
    /// `generation`, `fitness` and `score`; the edge schema `label` and
    /// `generation`.
    pub fn new(config: GraphConfig) -> LineageResult<Self> {
        config.node_schema.require(&RESERVED_NODE_KEYS)?;
        config.edge_schema.require(&[LABEL_KEY, GENERATION_KEY])?;

        let mut metadata = GraphMetadata::new(config.name.clone());
        metadata.seed = config.seed.clone();
        Ok(Self {
            config,
            metadata: RwLock::new(metadata),
            graph: RwLock::new(PropertyGraph::default()),
        })
    }

    /// Reload a graph written by [`Adapter::save`]. The format is taken
    /// from the file extension.
    pub fn load(path: impl AsRef<Path>) -> LineageResult<Self> {
        let path = path.as_ref();
        let format = GraphFormat::from_path(path).ok_or_else(|| {
            LineageError::Format(format!("unknown graph format: {}", path.display()))
        })?;
        let text = std::fs::read_to_string(path)?;
        let snapshot = match format {
            GraphFormat::Gml => gml::read_gml(&text)?,
            GraphFormat::Json => serde_json::from_str(&text)?,
        };
        let output_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        Self::from_snapshot(snapshot, format, output_dir)
    }

    /// Rebuild an adapter from a snapshot; ids must be contiguous from 0.
    pub fn from_snapshot(
        snapshot: GraphSnapshot,
        format: GraphFormat,
        output_dir: PathBuf,
    ) -> LineageResult<Self> {
        let mut nodes = snapshot.nodes;
        let mut edges = snapshot.edges;
        nodes.sort_by_key(|node| node.id);
        edges.sort_by_key(|edge| edge.id);

        if let Some(node) = nodes.iter().enumerate().find(|(i, n)| n.id.as_u64() != *i as u64) {
            return Err(LineageError::Format(format!("node ids are not contiguous at {}", node.1.id)));
        }
        if let Some(edge) = edges.iter().enumerate().find(|(i, e)| e.id.as_u64() != *i as u64) {
            return Err(LineageError::Format(format!("edge ids are not contiguous at {}", edge.1.id)));
        }

        let mut outgoing = vec![Vec::new(); nodes.len()];
        for edge in &edges {
            for endpoint in [edge.source, edge.target] {
                if endpoint.as_u64() as usize >= nodes.len() {
                    return Err(LineageError::Format(format!(
                        "edge {} references missing node {}",
                        edge.id, endpoint
                    )));
                }
            }
            outgoing[edge.source.as_u64() as usize].push(edge.id);
        }

        let config = GraphConfig {
            name: snapshot.metadata.name.clone(),
            seed: snapshot.metadata.seed.clone(),
            format,
            output_dir,
            node_schema: snapshot.node_schema,
            edge_schema: snapshot.edge_schema,
        };
        let adapter = Self::new(config)?;
        *adapter.metadata.write().unwrap() = snapshot.metadata;
        *adapter.graph.write().unwrap() = PropertyGraph {
            nodes,
            edges,
            outgoing,
        };
        Ok(adapter)
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn metadata(&self) -> GraphMetadata {
        self.metadata.read().unwrap().clone()
    }

    /// Copy of the whole graph
    pub fn snapshot(&self) -> GraphSnapshot {
        let graph = self.graph.read().unwrap();
        GraphSnapshot {
            metadata: self.metadata(),
            node_schema: self.config.node_schema.clone(),
            edge_schema: self.config.edge_schema.clone(),
            nodes: graph.nodes.clone(),
            edges: graph.edges.clone(),
        }
    }

    pub fn nodes(&self) -> Vec<NodeRecord> {
        self.graph.read().unwrap().nodes.clone()
    }

    pub fn edges(&self) -> Vec<EdgeRecord> {
        self.graph.read().unwrap().edges.clone()
    }

    /// Edges pointing at `id`, i.e. its recorded parents and mirrors
    pub fn incoming(&self, id: NodeId) -> Vec<EdgeRecord> {
        let graph = self.graph.read().unwrap();
        graph
            .edges
            .iter()
            .filter(|edge| edge.target == id)
            .cloned()
            .collect()
    }

    fn render(&self, snapshot: &GraphSnapshot) -> LineageResult<String> {
        match self.config.format {
            GraphFormat::Gml => gml::write_gml(snapshot),
            GraphFormat::Json => Ok(serde_json::to_string_pretty(snapshot)?),
        }
    }
}

impl Adapter for PropertyGraphAdapter {
    fn add_node(
        &self,
        gene: PropertyValue,
        generation: u32,
        attrs: Option<&Attributes>,
    ) -> LineageResult<NodeId> {
        let schema = &self.config.node_schema;
        let gene = schema.coerce(GENE_KEY, &gene)?;
        schema.coerce(GENERATION_KEY, &PropertyValue::from(generation))?;
        let extras = match attrs {
            Some(attrs) => schema.coerce_extras(attrs, &RESERVED_NODE_EXTRAS)?,
            None => Attributes::new(),
        };

        let mut graph = self.graph.write().unwrap();
        let id = NodeId::new(graph.nodes.len() as u64);
        graph
            .nodes
            .push(NodeRecord::new(id, gene, generation).with_attrs(extras));
        graph.outgoing.push(Vec::new());
        tracing::debug!(node = %id, generation, "node added");
        Ok(id)
    }

    fn add_edge(
        &self,
        tag: EdgeTag,
        source: NodeId,
        target: NodeId,
        attrs: Option<&Attributes>,
    ) -> LineageResult<EdgeId> {
        let schema = &self.config.edge_schema;
        let mut extras = attrs.cloned().unwrap_or_default();
        let generation = match extras.remove(GENERATION_KEY) {
            Some(value) => schema.coerce(GENERATION_KEY, &value)?,
            None => PropertyValue::Int(0),
        };
        let generation = generation
            .as_i64()
            .and_then(|g| u32::try_from(g).ok())
            .ok_or_else(|| {
                LineageError::InvalidAttribute(format!("`{}` must be non-negative", GENERATION_KEY))
            })?;
        let extras = schema.coerce_extras(&extras, &RESERVED_EDGE_EXTRAS)?;

        let mut graph = self.graph.write().unwrap();
        for endpoint in [source, target] {
            if graph.node(endpoint).is_none() {
                return Err(LineageError::UnregisteredIdentity(endpoint));
            }
        }
        let id = EdgeId::new(graph.edges.len() as u64);
        graph.edges.push(EdgeRecord {
            id,
            tag,
            source,
            target,
            generation,
            attrs: extras,
        });
        graph.outgoing[source.as_u64() as usize].push(id);
        tracing::debug!(edge = %id, %tag, %source, %target, "edge added");
        Ok(id)
    }

    fn get_node(&self, id: NodeId) -> LineageResult<NodeRecord> {
        self.graph
            .read()
            .unwrap()
            .node(id)
            .cloned()
            .ok_or(LineageError::NodeNotFound(id))
    }

    fn get_edge(&self, id: EdgeId) -> LineageResult<EdgeRecord> {
        self.graph
            .read()
            .unwrap()
            .edges
            .get(id.as_u64() as usize)
            .cloned()
            .ok_or(LineageError::EdgeNotFound(id))
    }

    fn find_node_by_gene(
        &self,
        gene: &PropertyValue,
        before: Option<NodeId>,
    ) -> LineageResult<Option<NodeId>> {
        // a gene the schema cannot hold cannot be stored either
        let Ok(gene) = self.config.node_schema.coerce(GENE_KEY, gene) else {
            return Ok(None);
        };
        let graph = self.graph.read().unwrap();
        let latest = graph
            .nodes
            .iter()
            .filter(|node| before.map_or(true, |bound| node.id < bound))
            .filter(|node| node.gene == gene)
            .max_by_key(|node| (node.generation, node.id));
        Ok(latest.map(|node| node.id))
    }

    fn walk_edge(&self, tag: EdgeTag, start: NodeId) -> LineageResult<NodeId> {
        let graph = self.graph.read().unwrap();
        if graph.node(start).is_none() {
            return Err(LineageError::NodeNotFound(start));
        }
        let mut current = start;
        let mut visited = HashSet::from([start]);
        loop {
            let next = graph.outgoing[current.as_u64() as usize]
                .iter()
                .rev()
                .map(|edge_id| &graph.edges[edge_id.as_u64() as usize])
                .find(|edge| edge.tag == tag)
                .map(|edge| edge.target);
            match next {
                Some(target) if visited.insert(target) => current = target,
                _ => return Ok(current),
            }
        }
    }

    fn update_fitness(&self, id: NodeId, fitness: &[f64]) -> LineageResult<()> {
        self.config
            .node_schema
            .coerce(FITNESS_KEY, &PropertyValue::from(fitness.to_vec()))?;
        let mut graph = self.graph.write().unwrap();
        graph.node_mut(id)?.fitness = Some(fitness.to_vec());
        Ok(())
    }

    fn update_score(&self, id: NodeId, score: f64) -> LineageResult<()> {
        self.config
            .node_schema
            .coerce(SCORE_KEY, &PropertyValue::Float(score))?;
        let mut graph = self.graph.write().unwrap();
        graph.node_mut(id)?.score = Some(score);
        Ok(())
    }

    fn save(&self) -> LineageResult<SaveLocation> {
        self.metadata.write().unwrap().saved_at = Some(Utc::now());
        let snapshot = self.snapshot();
        let text = self.render(&snapshot)?;

        let path = self.config.file_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, text)?;
        tracing::info!(
            path = %path.display(),
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "graph saved"
        );
        Ok(SaveLocation::File(path))
    }

    fn num_nodes(&self) -> LineageResult<usize> {
        Ok(self.graph.read().unwrap().nodes.len())
    }

    fn num_edges(&self) -> LineageResult<usize> {
        Ok(self.graph.read().unwrap().edges.len())
    }
}
