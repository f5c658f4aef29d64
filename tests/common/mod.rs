//! Shared helpers for lineage integration tests

#![allow(dead_code)]

use evotrace::{
    Attributes, EdgeAttrs, EdgeRecord, EdgeTag, GraphConfig, GraphFormat, NodeId,
    PropertyGraphAdapter, PropertyType, PropertyValue, Schema, Tracker,
};
use std::path::Path;

/// Edge schema with the extras the scenarios attach
pub fn test_edge_schema() -> Schema {
    Schema::default_edges()
        .with("operator", PropertyType::String)
        .with("weight", PropertyType::Float)
}

pub fn create_test_config(name: &str, dir: &Path, format: GraphFormat) -> GraphConfig {
    GraphConfig::new(name)
        .with_format(format)
        .with_output_dir(dir)
        .with_edge_schema(test_edge_schema())
}

/// Tracker over an in-memory graph saved under `dir`
pub fn create_test_tracker(dir: &Path, format: GraphFormat) -> Tracker<PropertyGraphAdapter> {
    let adapter = PropertyGraphAdapter::new(create_test_config("scenario", dir, format)).unwrap();
    Tracker::new(adapter)
}

pub fn attrs(pairs: &[(&str, PropertyValue)]) -> Attributes {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect()
}

pub fn operator(name: &str) -> EdgeAttrs {
    EdgeAttrs::Shared(attrs(&[("operator", name.into())]))
}

/// Incoming edges of `node` with `tag`, ordered by edge id
pub fn edges_into(graph: &PropertyGraphAdapter, node: NodeId, tag: EdgeTag) -> Vec<EdgeRecord> {
    let mut edges: Vec<EdgeRecord> = graph
        .incoming(node)
        .into_iter()
        .filter(|edge| edge.tag == tag)
        .collect();
    edges.sort_by_key(|edge| edge.id);
    edges
}
