//! Persistence and backend selection

mod common;

use common::{create_test_tracker, operator};
use evotrace::{
    Adapter, BackendConfig, EdgeAttrs, EdgeTag, GephiConfig, GephiTransport, GraphDbAdapter,
    GraphFormat, HubConfig, LineageError, LineageTracker, NodeId, OpenSession,
    PropertyGraphAdapter, PropertyValue, RunConfig, RunSection, SaveLocation, SqliteSession,
    Tracker, TrackerHub,
};
use std::path::PathBuf;
use tempfile::TempDir;

fn saved_path(location: SaveLocation) -> PathBuf {
    match location {
        SaveLocation::File(path) => path,
        other => panic!("expected a file, got {}", other),
    }
}

fn round_trip(format: GraphFormat) {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), format);

    let a = tracker.deploy(&vec![true, false, true], 0).unwrap();
    let b = tracker.deploy(&vec![false, false, true], 0).unwrap();
    let child = tracker.deploy(&vec![true, false, false], 1).unwrap();
    tracker.update_fitness(a, &[2.0, 0.5]).unwrap();
    tracker.update_score(a, 2.0).unwrap();
    tracker.update_score(child, 1.0).unwrap();
    tracker
        .set_parents(child, &[a, b], 1, &operator("cx_uniform"))
        .unwrap();

    let path = saved_path(tracker.save().unwrap());
    assert_eq!(GraphFormat::from_path(&path), Some(format));

    let original = tracker.adapter().snapshot();
    let reloaded = PropertyGraphAdapter::load(&path).unwrap();
    let snapshot = reloaded.snapshot();

    assert_eq!(snapshot.nodes, original.nodes);
    assert_eq!(snapshot.edges, original.edges);
    assert_eq!(snapshot.edge_schema, original.edge_schema);
    assert_eq!(snapshot.metadata.run_id, original.metadata.run_id);
    assert_eq!(reloaded.num_nodes().unwrap(), 3);
}

#[test]
fn gml_round_trip() {
    round_trip(GraphFormat::Gml);
}

#[test]
fn json_round_trip() {
    round_trip(GraphFormat::Json);
}

fn non_finite_round_trip(format: GraphFormat) {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), format);
    let id = tracker.deploy(&vec![true, false], 0).unwrap();
    let other = tracker.deploy(&vec![false, false], 0).unwrap();
    tracker
        .update_fitness(id, &[f64::NAN, 1.0, f64::NEG_INFINITY])
        .unwrap();
    tracker.update_score(id, f64::INFINITY).unwrap();
    tracker.update_score(other, f64::NAN).unwrap();

    let path = saved_path(tracker.save().unwrap());
    let reloaded = PropertyGraphAdapter::load(&path).unwrap();

    let node = reloaded.get_node(id).unwrap();
    let fitness = node.fitness.unwrap();
    assert_eq!(fitness.len(), 3);
    assert!(fitness[0].is_nan());
    assert_eq!(&fitness[1..], &[1.0, f64::NEG_INFINITY]);
    assert_eq!(node.score, Some(f64::INFINITY));
    assert!(reloaded.get_node(other).unwrap().score.unwrap().is_nan());
}

#[test]
fn json_keeps_non_finite_evaluations() {
    non_finite_round_trip(GraphFormat::Json);
}

#[test]
fn gml_keeps_non_finite_evaluations() {
    non_finite_round_trip(GraphFormat::Gml);
}

#[test]
fn reloaded_graph_keeps_issuing_ids() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Json);
    let parent = tracker.deploy(&vec![true], 0).unwrap();
    let path = saved_path(tracker.save().unwrap());

    let resumed = Tracker::new(PropertyGraphAdapter::load(&path).unwrap());
    let child = resumed.deploy(&vec![false], 1).unwrap();
    assert_eq!(child, NodeId::new(1));
    resumed
        .set_parents(child, &[parent], 1, &EdgeAttrs::none())
        .unwrap();
    assert_eq!(resumed.adapter().num_edges().unwrap(), 1);
}

#[test]
fn sqlite_run_resumes_with_fresh_ids() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("lineage.db");

    let first = {
        let session = SqliteSession::open(&db).unwrap();
        let tracker = Tracker::new(GraphDbAdapter::new(session, "onemax-7").unwrap());
        let a = tracker.deploy(&vec![1, 0, 1], 0).unwrap();
        let b = tracker.deploy(&vec![0, 1, 1], 0).unwrap();
        let child = tracker.deploy(&vec![1, 1, 1], 1).unwrap();
        tracker.update_fitness(child, &[3.0]).unwrap();
        tracker
            .set_parents(child, &[a, b], 1, &EdgeAttrs::none())
            .unwrap();
        let location = tracker.save().unwrap();
        assert!(matches!(location, SaveLocation::Remote(_)));
        child
    };

    let session = SqliteSession::open(&db).unwrap();
    let tracker = Tracker::new(GraphDbAdapter::new(session, "onemax-7").unwrap());
    assert_eq!(tracker.num_nodes().unwrap(), 3);

    let stored = tracker.get_raw_node(first).unwrap();
    assert_eq!(stored.generation, 1);
    assert_eq!(stored.fitness, Some(vec![3.0]));

    let next = tracker.deploy(&vec![0, 0, 0], 2).unwrap();
    assert_eq!(next, NodeId::new(3));
    let edges = tracker
        .set_parents(next, &[first], 2, &EdgeAttrs::none())
        .unwrap();
    assert_eq!(edges[0].as_u64(), 2);
    assert_eq!(tracker.get_raw_edge(edges[0]).unwrap().tag, EdgeTag::ParentOf);
}

#[test]
fn sqlite_runs_do_not_share_ids() {
    let session = SqliteSession::open_in_memory().unwrap();
    let adapter = GraphDbAdapter::new(session, "first").unwrap();
    adapter
        .add_node(PropertyValue::from(vec![1]), 0, None)
        .unwrap();
    adapter
        .add_node(PropertyValue::from(vec![0]), 0, None)
        .unwrap();

    let session = SqliteSession::open_in_memory().unwrap();
    let other = GraphDbAdapter::new(session, "second").unwrap();
    let id = other.add_node(PropertyValue::from(vec![1]), 0, None).unwrap();
    assert_eq!(id, NodeId::new(0));
}

#[test]
fn hub_keeps_running_when_gephi_is_unreachable() {
    let transport = GephiTransport::new(&GephiConfig {
        url: "http://127.0.0.1:1".into(),
        timeout_secs: 2,
        ..Default::default()
    })
    .unwrap();
    let hub = TrackerHub::with_config(
        Box::new(transport),
        HubConfig {
            seed: Some(3),
            ..Default::default()
        },
    )
    .unwrap();

    let parent = hub.deploy(&vec![true, false], 0).unwrap();
    let child = hub.deploy(&vec![true, true], 1).unwrap();
    hub.update_score(child, 2.0).unwrap();
    let edges = hub
        .set_parents(child, &[parent], 1, &EdgeAttrs::none())
        .unwrap();

    assert_eq!(edges.len(), 1);
    assert_eq!(hub.len(), 2);
    assert_eq!(hub.get(child).unwrap().parents, vec![parent]);
    assert!(hub.delivery_failures() >= 4);
    assert_eq!(
        hub.save().unwrap(),
        SaveLocation::Remote("http://127.0.0.1:1/workspace1?operation=updateGraph".into())
    );
}

#[test]
fn configured_memory_tracker_saves_under_output_dir() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig {
        run: RunSection {
            name: "configured".into(),
            seed: Some(11),
        },
        output_dir: Some(dir.path().to_path_buf()),
        backend: BackendConfig::Memory {
            format: GraphFormat::Json,
            node_schema: None,
            edge_schema: None,
        },
    };
    let tracker = config.open_tracker().unwrap();
    let parent = tracker.deploy(&vec![true, true], 0).unwrap();
    let child = tracker.deploy(&vec![true, false], 1).unwrap();
    tracker
        .set_parents(child, &[parent], 1, &EdgeAttrs::none())
        .unwrap();

    let path = saved_path(tracker.save().unwrap());
    assert_eq!(path, dir.path().join("configured.json"));

    let reloaded = PropertyGraphAdapter::load(&path).unwrap();
    assert_eq!(reloaded.metadata().seed.as_deref(), Some("11"));
    assert_eq!(reloaded.edges().len(), 1);
}

#[test]
fn configured_null_tracker_persists_nothing() {
    let config = RunConfig::from_yaml_str("run:\n  name: dry\nbackend:\n  kind: \"null\"\n").unwrap();
    let tracker = config.open_tracker().unwrap();
    let a = tracker.deploy(&vec![1], 0).unwrap();
    let b = tracker.deploy(&vec![0], 0).unwrap();
    assert!(a < b);
    assert_eq!(tracker.save().unwrap(), SaveLocation::Nowhere);
}

#[test]
fn unreachable_cypher_backend_fails_to_open() {
    let config = RunConfig::from_yaml_str(
        "backend:\n  kind: cypher\n  url: http://127.0.0.1:1\n  timeout_secs: 2\n",
    )
    .unwrap();
    assert!(matches!(
        config.open_tracker().err(),
        Some(LineageError::Transport(_))
    ));
}
