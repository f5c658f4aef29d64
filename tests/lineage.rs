//! End-to-end lineage recording through a Tracker over the in-memory graph

mod common;

use common::{attrs, create_test_tracker, edges_into, operator};
use evotrace::{
    Adapter, EdgeAttrs, EdgeTag, GraphFormat, LineageError, NodeId, PropertyValue, Tracked,
};
use tempfile::TempDir;

#[test]
fn three_node_scenario() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);

    let a = tracker.deploy(&vec![1, 0], 0).unwrap();
    let b = tracker.deploy(&vec![1, 1], 0).unwrap();
    let child = tracker.deploy(&vec![1, 0, 1], 1).unwrap();
    let edges = tracker
        .set_parents(child, &[a, b], 1, &EdgeAttrs::none())
        .unwrap();

    assert_eq!(edges.len(), 2);
    assert_eq!(tracker.num_nodes().unwrap(), 3);
    assert_eq!(tracker.get_raw_node(child).unwrap().generation, 1);

    for (edge_id, parent) in edges.iter().zip([a, b]) {
        let edge = tracker.get_raw_edge(*edge_id).unwrap();
        assert_eq!(edge.tag, EdgeTag::ParentOf);
        assert_eq!(edge.source, parent);
        assert_eq!(edge.target, child);
        assert_eq!(edge.generation, 1);
    }
}

#[test]
fn ids_are_distinct_and_increasing() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);

    let ids: Vec<NodeId> = (0..10)
        .map(|i| tracker.deploy(&vec![i % 2 == 0; 4], i / 3).unwrap())
        .collect();
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn shared_attributes_apply_to_every_edge() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let p1 = tracker.deploy(&vec![true, false], 0).unwrap();
    let p2 = tracker.deploy(&vec![false, true], 0).unwrap();
    let child = tracker.deploy(&vec![true, true], 1).unwrap();

    tracker
        .set_parents(child, &[p1, p2], 1, &operator("cx_one_point"))
        .unwrap();

    let edges = edges_into(tracker.adapter(), child, EdgeTag::ParentOf);
    assert_eq!(edges.len(), 2);
    for edge in &edges {
        assert_eq!(
            edge.attrs.get("operator"),
            Some(&PropertyValue::Str("cx_one_point".into()))
        );
    }
}

#[test]
fn per_parent_attributes_line_up_with_parents() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let p1 = tracker.deploy(&vec![true, false], 0).unwrap();
    let p2 = tracker.deploy(&vec![false, true], 0).unwrap();
    let child = tracker.deploy(&vec![true, true], 1).unwrap();

    let per_parent = EdgeAttrs::PerParent(vec![
        attrs(&[("weight", PropertyValue::Float(0.75))]),
        attrs(&[("weight", PropertyValue::Float(0.25))]),
    ]);
    tracker.set_parents(child, &[p1, p2], 1, &per_parent).unwrap();

    let edges = edges_into(tracker.adapter(), child, EdgeTag::ParentOf);
    let weights: Vec<(NodeId, Option<f64>)> = edges
        .iter()
        .map(|edge| (edge.source, edge.attrs.get("weight").and_then(|w| w.as_f64())))
        .collect();
    assert_eq!(weights, vec![(p1, Some(0.75)), (p2, Some(0.25))]);
}

#[test]
fn shared_and_repeated_per_parent_attributes_read_back_alike() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let p1 = tracker.deploy(&vec![true, false], 0).unwrap();
    let p2 = tracker.deploy(&vec![false, true], 0).unwrap();
    let shared_child = tracker.deploy(&vec![true, true], 1).unwrap();
    let per_parent_child = tracker.deploy(&vec![false, false], 1).unwrap();

    let m = attrs(&[
        ("operator", PropertyValue::Str("cx_uniform".into())),
        ("weight", PropertyValue::Float(0.5)),
    ]);
    tracker
        .set_parents(shared_child, &[p1, p2], 1, &EdgeAttrs::Shared(m.clone()))
        .unwrap();
    tracker
        .set_parents(
            per_parent_child,
            &[p1, p2],
            1,
            &EdgeAttrs::PerParent(vec![m.clone(), m]),
        )
        .unwrap();

    let read_back = |child| {
        edges_into(tracker.adapter(), child, EdgeTag::ParentOf)
            .into_iter()
            .map(|edge| (edge.source, edge.generation, edge.attrs))
            .collect::<Vec<_>>()
    };
    let shared = read_back(shared_child);
    assert_eq!(shared.len(), 2);
    assert_eq!(shared, read_back(per_parent_child));
    assert!(shared.iter().all(|(_, generation, _)| *generation == 1));
}

#[test]
fn misaligned_attributes_create_no_edges() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let p1 = tracker.deploy(&vec![true], 0).unwrap();
    let p2 = tracker.deploy(&vec![false], 0).unwrap();
    let child = tracker.deploy(&vec![true], 1).unwrap();

    let short = EdgeAttrs::PerParent(vec![attrs(&[("weight", PropertyValue::Float(1.0))])]);
    let err = tracker.set_parents(child, &[p1, p2], 1, &short).unwrap_err();

    assert!(matches!(err, LineageError::AttributeShape { .. }));
    assert_eq!(tracker.adapter().num_edges().unwrap(), 0);
}

#[test]
fn undeclared_edge_attribute_is_rejected() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let parent = tracker.deploy(&vec![true], 0).unwrap();
    let child = tracker.deploy(&vec![true], 1).unwrap();

    let unknown = EdgeAttrs::Shared(attrs(&[("crossover_point", PropertyValue::Int(3))]));
    let err = tracker.set_parents(child, &[parent], 1, &unknown).unwrap_err();

    assert!(matches!(err, LineageError::InvalidAttribute(_)));
    assert_eq!(tracker.adapter().num_edges().unwrap(), 0);
}

#[test]
fn last_fitness_write_wins() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let id = tracker.deploy(&vec![true, true, false], 0).unwrap();

    tracker.update_fitness(id, &[1.0, 2.0]).unwrap();
    tracker.update_fitness(id, &[3.5]).unwrap();

    assert_eq!(tracker.get_raw_node(id).unwrap().fitness, Some(vec![3.5]));
}

#[test]
fn score_before_fitness_leaves_fitness_unset() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let id = tracker.deploy(&vec![false, true], 0).unwrap();

    tracker.update_score(id, 0.5).unwrap();

    let node = tracker.get_raw_node(id).unwrap();
    assert_eq!(node.score, Some(0.5));
    assert_eq!(node.fitness, None);
    assert!(!node.is_evaluated());
}

#[test]
fn unregistered_ids_leave_counts_unchanged() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let parent = tracker.deploy(&vec![true], 0).unwrap();
    let ghost = NodeId::new(99);

    let err = tracker
        .set_parents(ghost, &[parent], 1, &EdgeAttrs::none())
        .unwrap_err();
    assert!(matches!(err, LineageError::UnregisteredIdentity(id) if id == ghost));

    assert!(matches!(
        tracker.update_fitness(ghost, &[1.0]),
        Err(LineageError::NodeNotFound(_))
    ));
    assert_eq!(tracker.num_nodes().unwrap(), 1);
    assert_eq!(tracker.adapter().num_edges().unwrap(), 0);
}

#[test]
fn repeated_genes_form_a_mirror_chain() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let gene = vec![true, false, true];

    let first = tracker.deploy(&gene, 0).unwrap();
    assert_eq!(tracker.check_and_add_mirror(first, &gene, 0, None).unwrap(), None);

    let second = tracker.deploy(&gene, 1).unwrap();
    let third = tracker.deploy(&gene, 2).unwrap();
    tracker.check_and_add_mirror(second, &gene, 1, None).unwrap();
    tracker.check_and_add_mirror(third, &gene, 2, None).unwrap();

    let into_second = edges_into(tracker.adapter(), second, EdgeTag::Mirror);
    let into_third = edges_into(tracker.adapter(), third, EdgeTag::Mirror);
    assert_eq!(into_second.len(), 1);
    assert_eq!(into_second[0].source, first);
    assert_eq!(into_third.len(), 1);
    assert_eq!(into_third[0].source, second);
}

#[test]
fn breed_links_offspring_to_all_parents() {
    let dir = TempDir::new().unwrap();
    let tracker = create_test_tracker(dir.path(), GraphFormat::Gml);
    let parents: Vec<Tracked<Vec<bool>>> = [vec![true, true, false, false], vec![false, false, true, true]]
        .into_iter()
        .map(|gene| {
            let id = tracker.deploy(&gene, 0).unwrap();
            Tracked::new(gene, id)
        })
        .collect();

    let offspring = tracker
        .breed(&parents, 1, &operator("cx_two_point"), |mut genes| {
            let (left, right) = genes.split_at_mut(1);
            left[0][2..].swap_with_slice(&mut right[0][2..]);
            genes
        })
        .unwrap();

    assert_eq!(offspring.len(), 2);
    assert_eq!(*offspring[0], vec![true, true, true, true]);
    for child in &offspring {
        let edges = edges_into(tracker.adapter(), child.id, EdgeTag::ParentOf);
        let sources: Vec<NodeId> = edges.iter().map(|e| e.source).collect();
        assert_eq!(sources, vec![parents[0].id, parents[1].id]);
        assert_eq!(tracker.get_raw_node(child.id).unwrap().generation, 1);
    }
}
