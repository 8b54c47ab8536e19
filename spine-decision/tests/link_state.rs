//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use std::collections::HashSet;

use maplit::btreemap;

use spine_decision::error::Error;
use spine_decision::link::{HoldableValue, Link, LinkStateMetric};
use spine_decision::link_state::LinkState;
use spine_utils::lsdb::PrefixForwardingAlgorithm;

use common::{AREA, adj_db, adjacency, get_link_state, path_metric};

#[test]
fn test_holdable_value() {
    let mut hv = HoldableValue::new(true);
    assert!(*hv.value());
    assert!(!hv.has_hold());
    assert!(!hv.decrement_ttl());

    let hold_up_ttl = 10;
    let hold_down_ttl = 5;

    // Bringing the value up is damped by the hold-up TTL.
    assert!(!hv.update_value(false, hold_up_ttl, hold_down_ttl));
    for _ in 0..hold_up_ttl - 1 {
        assert!(hv.has_hold());
        assert!(*hv.value());
        assert!(!hv.decrement_ttl());
    }
    assert!(hv.decrement_ttl());
    assert!(!hv.has_hold());
    assert!(!*hv.value());

    // Updating with the same value is a no-op.
    assert!(!hv.update_value(false, hold_up_ttl, hold_down_ttl));
    assert!(!hv.has_hold());
    assert!(!*hv.value());

    // The change is now bringing the value down.
    assert!(!hv.update_value(true, hold_up_ttl, hold_down_ttl));
    for _ in 0..hold_down_ttl - 1 {
        assert!(hv.has_hold());
        assert!(!*hv.value());
        assert!(!hv.decrement_ttl());
    }
    assert!(hv.decrement_ttl());
    assert!(!hv.has_hold());
    assert!(*hv.value());

    // A second change within the hold falls back to immediate update.
    assert!(!hv.update_value(false, hold_up_ttl, hold_down_ttl));
    assert!(hv.has_hold());
    assert!(*hv.value());
    assert!(!hv.decrement_ttl());
    assert!(hv.update_value(true, hold_up_ttl, hold_down_ttl));
    assert!(!hv.has_hold());
    assert!(*hv.value());

    // Metric variant: a decrease is the "up" direction.
    let mut hv: HoldableValue<LinkStateMetric> = HoldableValue::new(10);
    assert_eq!(*hv.value(), 10);
    assert!(!hv.update_value(5, hold_up_ttl, hold_down_ttl));
    for _ in 0..hold_up_ttl - 1 {
        assert!(hv.has_hold());
        assert_eq!(*hv.value(), 10);
        assert!(!hv.decrement_ttl());
    }
    assert!(hv.decrement_ttl());
    assert!(!hv.has_hold());
    assert_eq!(*hv.value(), 5);
}

#[test]
fn test_link_basic() {
    let adj1 = adjacency(1, 2, 0, 1);
    let adj2 = adjacency(2, 1, 0, 2);
    let mut link = Link::from_adjacencies(AREA, "1", &adj1, "2", &adj2);

    assert_eq!(link.area(), AREA);
    assert_eq!(link.other_node_name("1").unwrap(), "2");
    assert_eq!(link.other_node_name("2").unwrap(), "1");
    assert!(matches!(
        link.other_node_name("3"),
        Err(Error::LinkEndpointNotFound(..))
    ));

    assert_eq!(link.iface_from_node("1").unwrap(), "1/2/0");
    assert_eq!(link.iface_from_node("2").unwrap(), "2/1/0");
    assert!(link.iface_from_node("3").is_err());

    assert_eq!(link.metric_from_node("1").unwrap(), 1);
    assert_eq!(link.metric_from_node("2").unwrap(), 2);
    assert!(link.metric_from_node("3").is_err());

    assert!(!link.overload_from_node("1").unwrap());
    assert!(link.is_up());

    assert!(link.set_metric_from_node("1", 7).unwrap());
    assert_eq!(link.metric_from_node("1").unwrap(), 7);

    assert!(link.set_overload_from_node("2", true).unwrap());
    assert!(!link.overload_from_node("1").unwrap());
    assert!(link.overload_from_node("2").unwrap());
    assert!(!link.is_up());

    // Equivalent links compare equal regardless of construction order.
    let reversed = Link::from_adjacencies(AREA, "2", &adj2, "1", &adj1);
    assert_eq!(link, reversed);
    assert_eq!(link.cmp(&reversed), std::cmp::Ordering::Equal);

    // A link between different endpoints is distinct.
    let adj3 = adjacency(1, 3, 0, 1);
    let adj3r = adjacency(3, 1, 0, 1);
    let other = Link::from_adjacencies(AREA, "1", &adj3, "3", &adj3r);
    assert_ne!(link, other);
    assert_ne!(link.cmp(&other), std::cmp::Ordering::Equal);
}

#[test]
fn test_lsdb_symmetry() {
    let mut state = LinkState::new(AREA);

    // A one-sided announcement derives no link.
    let change = state
        .update_adjacency_database(adj_db(1, 0, &[(2, 1)]), AREA)
        .unwrap();
    assert!(!change.topology_changed);
    assert!(change.added_links.is_empty());
    assert!(state.ordered_links_from_node("1").is_empty());

    // The reverse announcement completes the link.
    let change = state
        .update_adjacency_database(adj_db(2, 0, &[(1, 1)]), AREA)
        .unwrap();
    assert!(change.topology_changed);
    assert_eq!(change.added_links.len(), 1);
    assert_eq!(state.ordered_links_from_node("1").len(), 1);
    assert_eq!(state.ordered_links_from_node("2").len(), 1);

    // Removing either endpoint's database removes the link.
    let change = state.delete_adjacency_database("1");
    assert!(change.topology_changed);
    assert!(state.ordered_links_from_node("1").is_empty());
    assert!(state.ordered_links_from_node("2").is_empty());
    assert!(!state.has_node("1"));
    assert!(state.has_node("2"));
}

#[test]
fn test_link_state_basic() {
    let mut state = LinkState::new(AREA);
    assert_eq!(state.area(), AREA);

    // Area mismatch is a programming error.
    assert!(matches!(
        state.update_adjacency_database(adj_db(1, 0, &[]), "other-area"),
        Err(Error::AreaMismatch(..))
    ));

    let db1 = adj_db(1, 1, &[(2, 1), (3, 1)]);
    let db2 = adj_db(2, 2, &[(1, 1), (3, 1)]);
    let db3 = adj_db(3, 3, &[(1, 1), (2, 1)]);

    assert!(
        !state
            .update_adjacency_database(db1.clone(), AREA)
            .unwrap()
            .topology_changed
    );
    let change = state.update_adjacency_database(db2, AREA).unwrap();
    assert!(change.topology_changed);
    assert_eq!(change.added_links.len(), 1);
    let change = state.update_adjacency_database(db3, AREA).unwrap();
    assert!(change.topology_changed);
    assert_eq!(change.added_links.len(), 2);

    assert_eq!(state.ordered_links_from_node("1").len(), 2);
    assert_eq!(state.ordered_links_from_node("2").len(), 2);
    assert_eq!(state.ordered_links_from_node("3").len(), 2);
    assert!(state.ordered_links_from_node("4").is_empty());

    // Ingesting an identical database is a no-op.
    let change = state.update_adjacency_database(db1, AREA).unwrap();
    assert!(!change.topology_changed);
    assert!(!change.link_attributes_changed);
    assert!(change.added_links.is_empty());

    // Node overload toggles change the topology.
    assert!(!state.is_node_overloaded("1"));
    let mut db1 = adj_db(1, 1, &[(2, 1), (3, 1)]);
    db1.is_overloaded = true;
    assert!(
        state
            .update_adjacency_database(db1.clone(), AREA)
            .unwrap()
            .topology_changed
    );
    assert!(state.is_node_overloaded("1"));
    assert!(
        !state
            .update_adjacency_database(db1.clone(), AREA)
            .unwrap()
            .topology_changed
    );
    db1.is_overloaded = false;
    assert!(
        state
            .update_adjacency_database(db1, AREA)
            .unwrap()
            .topology_changed
    );
    assert!(!state.is_node_overloaded("1"));

    // Soft-drain value changes also change the topology.
    let mut db1 = adj_db(1, 1, &[(2, 1), (3, 1)]);
    db1.node_metric_increment_val = 100;
    assert!(
        state
            .update_adjacency_database(db1, AREA)
            .unwrap()
            .topology_changed
    );
    assert_eq!(state.get_node_metric_increment("1"), 100);

    // Node label changes are reported separately.
    let db1 = adj_db(1, 7, &[(2, 1), (3, 1)]);
    let change = state.update_adjacency_database(db1, AREA).unwrap();
    assert!(change.node_label_changed);

    // Withdrawing one adjacency drops one link.
    let db1 = adj_db(1, 7, &[(3, 1)]);
    let mut db1_partial = db1;
    db1_partial.node_metric_increment_val = 100;
    assert!(
        state
            .update_adjacency_database(db1_partial, AREA)
            .unwrap()
            .topology_changed
    );
    assert_eq!(state.ordered_links_from_node("1").len(), 1);
    assert_eq!(state.ordered_links_from_node("2").len(), 1);
    assert_eq!(state.ordered_links_from_node("3").len(), 2);
}

#[test]
fn test_triangle_spf() {
    let mut state = get_link_state(&[
        (1, &[(2, 10), (3, 5)]),
        (2, &[(1, 10), (3, 20)]),
        (3, &[(1, 5), (2, 20)]),
    ]);

    let spf = state.get_spf_result("1", true).unwrap();
    assert_eq!(spf["1"].metric, 0);
    assert_eq!(spf["2"].metric, 10);
    assert_eq!(spf["3"].metric, 5);
    assert!(spf["2"].next_hops.contains("2"));
    assert!(spf["3"].next_hops.contains("3"));

    // From node 2, node 3 is cheaper through node 1.
    let spf = state.get_spf_result("2", true).unwrap();
    assert_eq!(spf["3"].metric, 15);
    assert!(spf["3"].next_hops.contains("1"));

    // Hop-count metric ignores link costs.
    let spf = state.get_spf_result("2", false).unwrap();
    assert_eq!(spf["3"].metric, 1);

    assert_eq!(
        state.get_metric_from_a_to_b("2", "3", true).unwrap(),
        Some(15)
    );
    assert_eq!(
        state.get_metric_from_a_to_b("2", "2", true).unwrap(),
        Some(0)
    );
    assert_eq!(state.get_metric_from_a_to_b("2", "9", true).unwrap(), None);
}

#[test]
fn test_node_overload_holds() {
    let mut state = get_link_state(&[
        (1, &[(2, 10), (3, 5)]),
        (2, &[(1, 10), (3, 20)]),
        (3, &[(1, 5), (2, 20)]),
    ]);

    // Overloading applies immediately.
    assert!(state.update_node_overloaded("2", true, 10, 0));
    assert!(state.is_node_overloaded("2"));

    // Un-overloading is held back for the hold-up TTL.
    assert!(!state.update_node_overloaded("2", false, 10, 0));
    assert!(state.is_node_overloaded("2"));
    assert!(state.has_holds());
    for _ in 0..9 {
        assert!(!state.decrement_holds().topology_changed);
        assert!(state.is_node_overloaded("2"));
    }
    assert!(state.decrement_holds().topology_changed);
    assert!(!state.is_node_overloaded("2"));
    assert!(!state.has_holds());
}

#[test]
fn test_spf_overload_transit_suppression() {
    // 1 -- 2 -- 4, plus a detour 1 -- 3 -- 4 with higher cost.
    let mut state = get_link_state(&[
        (1, &[(2, 1), (3, 5)]),
        (2, &[(1, 1), (4, 1)]),
        (3, &[(1, 5), (4, 5)]),
        (4, &[(2, 1), (3, 5)]),
    ]);

    let spf = state.get_spf_result("1", true).unwrap();
    assert_eq!(spf["4"].metric, 2);

    // Overloading node 2 removes it as transit; node 2 itself stays
    // reachable.
    let mut db2 = adj_db(2, 0, &[(1, 1), (4, 1)]);
    db2.is_overloaded = true;
    assert!(
        state
            .update_adjacency_database(db2, AREA)
            .unwrap()
            .topology_changed
    );
    let spf = state.get_spf_result("1", true).unwrap();
    assert_eq!(spf["2"].metric, 1);
    assert_eq!(spf["4"].metric, 10);
    assert!(spf["4"].next_hops.contains("3"));
}

#[test]
fn test_cache_coherence() {
    let mut state = get_link_state(&[
        (1, &[(2, 10), (3, 5)]),
        (2, &[(1, 10), (3, 20)]),
        (3, &[(1, 5), (2, 20)]),
    ]);

    let spf = state.get_spf_result("1", true).unwrap();
    assert_eq!(spf["2"].metric, 10);

    // A metric change invalidates the cached result synchronously.
    let change = state
        .update_adjacency_database(adj_db(1, 0, &[(2, 2), (3, 5)]), AREA)
        .unwrap();
    assert!(change.topology_changed);
    let spf = state.get_spf_result("1", true).unwrap();
    assert_eq!(spf["2"].metric, 2);
}

#[test]
fn test_diamond_ksp() {
    //      10
    //   1------2
    //   |      |\
    //  5|   15 | | 35
    //   |      |/
    //   3------4
    //      20
    let mut state = get_link_state(&[
        (1, &[(2, 10), (3, 5)]),
        (2, &[(1, 10), (4, 15), (4, 35)]),
        (3, &[(1, 5), (4, 20)]),
        (4, &[(2, 15), (3, 20), (2, 35)]),
    ]);

    let first_paths = state.get_kth_paths("2", "4", 1).unwrap();
    assert_eq!(first_paths.len(), 1);
    assert_eq!(first_paths[0].len(), 1);
    assert_eq!(
        state.link(first_paths[0][0]).metric_from_node("2").unwrap(),
        15
    );

    let second_paths = state.get_kth_paths("2", "4", 2).unwrap();
    assert_eq!(second_paths.len(), 2);
    let mut sizes = second_paths.iter().map(Vec::len).collect::<Vec<_>>();
    sizes.sort();
    assert_eq!(sizes, vec![1, 3]);
    for path in second_paths.iter() {
        assert_eq!(path_metric(&state, "2", path), 35);
    }
}

#[test]
fn test_full_mesh_parallel_ksp() {
    // Full mesh of four nodes with two parallel unit-metric links per pair.
    let mut state = get_link_state(&[
        (1, &[(2, 1), (2, 1), (3, 1), (3, 1), (4, 1), (4, 1)]),
        (2, &[(1, 1), (1, 1), (3, 1), (3, 1), (4, 1), (4, 1)]),
        (3, &[(1, 1), (1, 1), (2, 1), (2, 1), (4, 1), (4, 1)]),
        (4, &[(1, 1), (1, 1), (2, 1), (2, 1), (3, 1), (3, 1)]),
    ]);

    let first_paths = state.get_kth_paths("2", "4", 1).unwrap();
    assert_eq!(first_paths.len(), 2);
    assert!(first_paths.iter().all(|path| path.len() == 1));

    let second_paths = state.get_kth_paths("2", "4", 2).unwrap();
    assert_eq!(second_paths.len(), 4);
    assert!(second_paths.iter().all(|path| path.len() == 2));

    // All level-1 and level-2 paths are mutually edge-disjoint.
    let mut used_links = HashSet::new();
    for path in first_paths.iter().chain(second_paths.iter()) {
        for link_idx in path {
            assert!(used_links.insert(*link_idx));
        }
    }
}

#[test]
fn test_path_a_in_path_b() {
    let mut state = get_link_state(&[
        (1, &[(2, 10), (3, 5)]),
        (2, &[(1, 10), (4, 15), (4, 35)]),
        (3, &[(1, 5), (4, 20)]),
        (4, &[(2, 15), (3, 20), (2, 35)]),
    ]);

    let first = state.get_kth_paths("2", "4", 1).unwrap()[0].clone();
    let second_paths = state.get_kth_paths("2", "4", 2).unwrap();

    // The empty path is contained in everything.
    assert!(LinkState::path_a_in_path_b(&Vec::new(), &first));
    assert!(LinkState::path_a_in_path_b(&first, &first));

    // Level-2 paths are edge-disjoint from the level-1 path.
    for path in second_paths.iter() {
        assert!(!LinkState::path_a_in_path_b(&first, path));
    }

    // A prefix of a path is contained in it, but not the other way around.
    let longer = second_paths
        .iter()
        .find(|path| path.len() == 3)
        .unwrap()
        .clone();
    let sub = longer[..2].to_vec();
    assert!(LinkState::path_a_in_path_b(&sub, &longer));
    assert!(!LinkState::path_a_in_path_b(&longer, &sub));
}

#[test]
fn test_ucmp_weights() {
    // w:2     w:1  w:1
    //  (4)    (5)  (6)
    //    \   /   /   /
    //     \ /   /   /
    //     ( 2 )/  (3)
    //       \     /
    //        \   /
    //        ( 1 )
    let topo: &[(u32, &[(u32, u64)])] = &[
        (1, &[(2, 1), (3, 1)]),
        (2, &[(1, 1), (4, 1), (5, 1), (6, 1)]),
        (3, &[(1, 1), (6, 1)]),
        (4, &[(2, 1)]),
        (5, &[(2, 1)]),
        (6, &[(2, 1), (3, 1)]),
    ];
    let leaf_weights = btreemap! {
        "4".to_owned() => 2,
        "5".to_owned() => 1,
        "6".to_owned() => 1,
    };

    // Adjacency weight propagation.
    let mut state = get_link_state(topo);
    let spf = state.get_spf_result("1", true).unwrap();
    let result = state
        .resolve_ucmp_weights(
            &spf,
            &leaf_weights,
            PrefixForwardingAlgorithm::SpUcmpAdjWeightPropagation,
            true,
        )
        .unwrap();
    assert_eq!(result.len(), 6);

    let node2 = &result["2"];
    assert_eq!(node2.weight, Some(3));
    assert_eq!(node2.next_hop_links["2/4/0"].weight, 2);
    assert_eq!(node2.next_hop_links["2/5/0"].weight, 1);
    assert_eq!(node2.next_hop_links["2/6/0"].weight, 1);

    let node3 = &result["3"];
    assert_eq!(node3.weight, Some(1));
    assert_eq!(node3.next_hop_links["3/6/0"].weight, 1);

    let node1 = &result["1"];
    assert_eq!(node1.weight, Some(2));
    assert_eq!(node1.next_hop_links["1/2/0"].weight, 3);
    assert_eq!(node1.next_hop_links["1/3/0"].weight, 1);

    // Prefix weight propagation.
    let result = state
        .resolve_ucmp_weights(
            &spf,
            &leaf_weights,
            PrefixForwardingAlgorithm::SpUcmpPrefixWeightPropagation,
            true,
        )
        .unwrap();

    let node2 = &result["2"];
    assert_eq!(node2.weight, Some(4));

    let node1 = &result["1"];
    assert_eq!(node1.weight, Some(5));
    assert_eq!(node1.next_hop_links["1/2/0"].weight, 4);
    assert_eq!(node1.next_hop_links["1/3/0"].weight, 1);

    // Leaves at different distances from the root abort the resolution.
    let unequal_weights = btreemap! {
        "2".to_owned() => 1,
        "4".to_owned() => 1,
    };
    let result = state
        .resolve_ucmp_weights(
            &spf,
            &unequal_weights,
            PrefixForwardingAlgorithm::SpUcmpAdjWeightPropagation,
            true,
        )
        .unwrap();
    assert!(result.is_empty());

    // Non-UCMP algorithms are rejected.
    assert!(matches!(
        state.resolve_ucmp_weights(
            &spf,
            &leaf_weights,
            PrefixForwardingAlgorithm::SpEcmp,
            true,
        ),
        Err(Error::UnsupportedUcmpAlgorithm(..))
    ));
}
