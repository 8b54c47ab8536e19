//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod common;

use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr};

use maplit::btreemap;

use spine_decision::link_state::LinkState;
use spine_decision::prefix_state::PrefixState;
use spine_decision::rib::{DecisionRouteDb, RibUnicastEntry};
use spine_decision::spf_solver::SpfSolver;
use spine_utils::lsdb::{
    PrefixDatabase, PrefixEntry, PrefixForwardingAlgorithm,
    PrefixForwardingType,
};
use spine_utils::mpls::Label;
use spine_utils::southbound::{LabelAction, NextHop};

use common::{
    AREA, adj_db, adj_db_in_area, get_link_state, get_link_state_with_labels,
    prefix_entry, v4_prefix,
};

const TRIANGLE: &[(u32, &[(u32, u64)])] = &[
    (1, &[(2, 10), (3, 5)]),
    (2, &[(1, 10), (3, 20)]),
    (3, &[(1, 5), (2, 20)]),
];

fn solver(my_node_name: &str) -> SpfSolver {
    SpfSolver::new(my_node_name, true, false, false, true, false)
}

fn advertise(
    prefix_state: &mut PrefixState,
    node: &str,
    area: &str,
    entries: Vec<PrefixEntry>,
) {
    prefix_state
        .update_prefix_database(&PrefixDatabase::new(node, area, entries));
}

#[test]
fn test_build_route_basic() {
    let mut area_link_states =
        btreemap! { AREA.to_owned() => get_link_state(TRIANGLE) };
    let mut prefix_state = PrefixState::default();
    let prefix = v4_prefix("10.100.0.0/24");
    advertise(&mut prefix_state, "3", AREA, vec![prefix_entry(prefix)]);

    let mut solver = solver("1");
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();

    let route = &route_db.unicast_routes[&prefix];
    assert_eq!(route.igp_cost, 5);
    assert_eq!(route.best_area, AREA);
    assert_eq!(route.nexthops.len(), 1);
    let nexthop = route.nexthops.iter().next().unwrap();
    assert_eq!(nexthop.neighbor_node_name, "3");
    assert_eq!(nexthop.ifname, "1/3/0");
    assert_eq!(nexthop.metric, 5);
    assert_eq!(nexthop.address, IpAddr::V4(Ipv4Addr::new(10, 1, 3, 1)));
    assert!(nexthop.label_action.is_none());
}

#[test]
fn test_unknown_local_node() {
    // A node absent from every area's topology produces no RIB.
    let mut area_link_states =
        btreemap! { AREA.to_owned() => get_link_state(TRIANGLE) };
    let prefix_state = PrefixState::default();
    let mut solver = solver("99");
    assert!(
        solver
            .build_route_db(&mut area_link_states, &prefix_state)
            .unwrap()
            .is_none()
    );
}

#[test]
fn test_drain_filtering() {
    let mut area_link_states =
        btreemap! { AREA.to_owned() => get_link_state(TRIANGLE) };
    let mut prefix_state = PrefixState::default();
    let prefix = v4_prefix("10.100.0.0/24");
    advertise(&mut prefix_state, "2", AREA, vec![prefix_entry(prefix)]);
    advertise(&mut prefix_state, "3", AREA, vec![prefix_entry(prefix)]);

    let mut solver = solver("1");

    // Both origins are healthy: the closer one wins path selection.
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    let route = &route_db.unicast_routes[&prefix];
    assert_eq!(route.igp_cost, 5);
    assert_eq!(route.best_prefix_entry.metrics.drain_metric, 0);

    // Hard-draining node 3 excludes it from selection.
    let mut db3 = adj_db(3, 0, &[(1, 5), (2, 20)]);
    db3.is_overloaded = true;
    area_link_states
        .get_mut(AREA)
        .unwrap()
        .update_adjacency_database(db3, AREA)
        .unwrap();
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    let route = &route_db.unicast_routes[&prefix];
    assert_eq!(route.igp_cost, 10);
    assert!(
        route
            .nexthops
            .iter()
            .all(|nexthop| nexthop.neighbor_node_name == "2")
    );

    // With every origin hard-drained, all are kept and the route is
    // stamped with the drain metric.
    let mut db2 = adj_db(2, 0, &[(1, 10), (3, 20)]);
    db2.is_overloaded = true;
    area_link_states
        .get_mut(AREA)
        .unwrap()
        .update_adjacency_database(db2, AREA)
        .unwrap();
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    let route = &route_db.unicast_routes[&prefix];
    assert_eq!(route.igp_cost, 5);
    assert_eq!(route.best_prefix_entry.metrics.drain_metric, 1);
}

#[test]
fn test_soft_drain_filtering() {
    let mut area_link_states =
        btreemap! { AREA.to_owned() => get_link_state(TRIANGLE) };
    let mut prefix_state = PrefixState::default();
    let prefix = v4_prefix("10.100.0.0/24");
    advertise(&mut prefix_state, "2", AREA, vec![prefix_entry(prefix)]);
    advertise(&mut prefix_state, "3", AREA, vec![prefix_entry(prefix)]);

    // Soft-draining node 3 prefers the undrained origin.
    let mut db3 = adj_db(3, 0, &[(1, 5), (2, 20)]);
    db3.node_metric_increment_val = 50;
    area_link_states
        .get_mut(AREA)
        .unwrap()
        .update_adjacency_database(db3, AREA)
        .unwrap();

    let mut solver = solver("1");
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    let route = &route_db.unicast_routes[&prefix];
    assert_eq!(route.igp_cost, 10);
    assert!(
        route
            .nexthops
            .iter()
            .all(|nexthop| nexthop.neighbor_node_name == "2")
    );
}

#[test]
fn test_local_prefix_skipped() {
    let mut area_link_states =
        btreemap! { AREA.to_owned() => get_link_state(TRIANGLE) };
    let mut prefix_state = PrefixState::default();
    let prefix = v4_prefix("10.100.0.0/24");
    advertise(&mut prefix_state, "1", AREA, vec![prefix_entry(prefix)]);
    advertise(&mut prefix_state, "3", AREA, vec![prefix_entry(prefix)]);

    // The local node is among the best origins: no route is programmed.
    let mut solver = solver("1");
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    assert!(route_db.unicast_routes.is_empty());
}

#[test]
fn test_min_nexthop_requirement() {
    let mut area_link_states =
        btreemap! { AREA.to_owned() => get_link_state(TRIANGLE) };
    let mut prefix_state = PrefixState::default();
    let prefix = v4_prefix("10.100.0.0/24");
    let mut entry = prefix_entry(prefix);
    entry.min_nexthop = Some(2);
    advertise(&mut prefix_state, "3", AREA, vec![entry]);

    let mut solver = solver("1");
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    assert!(route_db.unicast_routes.is_empty());
}

#[test]
fn test_multi_area_shortest_metric() {
    // Area A reaches the prefix at cost 10, area B at cost 5. Only area
    // B's next-hops survive the merge.
    let area_a = {
        let mut state = LinkState::new("A");
        state
            .update_adjacency_database(adj_db_in_area(1, 2, 10, "A"), "A")
            .unwrap();
        state
            .update_adjacency_database(adj_db_in_area(2, 1, 10, "A"), "A")
            .unwrap();
        state
    };
    let area_b = {
        let mut state = LinkState::new("B");
        state
            .update_adjacency_database(adj_db_in_area(1, 3, 5, "B"), "B")
            .unwrap();
        state
            .update_adjacency_database(adj_db_in_area(3, 1, 5, "B"), "B")
            .unwrap();
        state
    };
    let mut area_link_states = btreemap! {
        "A".to_owned() => area_a,
        "B".to_owned() => area_b,
    };

    let mut prefix_state = PrefixState::default();
    let prefix = v4_prefix("10.100.0.0/24");
    advertise(&mut prefix_state, "2", "A", vec![prefix_entry(prefix)]);
    advertise(&mut prefix_state, "3", "B", vec![prefix_entry(prefix)]);

    let mut solver = solver("1");
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    let route = &route_db.unicast_routes[&prefix];
    assert_eq!(route.igp_cost, 5);
    assert_eq!(route.nexthops.len(), 1);
    let nexthop = route.nexthops.iter().next().unwrap();
    assert_eq!(nexthop.neighbor_node_name, "3");
    assert_eq!(nexthop.area, "B");
}

#[test]
fn test_ksp2_routes() {
    //      10
    //   1------2
    //   |      |\
    //  5|   15 | | 35
    //   |      |/
    //   3------4
    //      20
    let mut area_link_states = btreemap! {
        AREA.to_owned() => get_link_state_with_labels(&[
            (1, &[(2, 10), (3, 5)]),
            (2, &[(1, 10), (4, 15), (4, 35)]),
            (3, &[(1, 5), (4, 20)]),
            (4, &[(2, 15), (3, 20), (2, 35)]),
        ]),
    };

    let mut prefix_state = PrefixState::default();
    let prefix = v4_prefix("10.100.0.0/24");
    let mut entry = prefix_entry(prefix);
    entry.forwarding_type = PrefixForwardingType::SrMpls;
    entry.forwarding_algorithm = PrefixForwardingAlgorithm::Ksp2EdEcmp;
    advertise(&mut prefix_state, "4", AREA, vec![entry]);

    let mut solver = solver("2");
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    let route = &route_db.unicast_routes[&prefix];

    // One shortest path (2-4 at 15) plus two second-shortest paths, both
    // at 35: the parallel 2-4 link and 2-1-3-4.
    assert_eq!(route.nexthops.len(), 3);
    let mut costs =
        route.nexthops.iter().map(|nh| nh.metric).collect::<Vec<_>>();
    costs.sort();
    assert_eq!(costs, vec![15, 35, 35]);

    // The multi-hop path pushes the label stack of the traversed nodes,
    // excluding the first hop to respect PHP.
    let pushed = route
        .nexthops
        .iter()
        .find(|nh| nh.neighbor_node_name == "1")
        .unwrap();
    assert_eq!(pushed.metric, 35);
    assert_eq!(
        pushed.label_action,
        Some(LabelAction::Push(vec![Label::new(104), Label::new(103)]))
    );

    // Single-hop paths carry no label stack.
    for nexthop in route
        .nexthops
        .iter()
        .filter(|nh| nh.neighbor_node_name == "4")
    {
        assert!(nexthop.label_action.is_none());
    }
}

#[test]
fn test_ksp2_requires_sr_mpls() {
    let mut area_link_states = btreemap! {
        AREA.to_owned() => get_link_state_with_labels(&[
            (1, &[(2, 10), (3, 5)]),
            (2, &[(1, 10), (3, 20)]),
            (3, &[(1, 5), (2, 20)]),
        ]),
    };

    let mut prefix_state = PrefixState::default();
    let prefix = v4_prefix("10.100.0.0/24");
    let mut entry = prefix_entry(prefix);
    entry.forwarding_type = PrefixForwardingType::Ip;
    entry.forwarding_algorithm = PrefixForwardingAlgorithm::Ksp2EdEcmp;
    advertise(&mut prefix_state, "3", AREA, vec![entry]);

    let mut solver = solver("1");
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    assert!(route_db.unicast_routes.is_empty());
}

#[test]
fn test_node_segment_labels() {
    // Triangle plus a leaf on node 2, so reaching node 4's label requires
    // a SWAP through node 2.
    let mut area_link_states = btreemap! {
        AREA.to_owned() => get_link_state_with_labels(&[
            (1, &[(2, 10), (3, 5)]),
            (2, &[(1, 10), (3, 20), (4, 1)]),
            (3, &[(1, 5), (2, 20)]),
            (4, &[(2, 1)]),
        ]),
    };
    let prefix_state = PrefixState::default();

    let mut solver = SpfSolver::new("1", true, true, false, true, false);
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();

    // The local node's label pops and looks up the next layer.
    let own = &route_db.mpls_routes[&Label::new(101)];
    assert_eq!(own.nexthops.len(), 1);
    assert_eq!(
        own.nexthops.iter().next().unwrap().label_action,
        Some(LabelAction::PopAndLookup)
    );

    // Directly adjacent destinations are reached with PHP.
    let adjacent = &route_db.mpls_routes[&Label::new(103)];
    let nexthop = adjacent.nexthops.iter().next().unwrap();
    assert_eq!(nexthop.neighbor_node_name, "3");
    assert_eq!(nexthop.label_action, Some(LabelAction::Php));

    // Transit destinations are reached with SWAP.
    let transit = &route_db.mpls_routes[&Label::new(104)];
    let nexthop = transit.nexthops.iter().next().unwrap();
    assert_eq!(nexthop.neighbor_node_name, "2");
    assert_eq!(nexthop.label_action, Some(LabelAction::Swap(Label::new(104))));
}

#[test]
fn test_duplicate_node_labels() {
    // Nodes 2 and 3 both claim label 150; the larger node name wins.
    let mut state = LinkState::new(AREA);
    state
        .update_adjacency_database(adj_db(1, 101, &[(2, 10), (3, 5)]), AREA)
        .unwrap();
    state
        .update_adjacency_database(adj_db(2, 150, &[(1, 10)]), AREA)
        .unwrap();
    state
        .update_adjacency_database(adj_db(3, 150, &[(1, 5)]), AREA)
        .unwrap();
    let mut area_link_states = btreemap! { AREA.to_owned() => state };
    let prefix_state = PrefixState::default();

    let mut solver = SpfSolver::new("1", true, true, false, true, false);
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();

    let route = &route_db.mpls_routes[&Label::new(150)];
    let nexthop = route.nexthops.iter().next().unwrap();
    assert_eq!(nexthop.neighbor_node_name, "3");
}

#[test]
fn test_adjacency_labels() {
    let mut state = LinkState::new(AREA);
    let mut db1 = adj_db(1, 0, &[(2, 10), (3, 5)]);
    db1.adjacencies[0].adj_label = 201;
    db1.adjacencies[1].adj_label = 202;
    state.update_adjacency_database(db1, AREA).unwrap();
    state
        .update_adjacency_database(adj_db(2, 0, &[(1, 10), (3, 20)]), AREA)
        .unwrap();
    state
        .update_adjacency_database(adj_db(3, 0, &[(1, 5), (2, 20)]), AREA)
        .unwrap();
    let mut area_link_states = btreemap! { AREA.to_owned() => state };
    let prefix_state = PrefixState::default();

    let mut solver = SpfSolver::new("1", true, false, true, true, false);
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();

    assert_eq!(route_db.mpls_routes.len(), 2);
    let route = &route_db.mpls_routes[&Label::new(201)];
    let nexthop = route.nexthops.iter().next().unwrap();
    assert_eq!(nexthop.neighbor_node_name, "2");
    assert_eq!(nexthop.ifname, "1/2/0");
    assert_eq!(nexthop.label_action, Some(LabelAction::Php));
}

#[test]
fn test_static_unicast_routes() {
    let mut area_link_states =
        btreemap! { AREA.to_owned() => get_link_state(TRIANGLE) };
    let mut prefix_state = PrefixState::default();
    let advertised_prefix = v4_prefix("10.100.0.0/24");
    advertise(
        &mut prefix_state,
        "3",
        AREA,
        vec![prefix_entry(advertised_prefix)],
    );

    let static_prefix = v4_prefix("10.200.0.0/24");
    let static_nexthop = NextHop::new(
        IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
        "static0".to_owned(),
        0,
        None,
        AREA.to_owned(),
        "gateway".to_owned(),
    );
    let mut solver = solver("1");
    solver.update_static_unicast_routes(
        btreemap! {
            static_prefix => RibUnicastEntry::new(
                static_prefix,
                BTreeSet::from([static_nexthop.clone()]),
                prefix_entry(static_prefix),
                AREA.to_owned(),
                0,
                false,
            ),
            advertised_prefix => RibUnicastEntry::new(
                advertised_prefix,
                BTreeSet::from([static_nexthop]),
                prefix_entry(advertised_prefix),
                AREA.to_owned(),
                0,
                false,
            ),
        },
        vec![],
    );

    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();

    // The purely static prefix is installed as-is.
    let static_route = &route_db.unicast_routes[&static_prefix];
    assert_eq!(
        static_route.nexthops.iter().next().unwrap().neighbor_node_name,
        "gateway"
    );

    // The advertised prefix shadows its static counterpart.
    let advertised_route = &route_db.unicast_routes[&advertised_prefix];
    assert_eq!(
        advertised_route
            .nexthops
            .iter()
            .next()
            .unwrap()
            .neighbor_node_name,
        "3"
    );

    // Deleting the static route removes it from the next build.
    solver.update_static_unicast_routes(BTreeMap::new(), vec![static_prefix]);
    let route_db = solver
        .build_route_db(&mut area_link_states, &prefix_state)
        .unwrap()
        .unwrap();
    assert!(!route_db.unicast_routes.contains_key(&static_prefix));
}

#[test]
fn test_route_db_diff() {
    let prefix_a = v4_prefix("10.100.0.0/24");
    let prefix_b = v4_prefix("10.101.0.0/24");
    let nexthop = |name: &str| {
        NextHop::new(
            IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            "eth0".to_owned(),
            1,
            None,
            AREA.to_owned(),
            name.to_owned(),
        )
    };
    let entry = |prefix, nh: NextHop| {
        RibUnicastEntry::new(
            prefix,
            BTreeSet::from([nh]),
            prefix_entry(prefix),
            AREA.to_owned(),
            1,
            false,
        )
    };

    let mut old_db = DecisionRouteDb::default();
    old_db.add_unicast_route(entry(prefix_a, nexthop("x")));

    let mut new_db = DecisionRouteDb::default();
    new_db.add_unicast_route(entry(prefix_a, nexthop("y")));
    new_db.add_unicast_route(entry(prefix_b, nexthop("z")));

    // Changed and added routes are reported as updates.
    let delta = old_db.calculate_update(&new_db);
    assert_eq!(delta.unicast_routes_to_update.len(), 2);
    assert!(delta.unicast_routes_to_delete.is_empty());

    // Applying the delta reproduces the new snapshot.
    old_db.update(&delta);
    assert_eq!(old_db.unicast_routes, new_db.unicast_routes);

    // Unchanged snapshots produce an empty delta.
    let delta = old_db.calculate_update(&new_db);
    assert!(delta.is_empty());

    // Withdrawn routes are reported as deletions.
    let empty_db = DecisionRouteDb::default();
    let delta = old_db.calculate_update(&empty_db);
    assert!(delta.unicast_routes_to_update.is_empty());
    assert_eq!(
        delta.unicast_routes_to_delete,
        vec![prefix_a, prefix_b]
    );
}
