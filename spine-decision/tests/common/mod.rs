//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;

use spine_decision::link_state::{LinkState, Path};
use spine_utils::lsdb::{Adjacency, AdjacencyDatabase, PrefixEntry};

pub const AREA: &str = "area1";

// Builds the adjacency announced by `node` toward `other` over the
// `index`-th parallel link between them. Interfaces are named
// "<node>/<other>/<index>" on each side.
pub fn adjacency(node: u32, other: u32, index: usize, metric: u64) -> Adjacency {
    Adjacency::new(
        &other.to_string(),
        &format!("{}/{}/{}", node, other, index),
        &format!("{}/{}/{}", other, node, index),
        Ipv4Addr::new(10, node as u8, other as u8, index as u8 + 1),
        Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, node as u16, other as u16),
        metric,
        0,
        1,
    )
}

// Builds a node's adjacency database out of (neighbor, metric) pairs.
// Repeated neighbors produce parallel links.
pub fn adj_db(node: u32, node_label: u32, adjs: &[(u32, u64)]) -> AdjacencyDatabase {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    let adjacencies = adjs
        .iter()
        .map(|(other, metric)| {
            let index = counts.entry(*other).or_insert(0);
            let adj = adjacency(node, *other, *index, *metric);
            *index += 1;
            adj
        })
        .collect();
    AdjacencyDatabase::new(&node.to_string(), AREA, node_label, adjacencies)
}

// Builds a link-state database from a topology description.
pub fn get_link_state(topo: &[(u32, &[(u32, u64)])]) -> LinkState {
    let mut link_state = LinkState::new(AREA);
    for (node, adjs) in topo {
        link_state
            .update_adjacency_database(adj_db(*node, 0, adjs), AREA)
            .unwrap();
    }
    link_state
}

// Same, but every node carries a node segment label of (100 + node).
pub fn get_link_state_with_labels(topo: &[(u32, &[(u32, u64)])]) -> LinkState {
    let mut link_state = LinkState::new(AREA);
    for (node, adjs) in topo {
        link_state
            .update_adjacency_database(adj_db(*node, 100 + node, adjs), AREA)
            .unwrap();
    }
    link_state
}

// Builds a single-adjacency database in an arbitrary area, for multi-area
// topologies.
pub fn adj_db_in_area(
    node: u32,
    other: u32,
    metric: u64,
    area: &str,
) -> AdjacencyDatabase {
    AdjacencyDatabase::new(
        &node.to_string(),
        area,
        0,
        vec![adjacency(node, other, 0, metric)],
    )
}

// Total metric of a path walked from `src`.
pub fn path_metric(link_state: &LinkState, src: &str, path: &Path) -> u64 {
    let mut node = src.to_owned();
    let mut metric = 0;
    for link_idx in path {
        let link = link_state.link(*link_idx);
        metric += link.metric_from_node(&node).unwrap();
        node = link.other_node_name(&node).unwrap().to_owned();
    }
    metric
}

pub fn v4_prefix(prefix: &str) -> IpNetwork {
    prefix.parse().unwrap()
}

pub fn prefix_entry(prefix: IpNetwork) -> PrefixEntry {
    PrefixEntry::new(prefix)
}
