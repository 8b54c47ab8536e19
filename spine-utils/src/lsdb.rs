//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use derive_new::new;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

// (node name, area) pair identifying a prefix advertisement origin.
pub type NodeAndArea = (String, String);

// One direction of an adjacency, as announced by a node.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Adjacency {
    pub other_node_name: String,
    pub if_name: String,
    pub other_if_name: String,
    pub next_hop_v4: Ipv4Addr,
    pub next_hop_v6: Ipv6Addr,
    pub metric: u64,
    pub adj_label: u32,
    pub weight: i64,
    pub is_overloaded: bool,
    // Measured round-trip time to the neighbor, in microseconds.
    pub rtt: i64,
    // Time the adjacency was established, in seconds since the epoch.
    pub timestamp: i64,
}

// Full set of adjacencies announced by a node in one area.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct AdjacencyDatabase {
    pub this_node_name: String,
    pub area: String,
    pub is_overloaded: bool,
    pub node_label: u32,
    // Additive metric applied to paths transiting this node (soft drain).
    pub node_metric_increment_val: u64,
    pub adjacencies: Vec<Adjacency>,
}

// Per-origin attributes of an advertised prefix.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PrefixEntry {
    pub prefix: IpNetwork,
    pub metrics: PrefixMetrics,
    // Minimum number of next-hops required to program the route.
    pub min_nexthop: Option<usize>,
    pub forwarding_type: PrefixForwardingType,
    pub forwarding_algorithm: PrefixForwardingAlgorithm,
    // Opaque attributes carried along with the prefix.
    pub tags: Vec<String>,
}

// Route selection metrics, compared in field order: drained origins lose,
// then higher path/source preference wins, then lower distance wins.
#[derive(Clone, Debug, Eq, PartialEq, new)]
#[derive(Deserialize, Serialize)]
pub struct PrefixMetrics {
    pub drain_metric: u64,
    pub path_preference: u64,
    pub source_preference: u64,
    pub distance: u64,
}

// Full set of prefixes advertised by a node in one area.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PrefixDatabase {
    pub this_node_name: String,
    pub area: String,
    pub prefix_entries: Vec<PrefixEntry>,
}

// How traffic toward a prefix is encapsulated.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum PrefixForwardingType {
    Ip,
    SrMpls,
}

// How next-hops toward a prefix are computed.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum PrefixForwardingAlgorithm {
    SpEcmp,
    SpUcmpAdjWeightPropagation,
    SpUcmpPrefixWeightPropagation,
    Ksp2EdEcmp,
}

// ===== impl Adjacency =====

impl Adjacency {
    pub fn new(
        other_node_name: &str,
        if_name: &str,
        other_if_name: &str,
        next_hop_v4: Ipv4Addr,
        next_hop_v6: Ipv6Addr,
        metric: u64,
        adj_label: u32,
        weight: i64,
    ) -> Adjacency {
        Adjacency {
            other_node_name: other_node_name.to_owned(),
            if_name: if_name.to_owned(),
            other_if_name: other_if_name.to_owned(),
            next_hop_v4,
            next_hop_v6,
            metric,
            adj_label,
            weight,
            is_overloaded: false,
            rtt: 0,
            timestamp: 0,
        }
    }
}

// ===== impl AdjacencyDatabase =====

impl AdjacencyDatabase {
    pub fn new(
        this_node_name: &str,
        area: &str,
        node_label: u32,
        adjacencies: Vec<Adjacency>,
    ) -> AdjacencyDatabase {
        AdjacencyDatabase {
            this_node_name: this_node_name.to_owned(),
            area: area.to_owned(),
            is_overloaded: false,
            node_label,
            node_metric_increment_val: 0,
            adjacencies,
        }
    }
}

// ===== impl PrefixEntry =====

impl PrefixEntry {
    pub fn new(prefix: IpNetwork) -> PrefixEntry {
        PrefixEntry {
            prefix,
            metrics: PrefixMetrics::default(),
            min_nexthop: None,
            forwarding_type: PrefixForwardingType::Ip,
            forwarding_algorithm: PrefixForwardingAlgorithm::SpEcmp,
            tags: Vec::new(),
        }
    }
}

impl Default for PrefixMetrics {
    fn default() -> PrefixMetrics {
        PrefixMetrics {
            drain_metric: 0,
            path_preference: 1000,
            source_preference: 100,
            distance: 0,
        }
    }
}

// ===== impl PrefixDatabase =====

impl PrefixDatabase {
    pub fn new(
        this_node_name: &str,
        area: &str,
        prefix_entries: Vec<PrefixEntry>,
    ) -> PrefixDatabase {
        PrefixDatabase {
            this_node_name: this_node_name.to_owned(),
            area: area.to_owned(),
            prefix_entries,
        }
    }

    // Returns the entries keyed by prefix.
    pub fn entries_by_prefix(&self) -> BTreeMap<IpNetwork, PrefixEntry> {
        self.prefix_entries
            .iter()
            .map(|entry| (entry.prefix, entry.clone()))
            .collect()
    }
}
