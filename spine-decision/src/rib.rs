//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};

use derive_new::new;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use spine_utils::lsdb::PrefixEntry;
use spine_utils::mpls::Label;
use spine_utils::southbound::NextHop;

// Unicast routing table entry.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RibUnicastEntry {
    pub prefix: IpNetwork,
    pub nexthops: BTreeSet<NextHop>,
    // Attributes of the winning advertisement.
    pub best_prefix_entry: PrefixEntry,
    pub best_area: String,
    // Shortest IGP metric toward the best origins.
    pub igp_cost: u64,
    // Whether a local advertisement of this prefix took part in selection.
    pub local_prefix_considered: bool,
}

// MPLS routing table entry.
#[derive(Clone, Debug, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct RibMplsEntry {
    pub label: Label,
    pub nexthops: BTreeSet<NextHop>,
}

// Snapshot of the node's computed routing tables.
#[derive(Debug, Default)]
pub struct DecisionRouteDb {
    pub unicast_routes: BTreeMap<IpNetwork, RibUnicastEntry>,
    pub mpls_routes: BTreeMap<Label, RibMplsEntry>,
}

// Incremental difference between two route database snapshots.
#[derive(Debug, Default)]
pub struct DecisionRouteUpdate {
    pub unicast_routes_to_update: BTreeMap<IpNetwork, RibUnicastEntry>,
    pub unicast_routes_to_delete: Vec<IpNetwork>,
    pub mpls_routes_to_update: BTreeMap<Label, RibMplsEntry>,
    pub mpls_routes_to_delete: Vec<Label>,
}

// ===== impl DecisionRouteDb =====

impl DecisionRouteDb {
    pub fn add_unicast_route(&mut self, entry: RibUnicastEntry) {
        self.unicast_routes.insert(entry.prefix, entry);
    }

    pub fn add_mpls_route(&mut self, entry: RibMplsEntry) {
        self.mpls_routes.insert(entry.label, entry);
    }

    // Computes the delta turning this snapshot into `new_db`: entries
    // present in `new_db` that are new or changed, and keys absent from
    // `new_db`.
    pub fn calculate_update(
        &self,
        new_db: &DecisionRouteDb,
    ) -> DecisionRouteUpdate {
        let mut delta = DecisionRouteUpdate::default();

        for (prefix, entry) in &new_db.unicast_routes {
            match self.unicast_routes.get(prefix) {
                Some(old_entry) if old_entry == entry => (),
                _ => {
                    delta
                        .unicast_routes_to_update
                        .insert(*prefix, entry.clone());
                }
            }
        }
        for prefix in self.unicast_routes.keys() {
            if !new_db.unicast_routes.contains_key(prefix) {
                delta.unicast_routes_to_delete.push(*prefix);
            }
        }

        for (label, entry) in &new_db.mpls_routes {
            match self.mpls_routes.get(label) {
                Some(old_entry) if old_entry == entry => (),
                _ => {
                    delta.mpls_routes_to_update.insert(*label, entry.clone());
                }
            }
        }
        for label in self.mpls_routes.keys() {
            if !new_db.mpls_routes.contains_key(label) {
                delta.mpls_routes_to_delete.push(*label);
            }
        }

        delta
    }

    // Applies a previously computed delta.
    pub fn update(&mut self, delta: &DecisionRouteUpdate) {
        for prefix in &delta.unicast_routes_to_delete {
            self.unicast_routes.remove(prefix);
        }
        for (prefix, entry) in &delta.unicast_routes_to_update {
            self.unicast_routes.insert(*prefix, entry.clone());
        }
        for label in &delta.mpls_routes_to_delete {
            self.mpls_routes.remove(label);
        }
        for (label, entry) in &delta.mpls_routes_to_update {
            self.mpls_routes.insert(*label, entry.clone());
        }
    }
}

// ===== impl DecisionRouteUpdate =====

impl DecisionRouteUpdate {
    pub fn is_empty(&self) -> bool {
        self.unicast_routes_to_update.is_empty()
            && self.unicast_routes_to_delete.is_empty()
            && self.mpls_routes_to_update.is_empty()
            && self.mpls_routes_to_delete.is_empty()
    }
}
