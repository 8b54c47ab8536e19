//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use ipnetwork::IpNetwork;

use spine_utils::counters;
use spine_utils::lsdb::{NodeAndArea, PrefixDatabase, PrefixEntry};

// All advertisements of one prefix, keyed by origin.
pub type PrefixEntries = BTreeMap<NodeAndArea, Arc<PrefixEntry>>;

/// Database of prefix advertisements across all areas.
#[derive(Debug, Default)]
pub struct PrefixState {
    prefixes: BTreeMap<IpNetwork, PrefixEntries>,
    // Prefixes advertised per origin, for database-granularity deletion.
    node_to_prefixes: BTreeMap<NodeAndArea, BTreeSet<IpNetwork>>,
}

// ===== impl PrefixState =====

impl PrefixState {
    pub fn prefixes(&self) -> &BTreeMap<IpNetwork, PrefixEntries> {
        &self.prefixes
    }

    // Replaces the set of prefixes advertised by one origin. Returns the
    // prefixes whose advertisement set changed.
    pub fn update_prefix_database(
        &mut self,
        prefix_db: &PrefixDatabase,
    ) -> BTreeSet<IpNetwork> {
        counters::inc("decision.prefix_db_update");
        let node_area: NodeAndArea =
            (prefix_db.this_node_name.clone(), prefix_db.area.clone());

        let mut changed = BTreeSet::new();
        let new_prefixes = prefix_db.entries_by_prefix();
        let old_prefixes = self
            .node_to_prefixes
            .remove(&node_area)
            .unwrap_or_default();

        // Withdraw prefixes no longer advertised by this origin.
        for prefix in &old_prefixes {
            if !new_prefixes.contains_key(prefix) {
                self.remove_entry(prefix, &node_area);
                changed.insert(*prefix);
            }
        }

        // Add or update the advertised prefixes.
        for (prefix, entry) in new_prefixes {
            let entries = self.prefixes.entry(prefix).or_default();
            let updated = match entries.get(&node_area) {
                Some(old_entry) => **old_entry != entry,
                None => true,
            };
            if updated {
                entries.insert(node_area.clone(), Arc::new(entry));
                changed.insert(prefix);
            }
            self.node_to_prefixes
                .entry(node_area.clone())
                .or_default()
                .insert(prefix);
        }

        changed
    }

    // Withdraws every prefix advertised by one origin. Returns the affected
    // prefixes.
    pub fn delete_prefix_database(
        &mut self,
        node_name: &str,
        area: &str,
    ) -> BTreeSet<IpNetwork> {
        let node_area: NodeAndArea = (node_name.to_owned(), area.to_owned());
        let prefixes =
            self.node_to_prefixes.remove(&node_area).unwrap_or_default();
        for prefix in &prefixes {
            self.remove_entry(prefix, &node_area);
        }
        prefixes
    }

    fn remove_entry(&mut self, prefix: &IpNetwork, node_area: &NodeAndArea) {
        if let Some(entries) = self.prefixes.get_mut(prefix) {
            entries.remove(node_area);
            if entries.is_empty() {
                self.prefixes.remove(prefix);
            }
        }
    }
}
