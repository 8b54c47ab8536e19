//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeMap;

use ipnetwork::IpNetwork;
use tracing::warn;

use spine_utils::kv::Publication;
use spine_utils::lsdb::{AdjacencyDatabase, PrefixDatabase};

use crate::error::Error;
use crate::link_state::LinkState;
use crate::prefix_state::PrefixState;
use crate::rib::{DecisionRouteDb, DecisionRouteUpdate, RibUnicastEntry};
use crate::spf_solver::SpfSolver;

// Marker prefixes of the KV store keys carrying LSDB information.
pub const ADJ_DB_MARKER: &str = "adj:";
pub const PREFIX_DB_MARKER: &str = "prefix:";

#[derive(Clone, Debug)]
pub struct DecisionConfig {
    pub my_node_name: String,
    pub enable_v4: bool,
    pub enable_node_segment_label: bool,
    pub enable_adjacency_labels: bool,
    pub enable_best_route_selection: bool,
    pub v4_over_v6_nexthop: bool,
}

/// Route decision unit.
///
/// Consumes KV store publications carrying adjacency and prefix databases,
/// maintains the per-area link-state databases and the prefix database, and
/// rebuilds the node's RIB on demand, reporting incremental diffs.
#[derive(Debug)]
pub struct Decision {
    config: DecisionConfig,
    spf_solver: SpfSolver,
    area_link_states: BTreeMap<String, LinkState>,
    prefix_state: PrefixState,
    route_db: DecisionRouteDb,
}

// ===== impl DecisionConfig =====

impl DecisionConfig {
    pub fn new(my_node_name: &str) -> DecisionConfig {
        DecisionConfig {
            my_node_name: my_node_name.to_owned(),
            enable_v4: true,
            enable_node_segment_label: false,
            enable_adjacency_labels: false,
            enable_best_route_selection: true,
            v4_over_v6_nexthop: false,
        }
    }
}

// ===== impl Decision =====

impl Decision {
    pub fn new(config: DecisionConfig) -> Decision {
        let spf_solver = SpfSolver::new(
            &config.my_node_name,
            config.enable_v4,
            config.enable_node_segment_label,
            config.enable_adjacency_labels,
            config.enable_best_route_selection,
            config.v4_over_v6_nexthop,
        );
        Decision {
            config,
            spf_solver,
            area_link_states: Default::default(),
            prefix_state: Default::default(),
            route_db: Default::default(),
        }
    }

    pub fn link_state(&self, area: &str) -> Option<&LinkState> {
        self.area_link_states.get(area)
    }

    pub fn prefix_state(&self) -> &PrefixState {
        &self.prefix_state
    }

    pub fn route_db(&self) -> &DecisionRouteDb {
        &self.route_db
    }

    pub fn update_static_unicast_routes(
        &mut self,
        routes_to_update: BTreeMap<IpNetwork, RibUnicastEntry>,
        routes_to_delete: Vec<IpNetwork>,
    ) {
        self.spf_solver
            .update_static_unicast_routes(routes_to_update, routes_to_delete);
    }

    // Applies one KV store publication to the LSDB and prefix state.
    // Returns whether anything changed that warrants a RIB rebuild.
    //
    // A single malformed payload never aborts processing of the rest.
    pub fn process_publication(
        &mut self,
        publication: &Publication,
    ) -> Result<bool, Error> {
        let mut changed = false;
        let area = publication.area.as_str();

        for (key, value) in &publication.key_vals {
            // TTL refreshes carry no payload and no state change.
            let Some(payload) = &value.value else {
                continue;
            };

            if let Some(node_name) = key.strip_prefix(ADJ_DB_MARKER) {
                match serde_json::from_slice::<AdjacencyDatabase>(payload) {
                    Ok(adj_db) => {
                        if adj_db.this_node_name != node_name {
                            warn!(
                                %key,
                                node_name = %adj_db.this_node_name,
                                "ignoring adjacency database with mismatching key"
                            );
                            continue;
                        }
                        let link_state = self
                            .area_link_states
                            .entry(area.to_owned())
                            .or_insert_with(|| LinkState::new(area));
                        let change =
                            link_state.update_adjacency_database(adj_db, area)?;
                        changed |= change.topology_changed
                            || change.link_attributes_changed
                            || change.node_label_changed;
                    }
                    Err(error) => {
                        Error::PayloadDecodeError(key.clone(), error).log();
                    }
                }
            } else if let Some(node_name) = key.strip_prefix(PREFIX_DB_MARKER)
            {
                match serde_json::from_slice::<PrefixDatabase>(payload) {
                    Ok(prefix_db) => {
                        if prefix_db.this_node_name != node_name {
                            warn!(
                                %key,
                                node_name = %prefix_db.this_node_name,
                                "ignoring prefix database with mismatching key"
                            );
                            continue;
                        }
                        changed |= !self
                            .prefix_state
                            .update_prefix_database(&prefix_db)
                            .is_empty();
                    }
                    Err(error) => {
                        Error::PayloadDecodeError(key.clone(), error).log();
                    }
                }
            }
        }

        // Expired keys withdraw the corresponding databases.
        for key in &publication.expired_keys {
            if let Some(node_name) = key.strip_prefix(ADJ_DB_MARKER) {
                if let Some(link_state) = self.area_link_states.get_mut(area) {
                    changed |= link_state
                        .delete_adjacency_database(node_name)
                        .topology_changed;
                }
            } else if let Some(node_name) = key.strip_prefix(PREFIX_DB_MARKER)
            {
                changed |= !self
                    .prefix_state
                    .delete_prefix_database(node_name, area)
                    .is_empty();
            }
        }

        Ok(changed)
    }

    // Rebuilds the RIB and returns the delta against the previous build.
    pub fn rebuild(&mut self) -> Result<DecisionRouteUpdate, Error> {
        let Some(new_route_db) = self.spf_solver.build_route_db(
            &mut self.area_link_states,
            &self.prefix_state,
        )?
        else {
            return Ok(DecisionRouteUpdate::default());
        };
        let delta = self.route_db.calculate_update(&new_route_db);
        self.route_db = new_route_db;
        Ok(delta)
    }

    pub fn my_node_name(&self) -> &str {
        &self.config.my_node_name
    }
}

// ===== global functions =====

// Returns the KV store key carrying a node's adjacency database.
pub fn adjacency_db_key(node_name: &str) -> String {
    format!("{}{}", ADJ_DB_MARKER, node_name)
}

// Returns the KV store key carrying a node's prefix database.
pub fn prefix_db_key(node_name: &str) -> String {
    format!("{}{}", PREFIX_DB_MARKER, node_name)
}
