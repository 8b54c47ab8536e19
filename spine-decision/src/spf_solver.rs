//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::{IpAddr, Ipv6Addr};

use ipnetwork::IpNetwork;
use tracing::warn;

use spine_utils::counters;
use spine_utils::lsdb::{
    NodeAndArea, PrefixForwardingAlgorithm, PrefixForwardingType,
};
use spine_utils::mpls::Label;
use spine_utils::southbound::{LabelAction, NextHop};

use crate::debug::Debug;
use crate::error::Error;
use crate::link_state::LinkState;
use crate::prefix_state::{PrefixEntries, PrefixState};
use crate::rib::{DecisionRouteDb, RibMplsEntry, RibUnicastEntry};

// Shortest metric toward the selected origins, plus the distance from each
// next-hop node to them.
type BestNextHopMetrics = (u64, BTreeMap<String, u64>);

// Outcome of best-origin selection for one prefix.
#[derive(Clone, Debug, Default)]
pub struct RouteSelectionResult {
    // Every origin that survived selection; traffic may be spread over all
    // of them.
    pub all_node_areas: BTreeSet<NodeAndArea>,
    // Tie-broken single best origin, used for the route's attributes.
    pub best_node_area: NodeAndArea,
    // Whether the best origin is hard- or soft-drained.
    pub is_best_node_drained: bool,
}

/// Computes the node's RIB from the per-area link-state databases and the
/// prefix database.
#[derive(Debug)]
pub struct SpfSolver {
    my_node_name: String,
    enable_v4: bool,
    enable_node_segment_label: bool,
    enable_adjacency_labels: bool,
    enable_best_route_selection: bool,
    v4_over_v6_nexthop: bool,
    static_unicast_routes: BTreeMap<IpNetwork, RibUnicastEntry>,
    best_routes_cache: BTreeMap<IpNetwork, RouteSelectionResult>,
}

// ===== impl RouteSelectionResult =====

impl RouteSelectionResult {
    pub fn has_node(&self, node_name: &str) -> bool {
        self.all_node_areas.iter().any(|(node, _)| node == node_name)
    }
}

// ===== impl SpfSolver =====

impl SpfSolver {
    pub fn new(
        my_node_name: &str,
        enable_v4: bool,
        enable_node_segment_label: bool,
        enable_adjacency_labels: bool,
        enable_best_route_selection: bool,
        v4_over_v6_nexthop: bool,
    ) -> SpfSolver {
        SpfSolver {
            my_node_name: my_node_name.to_owned(),
            enable_v4,
            enable_node_segment_label,
            enable_adjacency_labels,
            enable_best_route_selection,
            v4_over_v6_nexthop,
            static_unicast_routes: Default::default(),
            best_routes_cache: Default::default(),
        }
    }

    pub fn best_routes_cache(
        &self,
    ) -> &BTreeMap<IpNetwork, RouteSelectionResult> {
        &self.best_routes_cache
    }

    // Adds and removes static unicast routes. Prefix-database routes take
    // precedence when both exist.
    pub fn update_static_unicast_routes(
        &mut self,
        routes_to_update: BTreeMap<IpNetwork, RibUnicastEntry>,
        routes_to_delete: Vec<IpNetwork>,
    ) {
        for (prefix, entry) in routes_to_update {
            self.static_unicast_routes.insert(prefix, entry);
        }
        for prefix in routes_to_delete {
            self.static_unicast_routes.remove(&prefix);
        }
    }

    // Builds the full route database for the local node. Returns None when
    // the local node is absent from every area's topology.
    pub fn build_route_db(
        &mut self,
        area_link_states: &mut BTreeMap<String, LinkState>,
        prefix_state: &PrefixState,
    ) -> Result<Option<DecisionRouteDb>, Error> {
        let node_exists = area_link_states
            .values()
            .any(|link_state| link_state.has_node(&self.my_node_name));
        if !node_exists {
            return Ok(None);
        }

        counters::inc("decision.route_build_runs");
        Debug::RouteBuildStart.log();

        let mut route_db = DecisionRouteDb::default();
        self.best_routes_cache.clear();

        // Unicast routes from the prefix database.
        let prefixes =
            prefix_state.prefixes().keys().copied().collect::<Vec<_>>();
        for prefix in prefixes {
            if let Some(route) = self.create_route_for_prefix(
                area_link_states,
                prefix_state,
                &prefix,
            )? {
                route_db.add_unicast_route(route);
            }
        }

        // Static unicast routes, unless shadowed by the prefix database.
        for (prefix, entry) in &self.static_unicast_routes {
            if route_db.unicast_routes.contains_key(prefix) {
                continue;
            }
            route_db.add_unicast_route(entry.clone());
        }

        // MPLS routes for every node segment label.
        if self.enable_node_segment_label {
            self.build_node_label_routes(area_link_states, &mut route_db)?;
        }

        // MPLS routes for the local node's adjacency labels.
        if self.enable_adjacency_labels {
            self.build_adjacency_label_routes(area_link_states, &mut route_db)?;
        }

        Debug::RouteBuildComplete(
            route_db.unicast_routes.len(),
            route_db.mpls_routes.len(),
        )
        .log();
        Ok(Some(route_db))
    }

    // Computes the route for a single prefix, or None when no usable
    // next-hops exist.
    pub fn create_route_for_prefix(
        &mut self,
        area_link_states: &mut BTreeMap<String, LinkState>,
        prefix_state: &PrefixState,
        prefix: &IpNetwork,
    ) -> Result<Option<RibUnicastEntry>, Error> {
        counters::inc("decision.get_route_for_prefix");

        let is_v4_prefix = matches!(prefix, IpNetwork::V4(_));
        if is_v4_prefix && !self.enable_v4 && !self.v4_over_v6_nexthop {
            warn!(
                %prefix,
                "skipping v4 prefix: v4 is disabled and v4-over-v6 next-hops are not allowed"
            );
            counters::inc("decision.skipped_unicast_route");
            return Ok(None);
        }

        let Some(all_prefix_entries) = prefix_state.prefixes().get(prefix)
        else {
            return Ok(None);
        };

        self.best_routes_cache.remove(prefix);

        // Keep prefix entries of reachable origins only.
        let mut prefix_entries = all_prefix_entries.clone();
        let mut local_prefix_considered = false;
        for (area, link_state) in area_link_states.iter_mut() {
            let spf_result =
                link_state.get_spf_result(&self.my_node_name, true)?;
            prefix_entries.retain(|node_area, _| {
                let (prefix_node, prefix_area) = node_area;
                if *prefix_node == self.my_node_name {
                    local_prefix_considered = true;
                }
                // Only check reachability within the area the origin
                // belongs to.
                area != prefix_area || spf_result.contains_key(prefix_node)
            });
        }

        if prefix_entries.is_empty() {
            Debug::NoRouteToPrefix(prefix).log();
            counters::inc("decision.no_route_to_prefix");
            return Ok(None);
        }

        // Best origin selection: find the candidates to run the forwarding
        // algorithm against.
        let route_selection_result =
            self.select_best_routes(&prefix_entries, area_link_states);
        if route_selection_result.all_node_areas.is_empty() {
            warn!(%prefix, "no route to prefix");
            counters::inc("decision.no_route_to_prefix");
            return Ok(None);
        }
        self.best_routes_cache
            .insert(*prefix, route_selection_result.clone());

        // Never program routes toward a prefix the local node advertises.
        if route_selection_result.has_node(&self.my_node_name) {
            Debug::SkipLocalPrefix(prefix).log();
            return Ok(None);
        }

        let area_rules =
            forwarding_rules(&prefix_entries, &route_selection_result);

        // Per-area path computation. SPF next-hops from an area are only
        // used when that area offers the shortest IGP metric; KSP2
        // next-hops from all areas are combined.
        let mut total_next_hops: BTreeSet<NextHop> = BTreeSet::new();
        let mut ksp2_next_hops: BTreeSet<NextHop> = BTreeSet::new();
        let mut shortest_metric = u64::MAX;

        for (area, (forwarding_type, forwarding_algorithm)) in &area_rules {
            let Some(link_state) = area_link_states.get_mut(area) else {
                continue;
            };

            match forwarding_algorithm {
                PrefixForwardingAlgorithm::SpEcmp
                | PrefixForwardingAlgorithm::SpUcmpAdjWeightPropagation
                | PrefixForwardingAlgorithm::SpUcmpPrefixWeightPropagation => {
                    let (best_metric, next_hops) = self.select_best_paths_spf(
                        prefix,
                        &route_selection_result,
                        is_v4_prefix,
                        area,
                        link_state,
                    )?;
                    if next_hops.is_empty() {
                        continue;
                    }
                    if shortest_metric >= best_metric {
                        if shortest_metric > best_metric {
                            shortest_metric = best_metric;
                            total_next_hops.clear();
                        }
                        total_next_hops.extend(next_hops);
                    }
                }
                PrefixForwardingAlgorithm::Ksp2EdEcmp => {
                    let next_hops = self.select_best_paths_ksp2(
                        prefix,
                        &route_selection_result,
                        *forwarding_type,
                        is_v4_prefix,
                        area,
                        link_state,
                    )?;
                    ksp2_next_hops.extend(next_hops);
                }
            }
        }
        total_next_hops.extend(ksp2_next_hops);

        Ok(self.add_best_paths(
            prefix,
            &route_selection_result,
            &prefix_entries,
            total_next_hops,
            shortest_metric,
            local_prefix_considered,
        ))
    }

    // Selects the set of origins traffic should be directed toward,
    // filtering drained nodes and applying shortest-distance selection.
    fn select_best_routes(
        &self,
        prefix_entries: &PrefixEntries,
        area_link_states: &BTreeMap<String, LinkState>,
    ) -> RouteSelectionResult {
        let mut result = RouteSelectionResult::default();

        let filtered = filter_drained_nodes(prefix_entries, area_link_states);

        if self.enable_best_route_selection {
            // Shortest-distance selection: highest path preference, then
            // highest source preference, then lowest distance.
            let mut best_metrics: Option<(u64, u64, u64)> = None;
            for (node_area, entry) in &filtered {
                let metrics = (
                    entry.metrics.path_preference,
                    entry.metrics.source_preference,
                    entry.metrics.distance,
                );
                let better = match best_metrics {
                    None => true,
                    Some((path_pref, source_pref, distance)) => {
                        metrics.0 > path_pref
                            || (metrics.0 == path_pref
                                && (metrics.1 > source_pref
                                    || (metrics.1 == source_pref
                                        && metrics.2 < distance)))
                    }
                };
                if better {
                    best_metrics = Some(metrics);
                    result.all_node_areas.clear();
                }
                if Some(metrics) == best_metrics {
                    result.all_node_areas.insert(node_area.clone());
                }
            }
        } else {
            // All filtered advertisers are considered best.
            result
                .all_node_areas
                .extend(filtered.keys().cloned());
        }

        if result.all_node_areas.is_empty() {
            return result;
        }

        // Tie-break the single best origin: prefer the local node, then
        // lexicographic order.
        result.best_node_area = result
            .all_node_areas
            .iter()
            .find(|(node, _)| *node == self.my_node_name)
            .unwrap_or_else(|| result.all_node_areas.iter().next().unwrap())
            .clone();

        // Routes toward a drained best origin are stamped with a drain
        // metric so other areas learn it on redistribution.
        let (best_node, best_area) = &result.best_node_area;
        if let Some(link_state) = area_link_states.get(best_area) {
            result.is_best_node_drained = link_state
                .is_node_overloaded(best_node)
                || link_state.get_node_metric_increment(best_node) != 0;
        }

        result
    }

    // Computes shortest-path next-hops toward the selected origins within
    // one area.
    fn select_best_paths_spf(
        &self,
        prefix: &IpNetwork,
        route_selection_result: &RouteSelectionResult,
        is_v4_prefix: bool,
        area: &str,
        link_state: &mut LinkState,
    ) -> Result<(u64, BTreeSet<NextHop>), Error> {
        let best_next_hop_metrics = get_next_hops_with_metric(
            &self.my_node_name,
            &route_selection_result.all_node_areas,
            link_state,
        )?;

        if best_next_hop_metrics.1.is_empty() {
            Debug::NoRouteToPrefix(prefix).log();
            counters::inc("decision.no_route_to_prefix");
            return Ok((best_next_hop_metrics.0, BTreeSet::new()));
        }

        let next_hops = self.get_next_hops(
            &route_selection_result.all_node_areas,
            is_v4_prefix,
            &best_next_hop_metrics,
            None,
            area,
            link_state,
        )?;
        Ok((best_next_hop_metrics.0, next_hops))
    }

    // Computes next-hops over the first- and second-shortest edge-disjoint
    // paths toward the selected origins, pushing the label stack of each
    // path.
    fn select_best_paths_ksp2(
        &self,
        prefix: &IpNetwork,
        route_selection_result: &RouteSelectionResult,
        forwarding_type: PrefixForwardingType,
        is_v4_prefix: bool,
        area: &str,
        link_state: &mut LinkState,
    ) -> Result<BTreeSet<NextHop>, Error> {
        let mut next_hops = BTreeSet::new();

        if forwarding_type != PrefixForwardingType::SrMpls {
            warn!(
                %prefix,
                ?forwarding_type,
                "incompatible forwarding type for algorithm KSP2_ED_ECMP"
            );
            counters::inc("decision.incompatible_forwarding_type");
            return Ok(next_hops);
        }

        // Shortest paths toward each selected origin.
        let mut paths = Vec::new();
        for (node, best_area) in &route_selection_result.all_node_areas {
            if node == &self.my_node_name && best_area == area {
                continue;
            }
            paths.extend(
                link_state
                    .get_kth_paths(&self.my_node_name, node, 1)?
                    .iter()
                    .cloned(),
            );
        }

        // Second-shortest paths. A second path containing a shortest path
        // as a subset is dropped: with anycast origins the second-shortest
        // path toward one origin may extend the shortest path toward
        // another, and using both would double-spray the shared links.
        let first_paths_size = paths.len();
        for (node, best_area) in &route_selection_result.all_node_areas {
            if best_area != area {
                continue;
            }
            for sec_path in link_state
                .get_kth_paths(&self.my_node_name, node, 2)?
                .iter()
            {
                let contains_first = paths[..first_paths_size]
                    .iter()
                    .any(|first| LinkState::path_a_in_path_b(first, sec_path));
                if !contains_first {
                    paths.push(sec_path.clone());
                }
            }
        }

        for path in &paths {
            let mut cost = 0;
            let mut labels = VecDeque::new();
            let mut invalid_nodes = Vec::new();
            let mut next_node_name = self.my_node_name.clone();
            for link_idx in path {
                let link = link_state.link(*link_idx);
                cost += link.metric_from_node(&next_node_name)?;
                next_node_name =
                    link.other_node_name(&next_node_name)?.to_owned();
                let adj_db =
                    &link_state.get_adjacency_databases()[&next_node_name];
                labels.push_front(adj_db.node_label);
                if !Label::new(adj_db.node_label).is_valid() {
                    invalid_nodes.push(next_node_name.clone());
                }
            }

            // Ignore paths traversing nodes with invalid node labels.
            if !invalid_nodes.is_empty() {
                warn!(
                    %prefix,
                    nodes = ?invalid_nodes,
                    "ignoring path through nodes with invalid node labels"
                );
                counters::inc("decision.skipped_mpls_route");
                continue;
            }

            // Remove the first node's label to respect PHP.
            labels.pop_back();

            let first_link = link_state.link(path[0]);
            let label_action = if labels.is_empty() {
                None
            } else {
                Some(LabelAction::Push(
                    labels.into_iter().map(Label::new).collect(),
                ))
            };
            let address = if is_v4_prefix && !self.v4_over_v6_nexthop {
                IpAddr::V4(first_link.nh_v4_from_node(&self.my_node_name)?)
            } else {
                IpAddr::V6(first_link.nh_v6_from_node(&self.my_node_name)?)
            };
            next_hops.insert(NextHop::new(
                address,
                first_link.iface_from_node(&self.my_node_name)?.to_owned(),
                cost,
                label_action,
                first_link.area().to_owned(),
                first_link
                    .other_node_name(&self.my_node_name)?
                    .to_owned(),
            ));
        }

        Ok(next_hops)
    }

    // Turns the collected next-hops into the final RIB entry, enforcing the
    // min-nexthop requirement and stamping the drain metric.
    fn add_best_paths(
        &self,
        prefix: &IpNetwork,
        route_selection_result: &RouteSelectionResult,
        prefix_entries: &PrefixEntries,
        next_hops: BTreeSet<NextHop>,
        shortest_metric: u64,
        local_prefix_considered: bool,
    ) -> Option<RibUnicastEntry> {
        if next_hops.is_empty() {
            return None;
        }

        // Enforce the strictest min-nexthop requirement among the selected
        // origins.
        let min_next_hop = route_selection_result
            .all_node_areas
            .iter()
            .filter_map(|node_area| {
                prefix_entries
                    .get(node_area)
                    .and_then(|entry| entry.min_nexthop)
            })
            .max();
        if let Some(min_next_hop) = min_next_hop {
            if min_next_hop > next_hops.len() {
                warn!(
                    %prefix,
                    required = %min_next_hop,
                    got = %next_hops.len(),
                    "ignoring route that does not meet the min-nexthop requirement"
                );
                return None;
            }
        }

        // Copy the best entry: the stored one reflects what the origin
        // advertised and must not be modified.
        let mut entry =
            (**prefix_entries.get(&route_selection_result.best_node_area)?)
                .clone();
        if route_selection_result.is_best_node_drained {
            entry.metrics.drain_metric = 1;
        }

        Some(RibUnicastEntry::new(
            *prefix,
            next_hops,
            entry,
            route_selection_result.best_node_area.1.clone(),
            shortest_metric,
            local_prefix_considered,
        ))
    }

    // Installs one MPLS route per known node segment label.
    fn build_node_label_routes(
        &mut self,
        area_link_states: &mut BTreeMap<String, LinkState>,
        route_db: &mut DecisionRouteDb,
    ) -> Result<(), Error> {
        let mut label_to_node: BTreeMap<u32, (String, RibMplsEntry)> =
            BTreeMap::new();

        let areas = area_link_states.keys().cloned().collect::<Vec<_>>();
        for area in &areas {
            let node_labels = area_link_states[area]
                .get_adjacency_databases()
                .iter()
                .map(|(node_name, adj_db)| {
                    (adj_db.node_label, node_name.clone())
                })
                .collect::<Vec<_>>();

            for (top_label, node_name) in node_labels {
                // An unset top label means the node runs in non-SR mode.
                if top_label == 0 {
                    counters::inc("decision.skipped_mpls_route");
                    continue;
                }
                if !Label::new(top_label).is_valid() {
                    warn!(%top_label, %node_name, %area, "ignoring invalid node label");
                    counters::inc("decision.skipped_mpls_route");
                    continue;
                }

                // Label collisions can appear transiently when segmented
                // networks allocating from the same range join together.
                // The label of the larger node name is respected.
                if let Some((existing_node, _)) = label_to_node.get(&top_label)
                {
                    counters::inc("decision.duplicate_node_label");
                    if *existing_node > node_name {
                        continue;
                    }
                }

                // Install POP_AND_LOOKUP for the local node's own label.
                if node_name == self.my_node_name {
                    let next_hop = NextHop::new(
                        IpAddr::V6(Ipv6Addr::UNSPECIFIED),
                        String::new(),
                        0,
                        Some(LabelAction::PopAndLookup),
                        area.clone(),
                        self.my_node_name.clone(),
                    );
                    label_to_node.insert(
                        top_label,
                        (
                            node_name,
                            RibMplsEntry::new(
                                Label::new(top_label),
                                BTreeSet::from([next_hop]),
                            ),
                        ),
                    );
                    continue;
                }

                // Best next-hops toward the node, with SWAP toward transit
                // neighbors and PHP when the neighbor is the destination.
                let link_state = area_link_states.get_mut(area).unwrap();
                let dst_node_areas = BTreeSet::from([(
                    node_name.clone(),
                    area.clone(),
                )]);
                let metric_nhs = get_next_hops_with_metric(
                    &self.my_node_name,
                    &dst_node_areas,
                    link_state,
                )?;
                if metric_nhs.1.is_empty() {
                    warn!(%top_label, %node_name, "no route to node label");
                    counters::inc("decision.no_route_to_label");
                    continue;
                }
                let next_hops = self.get_next_hops(
                    &dst_node_areas,
                    false,
                    &metric_nhs,
                    Some(Label::new(top_label)),
                    area,
                    link_state,
                )?;
                label_to_node.insert(
                    top_label,
                    (
                        node_name,
                        RibMplsEntry::new(Label::new(top_label), next_hops),
                    ),
                );
            }
        }

        for (_, (_, entry)) in label_to_node {
            route_db.add_mpls_route(entry);
        }
        Ok(())
    }

    // Installs one PHP MPLS route per local adjacency label.
    fn build_adjacency_label_routes(
        &self,
        area_link_states: &BTreeMap<String, LinkState>,
        route_db: &mut DecisionRouteDb,
    ) -> Result<(), Error> {
        for link_state in area_link_states.values() {
            for link_idx in
                link_state.ordered_links_from_node(&self.my_node_name)
            {
                let link = link_state.link(link_idx);
                let top_label = link.adj_label_from_node(&self.my_node_name)?;
                if top_label == 0 {
                    continue;
                }
                if !Label::new(top_label).is_valid() {
                    warn!(
                        %top_label,
                        link = %link.directional_to_string(&self.my_node_name)?,
                        "ignoring invalid adjacency label"
                    );
                    counters::inc("decision.skipped_mpls_route");
                    continue;
                }

                let next_hop = NextHop::new(
                    IpAddr::V6(link.nh_v6_from_node(&self.my_node_name)?),
                    link.iface_from_node(&self.my_node_name)?.to_owned(),
                    link.metric_from_node(&self.my_node_name)?,
                    Some(LabelAction::Php),
                    link.area().to_owned(),
                    link.other_node_name(&self.my_node_name)?.to_owned(),
                );
                route_db.add_mpls_route(RibMplsEntry::new(
                    Label::new(top_label),
                    BTreeSet::from([next_hop]),
                ));
            }
        }
        Ok(())
    }

    // Turns the next-hop node set into concrete next-hops, selecting every
    // outgoing link lying on a shortest path.
    fn get_next_hops(
        &self,
        dst_node_areas: &BTreeSet<NodeAndArea>,
        is_v4: bool,
        best_next_hop_metrics: &BestNextHopMetrics,
        swap_label: Option<Label>,
        area: &str,
        link_state: &LinkState,
    ) -> Result<BTreeSet<NextHop>, Error> {
        let (min_metric, next_hop_nodes) = best_next_hop_metrics;

        let mut next_hops = BTreeSet::new();
        for (_, link) in link_state.links_from_node(&self.my_node_name) {
            let neighbor_node = link.other_node_name(&self.my_node_name)?;

            // Ignore overloaded links and non-nexthop neighbors.
            let Some(dist_to_dst) = next_hop_nodes.get(neighbor_node) else {
                continue;
            };
            if !link.is_up() {
                continue;
            }

            // Ignore next-hops that are not on a shortest path.
            let dist_over_link =
                link.metric_from_node(&self.my_node_name)? + dist_to_dst;
            if dist_over_link != *min_metric {
                continue;
            }

            let label_action = swap_label.map(|label| {
                let is_next_hop_also_dst = dst_node_areas
                    .contains(&(neighbor_node.to_owned(), area.to_owned()));
                if is_next_hop_also_dst {
                    LabelAction::Php
                } else {
                    LabelAction::Swap(label)
                }
            });

            let address = if is_v4 && !self.v4_over_v6_nexthop {
                IpAddr::V4(link.nh_v4_from_node(&self.my_node_name)?)
            } else {
                IpAddr::V6(link.nh_v6_from_node(&self.my_node_name)?)
            };
            next_hops.insert(NextHop::new(
                address,
                link.iface_from_node(&self.my_node_name)?.to_owned(),
                dist_over_link,
                label_action,
                link.area().to_owned(),
                neighbor_node.to_owned(),
            ));
        }
        Ok(next_hops)
    }
}

// ===== helper functions =====

// Drops hard-drained origins (unless all are), then keeps only the origins
// with the minimum soft-drain value.
fn filter_drained_nodes(
    prefix_entries: &PrefixEntries,
    area_link_states: &BTreeMap<String, LinkState>,
) -> PrefixEntries {
    // Hard-drain filter.
    let mut filtered = prefix_entries.clone();
    filtered.retain(|(node, area), _| {
        !area_link_states
            .get(area)
            .map(|link_state| link_state.is_node_overloaded(node))
            .unwrap_or(false)
    });
    if filtered.is_empty() {
        filtered = prefix_entries.clone();
    }

    // Soft-drain filter: keep the minimum metric-increment value.
    let mut min_increment = u64::MAX;
    let mut result = PrefixEntries::new();
    for (node_area, entry) in filtered {
        let (node, area) = &node_area;
        let increment = area_link_states
            .get(area)
            .map(|link_state| link_state.get_node_metric_increment(node))
            .unwrap_or(0);
        if increment < min_increment {
            min_increment = increment;
            result.clear();
        }
        if increment == min_increment {
            result.insert(node_area, entry);
        }
    }
    result
}

// Derives the per-area forwarding rules from the prefix entries of the
// selected origins. When origins within an area disagree, the least capable
// type and algorithm win.
fn forwarding_rules(
    prefix_entries: &PrefixEntries,
    route_selection_result: &RouteSelectionResult,
) -> BTreeMap<String, (PrefixForwardingType, PrefixForwardingAlgorithm)> {
    let mut rules: BTreeMap<_, (PrefixForwardingType, PrefixForwardingAlgorithm)> =
        BTreeMap::new();
    for (node_area, entry) in prefix_entries {
        if !route_selection_result.all_node_areas.contains(node_area) {
            continue;
        }
        let area = node_area.1.clone();
        match rules.get_mut(&area) {
            Some((forwarding_type, forwarding_algorithm)) => {
                *forwarding_type =
                    std::cmp::min(*forwarding_type, entry.forwarding_type);
                *forwarding_algorithm = std::cmp::min(
                    *forwarding_algorithm,
                    entry.forwarding_algorithm,
                );
            }
            None => {
                rules.insert(
                    area,
                    (entry.forwarding_type, entry.forwarding_algorithm),
                );
            }
        }
    }
    rules
}

// Returns the minimum metric from the local node to the selected origins,
// plus the distance from each candidate next-hop node to them.
//
// The metric in the first position is the total source-to-destination
// distance, which differs from the per-next-hop distances in the map.
fn get_next_hops_with_metric(
    my_node_name: &str,
    dst_node_areas: &BTreeSet<NodeAndArea>,
    link_state: &mut LinkState,
) -> Result<BestNextHopMetrics, Error> {
    let spf_result = link_state.get_spf_result(my_node_name, true)?;

    // Find the set of closest origins.
    let mut shortest_metric = u64::MAX;
    let mut min_cost_nodes: BTreeSet<String> = BTreeSet::new();
    for (dst_node, _) in dst_node_areas {
        let Some(node_result) = spf_result.get(dst_node) else {
            continue;
        };
        if shortest_metric >= node_result.metric {
            if shortest_metric > node_result.metric {
                shortest_metric = node_result.metric;
                min_cost_nodes.clear();
            }
            min_cost_nodes.insert(dst_node.clone());
        }
    }

    // Record the neighbors lying on a shortest path toward them.
    let mut next_hop_nodes = BTreeMap::new();
    for dst_node in &min_cost_nodes {
        for next_hop in &spf_result[dst_node].next_hops {
            let distance_from_next_hop =
                shortest_metric - spf_result[next_hop].metric;
            next_hop_nodes.insert(next_hop.clone(), distance_from_next_hop);
        }
    }

    Ok((shortest_metric, next_hop_nodes))
}
