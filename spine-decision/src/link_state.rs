//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use itertools::{EitherOrBoth, Itertools};
use tracing::warn;

use spine_utils::counters;
use spine_utils::lsdb::{
    Adjacency, AdjacencyDatabase, PrefixForwardingAlgorithm,
};

use crate::collections::{LinkIndex, Links};
use crate::debug::Debug;
use crate::error::Error;
use crate::link::{HoldableValue, Link, LinkStateMetric};

// A path is the sequence of links traversed from source to destination.
pub type Path = Vec<LinkIndex>;

// Shortest-path computation result, keyed by reachable node.
pub type SpfResult = BTreeMap<String, SpfNodeResult>;

// UCMP weight resolution result, keyed by visited node.
pub type UcmpResult = BTreeMap<String, UcmpNodeResult>;

// Shortest-path state of one node: its distance from the source, the
// first-hop neighbors of the minimum paths, and the incoming DAG edges.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SpfNodeResult {
    pub metric: LinkStateMetric,
    pub next_hops: BTreeSet<String>,
    pub path_links: Vec<PathLink>,
}

// Incoming edge of the shortest-path DAG.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PathLink {
    pub link: LinkIndex,
    pub prev_node: String,
}

// UCMP state of one node: the weight it advertises upstream and its
// weighted next-hop links toward the leaves.
#[derive(Clone, Debug, Default)]
pub struct UcmpNodeResult {
    pub weight: Option<i64>,
    pub next_hop_links: BTreeMap<String, UcmpNextHopLink>,
}

// Weighted next-hop link of a UCMP result, keyed by outgoing interface.
#[derive(Clone, Debug)]
pub struct UcmpNextHopLink {
    pub link: LinkIndex,
    pub next_node_name: String,
    pub weight: i64,
}

// Incremental delta reported by a topology mutation.
#[derive(Debug, Default)]
pub struct LinkStateChange {
    pub topology_changed: bool,
    pub link_attributes_changed: bool,
    pub node_label_changed: bool,
    pub added_links: Vec<LinkIndex>,
}

/// Per-area link-state database.
///
/// Ingests adjacency databases, derives bidirectional links, and serves
/// cached SPF and k-shortest-path computations from the perspective of any
/// node. Caches are invalidated synchronously with every topology change.
#[derive(Debug)]
pub struct LinkState {
    area: String,
    adjacency_databases: BTreeMap<String, AdjacencyDatabase>,
    links: Links,
    node_overloads: BTreeMap<String, HoldableValue<bool>>,
    node_metric_increments: BTreeMap<String, u64>,
    spf_results: HashMap<(String, bool), Arc<SpfResult>>,
    ksp_results: HashMap<(String, String, usize), Arc<Vec<Path>>>,
}

// ===== impl UcmpNodeResult =====

impl UcmpNodeResult {
    // Reduces the next-hop weights by their greatest common divisor,
    // preserving the relative ratios.
    fn normalize_next_hop_weights(&mut self) {
        let mut divisor = 0;
        for nh in self.next_hop_links.values() {
            divisor = gcd(divisor, nh.weight);
        }
        if divisor > 1 {
            for nh in self.next_hop_links.values_mut() {
                nh.weight /= divisor;
            }
        }
    }
}

// ===== impl LinkState =====

impl LinkState {
    pub fn new(area: &str) -> LinkState {
        LinkState {
            area: area.to_owned(),
            adjacency_databases: Default::default(),
            links: Default::default(),
            node_overloads: Default::default(),
            node_metric_increments: Default::default(),
            spf_results: Default::default(),
            ksp_results: Default::default(),
        }
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn get_adjacency_databases(
        &self,
    ) -> &BTreeMap<String, AdjacencyDatabase> {
        &self.adjacency_databases
    }

    pub fn has_node(&self, node_name: &str) -> bool {
        self.adjacency_databases.contains_key(node_name)
    }

    pub fn link(&self, link_idx: LinkIndex) -> &Link {
        &self.links[link_idx]
    }

    // Returns the links incident to the given node.
    pub fn links_from_node(
        &self,
        node_name: &str,
    ) -> impl Iterator<Item = (LinkIndex, &Link)> {
        self.links
            .from_node(node_name)
            .map(move |link_idx| (link_idx, &self.links[link_idx]))
    }

    // Returns the links incident to the given node, in canonical order.
    pub fn ordered_links_from_node(&self, node_name: &str) -> Vec<LinkIndex> {
        self.links.ordered_from_node(node_name)
    }

    pub fn is_node_overloaded(&self, node_name: &str) -> bool {
        self.node_overloads
            .get(node_name)
            .map(|overload| *overload.value())
            .unwrap_or(false)
    }

    // Returns the node's soft-drain metric increment.
    pub fn get_node_metric_increment(&self, node_name: &str) -> u64 {
        self.node_metric_increments
            .get(node_name)
            .copied()
            .unwrap_or(0)
    }

    // Updates the node-level overload flag through its hold-down filter.
    // Returns whether the externally visible value changed.
    pub fn update_node_overloaded(
        &mut self,
        node_name: &str,
        is_overloaded: bool,
        hold_up_ttl: LinkStateMetric,
        hold_down_ttl: LinkStateMetric,
    ) -> bool {
        if let Some(overload) = self.node_overloads.get_mut(node_name) {
            return overload.update_value(
                is_overloaded,
                hold_up_ttl,
                hold_down_ttl,
            );
        }
        self.node_overloads
            .insert(node_name.to_owned(), HoldableValue::new(is_overloaded));
        // A new node doesn't constitute a topology change by itself.
        false
    }

    // Ticks all link and node holds once. The topology changes when any
    // hold expires.
    pub fn decrement_holds(&mut self) -> LinkStateChange {
        let mut change = LinkStateChange::default();
        for (_, link) in self.links.iter_mut() {
            change.topology_changed |= link.decrement_holds();
        }
        for overload in self.node_overloads.values_mut() {
            change.topology_changed |= overload.decrement_ttl();
        }
        if change.topology_changed {
            self.clear_caches();
        }
        change
    }

    pub fn has_holds(&self) -> bool {
        self.links.iter().any(|(_, link)| link.has_holds())
            || self.node_overloads.values().any(|o| o.has_hold())
    }

    // Builds a link out of this node's announced adjacency, but only if the
    // other node announces the matching reverse adjacency.
    fn maybe_make_link(&self, node_name: &str, adj: &Adjacency) -> Option<Link> {
        let other_adj_db = self.adjacency_databases.get(&adj.other_node_name)?;
        for other_adj in &other_adj_db.adjacencies {
            if other_adj.other_node_name == node_name
                && adj.other_if_name == other_adj.if_name
                && adj.if_name == other_adj.other_if_name
            {
                return Some(Link::from_adjacencies(
                    &self.area,
                    node_name,
                    adj,
                    &adj.other_node_name,
                    other_adj,
                ));
            }
        }
        None
    }

    // Derives the bidirectional links announced by an adjacency database, in
    // canonical order.
    fn get_ordered_link_set(&self, adj_db: &AdjacencyDatabase) -> Vec<Link> {
        let mut links = adj_db
            .adjacencies
            .iter()
            .filter_map(|adj| self.maybe_make_link(&adj_db.this_node_name, adj))
            .collect::<Vec<_>>();
        links.sort();
        links
    }

    // Replaces a node's adjacency database and reports the resulting
    // topology and attribute deltas.
    pub fn update_adjacency_database(
        &mut self,
        new_adj_db: AdjacencyDatabase,
        area: &str,
    ) -> Result<LinkStateChange, Error> {
        if area != self.area {
            return Err(Error::AreaMismatch(
                self.area.clone(),
                area.to_owned(),
            ));
        }

        let mut change = LinkStateChange::default();

        // Hold TTLs for damping link flaps are currently always zero.
        let hold_up_ttl: LinkStateMetric = 0;
        let hold_down_ttl: LinkStateMetric = 0;

        let node_name = new_adj_db.this_node_name.clone();
        Debug::AdjDbUpdate(&node_name, area).log();
        counters::inc("decision.adj_db_update");

        let is_overloaded = new_adj_db.is_overloaded;
        let node_label = new_adj_db.node_label;
        let metric_increment = new_adj_db.node_metric_increment_val;

        let prior_adj_db = self
            .adjacency_databases
            .insert(node_name.clone(), new_adj_db);

        // For comparing old and new state, order the links by their
        // canonical identity. This allows discerning topology changes in a
        // single merged walk.
        let old_links = self.links.ordered_from_node(&node_name);
        let new_links =
            self.get_ordered_link_set(&self.adjacency_databases[&node_name]);

        // Topology changes when a node is overloaded or un-overloaded.
        change.topology_changed |= self.update_node_overloaded(
            &node_name,
            is_overloaded,
            hold_up_ttl,
            hold_down_ttl,
        );

        // Topology changes when the soft-drain value changes.
        let prior_increment = prior_adj_db
            .as_ref()
            .map(|adj_db| adj_db.node_metric_increment_val)
            .unwrap_or(0);
        change.topology_changed |= prior_increment != metric_increment;
        self.node_metric_increments
            .insert(node_name.clone(), metric_increment);

        change.node_label_changed = prior_adj_db
            .as_ref()
            .map(|adj_db| adj_db.node_label)
            .unwrap_or(0)
            != node_label;

        let decisions = new_links
            .into_iter()
            .merge_join_by(old_links, |new_link, old_idx| {
                new_link.cmp(&self.links[*old_idx])
            })
            .collect::<Vec<_>>();

        for decision in decisions {
            match decision {
                EitherOrBoth::Left(mut new_link) => {
                    // A link not currently present. Even while a hold is
                    // pending the link is added to the indices, and SPF
                    // checks holds when running.
                    new_link.set_hold_up_ttl(hold_up_ttl);
                    change.topology_changed |= new_link.is_up();
                    Debug::LinkUp(&new_link.to_string()).log();
                    let link_idx = self.links.insert(new_link);
                    change.added_links.push(link_idx);
                }
                EitherOrBoth::Right(old_idx) => {
                    // A link no longer present. If it was overloaded or had
                    // a pending hold-up, removing it does not change the
                    // topology.
                    change.topology_changed |= self.links[old_idx].is_up();
                    Debug::LinkDown(&self.links[old_idx].to_string()).log();
                    self.links.remove(old_idx);
                }
                EitherOrBoth::Both(new_link, old_idx) => {
                    // The link did not go up or down, but the topology may
                    // still have changed if its overload or metric changed.
                    change.merge(self.update_link_attributes(
                        &node_name, &new_link, old_idx,
                    )?);
                }
            }
        }

        if change.topology_changed {
            self.clear_caches();
        }
        Ok(change)
    }

    // Applies per-endpoint attribute changes announced by `node_name` onto
    // the stored link.
    fn update_link_attributes(
        &mut self,
        node_name: &str,
        new_link: &Link,
        old_idx: LinkIndex,
    ) -> Result<LinkStateChange, Error> {
        let mut change = LinkStateChange::default();

        let new_metric = new_link.metric_from_node(node_name)?;
        if new_metric != self.links[old_idx].metric_from_node(node_name)? {
            Debug::LinkMetricChange(
                &self.links[old_idx].directional_to_string(node_name)?,
                self.links[old_idx].metric_from_node(node_name)?,
                new_metric,
            )
            .log();
            change.topology_changed |= self.links[old_idx]
                .set_metric_from_node(node_name, new_metric)?;
        }

        let new_overload = new_link.overload_from_node(node_name)?;
        if new_overload != self.links[old_idx].overload_from_node(node_name)? {
            Debug::LinkOverloadChange(
                &self.links[old_idx].directional_to_string(node_name)?,
                self.links[old_idx].overload_from_node(node_name)?,
                new_overload,
            )
            .log();
            change.topology_changed |= self.links[old_idx]
                .set_overload_from_node(node_name, new_overload)?;
        }

        let new_adj_label = new_link.adj_label_from_node(node_name)?;
        if new_adj_label != self.links[old_idx].adj_label_from_node(node_name)?
        {
            change.link_attributes_changed = true;
            self.links[old_idx]
                .set_adj_label_from_node(node_name, new_adj_label)?;
        }

        let new_weight = new_link.weight_from_node(node_name)?;
        if new_weight != self.links[old_idx].weight_from_node(node_name)? {
            change.link_attributes_changed = true;
            self.links[old_idx].set_weight_from_node(node_name, new_weight)?;
        }

        let new_nh_v4 = new_link.nh_v4_from_node(node_name)?;
        if new_nh_v4 != self.links[old_idx].nh_v4_from_node(node_name)? {
            change.link_attributes_changed = true;
            self.links[old_idx].set_nh_v4_from_node(node_name, new_nh_v4)?;
        }

        let new_nh_v6 = new_link.nh_v6_from_node(node_name)?;
        if new_nh_v6 != self.links[old_idx].nh_v6_from_node(node_name)? {
            change.link_attributes_changed = true;
            self.links[old_idx].set_nh_v6_from_node(node_name, new_nh_v6)?;
        }

        Ok(change)
    }

    // Removes a node's adjacency database and every link incident to it.
    pub fn delete_adjacency_database(
        &mut self,
        node_name: &str,
    ) -> LinkStateChange {
        let mut change = LinkStateChange::default();
        Debug::AdjDbDelete(node_name).log();

        if self.adjacency_databases.remove(node_name).is_some() {
            for link_idx in
                self.links.from_node(node_name).collect::<Vec<_>>()
            {
                self.links.remove(link_idx);
            }
            self.node_overloads.remove(node_name);
            self.clear_caches();
            change.topology_changed = true;
        } else {
            warn!(%node_name, "no adjacency database to delete");
        }
        change
    }

    fn clear_caches(&mut self) {
        self.spf_results.clear();
        self.ksp_results.clear();
    }

    // Returns the (cached) SPF result rooted at the given node.
    pub fn get_spf_result(
        &mut self,
        node_name: &str,
        use_link_metric: bool,
    ) -> Result<Arc<SpfResult>, Error> {
        let key = (node_name.to_owned(), use_link_metric);
        if let Some(cached) = self.spf_results.get(&key) {
            return Ok(cached.clone());
        }
        let result =
            Arc::new(self.run_spf(node_name, use_link_metric, &HashSet::new())?);
        self.spf_results.insert(key, result.clone());
        Ok(result)
    }

    // Returns the shortest-path metric from `a` to `b`, or None when `b` is
    // unreachable.
    pub fn get_metric_from_a_to_b(
        &mut self,
        a: &str,
        b: &str,
        use_link_metric: bool,
    ) -> Result<Option<LinkStateMetric>, Error> {
        if a == b {
            return Ok(Some(0));
        }
        let spf_result = self.get_spf_result(a, use_link_metric)?;
        Ok(spf_result.get(b).map(|node_result| node_result.metric))
    }

    // Computes shortest-path routes from the perspective of `this_node_name`.
    pub fn run_spf(
        &self,
        this_node_name: &str,
        use_link_metric: bool,
        links_to_ignore: &HashSet<LinkIndex>,
    ) -> Result<SpfResult, Error> {
        counters::inc("decision.spf_runs");
        Debug::SpfRun(this_node_name).log();

        let mut result = SpfResult::new();

        // Candidate list keyed by (tentative distance, node name), plus a
        // reverse index of the tentative distances.
        let mut cand_list: BTreeMap<(LinkStateMetric, String), SpfNodeResult> =
            BTreeMap::new();
        let mut cand_metrics: HashMap<String, LinkStateMetric> = HashMap::new();
        cand_list
            .insert((0, this_node_name.to_owned()), SpfNodeResult::default());
        cand_metrics.insert(this_node_name.to_owned(), 0);

        while let Some(((metric, node_name), mut node_result)) =
            cand_list.pop_first()
        {
            // This node's shortest paths are final. Record them.
            cand_metrics.remove(&node_name);
            node_result.metric = metric;
            let next_hops = node_result.next_hops.clone();
            result.insert(node_name.clone(), node_result);

            if self.is_node_overloaded(&node_name)
                && node_name != this_node_name
            {
                // No transit traffic through this node. Its shortest paths
                // are recorded, but none of its adjacencies may offer lower
                // cost paths toward further away nodes. This effectively
                // drains traffic away from the node.
                continue;
            }

            // Relax step: any neighbor without a lower cost path inherits
            // this node's next-hops.
            for link_idx in self.links.from_node(&node_name) {
                let link = &self.links[link_idx];
                let other_node_name =
                    link.other_node_name(&node_name)?.to_owned();
                if !link.is_up()
                    || result.contains_key(&other_node_name)
                    || links_to_ignore.contains(&link_idx)
                {
                    continue;
                }
                let link_metric = if use_link_metric {
                    link.metric_from_node(&node_name)?
                } else {
                    1
                };
                let tentative = metric + link_metric;

                match cand_metrics.get(&other_node_name).copied() {
                    // Ignore higher cost paths.
                    Some(current) if tentative > current => continue,
                    Some(current) => {
                        if tentative < current {
                            // Strictly better: forget any previously found
                            // paths and next-hops.
                            cand_list
                                .remove(&(current, other_node_name.clone()));
                            cand_list.insert(
                                (tentative, other_node_name.clone()),
                                SpfNodeResult::default(),
                            );
                            cand_metrics
                                .insert(other_node_name.clone(), tentative);
                        }
                    }
                    None => {
                        cand_list.insert(
                            (tentative, other_node_name.clone()),
                            SpfNodeResult::default(),
                        );
                        cand_metrics.insert(other_node_name.clone(), tentative);
                    }
                }

                // Along an equal or better path: record the DAG edge and
                // merge the next-hops.
                let entry = cand_list
                    .get_mut(&(tentative, other_node_name.clone()))
                    .unwrap();
                entry.path_links.push(PathLink {
                    link: link_idx,
                    prev_node: node_name.clone(),
                });
                entry.next_hops.extend(next_hops.iter().cloned());
                if entry.next_hops.is_empty() {
                    // Directly connected node.
                    entry.next_hops.insert(other_node_name);
                }
            }
        }

        Ok(result)
    }

    // Returns the k-th shortest edge-disjoint paths from `src` to `dst`.
    //
    // Level k excludes every link used by levels 1..k-1. Results are cached
    // until the next topology change.
    pub fn get_kth_paths(
        &mut self,
        src: &str,
        dst: &str,
        k: usize,
    ) -> Result<Arc<Vec<Path>>, Error> {
        assert!(k >= 1);
        let key = (src.to_owned(), dst.to_owned(), k);
        if let Some(cached) = self.ksp_results.get(&key) {
            return Ok(cached.clone());
        }

        let mut links_to_ignore = HashSet::new();
        for i in 1..k {
            for path in self.get_kth_paths(src, dst, i)?.iter() {
                links_to_ignore.extend(path.iter().copied());
            }
        }

        let result = if links_to_ignore.is_empty() {
            self.get_spf_result(src, true)?
        } else {
            Arc::new(self.run_spf(src, true, &links_to_ignore)?)
        };

        let mut paths = Vec::new();
        if result.contains_key(dst) {
            let mut visited_links = HashSet::new();
            while let Some(path) =
                self.trace_one_path(src, dst, &result, &mut visited_links)
            {
                if path.is_empty() {
                    break;
                }
                paths.push(path);
            }
        }

        let paths = Arc::new(paths);
        self.ksp_results.insert(key, paths.clone());
        Ok(paths)
    }

    // Reconstructs one not-yet-traced path from `src` to `dst` by walking
    // the SPF DAG backward. Links already consumed by previously traced
    // paths are skipped.
    fn trace_one_path(
        &self,
        src: &str,
        dst: &str,
        result: &SpfResult,
        visited_links: &mut HashSet<LinkIndex>,
    ) -> Option<Path> {
        if src == dst {
            return Some(Vec::new());
        }
        let node_result = result.get(dst)?;
        for path_link in &node_result.path_links {
            // Only consider this link if we haven't yet.
            if visited_links.insert(path_link.link) {
                if let Some(mut path) = self.trace_one_path(
                    src,
                    &path_link.prev_node,
                    result,
                    visited_links,
                ) {
                    path.push(path_link.link);
                    return Some(path);
                }
            }
        }
        None
    }

    // A path `a` is contained in `b` iff every link of `a` appears in `b`.
    pub fn path_a_in_path_b(a: &Path, b: &Path) -> bool {
        let b_links = b.iter().copied().collect::<HashSet<_>>();
        a.iter().all(|link| b_links.contains(link))
    }

    // Resolves UCMP weights by walking the SPF DAG backward from the leaf
    // nodes carrying weights toward the root.
    //
    // Every leaf present in the SPF graph must be equidistant from the
    // root; otherwise the resolution is skipped.
    pub fn resolve_ucmp_weights(
        &self,
        spf_graph: &SpfResult,
        leaf_node_to_weights: &BTreeMap<String, i64>,
        algorithm: PrefixForwardingAlgorithm,
        use_link_metric: bool,
    ) -> Result<UcmpResult, Error> {
        if !matches!(
            algorithm,
            PrefixForwardingAlgorithm::SpUcmpAdjWeightPropagation
                | PrefixForwardingAlgorithm::SpUcmpPrefixWeightPropagation
        ) {
            return Err(Error::UnsupportedUcmpAlgorithm(algorithm));
        }
        counters::inc("decision.ucmp_runs");

        let mut ucmp_result = UcmpResult::new();

        // Candidate list keyed by (distance from the leaves, node name).
        let mut cand_list: BTreeMap<(LinkStateMetric, String), UcmpNodeResult> =
            BTreeMap::new();
        let mut cand_metrics: HashMap<String, LinkStateMetric> = HashMap::new();

        // Seed the queue with the leaf nodes present in the SPF graph,
        // which must all be the same distance away from the root.
        let mut spf_metric = None;
        for (leaf_node_name, leaf_node_weight) in leaf_node_to_weights {
            let Some(node_result) = spf_graph.get(leaf_node_name) else {
                continue;
            };
            match spf_metric {
                None => spf_metric = Some(node_result.metric),
                Some(metric) if metric != node_result.metric => {
                    warn!(
                        %leaf_node_name,
                        metric = %node_result.metric,
                        expected = %metric,
                        "skipping UCMP resolution: leaf nodes are not equidistant from the root"
                    );
                    return Ok(ucmp_result);
                }
                _ => (),
            }
            cand_list.insert(
                (0, leaf_node_name.clone()),
                UcmpNodeResult {
                    weight: Some(*leaf_node_weight),
                    next_hop_links: BTreeMap::new(),
                },
            );
            cand_metrics.insert(leaf_node_name.clone(), 0);
        }

        // Walk the SPF graph from the leaf nodes to the root node.
        while let Some(((metric, node_name), mut node_result)) =
            cand_list.pop_first()
        {
            cand_metrics.remove(&node_name);

            // Compute the weight a non-leaf node advertises upstream.
            if node_result.weight.is_none() {
                let mut advertised_weight = 0;
                for nh in node_result.next_hop_links.values() {
                    advertised_weight += match algorithm {
                        PrefixForwardingAlgorithm::SpUcmpAdjWeightPropagation => {
                            // Weight is the sum of the next-hop link weights.
                            self.links[nh.link].weight_from_node(&node_name)?
                        }
                        PrefixForwardingAlgorithm::SpUcmpPrefixWeightPropagation => {
                            // Weight is the sum of the next-hop weights.
                            nh.weight
                        }
                        _ => unreachable!(),
                    };
                }
                node_result.weight = Some(advertised_weight);
            }
            let advertised_weight = node_result.weight.unwrap();

            // Walk the node's upstream neighbors in the SPF DAG.
            let spf_node = &spf_graph[&node_name];
            for path_link in &spf_node.path_links {
                let link = &self.links[path_link.link];
                let link_metric = if use_link_metric {
                    link.metric_from_node(&path_link.prev_node)?
                } else {
                    1
                };

                if !cand_metrics.contains_key(&path_link.prev_node) {
                    cand_list.insert(
                        (metric + link_metric, path_link.prev_node.clone()),
                        UcmpNodeResult::default(),
                    );
                    cand_metrics.insert(
                        path_link.prev_node.clone(),
                        metric + link_metric,
                    );
                }

                // Record the link on the upstream node along with the
                // resolved weight.
                let prev_metric = cand_metrics[&path_link.prev_node];
                let prev_entry = cand_list
                    .get_mut(&(prev_metric, path_link.prev_node.clone()))
                    .unwrap();
                let iface =
                    link.iface_from_node(&path_link.prev_node)?.to_owned();
                prev_entry.next_hop_links.insert(
                    iface,
                    UcmpNextHopLink {
                        link: path_link.link,
                        next_node_name: node_name.clone(),
                        weight: advertised_weight,
                    },
                );
            }

            node_result.normalize_next_hop_weights();
            ucmp_result.insert(node_name, node_result);
        }

        Ok(ucmp_result)
    }
}

// ===== impl LinkStateChange =====

impl LinkStateChange {
    fn merge(&mut self, other: LinkStateChange) {
        self.topology_changed |= other.topology_changed;
        self.link_attributes_changed |= other.link_attributes_changed;
        self.node_label_changed |= other.node_label_changed;
        self.added_links.extend(other.added_links);
    }
}

// ===== helper functions =====

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 { a } else { gcd(b, a % b) }
}
