//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, Ipv6Addr};

use spine_utils::lsdb::Adjacency;

use crate::collections::LinkKey;
use crate::error::Error;

// Link metrics and hold TTLs are tick counts and additive costs.
pub type LinkStateMetric = u64;

// Types whose changes have an "up" (optimistic) direction, eligible for
// hold-up damping.
pub trait HoldCompare: Clone + PartialEq {
    // Returns whether transitioning from `current` to `new` brings the
    // state up.
    fn is_change_bringing_up(current: &Self, new: &Self) -> bool;
}

/// A scalar whose changes toward the optimistic direction can be held back
/// for a number of ticks, while pessimistic changes apply immediately.
///
/// This damps flapping: a link or node reported as recovered is not used
/// again until the hold expires, but one reported as failed is avoided at
/// once.
#[derive(Clone, Debug)]
pub struct HoldableValue<T: HoldCompare> {
    value: T,
    held_value: Option<T>,
    hold_ttl: LinkStateMetric,
}

/// An undirected edge between two (node, interface) endpoints in a single
/// area, carrying per-endpoint attributes.
///
/// Identity is the canonical (lexicographically ordered) endpoint pair;
/// equality, ordering and hashing all derive from it.
#[derive(Clone, Debug)]
pub struct Link {
    area: String,
    node1: String,
    iface1: String,
    node2: String,
    iface2: String,
    metric1: LinkStateMetric,
    metric2: LinkStateMetric,
    overload1: bool,
    overload2: bool,
    adj_label1: u32,
    adj_label2: u32,
    nh_v4_1: Ipv4Addr,
    nh_v4_2: Ipv4Addr,
    nh_v6_1: Ipv6Addr,
    nh_v6_2: Ipv6Addr,
    weight1: i64,
    weight2: i64,
    ordered_names: LinkKey,
    hash: u64,
    hold_up_ttl: LinkStateMetric,
}

// Which constructed endpoint a node name refers to.
enum LinkEnd {
    First,
    Second,
}

// ===== impl HoldCompare =====

impl HoldCompare for bool {
    fn is_change_bringing_up(current: &bool, new: &bool) -> bool {
        // For overload flags, clearing the flag brings the object up.
        *current && !*new
    }
}

impl HoldCompare for LinkStateMetric {
    fn is_change_bringing_up(
        current: &LinkStateMetric,
        new: &LinkStateMetric,
    ) -> bool {
        // For metrics, a decrease brings the path up.
        *new < *current
    }
}

// ===== impl HoldableValue =====

impl<T> HoldableValue<T>
where
    T: HoldCompare,
{
    pub fn new(value: T) -> HoldableValue<T> {
        HoldableValue {
            value,
            held_value: None,
            hold_ttl: 0,
        }
    }

    // Returns the externally visible value: the held one while a hold is
    // active, the current one otherwise.
    pub fn value(&self) -> &T {
        self.held_value.as_ref().unwrap_or(&self.value)
    }

    pub fn has_hold(&self) -> bool {
        self.held_value.is_some()
    }

    // Ticks the hold once. Returns true at the moment the hold expires.
    pub fn decrement_ttl(&mut self) -> bool {
        if self.held_value.is_some() {
            self.hold_ttl -= 1;
            if self.hold_ttl == 0 {
                self.held_value = None;
                return true;
            }
        }
        false
    }

    // Updates the value, possibly retaining the previous one under a hold.
    //
    // Returns whether the externally visible value changed immediately.
    pub fn update_value(
        &mut self,
        value: T,
        hold_up_ttl: LinkStateMetric,
        hold_down_ttl: LinkStateMetric,
    ) -> bool {
        // Calling update with the same value is a no-op.
        if value == self.value {
            return false;
        }

        if self.has_hold() {
            // If there was already a hold we need to fall back to fast
            // update. Otherwise, there are cases that could lead to longer
            // transient loops.
            self.held_value = None;
            self.hold_ttl = 0;
        } else {
            self.hold_ttl =
                if T::is_change_bringing_up(&self.value, &value) {
                    hold_up_ttl
                } else {
                    hold_down_ttl
                };
            if self.hold_ttl != 0 {
                self.held_value = Some(self.value.clone());
            }
        }
        self.value = value;
        !self.has_hold()
    }
}

// ===== impl Link =====

impl Link {
    pub fn new(
        area: &str,
        node1: &str,
        iface1: &str,
        node2: &str,
        iface2: &str,
    ) -> Link {
        let end1 = (node1.to_owned(), iface1.to_owned());
        let end2 = (node2.to_owned(), iface2.to_owned());
        let ordered_names = if end1 <= end2 {
            (end1, end2)
        } else {
            (end2, end1)
        };
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        ordered_names.hash(&mut hasher);
        let hash = hasher.finish();

        Link {
            area: area.to_owned(),
            node1: node1.to_owned(),
            iface1: iface1.to_owned(),
            node2: node2.to_owned(),
            iface2: iface2.to_owned(),
            metric1: 1,
            metric2: 1,
            overload1: false,
            overload2: false,
            adj_label1: 0,
            adj_label2: 0,
            nh_v4_1: Ipv4Addr::UNSPECIFIED,
            nh_v4_2: Ipv4Addr::UNSPECIFIED,
            nh_v6_1: Ipv6Addr::UNSPECIFIED,
            nh_v6_2: Ipv6Addr::UNSPECIFIED,
            weight1: 0,
            weight2: 0,
            ordered_names,
            hash,
            hold_up_ttl: 0,
        }
    }

    // Builds a link from the two matching adjacency announcements.
    pub fn from_adjacencies(
        area: &str,
        node1: &str,
        adj1: &Adjacency,
        node2: &str,
        adj2: &Adjacency,
    ) -> Link {
        let mut link =
            Link::new(area, node1, &adj1.if_name, node2, &adj2.if_name);
        link.metric1 = adj1.metric;
        link.metric2 = adj2.metric;
        link.overload1 = adj1.is_overloaded;
        link.overload2 = adj2.is_overloaded;
        link.adj_label1 = adj1.adj_label;
        link.adj_label2 = adj2.adj_label;
        link.nh_v4_1 = adj1.next_hop_v4;
        link.nh_v4_2 = adj2.next_hop_v4;
        link.nh_v6_1 = adj1.next_hop_v6;
        link.nh_v6_2 = adj2.next_hop_v6;
        link.weight1 = adj1.weight;
        link.weight2 = adj2.weight;
        link
    }

    fn end_from_node(&self, node_name: &str) -> Result<LinkEnd, Error> {
        if node_name == self.node1 {
            Ok(LinkEnd::First)
        } else if node_name == self.node2 {
            Ok(LinkEnd::Second)
        } else {
            Err(Error::LinkEndpointNotFound(
                node_name.to_owned(),
                self.to_string(),
            ))
        }
    }

    pub fn area(&self) -> &str {
        &self.area
    }

    pub fn key(&self) -> &LinkKey {
        &self.ordered_names
    }

    pub fn hash_value(&self) -> u64 {
        self.hash
    }

    pub fn first_node_name(&self) -> &str {
        &self.ordered_names.0 .0
    }

    pub fn second_node_name(&self) -> &str {
        &self.ordered_names.1 .0
    }

    pub fn other_node_name(&self, node_name: &str) -> Result<&str, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => Ok(&self.node2),
            LinkEnd::Second => Ok(&self.node1),
        }
    }

    pub fn iface_from_node(&self, node_name: &str) -> Result<&str, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => Ok(&self.iface1),
            LinkEnd::Second => Ok(&self.iface2),
        }
    }

    pub fn metric_from_node(
        &self,
        node_name: &str,
    ) -> Result<LinkStateMetric, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => Ok(self.metric1),
            LinkEnd::Second => Ok(self.metric2),
        }
    }

    pub fn adj_label_from_node(&self, node_name: &str) -> Result<u32, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => Ok(self.adj_label1),
            LinkEnd::Second => Ok(self.adj_label2),
        }
    }

    pub fn weight_from_node(&self, node_name: &str) -> Result<i64, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => Ok(self.weight1),
            LinkEnd::Second => Ok(self.weight2),
        }
    }

    pub fn overload_from_node(&self, node_name: &str) -> Result<bool, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => Ok(self.overload1),
            LinkEnd::Second => Ok(self.overload2),
        }
    }

    pub fn nh_v4_from_node(&self, node_name: &str) -> Result<Ipv4Addr, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => Ok(self.nh_v4_1),
            LinkEnd::Second => Ok(self.nh_v4_2),
        }
    }

    pub fn nh_v6_from_node(&self, node_name: &str) -> Result<Ipv6Addr, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => Ok(self.nh_v6_1),
            LinkEnd::Second => Ok(self.nh_v6_2),
        }
    }

    pub fn set_metric_from_node(
        &mut self,
        node_name: &str,
        metric: LinkStateMetric,
    ) -> Result<bool, Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => self.metric1 = metric,
            LinkEnd::Second => self.metric2 = metric,
        }
        Ok(true)
    }

    pub fn set_adj_label_from_node(
        &mut self,
        node_name: &str,
        adj_label: u32,
    ) -> Result<(), Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => self.adj_label1 = adj_label,
            LinkEnd::Second => self.adj_label2 = adj_label,
        }
        Ok(())
    }

    pub fn set_weight_from_node(
        &mut self,
        node_name: &str,
        weight: i64,
    ) -> Result<(), Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => self.weight1 = weight,
            LinkEnd::Second => self.weight2 = weight,
        }
        Ok(())
    }

    pub fn set_nh_v4_from_node(
        &mut self,
        node_name: &str,
        nh_v4: Ipv4Addr,
    ) -> Result<(), Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => self.nh_v4_1 = nh_v4,
            LinkEnd::Second => self.nh_v4_2 = nh_v4,
        }
        Ok(())
    }

    pub fn set_nh_v6_from_node(
        &mut self,
        node_name: &str,
        nh_v6: Ipv6Addr,
    ) -> Result<(), Error> {
        match self.end_from_node(node_name)? {
            LinkEnd::First => self.nh_v6_1 = nh_v6,
            LinkEnd::Second => self.nh_v6_2 = nh_v6,
        }
        Ok(())
    }

    // Sets the overload flag of one endpoint. Returns whether the link's
    // up/down state changed as a result.
    //
    // Simplex overloads don't drop the link, so only a state flip signals a
    // topology change.
    pub fn set_overload_from_node(
        &mut self,
        node_name: &str,
        overload: bool,
    ) -> Result<bool, Error> {
        let was_up = self.is_up();
        match self.end_from_node(node_name)? {
            LinkEnd::First => self.overload1 = overload,
            LinkEnd::Second => self.overload2 = overload,
        }
        Ok(was_up != self.is_up())
    }

    pub fn set_hold_up_ttl(&mut self, ttl: LinkStateMetric) {
        self.hold_up_ttl = ttl;
    }

    pub fn is_up(&self) -> bool {
        self.hold_up_ttl == 0 && !self.overload1 && !self.overload2
    }

    // Ticks the hold-up TTL once. Returns true at the moment it expires.
    pub fn decrement_holds(&mut self) -> bool {
        if self.hold_up_ttl != 0 {
            self.hold_up_ttl -= 1;
            return self.hold_up_ttl == 0;
        }
        false
    }

    pub fn has_holds(&self) -> bool {
        self.hold_up_ttl != 0
    }

    pub fn directional_to_string(
        &self,
        from_node: &str,
    ) -> Result<String, Error> {
        let other_node = self.other_node_name(from_node)?;
        Ok(format!(
            "{} - {}%{} ---> {}%{}",
            self.area,
            from_node,
            self.iface_from_node(from_node)?,
            other_node,
            self.iface_from_node(other_node)?,
        ))
    }
}

impl std::fmt::Display for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - {}%{} <---> {}%{}",
            self.area, self.node1, self.iface1, self.node2, self.iface2
        )
    }
}

impl PartialEq for Link {
    fn eq(&self, other: &Link) -> bool {
        self.hash == other.hash && self.ordered_names == other.ordered_names
    }
}

impl Eq for Link {}

impl Ord for Link {
    fn cmp(&self, other: &Link) -> Ordering {
        self.hash
            .cmp(&other.hash)
            .then_with(|| self.ordered_names.cmp(&other.ordered_names))
    }
}

impl PartialOrd for Link {
    fn partial_cmp(&self, other: &Link) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Link {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}
