//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};

use crate::mpls::Label;

// MPLS operation attached to a next-hop.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub enum LabelAction {
    Push(Vec<Label>),
    Swap(Label),
    Php,
    PopAndLookup,
}

// Next-hop of a computed route.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
#[derive(Deserialize, Serialize)]
pub struct NextHop {
    pub address: IpAddr,
    pub ifname: String,
    pub metric: u64,
    pub weight: u64,
    pub area: String,
    pub neighbor_node_name: String,
    pub label_action: Option<LabelAction>,
}

// ===== Southbound messages =====

#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct UnicastRouteMsg {
    pub prefix: IpNetwork,
    pub nexthops: Vec<NextHop>,
}

#[derive(Clone, Debug)]
#[derive(Deserialize, Serialize)]
pub struct MplsRouteMsg {
    pub label: Label,
    pub nexthops: Vec<NextHop>,
}

// ===== impl NextHop =====

impl NextHop {
    pub fn new(
        address: IpAddr,
        ifname: String,
        metric: u64,
        label_action: Option<LabelAction>,
        area: String,
        neighbor_node_name: String,
    ) -> NextHop {
        NextHop {
            address,
            ifname,
            metric,
            weight: 0,
            area,
            neighbor_node_name,
            label_action,
        }
    }
}

impl std::fmt::Display for NextHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}%{} (metric {}, via {})",
            self.address, self.ifname, self.metric, self.neighbor_node_name
        )
    }
}
