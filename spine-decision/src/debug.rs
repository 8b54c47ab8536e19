//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use ipnetwork::IpNetwork;
use tracing::debug;

// Decision debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // LSDB maintenance
    AdjDbUpdate(&'a str, &'a str),
    AdjDbDelete(&'a str),
    LinkUp(&'a str),
    LinkDown(&'a str),
    LinkMetricChange(&'a str, u64, u64),
    LinkOverloadChange(&'a str, bool, bool),
    // SPF
    SpfRun(&'a str),
    // Route computation
    RouteBuildStart,
    RouteBuildComplete(usize, usize),
    NoRouteToPrefix(&'a IpNetwork),
    SkipLocalPrefix(&'a IpNetwork),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub fn log(&self) {
        match self {
            Debug::AdjDbUpdate(node_name, area) => {
                debug!(%node_name, %area, "{}", self);
            }
            Debug::AdjDbDelete(node_name) => {
                debug!(%node_name, "{}", self);
            }
            Debug::LinkUp(link) | Debug::LinkDown(link) => {
                debug!(%link, "{}", self);
            }
            Debug::LinkMetricChange(link, old, new) => {
                debug!(%link, %old, %new, "{}", self);
            }
            Debug::LinkOverloadChange(link, old, new) => {
                debug!(%link, %old, %new, "{}", self);
            }
            Debug::SpfRun(node_name) => {
                debug!(%node_name, "{}", self);
            }
            Debug::RouteBuildStart => {
                debug!("{}", self);
            }
            Debug::RouteBuildComplete(unicast, mpls) => {
                debug!(%unicast, %mpls, "{}", self);
            }
            Debug::NoRouteToPrefix(prefix) | Debug::SkipLocalPrefix(prefix) => {
                debug!(%prefix, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::AdjDbUpdate(..) => {
                write!(f, "adjacency database update")
            }
            Debug::AdjDbDelete(..) => {
                write!(f, "adjacency database delete")
            }
            Debug::LinkUp(..) => {
                write!(f, "link up")
            }
            Debug::LinkDown(..) => {
                write!(f, "link down")
            }
            Debug::LinkMetricChange(..) => {
                write!(f, "link metric change")
            }
            Debug::LinkOverloadChange(..) => {
                write!(f, "link overload change")
            }
            Debug::SpfRun(..) => {
                write!(f, "SPF run")
            }
            Debug::RouteBuildStart => {
                write!(f, "route build started")
            }
            Debug::RouteBuildComplete(..) => {
                write!(f, "route build complete")
            }
            Debug::NoRouteToPrefix(..) => {
                write!(f, "no route to prefix")
            }
            Debug::SkipLocalPrefix(..) => {
                write!(f, "skipping route for locally advertised prefix")
            }
        }
    }
}
