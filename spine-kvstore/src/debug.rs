//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::debug;

use spine_utils::kv::PeerSpec;

use crate::peer::fsm;

// KV store debug messages.
#[derive(Debug)]
pub enum Debug<'a> {
    // Peers
    PeerAdd(&'a str, &'a PeerSpec),
    PeerDel(&'a str),
    PeerStateTransition(&'a str, &'a fsm::State, &'a fsm::State),
    // Full sync
    FullSyncRequest(&'a str),
    FullSyncSuccess(&'a str, usize),
    FinalizeFullSync(&'a str, usize),
    InitialSyncComplete(&'a str),
    // Flooding
    FloodPublication(usize, usize),
    BufferPublication(usize),
    // TTL management
    TtlExpiry(usize),
    SelfOriginatedAdvertise(usize),
}

// ===== impl Debug =====

impl Debug<'_> {
    // Log debug message using the tracing API.
    pub fn log(&self) {
        match self {
            Debug::PeerAdd(peer_name, spec) => {
                debug!(%peer_name, ?spec, "{}", self);
            }
            Debug::PeerDel(peer_name) => {
                debug!(%peer_name, "{}", self);
            }
            Debug::PeerStateTransition(peer_name, old_state, new_state) => {
                debug!(%peer_name, ?old_state, ?new_state, "{}", self);
            }
            Debug::FullSyncRequest(peer_name) => {
                debug!(%peer_name, "{}", self);
            }
            Debug::FullSyncSuccess(peer_name, num_updates) => {
                debug!(%peer_name, %num_updates, "{}", self);
            }
            Debug::FinalizeFullSync(peer_name, num_keys) => {
                debug!(%peer_name, %num_keys, "{}", self);
            }
            Debug::InitialSyncComplete(area) => {
                debug!(%area, "{}", self);
            }
            Debug::FloodPublication(num_peers, num_keys) => {
                debug!(%num_peers, %num_keys, "{}", self);
            }
            Debug::BufferPublication(num_keys) => {
                debug!(%num_keys, "{}", self);
            }
            Debug::TtlExpiry(num_keys) => {
                debug!(%num_keys, "{}", self);
            }
            Debug::SelfOriginatedAdvertise(num_keys) => {
                debug!(%num_keys, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Debug<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Debug::PeerAdd(..) => {
                write!(f, "peer added")
            }
            Debug::PeerDel(..) => {
                write!(f, "peer deleted")
            }
            Debug::PeerStateTransition(..) => {
                write!(f, "peer state transition")
            }
            Debug::FullSyncRequest(..) => {
                write!(f, "full sync requested")
            }
            Debug::FullSyncSuccess(..) => {
                write!(f, "full sync response merged")
            }
            Debug::FinalizeFullSync(..) => {
                write!(f, "finalizing full sync")
            }
            Debug::InitialSyncComplete(..) => {
                write!(f, "initial sync completed with all peers")
            }
            Debug::FloodPublication(..) => {
                write!(f, "flooding publication")
            }
            Debug::BufferPublication(..) => {
                write!(f, "rate limited publication buffered")
            }
            Debug::TtlExpiry(..) => {
                write!(f, "expired keys removed")
            }
            Debug::SelfOriginatedAdvertise(..) => {
                write!(f, "advertising self-originated keys")
            }
        }
    }
}
