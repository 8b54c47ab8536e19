//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::BTreeSet;

use spine_utils::backoff::ExponentialBackoff;
use spine_utils::kv::PeerSpec;
use spine_utils::task::Task;

// Replication peer of one area.
#[derive(Debug)]
pub struct KvStorePeer {
    pub node_name: String,
    // Peer address (may change across restarts of the peer).
    pub spec: PeerSpec,
    pub state: fsm::State,
    // Retry backoff, advanced on every fall back to IDLE.
    pub backoff: ExponentialBackoff,
    // Keys that changed while this peer was syncing. Flooded to the peer
    // in the last step of the initial sync.
    pub pending_keys_during_initialization: BTreeSet<String>,
    // Number of API errors hit while syncing with the peer.
    pub num_api_errors: i64,
    // In-flight full-sync request. Dropping the handle aborts it, so a
    // deleted peer's late response is never processed.
    pub sync_task: Option<Task<()>>,
}

// Peer synchronization FSM.
pub mod fsm {
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum State {
        #[default]
        Idle,
        Syncing,
        Initialized,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    #[derive(Deserialize, Serialize)]
    pub enum Event {
        PeerAdd,
        SyncRespRcvd,
        ApiError,
        InconsistencyDetected,
        PeerDel,
    }
}

// ===== impl KvStorePeer =====

impl KvStorePeer {
    pub(crate) fn new(
        node_name: String,
        spec: PeerSpec,
        backoff: ExponentialBackoff,
    ) -> KvStorePeer {
        KvStorePeer {
            node_name,
            spec,
            state: fsm::State::Idle,
            backoff,
            pending_keys_during_initialization: Default::default(),
            num_api_errors: 0,
            sync_task: None,
        }
    }
}

// ===== global functions =====

// Computes the next peer state. `Ok(None)` means the peer is deleted;
// `Err(())` flags an event that is invalid in the current state.
pub(crate) fn next_state(
    state: fsm::State,
    event: fsm::Event,
) -> Result<Option<fsm::State>, ()> {
    use fsm::{Event, State};
    match (state, event) {
        (_, Event::PeerDel) => Ok(None),
        (State::Idle, Event::PeerAdd) => Ok(Some(State::Syncing)),
        (State::Syncing | State::Initialized, Event::SyncRespRcvd) => {
            Ok(Some(State::Initialized))
        }
        (State::Syncing | State::Initialized, Event::ApiError) => {
            Ok(Some(State::Idle))
        }
        (State::Syncing | State::Initialized, Event::InconsistencyDetected) => {
            Ok(Some(State::Idle))
        }
        _ => Err(()),
    }
}

// ===== unit tests =====
