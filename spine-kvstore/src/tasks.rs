//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::{Duration, Instant};

use spine_utils::Sender;
use spine_utils::kv::{KeyDumpParams, KeySetParams, PeerSpec};
use spine_utils::task::{IntervalTask, Task, TimeoutTask};

use crate::client::{ClientError, PeerClient};
use crate::tasks::messages::input::{
    AreaMsg, FloodResponseMsg, ProtocolMsg, SyncResponseMsg,
};

//
// KV store tasks diagram:
//
//                   peer_sync_request (Nx) -> +--------------+
//                          peer_flood (Nx) -> |              |
//                          area timers (6x):  |              |
//                 sync / ttl / flood-drain -> |   instance   |
//        self-advertise / self-unset /        |              |
//                              ttl-refresh -> |              |
//                                             +--------------+
//                      peer_updates_queue | kv_request_queue | api
//

// KV store inter-task message types.
pub mod messages {
    // Type aliases.
    pub type ProtocolInputMsg = input::ProtocolMsg;

    // Input messages (child task -> main task).
    pub mod input {
        use std::time::Duration;

        use spine_utils::kv::Publication;

        use crate::client::ClientError;

        #[derive(Debug)]
        pub enum ProtocolMsg {
            // Full-sync response from a peer.
            SyncResponse(SyncResponseMsg),
            // Completion of a flood submission toward a peer.
            FloodResponse(FloodResponseMsg),
            // Scan for IDLE peers ready to sync.
            SyncTimer(AreaMsg),
            // Earliest TTL expiry is due.
            TtlExpiry(AreaMsg),
            // Rate limiter has tokens for buffered publications.
            FloodDrain(AreaMsg),
            // Throttled advertisement of self-originated keys.
            SelfAdvertise(AreaMsg),
            // Throttled unset of self-originated keys.
            SelfUnset(AreaMsg),
            // Self-originated keys are due for a TTL refresh.
            TtlRefresh(AreaMsg),
        }

        #[derive(Debug)]
        pub struct AreaMsg {
            pub area: String,
        }

        #[derive(Debug)]
        pub struct SyncResponseMsg {
            pub area: String,
            pub peer_name: String,
            pub result: Result<Publication, ClientError>,
            pub duration: Duration,
        }

        #[derive(Debug)]
        pub struct FloodResponseMsg {
            pub area: String,
            pub peer_name: String,
            pub result: Result<(), ClientError>,
        }
    }
}

// ===== KV store tasks =====

// Issues the first leg of a three-way full sync toward a peer.
pub(crate) fn peer_sync_request<C>(
    area: &str,
    peer_name: &str,
    spec: PeerSpec,
    params: KeyDumpParams,
    connect_timeout: Duration,
    request_timeout: Duration,
    input_tx: &Sender<ProtocolMsg>,
) -> Task<()>
where
    C: PeerClient,
{
    let area = area.to_owned();
    let peer_name = peer_name.to_owned();
    let input_tx = input_tx.clone();

    Task::spawn(async move {
        let started = Instant::now();
        let result = async {
            let client = C::connect(&spec, connect_timeout).await?;
            match tokio::time::timeout(
                request_timeout,
                client.get_key_vals(&area, params),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            }
        }
        .await;

        let _ = input_tx.send(ProtocolMsg::SyncResponse(SyncResponseMsg {
            area,
            peer_name,
            result,
            duration: started.elapsed(),
        }));
    })
}

// Submits key-values to a peer (incremental flooding or full-sync
// finalization).
pub(crate) fn peer_flood<C>(
    area: &str,
    peer_name: &str,
    spec: PeerSpec,
    params: KeySetParams,
    connect_timeout: Duration,
    request_timeout: Duration,
    input_tx: &Sender<ProtocolMsg>,
) -> Task<()>
where
    C: PeerClient,
{
    let area = area.to_owned();
    let peer_name = peer_name.to_owned();
    let input_tx = input_tx.clone();

    Task::spawn(async move {
        let result = async {
            let client = C::connect(&spec, connect_timeout).await?;
            match tokio::time::timeout(
                request_timeout,
                client.set_key_vals(&area, params),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            }
        }
        .await;

        let _ = input_tx.send(ProtocolMsg::FloodResponse(FloodResponseMsg {
            area,
            peer_name,
            result,
        }));
    })
}

// Sends an area-scoped timer event after the given delay.
pub(crate) fn area_timeout(
    area: &str,
    timeout: Duration,
    event: fn(AreaMsg) -> ProtocolMsg,
    input_tx: &Sender<ProtocolMsg>,
) -> TimeoutTask {
    let area = area.to_owned();
    let input_tx = input_tx.clone();

    TimeoutTask::create(timeout, move || {
        let msg = event(AreaMsg { area });
        async move {
            let _ = input_tx.send(msg);
        }
    })
}

// Sends an area-scoped timer event on every interval tick.
pub(crate) fn area_interval(
    area: &str,
    interval: Duration,
    event: fn(AreaMsg) -> ProtocolMsg,
    input_tx: &Sender<ProtocolMsg>,
) -> IntervalTask {
    let area = area.to_owned();
    let input_tx = input_tx.clone();

    IntervalTask::create(interval, false, move || {
        let msg = event(AreaMsg { area: area.clone() });
        let input_tx = input_tx.clone();
        async move {
            let _ = input_tx.send(msg);
        }
    })
}
