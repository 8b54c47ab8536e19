//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use spine_utils::kv::{
    InitializationEvent, KeyDumpParams, KeyGetParams, KeySetParams,
    KeyValueRequest, KvStorePublication, LogSample, PeerEvent, Publication,
    Value,
};
use spine_utils::queue::ReplicateQueue;
use spine_utils::{Receiver, Responder, Sender, counters};

use crate::client::PeerClient;
use crate::error::Error;
use crate::peer::fsm;
use crate::store::KvStoreDb;
use crate::tasks::messages::input::ProtocolMsg;

// KV store configuration knobs.
#[derive(Clone, Debug)]
pub struct KvStoreConfig {
    // Name of this node, unique within the routing domain.
    pub node_name: String,
    // Areas this node participates in.
    pub areas: BTreeSet<String>,
    // Incremental flooding rate; unlimited when unset.
    pub flood_rate: Option<FloodRate>,
    // Milliseconds subtracted from received TTLs.
    pub ttl_decrement: i64,
    // TTL of self-originated keys.
    pub key_ttl: Duration,
    // Peer full-sync retry backoff bounds.
    pub sync_initial_backoff: Duration,
    pub sync_max_backoff: Duration,
    // Peer RPC timeouts.
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

#[derive(Clone, Copy, Debug)]
pub struct FloodRate {
    pub flood_msg_per_sec: f64,
    pub flood_msg_burst_size: f64,
}

// Shared state handed to each per-area database.
#[derive(Clone, Debug)]
pub struct KvStoreParams {
    pub config: Arc<KvStoreConfig>,
    pub updates_queue: ReplicateQueue<KvStorePublication>,
    pub log_sample_queue: ReplicateQueue<LogSample>,
    pub input_tx: Sender<ProtocolMsg>,
}

// Requests served by the KV store API channel.
#[derive(Debug)]
pub enum ApiRequest {
    GetKeyVals {
        area: String,
        params: KeyGetParams,
        responder: Responder<Result<Publication, Error>>,
    },
    SetKeyVals {
        area: String,
        params: KeySetParams,
        responder: Responder<Result<usize, Error>>,
    },
    DumpKeyVals {
        areas: BTreeSet<String>,
        params: KeyDumpParams,
        responder: Responder<Result<Vec<Publication>, Error>>,
    },
    DumpHashes {
        area: String,
        params: KeyDumpParams,
        responder: Responder<Result<Publication, Error>>,
    },
    DumpSelfOriginated {
        area: String,
        responder: Responder<Result<BTreeMap<String, Value>, Error>>,
    },
    GetPeers {
        area: String,
        responder: Responder<
            Result<BTreeMap<String, (spine_utils::kv::PeerSpec, fsm::State)>, Error>,
        >,
    },
    GetPeerState {
        area: String,
        peer_name: String,
        responder: Responder<Result<Option<fsm::State>, Error>>,
    },
    ReportPeerInconsistency {
        area: String,
        peer_name: String,
        responder: Responder<Result<(), Error>>,
    },
    GetCounters {
        responder: Responder<BTreeMap<String, i64>>,
    },
    Stop,
}

/// Multi-area KV store.
///
/// Owns one `KvStoreDb` per area and runs the event loop demultiplexing
/// peer events, key-value requests, API requests, and internal task
/// messages by area.
#[derive(Debug)]
pub struct KvStore<C: PeerClient> {
    params: KvStoreParams,
    store_dbs: BTreeMap<String, KvStoreDb<C>>,
    peer_updates_rx: Receiver<PeerEvent>,
    kv_requests_rx: Receiver<KeyValueRequest>,
    api_rx: Receiver<ApiRequest>,
    input_rx: Receiver<ProtocolMsg>,
    // No initialization verdict is reached before the first peer event.
    peer_events_received: bool,
    initial_sync_signal_sent: bool,
}

// Cloneable handle submitting API requests to a running KV store.
#[derive(Clone, Debug)]
pub struct KvStoreHandle {
    api_tx: Sender<ApiRequest>,
}

// ===== impl KvStoreConfig =====

impl KvStoreConfig {
    pub fn new(node_name: &str, areas: BTreeSet<String>) -> KvStoreConfig {
        KvStoreConfig {
            node_name: node_name.to_owned(),
            areas,
            flood_rate: None,
            ttl_decrement: 1,
            key_ttl: Duration::from_secs(300),
            sync_initial_backoff: Duration::from_secs(8),
            sync_max_backoff: Duration::from_secs(3600),
            connect_timeout: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

// ===== impl KvStore =====

impl<C> KvStore<C>
where
    C: PeerClient,
{
    pub fn new(
        config: KvStoreConfig,
        peer_updates_rx: Receiver<PeerEvent>,
        kv_requests_rx: Receiver<KeyValueRequest>,
        updates_queue: ReplicateQueue<KvStorePublication>,
        log_sample_queue: ReplicateQueue<LogSample>,
    ) -> (KvStore<C>, KvStoreHandle) {
        let (api_tx, api_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let params = KvStoreParams {
            config: Arc::new(config),
            updates_queue,
            log_sample_queue,
            input_tx,
        };

        let store_dbs = params
            .config
            .areas
            .iter()
            .map(|area| {
                (area.clone(), KvStoreDb::new(area, params.clone()))
            })
            .collect();

        let kvstore = KvStore {
            params,
            store_dbs,
            peer_updates_rx,
            kv_requests_rx,
            api_rx,
            input_rx,
            peer_events_received: false,
            initial_sync_signal_sent: false,
        };
        (kvstore, KvStoreHandle { api_tx })
    }

    // Runs the event loop until stopped or until every input channel is
    // closed.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(event) = self.peer_updates_rx.recv() => {
                    self.process_peer_updates(event);
                }
                Some(request) = self.kv_requests_rx.recv() => {
                    self.process_key_value_request(request);
                }
                Some(msg) = self.input_rx.recv() => {
                    self.process_protocol_msg(msg);
                }
                Some(request) = self.api_rx.recv() => {
                    if !self.process_api_request(request) {
                        break;
                    }
                }
                else => break,
            }
            self.check_initial_sync();
        }
    }

    fn db_mut(&mut self, area: &str) -> Result<&mut KvStoreDb<C>, Error> {
        self.store_dbs
            .get_mut(area)
            .ok_or_else(|| Error::UnknownArea(area.to_owned()))
    }

    fn db(&self, area: &str) -> Result<&KvStoreDb<C>, Error> {
        self.store_dbs
            .get(area)
            .ok_or_else(|| Error::UnknownArea(area.to_owned()))
    }

    // Demultiplexes a peer topology event into the per-area database.
    fn process_peer_updates(&mut self, event: PeerEvent) {
        self.peer_events_received = true;
        match self.db_mut(&event.area) {
            Ok(db) => {
                if !event.peers_to_add.is_empty() {
                    db.add_peers(event.peers_to_add);
                }
                if !event.peers_to_del.is_empty() {
                    db.del_peers(event.peers_to_del);
                }
            }
            Err(error) => error.log(),
        }
    }

    // Demultiplexes a self-originated key request into the per-area
    // database.
    fn process_key_value_request(&mut self, request: KeyValueRequest) {
        let result = match request {
            KeyValueRequest::Persist { area, key, value } => self
                .db_mut(&area)
                .map(|db| db.persist_self_originated_key(key, value)),
            KeyValueRequest::Set {
                area,
                key,
                value,
                version,
            } => self
                .db_mut(&area)
                .map(|db| db.set_self_originated_key(key, value, version)),
            KeyValueRequest::Unset { area, key, value } => self
                .db_mut(&area)
                .map(|db| db.unset_self_originated_key(key, value)),
            KeyValueRequest::Erase { area, key } => self
                .db_mut(&area)
                .map(|db| db.erase_self_originated_key(&key)),
        };
        if let Err(error) = result {
            error.log();
        }
    }

    // Routes an internal task message to its area database.
    fn process_protocol_msg(&mut self, msg: ProtocolMsg) {
        let result = match msg {
            ProtocolMsg::SyncResponse(msg) => {
                self.db_mut(&msg.area).map(|db| {
                    db.process_sync_response(
                        &msg.peer_name,
                        msg.result,
                        msg.duration,
                    )
                })
            }
            ProtocolMsg::FloodResponse(msg) => {
                self.db_mut(&msg.area).map(|db| {
                    db.process_flood_response(&msg.peer_name, msg.result)
                })
            }
            ProtocolMsg::SyncTimer(msg) => {
                self.db_mut(&msg.area).map(|db| db.request_peer_syncs())
            }
            ProtocolMsg::TtlExpiry(msg) => self
                .db_mut(&msg.area)
                .map(|db| db.cleanup_ttl_countdown_queue()),
            ProtocolMsg::FloodDrain(msg) => self
                .db_mut(&msg.area)
                .map(|db| db.flood_buffered_updates()),
            ProtocolMsg::SelfAdvertise(msg) => self
                .db_mut(&msg.area)
                .map(|db| db.advertise_self_originated_keys()),
            ProtocolMsg::SelfUnset(msg) => self
                .db_mut(&msg.area)
                .map(|db| db.unset_pending_self_originated_keys()),
            ProtocolMsg::TtlRefresh(msg) => {
                self.db_mut(&msg.area).map(|db| db.advertise_ttl_updates())
            }
        };
        if let Err(error) = result {
            error.log();
        }
    }

    // Serves one API request. Returns false when the store should stop.
    fn process_api_request(&mut self, request: ApiRequest) -> bool {
        match request {
            ApiRequest::GetKeyVals {
                area,
                params,
                responder,
            } => {
                let result =
                    self.db(&area).map(|db| db.get_key_vals(&params.keys));
                let _ = responder.send(result);
            }
            ApiRequest::SetKeyVals {
                area,
                params,
                responder,
            } => {
                let result = self.db_mut(&area).map(|db| {
                    let publication = Publication {
                        area: area.clone(),
                        key_vals: params.key_vals,
                        node_ids: params.node_ids,
                        flood_root_id: params.flood_root_id,
                        ..Default::default()
                    };
                    db.merge_publication(publication, false, params.sender_id)
                });
                let _ = responder.send(result);
            }
            ApiRequest::DumpKeyVals {
                areas,
                params,
                responder,
            } => {
                let result = if areas.is_empty() {
                    Ok(self
                        .store_dbs
                        .values()
                        .map(|db| db.dump_key_vals(&params))
                        .collect())
                } else {
                    areas
                        .iter()
                        .map(|area| {
                            self.db(area).map(|db| db.dump_key_vals(&params))
                        })
                        .collect()
                };
                let _ = responder.send(result);
            }
            ApiRequest::DumpHashes {
                area,
                params,
                responder,
            } => {
                let result = self.db(&area).map(|db| db.dump_hashes(&params));
                let _ = responder.send(result);
            }
            ApiRequest::DumpSelfOriginated { area, responder } => {
                let result =
                    self.db(&area).map(|db| db.dump_self_originated());
                let _ = responder.send(result);
            }
            ApiRequest::GetPeers { area, responder } => {
                let result = self.db(&area).map(|db| db.dump_peers());
                let _ = responder.send(result);
            }
            ApiRequest::GetPeerState {
                area,
                peer_name,
                responder,
            } => {
                let result =
                    self.db(&area).map(|db| db.get_peer_state(&peer_name));
                let _ = responder.send(result);
            }
            ApiRequest::ReportPeerInconsistency {
                area,
                peer_name,
                responder,
            } => {
                let result = self
                    .db_mut(&area)
                    .map(|db| db.report_peer_inconsistency(&peer_name));
                let _ = responder.send(result);
            }
            ApiRequest::GetCounters { responder } => {
                let mut all_counters = counters::snapshot();
                for db in self.store_dbs.values() {
                    all_counters.extend(db.get_counters());
                }
                let _ = responder.send(all_counters);
            }
            ApiRequest::Stop => return false,
        }
        true
    }

    // Publishes the initialization signal once every area finished its
    // initial sync.
    fn check_initial_sync(&mut self) {
        if !self.peer_events_received || self.initial_sync_signal_sent {
            return;
        }
        for db in self.store_dbs.values_mut() {
            db.process_initialization_event();
        }
        if self
            .store_dbs
            .values()
            .all(|db| db.initial_sync_completed())
        {
            self.initial_sync_signal_sent = true;
            debug!("initial KV store sync completed in all areas");
            self.params.updates_queue.publish(
                KvStorePublication::Initialization(
                    InitializationEvent::KvStoreSynced,
                ),
            );
        }
    }
}

// ===== impl KvStoreHandle =====

impl KvStoreHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(Responder<T>) -> ApiRequest,
    ) -> Result<T, Error> {
        let (responder, response_rx) = oneshot::channel();
        self.api_tx
            .send(build(responder))
            .map_err(|_| Error::StoreShutdown)?;
        response_rx.await.map_err(|_| Error::StoreShutdown)
    }

    pub async fn get_key_vals(
        &self,
        area: &str,
        params: KeyGetParams,
    ) -> Result<Publication, Error> {
        let area = area.to_owned();
        self.request(|responder| ApiRequest::GetKeyVals {
            area,
            params,
            responder,
        })
        .await?
    }

    pub async fn set_key_vals(
        &self,
        area: &str,
        params: KeySetParams,
    ) -> Result<usize, Error> {
        let area = area.to_owned();
        self.request(|responder| ApiRequest::SetKeyVals {
            area,
            params,
            responder,
        })
        .await?
    }

    pub async fn dump_key_vals(
        &self,
        areas: BTreeSet<String>,
        params: KeyDumpParams,
    ) -> Result<Vec<Publication>, Error> {
        self.request(|responder| ApiRequest::DumpKeyVals {
            areas,
            params,
            responder,
        })
        .await?
    }

    pub async fn dump_hashes(
        &self,
        area: &str,
        params: KeyDumpParams,
    ) -> Result<Publication, Error> {
        let area = area.to_owned();
        self.request(|responder| ApiRequest::DumpHashes {
            area,
            params,
            responder,
        })
        .await?
    }

    pub async fn dump_self_originated(
        &self,
        area: &str,
    ) -> Result<BTreeMap<String, Value>, Error> {
        let area = area.to_owned();
        self.request(|responder| ApiRequest::DumpSelfOriginated {
            area,
            responder,
        })
        .await?
    }

    pub async fn get_peers(
        &self,
        area: &str,
    ) -> Result<BTreeMap<String, (spine_utils::kv::PeerSpec, fsm::State)>, Error>
    {
        let area = area.to_owned();
        self.request(|responder| ApiRequest::GetPeers { area, responder })
            .await?
    }

    pub async fn get_peer_state(
        &self,
        area: &str,
        peer_name: &str,
    ) -> Result<Option<fsm::State>, Error> {
        let area = area.to_owned();
        let peer_name = peer_name.to_owned();
        self.request(|responder| ApiRequest::GetPeerState {
            area,
            peer_name,
            responder,
        })
        .await?
    }

    pub async fn report_peer_inconsistency(
        &self,
        area: &str,
        peer_name: &str,
    ) -> Result<(), Error> {
        let area = area.to_owned();
        let peer_name = peer_name.to_owned();
        self.request(|responder| ApiRequest::ReportPeerInconsistency {
            area,
            peer_name,
            responder,
        })
        .await?
    }

    pub async fn get_counters(&self) -> Result<BTreeMap<String, i64>, Error> {
        self.request(|responder| ApiRequest::GetCounters { responder })
            .await
    }

    // Requests the event loop to stop.
    pub fn stop(&self) {
        if self.api_tx.send(ApiRequest::Stop).is_err() {
            warn!("KV store is already stopped");
        }
    }
}
