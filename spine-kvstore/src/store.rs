//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::warn;

use spine_utils::backoff::ExponentialBackoff;
use spine_utils::counters;
use spine_utils::kv::{
    KeyDumpParams, KeySetParams, KvStorePublication, LogSample, PeerSpec,
    Publication, TTL_INFINITY, Value,
};
use spine_utils::task::{IntervalTask, TimeoutTask};

use crate::client::{ClientError, PeerClient};
use crate::debug::Debug;
use crate::error::Error;
use crate::instance::KvStoreParams;
use crate::peer::{KvStorePeer, fsm, next_state};
use crate::tasks;
use crate::tasks::messages::input::ProtocolMsg;

// Throttle interval for batched self-originated key advertisements.
const SELF_ADVERTISE_THROTTLE: Duration = Duration::from_millis(100);
// Initial and maximum backoff for re-advertising persisted keys.
const KEY_ADVERTISE_INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const KEY_ADVERTISE_MAX_BACKOFF: Duration = Duration::from_secs(8);
// Upper bound on concurrent full syncs over the peer transport.
const MAX_PARALLEL_SYNCS: usize = 32;

// A value this node originates, with its advertisement and TTL-refresh
// backoffs.
#[derive(Debug)]
pub struct SelfOriginatedValue {
    pub value: Value,
    // Backoff gating re-advertisement. Only present for persisted keys,
    // which are authoritatively defended against other originators.
    pub key_backoff: Option<ExponentialBackoff>,
    // Backoff scheduling TTL refreshes ahead of expiry.
    pub ttl_backoff: ExponentialBackoff,
}

// Entry of the TTL countdown queue, ordered by expiry time.
#[derive(Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
struct TtlEntry {
    expiry: Instant,
    key: String,
    version: u64,
    originator_id: String,
    ttl_version: u64,
}

// Refill-on-demand token bucket limiting flood throughput.
#[derive(Debug)]
struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
}

// Outcome of merging one received key-value against the local store.
enum MergeOutcome {
    FullUpdate,
    TtlUpdate,
    NoUpdate,
}

/// Per-area KV store database.
///
/// Holds the replicated key-value map, the peer set with its sync FSM, the
/// TTL countdown queue, the flood rate limiter, and the node's
/// self-originated keys.
#[derive(Debug)]
pub struct KvStoreDb<C> {
    area: String,
    params: KvStoreParams,
    kv_store: BTreeMap<String, Value>,
    peers: BTreeMap<String, KvStorePeer>,
    initial_sync_completed: bool,
    parallel_sync_limit: usize,
    sync_timer: Option<TimeoutTask>,
    // TTL countdown.
    ttl_countdown_queue: BTreeSet<TtlEntry>,
    ttl_countdown_timer: Option<TimeoutTask>,
    // Flood rate limiting.
    flood_limiter: Option<TokenBucket>,
    // Keys pending flood, coalesced per flood root.
    publication_buffer: BTreeMap<Option<String>, BTreeSet<String>>,
    pending_publication_timer: Option<TimeoutTask>,
    // Self-originated keys.
    self_originated: BTreeMap<String, SelfOriginatedValue>,
    keys_to_advertise: BTreeSet<String>,
    keys_to_unset: BTreeMap<String, Value>,
    advertise_timer: Option<TimeoutTask>,
    unset_timer: Option<TimeoutTask>,
    ttl_refresh_timer: Option<IntervalTask>,
    _client: PhantomData<fn() -> C>,
}

// ===== impl TokenBucket =====

impl TokenBucket {
    fn new(rate: f64, burst: f64) -> TokenBucket {
        TokenBucket {
            rate,
            burst,
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let elapsed = self.last_refill.elapsed().as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last_refill = Instant::now();
    }

    fn consume(&mut self, tokens: f64) -> bool {
        self.refill();
        if self.tokens >= tokens {
            self.tokens -= tokens;
            return true;
        }
        false
    }

    fn time_until_available(&mut self, tokens: f64) -> Duration {
        self.refill();
        if self.tokens >= tokens {
            return Duration::ZERO;
        }
        Duration::from_secs_f64((tokens - self.tokens) / self.rate)
    }
}

// ===== impl KvStoreDb =====

impl<C> KvStoreDb<C>
where
    C: PeerClient,
{
    pub(crate) fn new(area: &str, params: KvStoreParams) -> KvStoreDb<C> {
        let flood_limiter = params.config.flood_rate.map(|rate| {
            TokenBucket::new(rate.flood_msg_per_sec, rate.flood_msg_burst_size)
        });
        KvStoreDb {
            area: area.to_owned(),
            params,
            kv_store: Default::default(),
            peers: Default::default(),
            initial_sync_completed: false,
            parallel_sync_limit: 2,
            sync_timer: None,
            ttl_countdown_queue: Default::default(),
            ttl_countdown_timer: None,
            flood_limiter,
            publication_buffer: Default::default(),
            pending_publication_timer: None,
            self_originated: Default::default(),
            keys_to_advertise: Default::default(),
            keys_to_unset: Default::default(),
            advertise_timer: None,
            unset_timer: None,
            ttl_refresh_timer: None,
            _client: PhantomData,
        }
    }

    pub(crate) fn area(&self) -> &str {
        &self.area
    }

    fn node_name(&self) -> String {
        self.params.config.node_name.clone()
    }

    pub(crate) fn initial_sync_completed(&self) -> bool {
        self.initial_sync_completed
    }

    // ===== data storage and merge =====

    // Merges one received value against the stored one by the
    // (version, originator, hash) tuple in strictly descending priority.
    fn merge_key_value(&mut self, key: &str, rcvd: Value) -> MergeOutcome {
        let outcome = match self.kv_store.get(key) {
            None => {
                if rcvd.value.is_some() {
                    MergeOutcome::FullUpdate
                } else {
                    // A TTL refresh for an unknown key cannot be accepted.
                    MergeOutcome::NoUpdate
                }
            }
            Some(current) => {
                if rcvd.version != current.version {
                    if rcvd.version > current.version && rcvd.value.is_some() {
                        MergeOutcome::FullUpdate
                    } else {
                        MergeOutcome::NoUpdate
                    }
                } else if rcvd.originator_id != current.originator_id {
                    if rcvd.originator_id > current.originator_id
                        && rcvd.value.is_some()
                    {
                        MergeOutcome::FullUpdate
                    } else {
                        MergeOutcome::NoUpdate
                    }
                } else if rcvd.value.is_some() && rcvd.hash > current.hash {
                    MergeOutcome::FullUpdate
                } else if rcvd.ttl_version > current.ttl_version {
                    MergeOutcome::TtlUpdate
                } else {
                    MergeOutcome::NoUpdate
                }
            }
        };

        match &outcome {
            MergeOutcome::FullUpdate => {
                self.update_ttl_countdown_queue(key, &rcvd);
                self.kv_store.insert(key.to_owned(), rcvd);
            }
            MergeOutcome::TtlUpdate => {
                let current = self.kv_store.get_mut(key).unwrap();
                current.ttl = rcvd.ttl;
                current.ttl_version = rcvd.ttl_version;
                let current = current.clone();
                self.update_ttl_countdown_queue(key, &current);
            }
            MergeOutcome::NoUpdate => (),
        }
        outcome
    }

    // Merges a received publication into the local store, floods the
    // resulting delta, and serves the full-sync third leg when the sender
    // requests keys back.
    //
    // Returns the number of effective changes.
    pub(crate) fn merge_publication(
        &mut self,
        publication: Publication,
        is_self_originated: bool,
        sender_id: Option<String>,
    ) -> usize {
        counters::inc("kvstore.received_publications");

        // Flood-loop guard: drop publications that already traversed this
        // node.
        let node_name = self.node_name();
        if publication.node_ids.contains(&node_name) {
            counters::inc("kvstore.looped_publications");
            return 0;
        }

        let mut delta: BTreeMap<String, Value> = BTreeMap::new();
        for (key, rcvd) in &publication.key_vals {
            let mut rcvd = rcvd.clone();

            // Received TTLs are decremented to bound replication lifetime.
            if !is_self_originated && rcvd.ttl != TTL_INFINITY {
                rcvd.ttl -= self.params.config.ttl_decrement;
                if rcvd.ttl <= 0 {
                    continue;
                }
            }

            match self.merge_key_value(key, rcvd) {
                MergeOutcome::FullUpdate => {
                    delta.insert(key.clone(), self.kv_store[key].clone());
                }
                MergeOutcome::TtlUpdate => {
                    // TTL-only refreshes are published without the payload
                    // so consumers can skip them.
                    delta
                        .insert(key.clone(), self.kv_store[key].to_hash_only());
                }
                MergeOutcome::NoUpdate => (),
            }
        }

        let num_updates = delta.len();
        counters::add("kvstore.updated_key_vals", num_updates as i64);

        // Defend persisted self-originated keys that lost to another
        // originator or a higher version.
        self.process_publication_for_self_originated_keys(&delta);

        if !delta.is_empty() {
            let mut node_ids = publication.node_ids.clone();
            node_ids.push(node_name);
            let delta_publication = Publication {
                area: self.area.clone(),
                key_vals: delta,
                expired_keys: Vec::new(),
                node_ids,
                tobe_updated_keys: None,
                flood_root_id: publication.flood_root_id.clone(),
            };
            self.params
                .updates_queue
                .publish(KvStorePublication::Update(delta_publication.clone()));
            self.flood_publication(
                delta_publication,
                !is_self_originated,
                sender_id.clone(),
            );
        }

        // Third leg of the full sync: reply with the key-values the sender
        // found missing or outdated on its side.
        if let Some(sender_id) = sender_id {
            if let Some(tobe_updated_keys) = &publication.tobe_updated_keys {
                if !tobe_updated_keys.is_empty() {
                    self.finalize_full_sync(
                        &sender_id,
                        tobe_updated_keys.clone(),
                    );
                }
            }
        }

        num_updates
    }

    // Returns the requested key-values.
    pub(crate) fn get_key_vals(&self, keys: &[String]) -> Publication {
        let mut publication = Publication {
            area: self.area.clone(),
            ..Default::default()
        };
        for key in keys {
            if let Some(value) = self.kv_store.get(key) {
                publication.key_vals.insert(key.clone(), value.clone());
            }
        }
        publication
    }

    // Dumps key-values matching the given filters. When the requester
    // includes its digest, only newer entries are returned and the keys the
    // requester should send back are collected.
    pub(crate) fn dump_key_vals(&self, params: &KeyDumpParams) -> Publication {
        let mut publication = Publication {
            area: self.area.clone(),
            node_ids: vec![self.params.config.node_name.clone()],
            ..Default::default()
        };

        let mut tobe_updated_keys = Vec::new();
        for (key, value) in &self.kv_store {
            if !params.prefixes.is_empty()
                && !params.prefixes.iter().any(|prefix| key.starts_with(prefix))
            {
                continue;
            }
            if !params.originator_ids.is_empty()
                && !params.originator_ids.contains(&value.originator_id)
            {
                continue;
            }

            match params
                .keyval_hash_map
                .as_ref()
                .and_then(|digest| digest.get(key))
            {
                Some(theirs) => {
                    let ours =
                        (value.version, &value.originator_id, value.hash);
                    let theirs =
                        (theirs.version, &theirs.originator_id, theirs.hash);
                    match ours.cmp(&theirs) {
                        std::cmp::Ordering::Greater => {
                            publication
                                .key_vals
                                .insert(key.clone(), value.clone());
                        }
                        std::cmp::Ordering::Less => {
                            tobe_updated_keys.push(key.clone());
                        }
                        std::cmp::Ordering::Equal => (),
                    }
                }
                None => {
                    publication.key_vals.insert(key.clone(), value.clone());
                }
            }
        }

        if let Some(digest) = &params.keyval_hash_map {
            // Keys we don't hold at all are also wanted from the requester.
            for key in digest.keys() {
                if !self.kv_store.contains_key(key) {
                    tobe_updated_keys.push(key.clone());
                }
            }
            publication.tobe_updated_keys = Some(tobe_updated_keys);
        }

        publication
    }

    // Dumps the digests of all keys matching the given filters.
    pub(crate) fn dump_hashes(&self, params: &KeyDumpParams) -> Publication {
        let mut publication = Publication {
            area: self.area.clone(),
            node_ids: vec![self.params.config.node_name.clone()],
            ..Default::default()
        };
        for (key, value) in &self.kv_store {
            if !params.prefixes.is_empty()
                && !params.prefixes.iter().any(|prefix| key.starts_with(prefix))
            {
                continue;
            }
            publication
                .key_vals
                .insert(key.clone(), value.to_hash_only());
        }
        publication
    }

    pub(crate) fn dump_self_originated(&self) -> BTreeMap<String, Value> {
        self.self_originated
            .iter()
            .map(|(key, sov)| (key.clone(), sov.value.clone()))
            .collect()
    }

    pub(crate) fn get_counters(&self) -> BTreeMap<String, i64> {
        let mut counters = BTreeMap::new();
        counters.insert(
            format!("kvstore.{}.num_keys", self.area),
            self.kv_store.len() as i64,
        );
        counters.insert(
            format!("kvstore.{}.num_peers", self.area),
            self.peers.len() as i64,
        );
        counters.insert(
            format!("kvstore.{}.num_self_originated_keys", self.area),
            self.self_originated.len() as i64,
        );
        counters.insert(
            format!("kvstore.{}.pending_syncs", self.area),
            self.peers
                .values()
                .filter(|peer| peer.state == fsm::State::Syncing)
                .count() as i64,
        );
        counters
    }

    // ===== peer management =====

    pub(crate) fn add_peers(
        &mut self,
        peers_to_add: BTreeMap<String, PeerSpec>,
    ) {
        for (peer_name, spec) in peers_to_add {
            if let Some(peer) = self.peers.get(&peer_name) {
                if peer.spec == spec {
                    continue;
                }
                // The peer's address changed: tear the session down and
                // start over.
                self.peers.remove(&peer_name);
            }
            Debug::PeerAdd(&peer_name, &spec).log();
            let backoff = ExponentialBackoff::new(
                self.params.config.sync_initial_backoff,
                self.params.config.sync_max_backoff,
            );
            self.peers.insert(
                peer_name.clone(),
                KvStorePeer::new(peer_name, spec, backoff),
            );
        }
        self.request_peer_syncs();
    }

    pub(crate) fn del_peers(&mut self, peers_to_del: Vec<String>) {
        for peer_name in peers_to_del {
            Debug::PeerDel(&peer_name).log();
            if self.peers.remove(&peer_name).is_none() {
                warn!(%peer_name, "no such peer to delete");
            }
        }
    }

    pub(crate) fn dump_peers(
        &self,
    ) -> BTreeMap<String, (PeerSpec, fsm::State)> {
        self.peers
            .iter()
            .map(|(peer_name, peer)| {
                (peer_name.clone(), (peer.spec.clone(), peer.state))
            })
            .collect()
    }

    pub(crate) fn get_peer_state(
        &self,
        peer_name: &str,
    ) -> Option<fsm::State> {
        self.peers.get(peer_name).map(|peer| peer.state)
    }

    // Drives the peer FSM. Every fall back to IDLE advances the retry
    // backoff.
    fn peer_state_transition(&mut self, peer_name: &str, event: fsm::Event) {
        let Some(peer) = self.peers.get_mut(peer_name) else {
            return;
        };
        match next_state(peer.state, event) {
            Ok(Some(new_state)) => {
                if new_state != peer.state {
                    Debug::PeerStateTransition(
                        peer_name,
                        &peer.state,
                        &new_state,
                    )
                    .log();
                }
                peer.state = new_state;
                if new_state == fsm::State::Idle {
                    peer.backoff.report_error();
                }
            }
            Ok(None) => {
                self.peers.remove(peer_name);
            }
            Err(()) => {
                Error::PeerFsmUnexpectedEvent(
                    peer_name.to_owned(),
                    peer.state,
                    event,
                )
                .log();
            }
        }
    }

    // Flags a peer that keeps returning conflicting versions; it falls
    // back to IDLE and resyncs from scratch.
    pub(crate) fn report_peer_inconsistency(&mut self, peer_name: &str) {
        counters::inc("kvstore.peer_inconsistencies");
        self.peer_state_transition(
            peer_name,
            fsm::Event::InconsistencyDetected,
        );
        self.request_peer_syncs();
    }

    // ===== three-way full sync =====

    // Scans IDLE peers whose backoff expired and issues full-sync
    // requests, bounded by the parallel sync limit.
    pub(crate) fn request_peer_syncs(&mut self) {
        self.sync_timer = None;

        let mut in_progress = self
            .peers
            .values()
            .filter(|peer| peer.state == fsm::State::Syncing)
            .count();

        let idle_peers = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.state == fsm::State::Idle)
            .map(|(peer_name, _)| peer_name.clone())
            .collect::<Vec<_>>();

        for peer_name in idle_peers {
            if in_progress >= self.parallel_sync_limit {
                break;
            }
            let peer = &self.peers[&peer_name];
            if !peer.backoff.can_try_now() {
                continue;
            }
            let spec = peer.spec.clone();

            // Ship our digest so the peer can compute both directions of
            // the difference.
            let params = KeyDumpParams {
                prefixes: Vec::new(),
                originator_ids: Default::default(),
                keyval_hash_map: Some(
                    self.kv_store
                        .iter()
                        .map(|(key, value)| {
                            (key.clone(), value.to_hash_only())
                        })
                        .collect(),
                ),
                sender_id: Some(self.node_name()),
            };

            Debug::FullSyncRequest(&peer_name).log();
            counters::inc("kvstore.full_sync_requests");
            self.peer_state_transition(&peer_name, fsm::Event::PeerAdd);

            let task = tasks::peer_sync_request::<C>(
                &self.area,
                &peer_name,
                spec,
                params,
                self.params.config.connect_timeout,
                self.params.config.request_timeout,
                &self.params.input_tx,
            );
            self.peers.get_mut(&peer_name).unwrap().sync_task = Some(task);
            in_progress += 1;
        }

        self.schedule_sync_timer();
    }

    // Wakes up when the earliest backoff among the remaining IDLE peers
    // expires.
    fn schedule_sync_timer(&mut self) {
        let delay = self
            .peers
            .values()
            .filter(|peer| peer.state == fsm::State::Idle)
            .map(|peer| peer.backoff.time_remaining_until_retry())
            .filter(|delay| !delay.is_zero())
            .min();
        if let Some(delay) = delay {
            self.sync_timer = Some(tasks::area_timeout(
                &self.area,
                delay,
                ProtocolMsg::SyncTimer,
                &self.params.input_tx,
            ));
        }
    }

    // Handles the second leg of the full sync: the peer's response.
    pub(crate) fn process_sync_response(
        &mut self,
        peer_name: &str,
        result: Result<Publication, ClientError>,
        duration: Duration,
    ) {
        {
            // Late responses of deleted or already-reset peers are
            // discarded.
            let Some(peer) = self.peers.get_mut(peer_name) else {
                return;
            };
            if peer.state != fsm::State::Syncing {
                return;
            }
            peer.sync_task = None;
        }

        match result {
            Ok(publication) => {
                counters::inc("kvstore.full_sync_success");
                if let Some(peer) = self.peers.get_mut(peer_name) {
                    peer.backoff.report_success();
                }
                self.peer_state_transition(peer_name, fsm::Event::SyncRespRcvd);

                // Each successful sync doubles the parallel sync window.
                self.parallel_sync_limit = std::cmp::min(
                    self.parallel_sync_limit * 2,
                    MAX_PARALLEL_SYNCS,
                );

                let num_updates =
                    self.merge_publication(publication, false, Some(peer_name.to_owned()));
                Debug::FullSyncSuccess(peer_name, num_updates).log();
                self.log_sync_event(peer_name, duration, num_updates);

                // Flush keys that changed while this sync was in flight.
                let has_pending = self
                    .peers
                    .get(peer_name)
                    .map(|peer| {
                        !peer.pending_keys_during_initialization.is_empty()
                    })
                    .unwrap_or(false);
                if has_pending {
                    self.finalize_full_sync(peer_name, Vec::new());
                }

                self.process_initialization_event();
                self.request_peer_syncs();
            }
            Err(error) => {
                counters::inc("kvstore.peer_api_errors");
                Error::PeerApiError(peer_name.to_owned(), error).log();
                if let Some(peer) = self.peers.get_mut(peer_name) {
                    peer.num_api_errors += 1;
                }
                self.peer_state_transition(peer_name, fsm::Event::ApiError);
                self.request_peer_syncs();
            }
        }
    }

    // Performs the last leg of the full sync: sends back the key-values
    // the peer needs, plus any keys that changed while the sync was in
    // flight.
    fn finalize_full_sync(&mut self, peer_name: &str, mut keys: Vec<String>) {
        let Some(peer) = self.peers.get_mut(peer_name) else {
            return;
        };
        keys.extend(std::mem::take(
            &mut peer.pending_keys_during_initialization,
        ));
        keys.sort();
        keys.dedup();
        let spec = peer.spec.clone();

        let key_vals = keys
            .into_iter()
            .filter_map(|key| {
                self.kv_store
                    .get(&key)
                    .map(|value| (key, value.clone()))
            })
            .collect::<BTreeMap<_, _>>();
        if key_vals.is_empty() {
            return;
        }

        Debug::FinalizeFullSync(peer_name, key_vals.len()).log();
        counters::inc("kvstore.full_sync_finalized");

        let params = KeySetParams {
            key_vals,
            sender_id: Some(self.node_name()),
            node_ids: vec![self.node_name()],
            flood_root_id: None,
        };
        let mut task = tasks::peer_flood::<C>(
            &self.area,
            peer_name,
            spec,
            params,
            self.params.config.connect_timeout,
            self.params.config.request_timeout,
            &self.params.input_tx,
        );
        task.detach();
    }

    // Marks the initial sync done once every peer reached INITIALIZED
    // (vacuously when the area has no peers). Only fires once.
    pub(crate) fn process_initialization_event(&mut self) {
        if self.initial_sync_completed {
            return;
        }
        let all_initialized = self
            .peers
            .values()
            .all(|peer| peer.state == fsm::State::Initialized);
        if all_initialized {
            self.initial_sync_completed = true;
            Debug::InitialSyncComplete(&self.area).log();
        }
    }

    // ===== flooding =====

    // Floods a publication to all INITIALIZED peers except the sender.
    // Rate-limited publications exceeding the flood rate are buffered.
    fn flood_publication(
        &mut self,
        publication: Publication,
        rate_limited: bool,
        sender_id: Option<String>,
    ) {
        if rate_limited {
            if let Some(limiter) = &mut self.flood_limiter {
                if !limiter.consume(1.0) {
                    self.buffer_publication(publication);
                    return;
                }
            }
        }

        let mut flood_peers = Vec::new();
        for (peer_name, peer) in &mut self.peers {
            if Some(peer_name.as_str()) == sender_id.as_deref() {
                continue;
            }
            match peer.state {
                fsm::State::Initialized => {
                    flood_peers.push((peer_name.clone(), peer.spec.clone()));
                }
                fsm::State::Syncing => {
                    // The peer will receive these keys when its sync
                    // finalizes.
                    peer.pending_keys_during_initialization
                        .extend(publication.key_vals.keys().cloned());
                }
                fsm::State::Idle => (),
            }
        }

        if flood_peers.is_empty() {
            return;
        }
        Debug::FloodPublication(
            flood_peers.len(),
            publication.key_vals.len(),
        )
        .log();
        counters::inc("kvstore.flooded_publications");

        for (peer_name, spec) in flood_peers {
            let params = KeySetParams {
                key_vals: publication.key_vals.clone(),
                sender_id: Some(self.node_name()),
                node_ids: publication.node_ids.clone(),
                flood_root_id: publication.flood_root_id.clone(),
            };
            let mut task = tasks::peer_flood::<C>(
                &self.area,
                &peer_name,
                spec,
                params,
                self.params.config.connect_timeout,
                self.params.config.request_timeout,
                &self.params.input_tx,
            );
            task.detach();
        }
    }

    // Handles the completion of a flood submission toward a peer.
    pub(crate) fn process_flood_response(
        &mut self,
        peer_name: &str,
        result: Result<(), ClientError>,
    ) {
        if let Err(error) = result {
            counters::inc("kvstore.peer_api_errors");
            Error::PeerApiError(peer_name.to_owned(), error).log();
            let Some(peer) = self.peers.get_mut(peer_name) else {
                return;
            };
            peer.num_api_errors += 1;
            if peer.state != fsm::State::Idle {
                self.peer_state_transition(peer_name, fsm::Event::ApiError);
                self.request_peer_syncs();
            }
        }
    }

    // Buffers the keys of a rate-limited publication, coalescing repeated
    // updates of the same key. A timer drains the buffer when tokens
    // become available.
    fn buffer_publication(&mut self, publication: Publication) {
        counters::inc("kvstore.buffered_publications");
        Debug::BufferPublication(publication.key_vals.len()).log();
        self.publication_buffer
            .entry(publication.flood_root_id)
            .or_default()
            .extend(publication.key_vals.into_keys());

        if self.pending_publication_timer.is_none() {
            let delay = self
                .flood_limiter
                .as_mut()
                .map(|limiter| limiter.time_until_available(1.0))
                .unwrap_or(Duration::ZERO);
            self.pending_publication_timer = Some(tasks::area_timeout(
                &self.area,
                delay,
                ProtocolMsg::FloodDrain,
                &self.params.input_tx,
            ));
        }
    }

    // Floods the buffered keys with their latest values.
    pub(crate) fn flood_buffered_updates(&mut self) {
        self.pending_publication_timer = None;
        let buffer = std::mem::take(&mut self.publication_buffer);
        for (flood_root_id, keys) in buffer {
            let key_vals = keys
                .into_iter()
                .filter_map(|key| {
                    self.kv_store
                        .get(&key)
                        .map(|value| (key, value.clone()))
                })
                .collect::<BTreeMap<_, _>>();
            if key_vals.is_empty() {
                continue;
            }
            let publication = Publication {
                area: self.area.clone(),
                key_vals,
                expired_keys: Vec::new(),
                node_ids: vec![self.node_name()],
                tobe_updated_keys: None,
                flood_root_id,
            };
            self.flood_publication(publication, true, None);
        }
    }

    // ===== TTL management =====

    fn update_ttl_countdown_queue(&mut self, key: &str, value: &Value) {
        if value.ttl == TTL_INFINITY {
            return;
        }
        self.ttl_countdown_queue.insert(TtlEntry {
            expiry: Instant::now() + Duration::from_millis(value.ttl as u64),
            key: key.to_owned(),
            version: value.version,
            originator_id: value.originator_id.clone(),
            ttl_version: value.ttl_version,
        });
        self.schedule_ttl_countdown_timer();
    }

    fn schedule_ttl_countdown_timer(&mut self) {
        match self.ttl_countdown_queue.first() {
            Some(first) => {
                let delay =
                    first.expiry.saturating_duration_since(Instant::now());
                self.ttl_countdown_timer = Some(tasks::area_timeout(
                    &self.area,
                    delay,
                    ProtocolMsg::TtlExpiry,
                    &self.params.input_tx,
                ));
            }
            None => self.ttl_countdown_timer = None,
        }
    }

    // Purges expired keys and publishes the expiration delta. Queue
    // entries that no longer describe the stored value are ignored.
    pub(crate) fn cleanup_ttl_countdown_queue(&mut self) {
        let now = Instant::now();
        let mut expired_keys = Vec::new();
        while let Some(first) = self.ttl_countdown_queue.first() {
            if first.expiry > now {
                break;
            }
            let entry = self.ttl_countdown_queue.pop_first().unwrap();
            if let Some(current) = self.kv_store.get(&entry.key) {
                if current.version == entry.version
                    && current.originator_id == entry.originator_id
                    && current.ttl_version == entry.ttl_version
                {
                    self.kv_store.remove(&entry.key);
                    expired_keys.push(entry.key);
                }
            }
        }

        if !expired_keys.is_empty() {
            counters::add("kvstore.expired_keys", expired_keys.len() as i64);
            Debug::TtlExpiry(expired_keys.len()).log();
            let publication = Publication {
                area: self.area.clone(),
                expired_keys,
                node_ids: vec![self.node_name()],
                ..Default::default()
            };
            self.params
                .updates_queue
                .publish(KvStorePublication::Update(publication));
        }

        self.schedule_ttl_countdown_timer();
    }

    // ===== self-originated keys =====

    // Stores a key this node originates and defends: if someone else
    // advertises the same key with a higher version, it is re-advertised
    // with an even higher one.
    pub(crate) fn persist_self_originated_key(
        &mut self,
        key: String,
        value: Bytes,
    ) {
        let observed_version =
            self.kv_store.get(&key).map(|v| v.version).unwrap_or(0);

        if let Some(sov) = self.self_originated.get_mut(&key) {
            if sov.key_backoff.is_some()
                && sov.value.value.as_ref() == Some(&value)
            {
                // Same value already persisted; TTL refreshing continues.
                return;
            }
            let version =
                std::cmp::max(sov.value.version, observed_version) + 1;
            sov.value = Value::new(
                version,
                self.params.config.node_name.clone(),
                Some(value),
                self.params.config.key_ttl.as_millis() as i64,
                0,
            );
            sov.key_backoff = Some(ExponentialBackoff::new(
                KEY_ADVERTISE_INITIAL_BACKOFF,
                KEY_ADVERTISE_MAX_BACKOFF,
            ));
        } else {
            let version = observed_version + 1;
            let sov = SelfOriginatedValue {
                value: Value::new(
                    version,
                    self.params.config.node_name.clone(),
                    Some(value),
                    self.params.config.key_ttl.as_millis() as i64,
                    0,
                ),
                key_backoff: Some(ExponentialBackoff::new(
                    KEY_ADVERTISE_INITIAL_BACKOFF,
                    KEY_ADVERTISE_MAX_BACKOFF,
                )),
                ttl_backoff: self.new_ttl_backoff(),
            };
            self.self_originated.insert(key.clone(), sov);
        }

        self.keys_to_advertise.insert(key);
        self.schedule_advertise_timer();
    }

    // Stores a key with an explicit version, without authoritative
    // defense. Version 0 picks the next version beyond the observed one.
    pub(crate) fn set_self_originated_key(
        &mut self,
        key: String,
        value: Bytes,
        version: u64,
    ) {
        let version = if version == 0 {
            self.kv_store.get(&key).map(|v| v.version).unwrap_or(0) + 1
        } else {
            version
        };
        let sov = SelfOriginatedValue {
            value: Value::new(
                version,
                self.params.config.node_name.clone(),
                Some(value),
                self.params.config.key_ttl.as_millis() as i64,
                0,
            ),
            key_backoff: None,
            ttl_backoff: self.new_ttl_backoff(),
        };
        self.self_originated.insert(key.clone(), sov);
        self.keys_to_advertise.insert(key);
        self.schedule_advertise_timer();
    }

    // Advertises a final value and stops refreshing the key, letting it
    // expire from the network.
    pub(crate) fn unset_self_originated_key(
        &mut self,
        key: String,
        value: Bytes,
    ) {
        let observed_version =
            self.kv_store.get(&key).map(|v| v.version).unwrap_or(0);
        let current_version = self
            .self_originated
            .get(&key)
            .map(|sov| sov.value.version)
            .unwrap_or(0);
        let version = std::cmp::max(observed_version, current_version) + 1;

        let final_value = Value::new(
            version,
            self.params.config.node_name.clone(),
            Some(value),
            self.params.config.key_ttl.as_millis() as i64,
            0,
        );
        self.self_originated.remove(&key);
        self.keys_to_advertise.remove(&key);
        self.keys_to_unset.insert(key, final_value);
        self.schedule_unset_timer();
    }

    // Stops refreshing the key without advertising a new value.
    pub(crate) fn erase_self_originated_key(&mut self, key: &str) {
        self.self_originated.remove(key);
        self.keys_to_advertise.remove(key);
    }

    // Re-advertises persisted keys that another originator or a previous
    // incarnation of this node overwrote.
    fn process_publication_for_self_originated_keys(
        &mut self,
        delta: &BTreeMap<String, Value>,
    ) {
        let node_name = self.node_name();
        let mut advertise = false;
        for (key, rcvd) in delta {
            let Some(sov) = self.self_originated.get_mut(key) else {
                continue;
            };
            // Only persisted keys are defended.
            if sov.key_backoff.is_none() {
                continue;
            }
            if rcvd.originator_id != node_name
                || rcvd.version > sov.value.version
            {
                counters::inc("kvstore.key_version_conflicts");
                sov.value.version = rcvd.version + 1;
                sov.value.ttl_version = 0;
                // Conflicts advance the re-advertisement backoff.
                if let Some(backoff) = &mut sov.key_backoff {
                    backoff.report_error();
                }
                self.keys_to_advertise.insert(key.clone());
                advertise = true;
            }
        }
        if advertise {
            self.schedule_advertise_timer();
        }
    }

    fn schedule_advertise_timer(&mut self) {
        if self.advertise_timer.is_none() {
            self.advertise_timer = Some(tasks::area_timeout(
                &self.area,
                SELF_ADVERTISE_THROTTLE,
                ProtocolMsg::SelfAdvertise,
                &self.params.input_tx,
            ));
        }
    }

    fn schedule_unset_timer(&mut self) {
        if self.unset_timer.is_none() {
            self.unset_timer = Some(tasks::area_timeout(
                &self.area,
                SELF_ADVERTISE_THROTTLE,
                ProtocolMsg::SelfUnset,
                &self.params.input_tx,
            ));
        }
    }

    // Advertises the pending batch of self-originated keys into the local
    // store, flooding them without rate limiting.
    pub(crate) fn advertise_self_originated_keys(&mut self) {
        self.advertise_timer = None;

        let mut key_vals = BTreeMap::new();
        let mut advertised = Vec::new();
        let mut blocked = Vec::new();
        for key in self.keys_to_advertise.clone() {
            let Some(sov) = self.self_originated.get_mut(&key) else {
                advertised.push(key);
                continue;
            };
            if let Some(backoff) = &sov.key_backoff {
                if !backoff.can_try_now() {
                    blocked.push(backoff.time_remaining_until_retry());
                    continue;
                }
            }
            sov.value.ttl = self.params.config.key_ttl.as_millis() as i64;
            key_vals.insert(key.clone(), sov.value.clone());
            if let Some(backoff) = &mut sov.key_backoff {
                backoff.report_success();
            }
            advertised.push(key);
        }
        for key in advertised {
            self.keys_to_advertise.remove(&key);
        }

        if !key_vals.is_empty() {
            Debug::SelfOriginatedAdvertise(key_vals.len()).log();
            let publication = Publication {
                area: self.area.clone(),
                key_vals,
                ..Default::default()
            };
            self.merge_publication(publication, true, None);
            self.schedule_ttl_refresh_timer();
        }

        // Keys still backing off get another pass later.
        if let Some(delay) = blocked.into_iter().min() {
            self.advertise_timer = Some(tasks::area_timeout(
                &self.area,
                std::cmp::max(delay, SELF_ADVERTISE_THROTTLE),
                ProtocolMsg::SelfAdvertise,
                &self.params.input_tx,
            ));
        }
    }

    // Advertises the pending batch of unset keys with their final values.
    pub(crate) fn unset_pending_self_originated_keys(&mut self) {
        self.unset_timer = None;
        let key_vals = std::mem::take(&mut self.keys_to_unset);
        if key_vals.is_empty() {
            return;
        }
        let publication = Publication {
            area: self.area.clone(),
            key_vals,
            ..Default::default()
        };
        self.merge_publication(publication, true, None);
    }

    // Refreshes the TTL of self-originated keys due for it by advertising
    // a bumped ttl-version, keeping remote copies alive.
    pub(crate) fn advertise_ttl_updates(&mut self) {
        let key_ttl = self.params.config.key_ttl.as_millis() as i64;
        let mut key_vals = BTreeMap::new();
        for (key, sov) in &mut self.self_originated {
            if !sov.ttl_backoff.can_try_now() {
                continue;
            }
            sov.ttl_backoff.report_error();
            sov.value.ttl = key_ttl;
            sov.value.ttl_version += 1;
            // TTL refreshes carry no payload.
            key_vals.insert(key.clone(), sov.value.to_hash_only());
        }

        if !key_vals.is_empty() {
            let publication = Publication {
                area: self.area.clone(),
                key_vals,
                ..Default::default()
            };
            self.merge_publication(publication, true, None);
        }

        self.schedule_ttl_refresh_timer();
    }

    fn schedule_ttl_refresh_timer(&mut self) {
        if self.self_originated.is_empty() {
            self.ttl_refresh_timer = None;
            return;
        }
        if self.ttl_refresh_timer.is_none() {
            self.ttl_refresh_timer = Some(tasks::area_interval(
                &self.area,
                self.params.config.key_ttl / 4,
                ProtocolMsg::TtlRefresh,
                &self.params.input_tx,
            ));
        }
    }

    // The refresh cadence is a quarter of the key TTL.
    fn new_ttl_backoff(&self) -> ExponentialBackoff {
        let refresh_interval = self.params.config.key_ttl / 4;
        let mut backoff =
            ExponentialBackoff::new(refresh_interval, refresh_interval);
        backoff.report_error();
        backoff
    }

    // ===== logging =====

    fn log_sync_event(
        &self,
        peer_name: &str,
        duration: Duration,
        num_updates: usize,
    ) {
        let mut sample = LogSample::new(
            "kvstore.full_sync".to_owned(),
            self.params.config.node_name.clone(),
            self.area.clone(),
        );
        sample
            .attrs
            .insert("peer".to_owned(), peer_name.to_owned());
        sample.attrs.insert(
            "duration_ms".to_owned(),
            duration.as_millis().to_string(),
        );
        sample
            .attrs
            .insert("num_updates".to_owned(), num_updates.to_string());
        self.params.log_sample_queue.publish(sample);
    }
}
