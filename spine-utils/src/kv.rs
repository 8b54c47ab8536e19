//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use derive_new::new;
use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};

// TTL value of key-value entries that never expire.
pub const TTL_INFINITY: i64 = i64::MAX;

// Key-value entry as stored and replicated among peers.
//
// Conflicts are resolved by the (version, originator_id, hash) tuple in
// strictly descending priority.
#[derive(Clone, Debug, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Value {
    // Monotonically increasing version, bumped by the originator.
    pub version: u64,
    // Name of the node that advertised this entry.
    pub originator_id: String,
    // Opaque payload. Absent in hash dumps and TTL refreshes.
    pub value: Option<Bytes>,
    // Remaining time to live, in milliseconds.
    pub ttl: i64,
    // Version of the TTL, bumped on every refresh by the originator.
    pub ttl_version: u64,
    // Digest over (originator_id, value).
    pub hash: u64,
}

// Publication of key-value state, either replicated from a peer or produced
// locally for the update stream.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct Publication {
    pub area: String,
    pub key_vals: BTreeMap<String, Value>,
    // Keys that expired and were removed from the store.
    pub expired_keys: Vec<String>,
    // Nodes this publication traversed, for flood-loop detection.
    pub node_ids: Vec<String>,
    // Keys the receiving side is expected to send back (full-sync third leg).
    pub tobe_updated_keys: Option<Vec<String>>,
    // Identifier of the flooding spanning-tree root, if any.
    pub flood_root_id: Option<String>,
}

// Parameters for a key-value set request.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct KeySetParams {
    pub key_vals: BTreeMap<String, Value>,
    pub sender_id: Option<String>,
    pub node_ids: Vec<String>,
    pub flood_root_id: Option<String>,
}

// Parameters for a point key-value query.
#[derive(Clone, Debug, Default, new)]
#[derive(Deserialize, Serialize)]
pub struct KeyGetParams {
    pub keys: Vec<String>,
}

// Parameters for a key-value dump, optionally carrying the requester's
// digest for full-sync reconciliation.
#[derive(Clone, Debug, Default)]
#[derive(Deserialize, Serialize)]
pub struct KeyDumpParams {
    // Key prefixes to match (empty matches all keys).
    pub prefixes: Vec<String>,
    // Originators to match (empty matches all originators).
    pub originator_ids: BTreeSet<String>,
    // Hash digest of the requester's entries, keyed by key. Values carry
    // only (version, originator_id, hash).
    pub keyval_hash_map: Option<BTreeMap<String, Value>>,
    pub sender_id: Option<String>,
}

// Address and port used to reach a peer's KV store service.
#[derive(Clone, Debug, Default, Eq, new, PartialEq)]
#[derive(Deserialize, Serialize)]
pub struct PeerSpec {
    pub peer_addr: String,
    pub ctrl_port: u16,
}

// Peer topology event consumed from the peer update queue.
#[derive(Clone, Debug, Default)]
pub struct PeerEvent {
    pub area: String,
    pub peers_to_add: BTreeMap<String, PeerSpec>,
    pub peers_to_del: Vec<String>,
}

// Request to manipulate a self-originated key, consumed from the key-value
// request queue.
#[derive(Clone, Debug)]
pub enum KeyValueRequest {
    // Set and authoritatively defend a key.
    Persist {
        area: String,
        key: String,
        value: Bytes,
    },
    // Set a key with an explicit version (0 picks the next free version).
    Set {
        area: String,
        key: String,
        value: Bytes,
        version: u64,
    },
    // Set a final value and stop refreshing its TTL.
    Unset {
        area: String,
        key: String,
        value: Bytes,
    },
    // Stop refreshing the TTL without setting a new value.
    Erase {
        area: String,
        key: String,
    },
}

// Message published on the KV store update stream.
#[derive(Clone, Debug, EnumAsInner)]
pub enum KvStorePublication {
    Update(Publication),
    Initialization(InitializationEvent),
}

// Initialization milestones signaled to downstream consumers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InitializationEvent {
    KvStoreSynced,
}

// Structured event record published on the log sample queue.
#[derive(Clone, Debug)]
pub struct LogSample {
    pub event: String,
    pub node_name: String,
    pub area: String,
    pub timestamp: DateTime<Utc>,
    pub attrs: BTreeMap<String, String>,
}

// ===== impl LogSample =====

impl LogSample {
    pub fn new(event: String, node_name: String, area: String) -> LogSample {
        LogSample {
            event,
            node_name,
            area,
            timestamp: Utc::now(),
            attrs: BTreeMap::new(),
        }
    }
}

// ===== impl Value =====

impl Value {
    pub fn new(
        version: u64,
        originator_id: String,
        value: Option<Bytes>,
        ttl: i64,
        ttl_version: u64,
    ) -> Value {
        let hash = value_hash(&originator_id, value.as_deref());
        Value {
            version,
            originator_id,
            value,
            ttl,
            ttl_version,
            hash,
        }
    }

    // Returns a copy carrying only the conflict-resolution digest fields.
    pub fn to_hash_only(&self) -> Value {
        Value {
            version: self.version,
            originator_id: self.originator_id.clone(),
            value: None,
            ttl: self.ttl,
            ttl_version: self.ttl_version,
            hash: self.hash,
        }
    }
}

// ===== global functions =====

// Computes the stable digest of a key-value payload.
pub fn value_hash(originator_id: &str, value: Option<&[u8]>) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    originator_id.hash(&mut hasher);
    value.hash(&mut hasher);
    hasher.finish()
}
