//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::time::Duration;

use async_trait::async_trait;

use spine_utils::kv::{KeyDumpParams, KeySetParams, PeerSpec, Publication};

// Transient failure of a peer RPC.
#[derive(Clone, Debug)]
pub enum ClientError {
    ConnectFailed(String),
    RequestFailed(String),
    Timeout,
}

// Abstract RPC client used to reach a peer's KV store.
//
// The store is parameterized over this trait so peers can be reached over
// any transport, and mocked in tests.
#[async_trait]
pub trait PeerClient: Send + Sync + Sized + 'static {
    // Establishes a session toward the peer.
    async fn connect(
        spec: &PeerSpec,
        timeout: Duration,
    ) -> Result<Self, ClientError>;

    // Dumps key-values from the peer, optionally reconciling against the
    // provided digest.
    async fn get_key_vals(
        &self,
        area: &str,
        params: KeyDumpParams,
    ) -> Result<Publication, ClientError>;

    // Submits key-values to the peer.
    async fn set_key_vals(
        &self,
        area: &str,
        params: KeySetParams,
    ) -> Result<(), ClientError>;

    // Dumps the peer's key digests.
    async fn dump_hashes(
        &self,
        area: &str,
        params: KeyDumpParams,
    ) -> Result<Publication, ClientError>;
}

// ===== impl ClientError =====

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::ConnectFailed(reason) => {
                write!(f, "failed to connect to peer: {}", reason)
            }
            ClientError::RequestFailed(reason) => {
                write!(f, "peer request failed: {}", reason)
            }
            ClientError::Timeout => {
                write!(f, "peer request timed out")
            }
        }
    }
}

impl std::error::Error for ClientError {}
