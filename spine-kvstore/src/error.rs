//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::warn;

use crate::client::ClientError;
use crate::peer::fsm;

// KV store errors.
#[derive(Debug)]
pub enum Error {
    UnknownArea(String),
    PeerApiError(String, ClientError),
    PeerFsmUnexpectedEvent(String, fsm::State, fsm::Event),
    StoreShutdown,
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::UnknownArea(area) => {
                warn!(%area, "{}", self);
            }
            Error::PeerApiError(peer_name, error) => {
                warn!(%peer_name, %error, "{}", self);
            }
            Error::PeerFsmUnexpectedEvent(peer_name, state, event) => {
                warn!(%peer_name, ?state, ?event, "{}", self);
            }
            Error::StoreShutdown => {
                warn!("{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::UnknownArea(..) => {
                write!(f, "area is not configured")
            }
            Error::PeerApiError(..) => {
                write!(f, "peer API request failed")
            }
            Error::PeerFsmUnexpectedEvent(..) => {
                write!(f, "unexpected peer FSM event")
            }
            Error::StoreShutdown => {
                write!(f, "KV store is shut down")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PeerApiError(_, error) => Some(error),
            _ => None,
        }
    }
}
