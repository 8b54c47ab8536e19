//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use tracing::{error, warn};

use spine_utils::lsdb::PrefixForwardingAlgorithm;

// Decision errors.
#[derive(Debug)]
pub enum Error {
    // Programming errors
    LinkEndpointNotFound(String, String),
    AreaMismatch(String, String),
    // Publication ingest
    PayloadDecodeError(String, serde_json::Error),
    // Route computation
    UnsupportedUcmpAlgorithm(PrefixForwardingAlgorithm),
}

// ===== impl Error =====

impl Error {
    pub fn log(&self) {
        match self {
            Error::LinkEndpointNotFound(node_name, link) => {
                error!(%node_name, %link, "{}", self);
            }
            Error::AreaMismatch(expected, received) => {
                error!(%expected, %received, "{}", self);
            }
            Error::PayloadDecodeError(key, error) => {
                warn!(%key, %error, "{}", self);
            }
            Error::UnsupportedUcmpAlgorithm(algorithm) => {
                warn!(?algorithm, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::LinkEndpointNotFound(..) => {
                write!(f, "node is not an endpoint of the link")
            }
            Error::AreaMismatch(..) => {
                write!(f, "area does not match the link-state database")
            }
            Error::PayloadDecodeError(..) => {
                write!(f, "failed to decode key-value payload")
            }
            Error::UnsupportedUcmpAlgorithm(..) => {
                write!(f, "unsupported UCMP weight propagation algorithm")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::PayloadDecodeError(_, error) => Some(error),
            _ => None,
        }
    }
}
