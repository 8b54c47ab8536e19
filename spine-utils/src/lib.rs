//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

pub mod backoff;
pub mod counters;
pub mod kv;
pub mod lsdb;
pub mod mpls;
pub mod queue;
pub mod southbound;
pub mod task;

// Type aliases.
pub type Sender<T> = tokio::sync::mpsc::UnboundedSender<T>;
pub type Receiver<T> = tokio::sync::mpsc::UnboundedReceiver<T>;
pub type Responder<T> = tokio::sync::oneshot::Sender<T>;
