//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::{Receiver, Sender};

/// Multi-consumer fan-out queue.
///
/// Every subscriber owns a private lossless queue; published messages are
/// replicated to all subscribers alive at publication time. Subscribers whose
/// receiving half was dropped are pruned lazily on the next publish.
#[derive(Clone, Debug)]
pub struct ReplicateQueue<T> {
    senders: Arc<Mutex<Vec<Sender<T>>>>,
}

// ===== impl ReplicateQueue =====

impl<T> ReplicateQueue<T>
where
    T: Clone,
{
    pub fn new() -> ReplicateQueue<T> {
        ReplicateQueue {
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Creates a new reader attached to this queue.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        rx
    }

    /// Replicates the message to all live readers.
    pub fn publish(&self, msg: T) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|tx| tx.send(msg.clone()).is_ok());
    }

    /// Returns the number of attached readers.
    pub fn reader_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }
}

impl<T> Default for ReplicateQueue<T>
where
    T: Clone,
{
    fn default() -> ReplicateQueue<T> {
        ReplicateQueue::new()
    }
}
