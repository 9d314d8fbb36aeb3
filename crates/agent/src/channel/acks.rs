// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use dv_core::AckId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Wait handles for messages sent with an acknowledgement id.
///
/// Each handle resolves when the matching `acknowledge` arrives. Dropping a
/// handle's sender fails the wait, which is how a closed channel releases
/// every blocked sender at once.
#[derive(Clone, Default)]
pub struct PendingAcks {
    waiting: Arc<Mutex<HashMap<AckId, oneshot::Sender<()>>>>,
}

impl PendingAcks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: AckId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().insert(id, tx);
        rx
    }

    /// Release the sender waiting on `id`. Returns false for unknown ids.
    pub fn resolve(&self, id: &AckId) -> bool {
        match self.waiting.lock().remove(id) {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    pub fn forget(&self, id: &AckId) {
        self.waiting.lock().remove(id);
    }

    /// Fail every outstanding wait. Returns how many were pending.
    pub fn fail_all(&self) -> usize {
        let mut waiting = self.waiting.lock();
        let count = waiting.len();
        waiting.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiting.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "acks_tests.rs"]
mod tests;
