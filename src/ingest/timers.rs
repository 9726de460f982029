use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::ingest::channel::ChannelKey;

/// Registry of pending stop deadlines, one per channel.
///
/// Scheduling a deadline for a channel aborts the one it replaces, so at most
/// one stop task per channel is ever alive.
#[derive(Default)]
pub struct StopTimers {
    handles: Mutex<HashMap<ChannelKey, JoinHandle<()>>>,
}

impl StopTimers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` at `deadline` unless cancelled or replaced first.
    pub fn schedule<F>(&self, key: ChannelKey, deadline: Instant, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task.await;
        });

        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = handles.insert(key, handle) {
            previous.abort();
        }
    }

    /// Cancel the pending deadline of one channel. Returns whether one was pending.
    pub fn cancel(&self, key: &ChannelKey) -> bool {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.remove(key).is_some_and(|handle| {
            let pending = !handle.is_finished();
            handle.abort();
            pending
        })
    }

    /// Cancel every deadline belonging to `device_id`.
    pub fn cancel_device(&self, device_id: &str) -> usize {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let keys: Vec<ChannelKey> = handles
            .keys()
            .filter(|k| k.device_id == device_id)
            .cloned()
            .collect();

        keys.iter()
            .filter_map(|k| handles.remove(k))
            .filter(|handle| {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            })
            .count()
    }

    pub fn cancel_all(&self) -> usize {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles
            .drain()
            .filter(|(_, handle)| {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            })
            .count()
    }

    /// Deadlines that have neither fired nor been cancelled.
    pub fn pending(&self) -> usize {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.values().filter(|h| !h.is_finished()).count()
    }
}
