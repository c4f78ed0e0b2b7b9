//! Dispatch + suspend-until-correlated-event.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::WorkQueue;
use super::types::{CorrelationKey, EventBusError, JobDescriptor, ProcessingResult};
use crate::job::ProcessingJob;

enum Slot {
    /// Dispatched; no event and no waiter yet.
    Registered,
    /// The event arrived before anyone awaited it.
    Buffered(ProcessingResult),
    /// An instance is parked on this key.
    Waiting(oneshot::Sender<ProcessingResult>),
}

/// Correlates externally raised completion events with suspended instances.
///
/// A key is registered by [`dispatch`](Self::dispatch) and released when
/// its event has been consumed or the wait gave up.
pub struct CorrelationEventBus {
    queue: Arc<dyn WorkQueue>,
    blob_container_url: String,
    slots: Mutex<HashMap<CorrelationKey, Slot>>,
}

impl CorrelationEventBus {
    pub fn new(queue: Arc<dyn WorkQueue>, blob_container_url: impl Into<String>) -> Self {
        Self {
            queue,
            blob_container_url: blob_container_url.into(),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Register the job's correlation key and publish it.
    pub async fn dispatch(&self, job: &ProcessingJob) -> Result<CorrelationKey, EventBusError> {
        let key = CorrelationKey::for_job(job);
        {
            let mut slots = self.slots.lock().await;
            if slots.contains_key(&key) {
                return Err(EventBusError::DuplicateCorrelation(key));
            }
            slots.insert(key.clone(), Slot::Registered);
        }

        let descriptor = JobDescriptor::from_job(job, &self.blob_container_url);
        if let Err(e) = self.queue.publish(&descriptor).await {
            self.release(&key).await;
            return Err(e.into());
        }

        info!(
            "Dispatched {} for site {} via {} queue",
            key,
            job.site_id,
            self.queue.name()
        );
        Ok(key)
    }

    /// Deliver an external completion event.
    pub async fn raise_event(
        &self,
        key: &CorrelationKey,
        payload: ProcessingResult,
    ) -> Result<(), EventBusError> {
        let mut slots = self.slots.lock().await;
        match slots.remove(key) {
            None => Err(EventBusError::UnknownCorrelation(key.clone())),
            Some(Slot::Registered) => {
                debug!("Buffering early event for {}", key);
                slots.insert(key.clone(), Slot::Buffered(payload));
                Ok(())
            }
            Some(Slot::Buffered(first)) => {
                warn!("Ignoring duplicate event for {}", key);
                slots.insert(key.clone(), Slot::Buffered(first));
                Err(EventBusError::DuplicateEvent(key.clone()))
            }
            Some(Slot::Waiting(tx)) => tx.send(payload).map_err(|_| {
                warn!("Waiter for {} gave up before the event arrived", key);
                EventBusError::Closed(key.clone())
            }),
        }
    }

    /// Suspend until the event for `key` arrives, `timeout` elapses
    /// (`None` waits forever) or `cancel` fires. The key is released on
    /// every exit path.
    pub async fn await_completion(
        &self,
        key: &CorrelationKey,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ProcessingResult, EventBusError> {
        let mut rx = {
            let mut slots = self.slots.lock().await;
            match slots.remove(key) {
                None => return Err(EventBusError::UnknownCorrelation(key.clone())),
                Some(Slot::Buffered(payload)) => return Ok(payload),
                Some(Slot::Waiting(tx)) => {
                    slots.insert(key.clone(), Slot::Waiting(tx));
                    return Err(EventBusError::AlreadyAwaiting(key.clone()));
                }
                Some(Slot::Registered) => {
                    let (tx, rx) = oneshot::channel();
                    slots.insert(key.clone(), Slot::Waiting(tx));
                    rx
                }
            }
        };

        let deadline = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };

        let outcome = tokio::select! {
            received = &mut rx => received.map_err(|_| EventBusError::Closed(key.clone())),
            _ = cancel.cancelled() => Err(EventBusError::Cancelled(key.clone())),
            _ = deadline => Err(EventBusError::Timeout {
                key: key.clone(),
                timeout: timeout.unwrap_or_default(),
            }),
        };

        if outcome.is_err() {
            self.release(key).await;
            // An event sent while the wait was giving up is still consumed;
            // once closed, later sends fail at `raise_event`.
            rx.close();
            if let Ok(payload) = rx.try_recv() {
                debug!("Event for {} arrived as the wait ended, consuming it", key);
                return Ok(payload);
            }
        }
        outcome
    }

    /// Drop any state held for `key`.
    pub async fn release(&self, key: &CorrelationKey) {
        self.slots.lock().await.remove(key);
    }

    pub async fn is_pending(&self, key: &CorrelationKey) -> bool {
        self.slots.lock().await.contains_key(key)
    }

    pub async fn pending_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}
