//! Mock work queue for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::event_bus::{JobDescriptor, QueueError, WorkQueue};

/// Mock implementation of the WorkQueue trait.
///
/// Records every published descriptor and can fail the next publish.
///
/// # Example
///
/// ```rust,ignore
/// let queue = MockWorkQueue::new();
/// bus.dispatch(&job).await?;
///
/// let published = queue.published().await;
/// assert_eq!(published[0].event_name, "LiDARProcessingCompleted");
/// ```
#[derive(Debug)]
pub struct MockWorkQueue {
    published: Arc<RwLock<Vec<JobDescriptor>>>,
    /// If set, the next publish fails with this error.
    next_error: Arc<RwLock<Option<QueueError>>>,
}

impl Default for MockWorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorkQueue {
    pub fn new() -> Self {
        Self {
            published: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Descriptors published so far, in order.
    pub async fn published(&self) -> Vec<JobDescriptor> {
        self.published.read().await.clone()
    }

    /// Make the next publish fail.
    pub async fn set_next_error(&self, error: QueueError) {
        *self.next_error.write().await = Some(error);
    }

    pub async fn clear(&self) {
        self.published.write().await.clear();
    }
}

#[async_trait]
impl WorkQueue for MockWorkQueue {
    fn name(&self) -> &str {
        "mock"
    }

    async fn publish(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.published.write().await.push(job.clone());
        Ok(())
    }
}
