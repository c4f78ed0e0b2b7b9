//! Work queue the external processors consume jobs from.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{JobDescriptor, QueueError};

/// Publishes jobs for external processors.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Queue name for logs.
    fn name(&self) -> &str;

    async fn publish(&self, job: &JobDescriptor) -> Result<(), QueueError>;
}

/// Posts each job descriptor as JSON to an HTTP endpoint.
pub struct HttpWorkQueue {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpWorkQueue {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, QueueError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueueError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl WorkQueue for HttpWorkQueue {
    fn name(&self) -> &str {
        "http"
    }

    async fn publish(&self, job: &JobDescriptor) -> Result<(), QueueError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(job)
            .send()
            .await
            .map_err(|e| QueueError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(
            "Published job {} for site {} to {}",
            job.instance_id,
            job.site_id,
            self.endpoint
        );
        Ok(())
    }
}
