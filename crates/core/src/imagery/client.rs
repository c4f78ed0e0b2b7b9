//! Imagery processor seam and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;

use super::types::{GeneratedImage, ImageryError, ImageryKind, ImageryRequest};

/// Generates one satellite product for a site.
#[async_trait]
pub trait ImageryProcessor: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        kind: ImageryKind,
        request: &ImageryRequest,
    ) -> Result<GeneratedImage, ImageryError>;
}

/// Calls `POST <endpoint>/process/<kind>`.
pub struct HttpImageryProcessor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpImageryProcessor {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ImageryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ImageryError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, kind: ImageryKind) -> String {
        format!("{}/process/{}", self.endpoint, kind.endpoint_path())
    }
}

#[async_trait]
impl ImageryProcessor for HttpImageryProcessor {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate(
        &self,
        kind: ImageryKind,
        request: &ImageryRequest,
    ) -> Result<GeneratedImage, ImageryError> {
        let response = self
            .client
            .post(self.url_for(kind))
            .json(request)
            .send()
            .await
            .map_err(|e| ImageryError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ImageryError::Processor {
                status: status.as_u16(),
                message,
            });
        }

        let image: GeneratedImage = response
            .json()
            .await
            .map_err(|e| ImageryError::InvalidResponse(e.to_string()))?;

        if image.image_url.trim().is_empty() {
            return Err(ImageryError::InvalidResponse(format!(
                "{} response has no image URL",
                kind.as_str()
            )));
        }
        Ok(image)
    }
}
