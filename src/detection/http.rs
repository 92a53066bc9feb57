use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{DetectionError, DetectionModel, RawCandidate};
use crate::config::ModelConfig;
use crate::database::models::Document;

pub const PAGE_COUNT_HEADER: &str = "X-Page-Count";

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    candidates: Vec<RawCandidate>,
}

/// Posts raw document bytes to an inference endpoint.
pub struct HttpDetectionModel {
    client: Client,
    url: String,
    timeout_secs: u64,
}

impl HttpDetectionModel {
    pub fn new(config: &ModelConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                error!("Failed to build detection HTTP client with timeout, using default client: {}", e);
                Client::new()
            });

        Self {
            client,
            url: config.url.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_status(status: StatusCode, body: String) -> DetectionError {
        match status.as_u16() {
            408 | 429 => DetectionError::ModelUnavailable(format!("{}: {}", status, body)),
            400..=499 => DetectionError::InvalidInput(format!("{}: {}", status, body)),
            _ => DetectionError::ModelUnavailable(format!("{}: {}", status, body)),
        }
    }
}

#[async_trait]
impl DetectionModel for HttpDetectionModel {
    async fn detect(&self, document: &Document, content: &[u8]) -> Result<Vec<RawCandidate>, DetectionError> {
        if content.is_empty() {
            return Err(DetectionError::InvalidInput("document content is empty".to_string()));
        }

        debug!(
            "Sending document {} ({} bytes, {} pages) to {}",
            document.id,
            content.len(),
            document.page_count,
            self.url
        );

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, document.content_type.as_str())
            .header(PAGE_COUNT_HEADER, document.page_count.to_string())
            .body(content.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DetectionError::ModelTimeout(self.timeout_secs)
                } else {
                    DetectionError::ModelUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Detection model returned {} for document {}", status, document.id);
            return Err(Self::map_status(status, body));
        }

        let parsed: DetectionResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                DetectionError::ModelTimeout(self.timeout_secs)
            } else {
                DetectionError::ModelUnavailable(format!("undecodable detection response: {}", e))
            }
        })?;

        debug!(
            "Detection model returned {} candidates for document {}",
            parsed.candidates.len(),
            document.id
        );
        Ok(parsed.candidates)
    }
}
