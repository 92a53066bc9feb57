//! Detection model adapter: raw annotation candidates from document content.

mod http;

pub use http::HttpDetectionModel;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::models::{Document, Region};

/// Unresolved proposal from the inference endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    /// Type tag, matched against annotation type labels
    pub tag: String,
    pub page: u32,
    /// `[x, y, width, height]`, normalized to the page
    pub bbox: [f32; 4],
    pub confidence: f32,
}

impl RawCandidate {
    pub fn new(tag: impl Into<String>, page: u32, bbox: [f32; 4], confidence: f32) -> Self {
        Self {
            tag: tag.into(),
            page,
            bbox,
            confidence,
        }
    }

    pub fn region(&self) -> Region {
        Region::from_bbox(self.page, self.bbox)
    }
}

/// All variants are retryable by the caller; none is retried here.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("detection model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("detection model timed out after {0}s")]
    ModelTimeout(u64),

    #[error("detection model rejected input: {0}")]
    InvalidInput(String),
}

#[async_trait]
pub trait DetectionModel: Send + Sync {
    /// An empty vector means nothing was detected; failures are always `Err`.
    async fn detect(&self, document: &Document, content: &[u8]) -> Result<Vec<RawCandidate>, DetectionError>;
}
