use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::report::{ReportArtifact, ReportInput, ReportSynthesizer};
use super::resolver::{AnnotationTypeResolver, DroppedCandidate};
use super::PipelineFailure;
use crate::database::models::{Annotation, Document};
use crate::database::AnnotationTypeRepository;
use crate::detection::DetectionModel;

/// Result of one detection + synthesis run; nothing persisted yet.
#[derive(Debug, Clone)]
pub struct CreatedReport {
    pub artifact: ReportArtifact,
    pub annotations: Vec<Annotation>,
    pub dropped: Vec<DroppedCandidate>,
}

/// Inner pipeline: detect, resolve, synthesize.
///
/// Holds no storage handles; the caller decides what to persist.
pub struct ReportCreator {
    detector: Arc<dyn DetectionModel>,
    types: Arc<dyn AnnotationTypeRepository>,
    synthesizer: Arc<dyn ReportSynthesizer>,
    strict_types: bool,
}

impl ReportCreator {
    pub fn new(
        detector: Arc<dyn DetectionModel>,
        types: Arc<dyn AnnotationTypeRepository>,
        synthesizer: Arc<dyn ReportSynthesizer>,
        strict_types: bool,
    ) -> Self {
        Self {
            detector,
            types,
            synthesizer,
            strict_types,
        }
    }

    /// `run_id` seeds annotation ids; pass the id the report will be stored under.
    pub async fn create(
        &self,
        run_id: Uuid,
        document: &Document,
        content: &[u8],
    ) -> Result<CreatedReport, PipelineFailure> {
        let candidates = self.detector.detect(document, content).await?;
        debug!("Run {}: {} raw candidates for document {}", run_id, candidates.len(), document.id);

        let registered = self.types.list_all().await?;
        let resolver = AnnotationTypeResolver::new(registered.iter().cloned(), self.strict_types);
        let resolution = resolver.resolve(run_id, document, &candidates, Utc::now())?;

        let types: HashMap<_, _> = registered.into_iter().map(|t| (t.id, t)).collect();
        let artifact = self.synthesizer.synthesize(&ReportInput {
            document,
            content,
            annotations: &resolution.annotations,
            types: &types,
        })?;

        info!(
            "Run {}: synthesized report for document {} with {} annotations ({} dropped)",
            run_id,
            document.id,
            resolution.annotations.len(),
            resolution.dropped.len()
        );

        Ok(CreatedReport {
            artifact,
            annotations: resolution.annotations,
            dropped: resolution.dropped,
        })
    }
}
