//! Report generation: detection output resolved against registered types,
//! then rendered together with the document.

mod creator;
mod report;
mod resolver;

pub use creator::{CreatedReport, ReportCreator};
pub use report::{
    content_digest, JsonReportRenderer, RenderError, ReportArtifact, ReportInput, ReportSynthesizer,
    REPORT_CONTENT_TYPE,
};
pub use resolver::{AnnotationTypeResolver, DropReason, DroppedCandidate, Resolution, ResolveError};

use thiserror::Error;

use crate::database::DatabaseError;
use crate::detection::DetectionError;
use crate::storage::StorageError;

/// Failure of any stage of a report run, kind preserved.
#[derive(Debug, Error)]
pub enum PipelineFailure {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("repository: {0}")]
    Repository(#[from] DatabaseError),
}
