pub mod annotation_service;
pub mod document_service;

pub use annotation_service::{
    AnnotationError, AnnotationService, AnnotationTypeService, NewAnnotation, NewAnnotationType,
};
pub use document_service::{DocumentError, DocumentLocks, DocumentService};
