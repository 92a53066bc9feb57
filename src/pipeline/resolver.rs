use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::database::models::{Annotation, AnnotationType, Creator, Document, Payload};
use crate::detection::RawCandidate;

#[derive(Debug, Error, PartialEq)]
pub enum ResolveError {
    #[error("no registered annotation type for tag '{tag}'")]
    UnknownType { tag: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    UnknownType,
    OutOfBounds,
    InvalidConfidence,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DroppedCandidate {
    pub candidate: RawCandidate,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub annotations: Vec<Annotation>,
    pub dropped: Vec<DroppedCandidate>,
}

/// Maps detector tags to registered, detector-usable annotation types.
pub struct AnnotationTypeResolver {
    by_label: HashMap<String, AnnotationType>,
    strict: bool,
}

impl AnnotationTypeResolver {
    /// Types that are not shared are ignored; the detector may not use them.
    pub fn new(types: impl IntoIterator<Item = AnnotationType>, strict: bool) -> Self {
        let by_label = types
            .into_iter()
            .filter(AnnotationType::usable_by_detector)
            .map(|t| (t.label.clone(), t))
            .collect();
        Self { by_label, strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn type_for(&self, label: &str) -> Option<&AnnotationType> {
        self.by_label.get(label)
    }

    /// Every emitted annotation references a known type and lies inside the
    /// document. Ids derive from `run_id` and candidate position, so the same
    /// input under the same run resolves to identical annotations.
    pub fn resolve(
        &self,
        run_id: Uuid,
        document: &Document,
        candidates: &[RawCandidate],
        created_at: DateTime<Utc>,
    ) -> Result<Resolution, ResolveError> {
        let mut resolution = Resolution::default();

        for (index, candidate) in candidates.iter().enumerate() {
            let annotation_type = match self.by_label.get(&candidate.tag) {
                Some(t) => t,
                None if self.strict => {
                    return Err(ResolveError::UnknownType {
                        tag: candidate.tag.clone(),
                    })
                }
                None => {
                    resolution.record_drop(candidate, DropReason::UnknownType, document.id);
                    continue;
                }
            };

            if !(0.0..=1.0).contains(&candidate.confidence) {
                resolution.record_drop(candidate, DropReason::InvalidConfidence, document.id);
                continue;
            }

            let region = candidate.region();
            if !region.fits_within(document.page_count) {
                resolution.record_drop(candidate, DropReason::OutOfBounds, document.id);
                continue;
            }

            resolution.annotations.push(Annotation {
                id: annotation_id(run_id, index),
                document_id: document.id,
                type_id: annotation_type.id,
                creator: Creator::Detector,
                region,
                payload: Payload::Detected {
                    confidence: candidate.confidence,
                },
                created_at,
            });
        }

        Ok(resolution)
    }
}

impl Resolution {
    fn record_drop(&mut self, candidate: &RawCandidate, reason: DropReason, document_id: Uuid) {
        warn!(
            "Dropping candidate '{}' on page {} of document {}: {:?}",
            candidate.tag, candidate.page, document_id, reason
        );
        self.dropped.push(DroppedCandidate {
            candidate: candidate.clone(),
            reason,
        });
    }
}

fn annotation_id(run_id: Uuid, index: usize) -> Uuid {
    Uuid::new_v5(&run_id, format!("candidate:{}", index).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::TypeAccess;
    use crate::storage::ContentHandle;

    fn document(page_count: u32) -> Document {
        Document {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "contract.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size: 10,
            page_count,
            content_handle: ContentHandle::generate(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn types() -> Vec<AnnotationType> {
        let owner = Uuid::new_v4();
        vec![
            AnnotationType::new(owner, "signature", "Handwritten signature", TypeAccess::Shared),
            AnnotationType::new(owner, "stamp", "Company stamp", TypeAccess::Shared),
            AnnotationType::new(owner, "private", "Reviewer-only marker", TypeAccess::CreatorOnly),
        ]
    }

    fn candidates() -> Vec<RawCandidate> {
        vec![
            RawCandidate::new("signature", 0, [0.1, 0.8, 0.3, 0.1], 0.97),
            RawCandidate::new("barcode", 0, [0.1, 0.1, 0.2, 0.2], 0.5),
            RawCandidate::new("stamp", 1, [0.6, 0.6, 0.2, 0.2], 0.81),
            RawCandidate::new("private", 0, [0.1, 0.1, 0.2, 0.2], 0.5),
        ]
    }

    #[test]
    fn unknown_tags_are_dropped_and_recorded() {
        let resolver = AnnotationTypeResolver::new(types(), false);
        let doc = document(2);
        let resolution = resolver
            .resolve(Uuid::new_v4(), &doc, &candidates(), Utc::now())
            .unwrap();

        let labels: Vec<_> = resolution
            .annotations
            .iter()
            .map(|a| {
                resolver
                    .by_label
                    .values()
                    .find(|t| t.id == a.type_id)
                    .map(|t| t.label.as_str())
                    .unwrap()
            })
            .collect();
        assert_eq!(labels, vec!["signature", "stamp"]);
        assert!(resolution
            .annotations
            .iter()
            .all(|a| a.creator == Creator::Detector && a.document_id == doc.id));

        let dropped: Vec<_> = resolution
            .dropped
            .iter()
            .map(|d| (d.candidate.tag.as_str(), d.reason))
            .collect();
        // creator-only types are invisible to the detector
        assert_eq!(
            dropped,
            vec![("barcode", DropReason::UnknownType), ("private", DropReason::UnknownType)]
        );
    }

    #[test]
    fn strict_mode_fails_on_unknown_tags() {
        let resolver = AnnotationTypeResolver::new(types(), true);
        let err = resolver
            .resolve(Uuid::new_v4(), &document(2), &candidates(), Utc::now())
            .unwrap_err();
        assert_eq!(err, ResolveError::UnknownType { tag: "barcode".to_string() });
    }

    #[test]
    fn out_of_bounds_and_bad_confidence_drop_even_when_strict() {
        let resolver = AnnotationTypeResolver::new(types(), true);
        let input = vec![
            RawCandidate::new("stamp", 3, [0.1, 0.1, 0.1, 0.1], 0.5),
            RawCandidate::new("stamp", 0, [0.9, 0.1, 0.2, 0.1], 0.5),
            RawCandidate::new("stamp", 0, [0.1, 0.1, 0.1, 0.1], 1.5),
            RawCandidate::new("stamp", 0, [0.1, 0.1, 0.1, 0.1], f32::NAN),
        ];
        let resolution = resolver
            .resolve(Uuid::new_v4(), &document(1), &input, Utc::now())
            .unwrap();
        assert!(resolution.annotations.is_empty());
        let reasons: Vec<_> = resolution.dropped.iter().map(|d| d.reason).collect();
        assert_eq!(
            reasons,
            vec![
                DropReason::OutOfBounds,
                DropReason::OutOfBounds,
                DropReason::InvalidConfidence,
                DropReason::InvalidConfidence
            ]
        );
    }

    #[test]
    fn resolving_twice_yields_the_same_annotations() {
        let resolver = AnnotationTypeResolver::new(types(), false);
        let doc = document(2);
        let run = Uuid::new_v4();
        let at = Utc::now();

        let first = resolver.resolve(run, &doc, &candidates(), at).unwrap();
        let second = resolver.resolve(run, &doc, &candidates(), at).unwrap();
        assert_eq!(first, second);

        let other_run = resolver.resolve(Uuid::new_v4(), &doc, &candidates(), at).unwrap();
        assert_ne!(first.annotations[0].id, other_run.annotations[0].id);
    }

    #[test]
    fn empty_input_resolves_to_nothing() {
        let resolution = AnnotationTypeResolver::new(types(), true)
            .resolve(Uuid::new_v4(), &document(1), &[], Utc::now())
            .unwrap();
        assert_eq!(resolution, Resolution::default());
    }
}
