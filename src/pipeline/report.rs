use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::{Annotation, AnnotationType, Creator, Document, Payload};

pub const REPORT_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("annotation {annotation_id} references unknown type {type_id}")]
    MissingType { annotation_id: Uuid, type_id: Uuid },

    #[error("annotation {annotation_id} belongs to document {found}, not {expected}")]
    ForeignAnnotation {
        annotation_id: Uuid,
        expected: Uuid,
        found: Uuid,
    },

    #[error("annotation {0} lies outside the document")]
    OutOfBounds(Uuid),

    #[error("report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Rendered report bytes, not yet stored
#[derive(Debug, Clone, PartialEq)]
pub struct ReportArtifact {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Everything a renderer may look at
pub struct ReportInput<'a> {
    pub document: &'a Document,
    pub content: &'a [u8],
    pub annotations: &'a [Annotation],
    pub types: &'a HashMap<Uuid, AnnotationType>,
}

/// Pure: no I/O, no persistence.
pub trait ReportSynthesizer: Send + Sync {
    fn synthesize(&self, input: &ReportInput<'_>) -> Result<ReportArtifact, RenderError>;
}

/// Paginated JSON report. Output is byte-identical for identical input.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonReportRenderer {
    pub pretty: bool,
}

#[derive(Serialize)]
struct RenderedReport<'a> {
    document: DocumentSummary<'a>,
    pages: Vec<RenderedPage<'a>>,
    summary: BTreeMap<&'a str, usize>,
}

#[derive(Serialize)]
struct DocumentSummary<'a> {
    id: Uuid,
    name: &'a str,
    content_type: &'a str,
    size: i64,
    page_count: u32,
    sha256: String,
}

#[derive(Serialize)]
struct RenderedPage<'a> {
    page: u32,
    annotations: Vec<RenderedAnnotation<'a>>,
}

#[derive(Serialize)]
struct RenderedAnnotation<'a> {
    id: Uuid,
    label: &'a str,
    bbox: [f32; 4],
    source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    author: Option<Uuid>,
}

impl ReportSynthesizer for JsonReportRenderer {
    fn synthesize(&self, input: &ReportInput<'_>) -> Result<ReportArtifact, RenderError> {
        let document = input.document;
        let mut pages: Vec<RenderedPage<'_>> = (0..document.page_count)
            .map(|page| RenderedPage {
                page,
                annotations: Vec::new(),
            })
            .collect();
        let mut summary = BTreeMap::new();

        let mut ordered: Vec<&Annotation> = input.annotations.iter().collect();
        ordered.sort_by(|a, b| {
            (a.region.page, a.region.y, a.region.x)
                .partial_cmp(&(b.region.page, b.region.y, b.region.x))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        for annotation in ordered {
            if annotation.document_id != document.id {
                return Err(RenderError::ForeignAnnotation {
                    annotation_id: annotation.id,
                    expected: document.id,
                    found: annotation.document_id,
                });
            }
            if !annotation.region.fits_within(document.page_count) {
                return Err(RenderError::OutOfBounds(annotation.id));
            }
            let annotation_type =
                input
                    .types
                    .get(&annotation.type_id)
                    .ok_or(RenderError::MissingType {
                        annotation_id: annotation.id,
                        type_id: annotation.type_id,
                    })?;

            let (source, confidence) = match annotation.payload {
                Payload::Detected { confidence } => ("detected", Some(confidence)),
                Payload::Manual => ("manual", None),
            };
            let region = annotation.region;

            *summary.entry(annotation_type.label.as_str()).or_insert(0) += 1;
            // fits_within guarantees the page index exists
            pages[region.page as usize].annotations.push(RenderedAnnotation {
                id: annotation.id,
                label: &annotation_type.label,
                bbox: [region.x, region.y, region.width, region.height],
                source,
                confidence,
                author: match annotation.creator {
                    Creator::Detector => None,
                    Creator::User(id) => Some(id),
                },
            });
        }

        let report = RenderedReport {
            document: DocumentSummary {
                id: document.id,
                name: &document.name,
                content_type: &document.content_type,
                size: document.size,
                page_count: document.page_count,
                sha256: content_digest(input.content),
            },
            pages,
            summary,
        };

        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&report)?
        } else {
            serde_json::to_vec(&report)?
        };

        Ok(ReportArtifact {
            content_type: REPORT_CONTENT_TYPE.to_string(),
            bytes,
        })
    }
}

pub fn content_digest(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{Region, TypeAccess};
    use crate::storage::ContentHandle;
    use chrono::Utc;
    use serde_json::Value;

    struct Fixture {
        document: Document,
        types: HashMap<Uuid, AnnotationType>,
        annotations: Vec<Annotation>,
    }

    fn fixture() -> Fixture {
        let owner = Uuid::new_v4();
        let document = Document {
            id: Uuid::new_v4(),
            owner_id: owner,
            name: "invoice.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size: 3,
            page_count: 2,
            content_handle: ContentHandle::generate(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let total = AnnotationType::new(owner, "total", "Invoice total", TypeAccess::Shared);
        let stamp = AnnotationType::new(owner, "stamp", "Stamp", TypeAccess::Shared);

        let annotation = |type_id, region, payload, creator| Annotation {
            id: Uuid::new_v4(),
            document_id: document.id,
            type_id,
            creator,
            region,
            payload,
            created_at: Utc::now(),
        };
        let annotations = vec![
            annotation(
                stamp.id,
                Region::new(1, 0.5, 0.5, 0.2, 0.2),
                Payload::Manual,
                Creator::User(owner),
            ),
            annotation(
                total.id,
                Region::new(0, 0.7, 0.9, 0.2, 0.05),
                Payload::Detected { confidence: 0.75 },
                Creator::Detector,
            ),
            annotation(
                stamp.id,
                Region::new(0, 0.1, 0.1, 0.2, 0.2),
                Payload::Detected { confidence: 0.5 },
                Creator::Detector,
            ),
        ];

        let types = [total, stamp].into_iter().map(|t| (t.id, t)).collect();
        Fixture {
            document,
            types,
            annotations,
        }
    }

    fn render(f: &Fixture, annotations: &[Annotation]) -> Result<ReportArtifact, RenderError> {
        JsonReportRenderer::default().synthesize(&ReportInput {
            document: &f.document,
            content: b"pdf",
            annotations,
            types: &f.types,
        })
    }

    #[test]
    fn renders_pages_in_position_order() {
        let f = fixture();
        let artifact = render(&f, &f.annotations).unwrap();
        assert_eq!(artifact.content_type, REPORT_CONTENT_TYPE);

        let json: Value = serde_json::from_slice(&artifact.bytes).unwrap();
        assert_eq!(json["document"]["page_count"], 2);
        assert_eq!(json["document"]["sha256"], content_digest(b"pdf"));

        let first_page: Vec<_> = json["pages"][0]["annotations"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["label"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(first_page, vec!["stamp", "total"]);
        assert_eq!(json["pages"][1]["annotations"][0]["source"], "manual");
        assert!(json["pages"][1]["annotations"][0].get("confidence").is_none());
        assert_eq!(json["summary"]["stamp"], 2);
        assert_eq!(json["summary"]["total"], 1);
    }

    #[test]
    fn rendering_is_deterministic() {
        let f = fixture();
        let mut reversed = f.annotations.clone();
        reversed.reverse();
        assert_eq!(render(&f, &f.annotations).unwrap(), render(&f, &reversed).unwrap());
    }

    #[test]
    fn empty_annotation_set_still_renders_every_page() {
        let f = fixture();
        let json: Value = serde_json::from_slice(&render(&f, &[]).unwrap().bytes).unwrap();
        assert_eq!(json["pages"].as_array().unwrap().len(), 2);
        assert!(json["summary"].as_object().unwrap().is_empty());
    }

    #[test]
    fn unknown_type_is_a_render_error() {
        let mut f = fixture();
        f.types.clear();
        assert!(matches!(
            render(&f, &f.annotations),
            Err(RenderError::MissingType { .. })
        ));
    }

    #[test]
    fn out_of_document_annotations_are_rejected() {
        let f = fixture();
        let mut stray = f.annotations[0].clone();
        stray.region.page = 7;
        assert!(matches!(render(&f, &[stray]), Err(RenderError::OutOfBounds(_))));

        let mut foreign = f.annotations[0].clone();
        foreign.document_id = Uuid::new_v4();
        assert!(matches!(
            render(&f, &[foreign]),
            Err(RenderError::ForeignAnnotation { .. })
        ));
    }
}
