use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Who may attach an annotation type to annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeAccess {
    /// Usable by every user and by the detection pipeline.
    Shared,
    /// Usable only in manual annotations made by the creator (or an admin).
    CreatorOnly,
}

impl TypeAccess {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeAccess::Shared => "shared",
            TypeAccess::CreatorOnly => "creator_only",
        }
    }
}

impl Default for TypeAccess {
    fn default() -> Self {
        TypeAccess::Shared
    }
}

impl FromStr for TypeAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(TypeAccess::Shared),
            "creator_only" => Ok(TypeAccess::CreatorOnly),
            other => Err(format!("unknown annotation type access '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationType {
    pub id: Uuid,
    pub creator_id: Uuid,
    /// Class name; detector tags resolve against it.
    pub label: String,
    pub description: String,
    pub access: TypeAccess,
    pub created_at: DateTime<Utc>,
}

impl AnnotationType {
    pub fn new(
        creator_id: Uuid,
        label: impl Into<String>,
        description: impl Into<String>,
        access: TypeAccess,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            creator_id,
            label: label.into(),
            description: description.into(),
            access,
            created_at: Utc::now(),
        }
    }

    pub fn usable_by_detector(&self) -> bool {
        self.access == TypeAccess::Shared
    }
}

/// Rectangle on one page, coordinates normalized to the page size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(page: u32, x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { page, x, y, width, height }
    }

    /// Build from the detector's `[x, y, w, h]` box.
    pub fn from_bbox(page: u32, bbox: [f32; 4]) -> Self {
        Self::new(page, bbox[0], bbox[1], bbox[2], bbox[3])
    }

    pub fn fits_within(&self, page_count: u32) -> bool {
        let finite = [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite());

        finite
            && self.page < page_count
            && self.x >= 0.0
            && self.y >= 0.0
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.0
            && self.y + self.height <= 1.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "p{}:[{:.4},{:.4},{:.4},{:.4}]",
            self.page, self.x, self.y, self.width, self.height
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user_id", rename_all = "snake_case")]
pub enum Creator {
    Detector,
    User(Uuid),
}

impl Creator {
    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Creator::Detector => None,
            Creator::User(id) => Some(*id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Detected { confidence: f32 },
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: Uuid,
    pub document_id: Uuid,
    pub type_id: Uuid,
    pub creator: Creator,
    pub region: Region,
    pub payload: Payload,
    pub created_at: DateTime<Utc>,
}
