pub mod annotation;
pub mod document;
pub mod user;

pub use annotation::{Annotation, AnnotationType, Creator, Payload, Region, TypeAccess};
pub use document::{count_pages, Document, Report};
pub use user::{Role, User, UserProfile};
