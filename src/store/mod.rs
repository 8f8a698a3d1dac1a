//! Durable local user data
//!
//! Annotations (highlights, notes) bypass the expiring cache entirely:
//! they are user-authored, never expire, and must survive restarts.

pub mod annotations;

pub use annotations::{AnnotationStore, Highlight, UserAnnotation};
