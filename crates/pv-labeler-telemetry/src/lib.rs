//! This crate contains the tracing (logging) setup shared by the PersistentVolume labeler
//! binaries.
pub mod tracing;

pub use crate::tracing::Tracing;
