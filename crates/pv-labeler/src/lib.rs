//! A mutating admission webhook which assigns zone and region topology labels to
//! PersistentVolumes and restricts their required node affinity to the matching nodes.
//!
//! Requests flow through three steps:
//!
//! 1. [`resolve::resolve_volume_labels`] decides which labels a volume should carry, either by
//!    trusting the labels of a dynamically provisioned volume or by asking the
//!    [`provider::LabelProvider`] registered for the storage backend of the volume.
//! 2. [`affinity::mutate_persistent_volume`] applies these labels to a copy of the volume and adds
//!    the equivalent node selector requirements.
//! 3. [`patch::diff`] encodes the change as a JSON patch, which [`admission::PvLabelAdmission`]
//!    returns to the API server.
pub mod admission;
pub mod affinity;
pub mod patch;
pub mod provider;
pub mod resolve;
pub mod topology;
pub mod volume;

// Selected re-exports
pub use crate::{
    admission::PvLabelAdmission,
    provider::{CatalogLabelProvider, LabelProvider, ProviderRegistry, VolumeCatalog},
    volume::Backend,
};
