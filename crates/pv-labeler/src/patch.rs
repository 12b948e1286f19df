//! Encodes a volume mutation as a JSON patch.
use json_patch::Patch;
use k8s_openapi::api::core::v1::PersistentVolume;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum PatchError {
    #[snafu(display("failed to serialize the {which} volume"))]
    SerializeVolume {
        source: serde_json::Error,
        which: &'static str,
    },
}

/// Computes the RFC 6902 operations turning `before` into `after`.
pub fn diff(before: &PersistentVolume, after: &PersistentVolume) -> Result<Patch, PatchError> {
    let before = serde_json::to_value(before).context(SerializeVolumeSnafu { which: "original" })?;
    let after = serde_json::to_value(after).context(SerializeVolumeSnafu { which: "mutated" })?;

    Ok(json_patch::diff(&before, &after))
}
