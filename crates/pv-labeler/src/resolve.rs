//! Decides which topology labels a volume should carry.
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::PersistentVolume;
use kube::ResourceExt;
use snafu::{ResultExt, Snafu};
use tracing::instrument;

use crate::{
    provider::{LabelProviderError, ProviderRegistry},
    topology::{ANNOTATION_DYNAMICALLY_PROVISIONED, TopologyLabels},
    volume::{Backend, VolumeSource},
};

#[derive(Debug, Snafu)]
pub enum ResolveError {
    #[snafu(display("failed to query the {backend} label provider for volume {volume_id:?}"))]
    QueryLabelProvider {
        source: LabelProviderError,
        backend: Backend,
        volume_id: String,
    },
}

/// Returns the topology labels `volume` should carry.
///
/// A dynamically provisioned volume which already carries a complete zone and region pair is
/// trusted as-is. Otherwise the label provider registered for the backend of the volume is asked.
/// Volumes of unknown backends, or of backends without a registered provider, resolve to no
/// labels at all.
#[instrument(skip_all, fields(volume.name = %volume.name_any()))]
pub async fn resolve_volume_labels(
    volume: &PersistentVolume,
    registry: &ProviderRegistry,
) -> Result<BTreeMap<String, String>, ResolveError> {
    if volume
        .annotations()
        .contains_key(ANNOTATION_DYNAMICALLY_PROVISIONED)
    {
        if let Some(topology) = TopologyLabels::from_labels(volume.labels()) {
            tracing::debug!(
                generation = %topology.generation,
                "trusting topology labels of dynamically provisioned volume"
            );
            return Ok(topology.into_labels());
        }
    }

    // Prefer the payload of a registered backend if the volume carries several
    let source = registry
        .backends()
        .find_map(|backend| VolumeSource::for_backend(volume, backend))
        .unwrap_or_else(|| VolumeSource::from_persistent_volume(volume));
    let (Some(backend), Some(volume_id)) = (source.backend(), source.volume_id()) else {
        tracing::debug!("volume has no supported volume source, skipping");
        return Ok(BTreeMap::new());
    };

    let Some(provider) = registry.get(backend) else {
        tracing::debug!(%backend, "no label provider registered for backend, skipping");
        return Ok(BTreeMap::new());
    };

    let labels = provider
        .labels_for_volume(volume)
        .await
        .context(QueryLabelProviderSnafu { backend, volume_id })?;
    tracing::debug!(%backend, volume_id, ?labels, "queried label provider");

    Ok(labels)
}
