//! A label provider answering from a static YAML catalog of volumes, loaded from the file passed
//! with `--cloud-config`.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    provider::{
        LabelProvider, LabelProviderError, UnknownVolumeSnafu, UnsupportedVolumeSourceSnafu,
    },
    volume::{Backend, VolumeSource},
};

#[derive(Debug, Snafu)]
pub enum CatalogError {
    #[snafu(display("failed to read volume catalog from {path:?}"))]
    ReadFile {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to parse volume catalog {path:?}"))]
    ParseYaml {
        source: serde_yaml::Error,
        path: PathBuf,
    },
}

/// Topology labels of the volumes of one storage backend, keyed by the backend volume identifier.
///
/// ```yaml
/// defaultLabels:
///   topology.kubernetes.io/zone: zone-a
///   topology.kubernetes.io/region: region-1
/// volumes:
///   vol-0123:
///     topology.kubernetes.io/zone: zone-a__zone-b
///     topology.kubernetes.io/region: region-1
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeCatalog {
    /// Used for every volume which has no entry in [`Self::volumes`].
    #[serde(default)]
    pub default_labels: BTreeMap<String, String>,

    #[serde(default)]
    pub volumes: BTreeMap<String, BTreeMap<String, String>>,
}

impl VolumeCatalog {
    /// Reads the catalog from `path`. No path or an empty file result in an empty catalog.
    pub fn from_file(path: Option<&Path>) -> Result<Self, CatalogError> {
        let Some(path) = path else {
            tracing::info!("no volume catalog configured, using an empty one");
            return Ok(Self::default());
        };

        let contents = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        if contents.trim().is_empty() {
            tracing::warn!(path = %path.display(), "volume catalog is empty");
            return Ok(Self::default());
        }

        let catalog: Self = serde_yaml::from_str(&contents).context(ParseYamlSnafu { path })?;
        tracing::info!(
            path = %path.display(),
            volumes = catalog.volumes.len(),
            has_default_labels = !catalog.default_labels.is_empty(),
            "loaded volume catalog"
        );

        Ok(catalog)
    }

    /// The labels of `volume_id`, falling back to the default labels.
    pub fn labels(&self, volume_id: &str) -> Option<&BTreeMap<String, String>> {
        self.volumes
            .get(volume_id)
            .or_else(|| (!self.default_labels.is_empty()).then_some(&self.default_labels))
    }
}

/// A [`LabelProvider`] answering from a static [`VolumeCatalog`] for exactly one backend.
#[derive(Clone, Debug)]
pub struct CatalogLabelProvider {
    backend: Backend,
    catalog: VolumeCatalog,
}

impl CatalogLabelProvider {
    pub fn new(backend: Backend, catalog: VolumeCatalog) -> Self {
        Self { backend, catalog }
    }
}

#[async_trait]
impl LabelProvider for CatalogLabelProvider {
    async fn labels_for_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<BTreeMap<String, String>, LabelProviderError> {
        let volume_id = VolumeSource::for_backend(volume, self.backend)
            .and_then(|source| source.volume_id())
            .context(UnsupportedVolumeSourceSnafu {
                backend: self.backend,
            })?;

        self.catalog
            .labels(volume_id)
            .cloned()
            .context(UnknownVolumeSnafu { volume_id })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use indoc::indoc;
    use k8s_openapi::api::core::v1::{
        AWSElasticBlockStoreVolumeSource, GCEPersistentDiskVolumeSource, PersistentVolumeSpec,
    };

    use super::*;
    use crate::topology::{LABEL_TOPOLOGY_REGION, LABEL_TOPOLOGY_ZONE};

    const CATALOG: &str = indoc! {"
        defaultLabels:
          topology.kubernetes.io/zone: zone-a
          topology.kubernetes.io/region: region-1
        volumes:
          vol-0123:
            topology.kubernetes.io/zone: zone-a__zone-b
            topology.kubernetes.io/region: region-1
    "};

    fn write_catalog(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        file
    }

    fn aws_volume(volume_id: &str) -> PersistentVolume {
        PersistentVolume {
            spec: Some(PersistentVolumeSpec {
                aws_elastic_block_store: Some(AWSElasticBlockStoreVolumeSource {
                    volume_id: volume_id.to_owned(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn parse_catalog() {
        let file = write_catalog(CATALOG);
        let catalog = VolumeCatalog::from_file(Some(file.path())).expect("valid catalog");

        assert_eq!(catalog.volumes.len(), 1);
        assert_eq!(
            catalog.default_labels.get(LABEL_TOPOLOGY_ZONE).map(String::as_str),
            Some("zone-a")
        );
    }

    #[test]
    fn missing_path_is_empty_catalog() {
        let catalog = VolumeCatalog::from_file(None).expect("no catalog");
        assert_eq!(catalog, VolumeCatalog::default());
    }

    #[test]
    fn empty_file_is_empty_catalog() {
        let file = write_catalog("\n");
        let catalog = VolumeCatalog::from_file(Some(file.path())).expect("empty catalog");
        assert_eq!(catalog, VolumeCatalog::default());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let directory = tempfile::tempdir().expect("create temp dir");
        let error = VolumeCatalog::from_file(Some(&directory.path().join("missing.yaml")))
            .expect_err("missing file");
        assert!(matches!(error, CatalogError::ReadFile { .. }));
    }

    #[test]
    fn unknown_fields_are_an_error() {
        let file = write_catalog("zones: []\n");
        let error = VolumeCatalog::from_file(Some(file.path())).expect_err("unknown field");
        assert!(matches!(error, CatalogError::ParseYaml { .. }));
    }

    #[tokio::test]
    async fn listed_volume() {
        let file = write_catalog(CATALOG);
        let catalog = VolumeCatalog::from_file(Some(file.path())).expect("valid catalog");
        let provider = CatalogLabelProvider::new(Backend::Aws, catalog);

        let labels = provider
            .labels_for_volume(&aws_volume("vol-0123"))
            .await
            .expect("listed volume");

        assert_eq!(
            labels.get(LABEL_TOPOLOGY_ZONE).map(String::as_str),
            Some("zone-a__zone-b")
        );
        assert_eq!(
            labels.get(LABEL_TOPOLOGY_REGION).map(String::as_str),
            Some("region-1")
        );
    }

    #[tokio::test]
    async fn unlisted_volume_uses_defaults() {
        let file = write_catalog(CATALOG);
        let catalog = VolumeCatalog::from_file(Some(file.path())).expect("valid catalog");
        let provider = CatalogLabelProvider::new(Backend::Aws, catalog.clone());

        let labels = provider
            .labels_for_volume(&aws_volume("vol-4567"))
            .await
            .expect("default labels");

        assert_eq!(labels, catalog.default_labels);
    }

    #[tokio::test]
    async fn unlisted_volume_without_defaults() {
        let provider = CatalogLabelProvider::new(Backend::Aws, VolumeCatalog::default());

        let error = provider
            .labels_for_volume(&aws_volume("vol-4567"))
            .await
            .expect_err("unknown volume");

        assert_eq!(
            error,
            LabelProviderError::UnknownVolume {
                volume_id: "vol-4567".to_owned()
            }
        );
    }

    #[tokio::test]
    async fn other_backend_is_unsupported() {
        let provider = CatalogLabelProvider::new(Backend::Aws, VolumeCatalog::default());
        let volume = PersistentVolume {
            spec: Some(PersistentVolumeSpec {
                gce_persistent_disk: Some(GCEPersistentDiskVolumeSource {
                    pd_name: "pd-1".to_owned(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };

        let error = provider
            .labels_for_volume(&volume)
            .await
            .expect_err("wrong backend");

        assert_eq!(
            error,
            LabelProviderError::UnsupportedVolumeSource {
                backend: Backend::Aws
            }
        );
    }
}
