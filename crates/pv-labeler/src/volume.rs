//! The vendor payload of a [`PersistentVolume`] and the storage backend it belongs to.
use k8s_openapi::api::core::v1::{
    AWSElasticBlockStoreVolumeSource, AzureDiskVolumeSource, GCEPersistentDiskVolumeSource,
    PersistentVolume, VsphereVirtualDiskVolumeSource,
};

/// The storage backends a label provider can be registered for.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    Gce,
    Azure,
    Aws,
    Vsphere,
}

/// The vendor payload of a volume.
///
/// Only one payload is considered per volume. If the (invalid) volume carries several, the
/// payload of a backend with a registered label provider is preferred (see
/// [`VolumeSource::for_backend`]), otherwise the first one in the order GCE, Azure, AWS, vSphere
/// wins.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VolumeSource<'a> {
    GcePersistentDisk(&'a GCEPersistentDiskVolumeSource),
    AzureDisk(&'a AzureDiskVolumeSource),
    AwsElasticBlockStore(&'a AWSElasticBlockStoreVolumeSource),
    VsphereVolume(&'a VsphereVirtualDiskVolumeSource),

    /// Anything else (hostPath, CSI, NFS, ...) or no payload at all.
    Unrecognized,
}

impl<'a> VolumeSource<'a> {
    pub fn from_persistent_volume(volume: &'a PersistentVolume) -> Self {
        let Some(spec) = volume.spec.as_ref() else {
            return Self::Unrecognized;
        };

        if let Some(source) = &spec.gce_persistent_disk {
            Self::GcePersistentDisk(source)
        } else if let Some(source) = &spec.azure_disk {
            Self::AzureDisk(source)
        } else if let Some(source) = &spec.aws_elastic_block_store {
            Self::AwsElasticBlockStore(source)
        } else if let Some(source) = &spec.vsphere_volume {
            Self::VsphereVolume(source)
        } else {
            Self::Unrecognized
        }
    }

    /// The payload of `backend`, if the volume carries one.
    pub fn for_backend(volume: &'a PersistentVolume, backend: Backend) -> Option<Self> {
        let spec = volume.spec.as_ref()?;
        match backend {
            Backend::Gce => spec.gce_persistent_disk.as_ref().map(Self::GcePersistentDisk),
            Backend::Azure => spec.azure_disk.as_ref().map(Self::AzureDisk),
            Backend::Aws => spec
                .aws_elastic_block_store
                .as_ref()
                .map(Self::AwsElasticBlockStore),
            Backend::Vsphere => spec.vsphere_volume.as_ref().map(Self::VsphereVolume),
        }
    }

    pub fn backend(&self) -> Option<Backend> {
        match self {
            Self::GcePersistentDisk(_) => Some(Backend::Gce),
            Self::AzureDisk(_) => Some(Backend::Azure),
            Self::AwsElasticBlockStore(_) => Some(Backend::Aws),
            Self::VsphereVolume(_) => Some(Backend::Vsphere),
            Self::Unrecognized => None,
        }
    }

    /// The identifier the backend knows the volume by: the GCE PD name, the Azure disk name, the
    /// AWS volume ID or the vSphere volume path.
    pub fn volume_id(&self) -> Option<&'a str> {
        match self {
            Self::GcePersistentDisk(source) => Some(&source.pd_name),
            Self::AzureDisk(source) => Some(&source.disk_name),
            Self::AwsElasticBlockStore(source) => Some(&source.volume_id),
            Self::VsphereVolume(source) => Some(&source.volume_path),
            Self::Unrecognized => None,
        }
    }
}
