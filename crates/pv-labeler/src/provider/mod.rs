//! The capability to look up topology labels for a volume from its storage backend.
use std::{
    collections::BTreeMap,
    fmt::{self, Debug},
    sync::Arc,
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use snafu::Snafu;

use crate::volume::Backend;

mod catalog;

pub use catalog::{CatalogError, CatalogLabelProvider, VolumeCatalog};

#[derive(Debug, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum LabelProviderError {
    #[snafu(display("no topology labels are known for volume {volume_id:?}"))]
    UnknownVolume { volume_id: String },

    #[snafu(display("the {backend} label provider does not support the volume source"))]
    UnsupportedVolumeSource { backend: Backend },
}

/// Returns the topology labels a volume should carry, as reported by its storage backend.
///
/// Implementations are shared between all concurrently handled requests.
#[async_trait]
pub trait LabelProvider: Send + Sync {
    async fn labels_for_volume(
        &self,
        volume: &PersistentVolume,
    ) -> Result<BTreeMap<String, String>, LabelProviderError>;
}

/// The label providers available to the webhook, at most one per [`Backend`].
///
/// Built once during startup and only read afterwards.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<Backend, Arc<dyn LabelProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, backend: Backend, provider: Arc<dyn LabelProvider>) -> Self {
        self.register(backend, provider);
        self
    }

    /// Registers `provider` for `backend`, replacing a previously registered one.
    pub fn register(&mut self, backend: Backend, provider: Arc<dyn LabelProvider>) {
        if self.providers.insert(backend, provider).is_some() {
            tracing::debug!(%backend, "replaced label provider");
        }
    }

    pub fn get(&self, backend: Backend) -> Option<&Arc<dyn LabelProvider>> {
        self.providers.get(&backend)
    }

    pub fn backends(&self) -> impl Iterator<Item = Backend> + '_ {
        self.providers.keys().copied()
    }
}

impl Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("backends", &self.backends().collect::<Vec<_>>())
            .finish()
    }
}
