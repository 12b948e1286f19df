use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use arc_swap::ArcSwap;
use snafu::{OptionExt, ResultExt, Snafu};
use tokio_rustls::rustls::{
    crypto::ring::default_provider,
    pki_types::{
        CertificateDer, PrivateKeyDer,
        pem::{self, PemObject},
    },
    server::{ClientHello, ResolvesServerCert},
    sign::CertifiedKey,
};

type Result<T, E = CertificateResolverError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum CertificateResolverError {
    #[snafu(display("failed to read certificate chain from {path:?}"))]
    ReadCertificateChain { source: pem::Error, path: PathBuf },

    #[snafu(display("certificate file {path:?} does not contain any certificate"))]
    EmptyCertificateChain { path: PathBuf },

    #[snafu(display("failed to read private key from {path:?}"))]
    ReadPrivateKey { source: pem::Error, path: PathBuf },

    #[snafu(display("failed to decode CertifiedKey from DER"))]
    DecodeCertifiedKeyFromDer { source: tokio_rustls::rustls::Error },

    #[snafu(display("failed to run task in blocking thread"))]
    TokioSpawnBlocking { source: tokio::task::JoinError },
}

/// This struct serves as [`ResolvesServerCert`] to always hand out the current certificate for TLS
/// client connections.
///
/// The certificate and key are mounted into the container (e.g. from a Secret managed by
/// cert-manager). [`Self::reload_certificate`] re-reads both files and swaps the served key,
/// which hot-reloads rotated certificates in the running webhook.
#[derive(Debug)]
pub struct CertificateResolver {
    /// Using a [`ArcSwap`] (over e.g. [`tokio::sync::RwLock`]), so that we can easily
    /// (and performant) bridge between async write and sync read.
    current_certified_key: ArcSwap<CertifiedKey>,

    certificate_path: PathBuf,
    private_key_path: PathBuf,
}

impl CertificateResolver {
    pub async fn new(certificate_path: PathBuf, private_key_path: PathBuf) -> Result<Self> {
        let certified_key =
            Self::load_certified_key(certificate_path.clone(), private_key_path.clone()).await?;

        Ok(Self {
            current_certified_key: ArcSwap::new(certified_key),
            certificate_path,
            private_key_path,
        })
    }

    /// Re-reads the certificate and key. On error the currently served certificate is kept.
    pub async fn reload_certificate(&self) -> Result<()> {
        let certified_key = Self::load_certified_key(
            self.certificate_path.clone(),
            self.private_key_path.clone(),
        )
        .await?;

        self.current_certified_key.store(certified_key);
        tracing::debug!(
            certificate_path = %self.certificate_path.display(),
            "reloaded serving certificate"
        );

        Ok(())
    }

    async fn load_certified_key(
        certificate_path: PathBuf,
        private_key_path: PathBuf,
    ) -> Result<Arc<CertifiedKey>> {
        // File IO and key parsing are blocking, so we use `spawn_blocking`
        tokio::task::spawn_blocking(move || {
            let tls_provider = default_provider();

            let certificate_chain = read_certificate_chain(&certificate_path)?;
            let private_key = PrivateKeyDer::from_pem_file(&private_key_path).context(
                ReadPrivateKeySnafu {
                    path: &private_key_path,
                },
            )?;

            let certified_key =
                CertifiedKey::from_der(certificate_chain, private_key, &tls_provider)
                    .context(DecodeCertifiedKeyFromDerSnafu)?;

            Ok(Arc::new(certified_key))
        })
        .await
        .context(TokioSpawnBlockingSnafu)?
    }
}

fn read_certificate_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certificate_chain = CertificateDer::pem_file_iter(path)
        .context(ReadCertificateChainSnafu { path })?
        .collect::<Result<Vec<_>, _>>()
        .context(ReadCertificateChainSnafu { path })?;

    // An empty chain would only fail later during the handshake, so reject it here
    certificate_chain
        .first()
        .context(EmptyCertificateChainSnafu { path })?;

    Ok(certificate_chain)
}

impl ResolvesServerCert for CertificateResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(self.current_certified_key.load_full())
    }
}
