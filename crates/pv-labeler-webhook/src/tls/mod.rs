//! This module contains structs and functions to easily create a TLS termination
//! server, which can be used in combination with an Axum [`Router`].
use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, extract::Request};
use cert_resolver::{CertificateResolver, CertificateResolverError};
use hyper::{body::Incoming, service::service_fn};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use snafu::{ResultExt, Snafu};
use tokio::{net::TcpListener, time::interval};
use tokio_rustls::{
    TlsAcceptor,
    rustls::{ServerConfig, crypto::ring::default_provider, version::TLS13},
};
use tower::{Service, ServiceExt};
use tracing::{Instrument, field::Empty, instrument};

use crate::options::TlsOptions;

mod cert_resolver;

pub type Result<T, E = TlsServerError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum TlsServerError {
    #[snafu(display("failed to create certificate resolver"))]
    CreateCertificateResolver { source: CertificateResolverError },

    #[snafu(display("failed to create TCP listener by binding to socket address {socket_addr:?}"))]
    BindTcpListener {
        source: std::io::Error,
        socket_addr: SocketAddr,
    },

    #[snafu(display("failed to set safe TLS protocol versions"))]
    SetSafeTlsProtocolVersions { source: tokio_rustls::rustls::Error },
}

/// A server which terminates TLS connections and allows clients to communicate
/// via HTTPS with the underlying HTTP router.
///
/// Only TLS 1.3 is offered to clients.
pub struct TlsServer {
    config: ServerConfig,
    cert_resolver: Arc<CertificateResolver>,
    reload_interval: Option<Duration>,

    socket_addr: SocketAddr,
    router: Router,
}

impl TlsServer {
    #[instrument(name = "create_tls_server", skip(router))]
    pub async fn new(socket_addr: SocketAddr, router: Router, tls: TlsOptions) -> Result<Self> {
        let TlsOptions {
            certificate_path,
            private_key_path,
            reload_interval,
        } = tls;

        let cert_resolver = Arc::new(
            CertificateResolver::new(certificate_path, private_key_path)
                .await
                .context(CreateCertificateResolverSnafu)?,
        );

        let tls_provider = default_provider();
        let mut config = ServerConfig::builder_with_provider(tls_provider.into())
            .with_protocol_versions(&[&TLS13])
            .context(SetSafeTlsProtocolVersionsSnafu)?
            .with_no_client_auth()
            .with_cert_resolver(cert_resolver.clone());
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

        Ok(Self {
            config,
            cert_resolver,
            reload_interval,
            socket_addr,
            router,
        })
    }

    /// Runs the TLS server by listening for incoming TCP connections on the
    /// bound socket address. It only accepts TLS connections. Internally each
    /// TLS stream get handled by a Hyper service, which in turn is an Axum
    /// router.
    pub async fn run(self) -> Result<()> {
        if let Some(reload_interval) = self.reload_interval {
            let cert_resolver = self.cert_resolver.clone();
            tokio::spawn(async move {
                Self::run_certificate_reload_loop(cert_resolver, reload_interval).await;
            });
        }

        let tls_acceptor = TlsAcceptor::from(Arc::new(self.config));
        let tcp_listener =
            TcpListener::bind(self.socket_addr)
                .await
                .context(BindTcpListenerSnafu {
                    socket_addr: self.socket_addr,
                })?;

        tracing::info!(socket_addr = %self.socket_addr, "webhook server listening");

        // The connect info lets handlers and the trace layer see the client address
        let mut router = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let network_type = self.socket_addr.semantic_convention_network_type();

        loop {
            let (tcp_stream, remote_addr) = match tcp_listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::trace!(%err, "failed to accept incoming TCP connection");
                    continue;
                }
            };

            let Ok(tower_service) = router.call(remote_addr).await;
            let tls_acceptor = tls_acceptor.clone();

            let span = tracing::debug_span!(
                "serve connection",
                "client.address" = remote_addr.ip().to_string(),
                "client.port" = i64::from(remote_addr.port()),
                "network.type" = network_type,
                "error.message" = Empty,
            );
            tokio::spawn(
                async move {
                    let tls_stream = match tls_acceptor.accept(tcp_stream).await {
                        Ok(tls_stream) => tls_stream,
                        Err(err) => {
                            tracing::Span::current().record("error.message", err.to_string());
                            tracing::trace!("TLS handshake failed");
                            return;
                        }
                    };

                    // hyper brings its own IO and service traits, bridge them to tokio and tower
                    let hyper_service = service_fn(move |request: Request<Incoming>| {
                        tower_service.clone().oneshot(request)
                    });

                    let connection = auto::Builder::new(TokioExecutor::new());
                    if let Err(err) = connection
                        .serve_connection_with_upgrades(TokioIo::new(tls_stream), hyper_service)
                        .await
                    {
                        tracing::Span::current().record("error.message", err.to_string());
                        tracing::warn!(%err, "failed to serve connection");
                    }
                }
                .instrument(span),
            );
        }
    }

    async fn run_certificate_reload_loop(
        cert_resolver: Arc<CertificateResolver>,
        reload_interval: Duration,
    ) {
        let mut interval = interval(reload_interval);
        // Let the interval tick once, the certificate was just loaded.
        interval.tick().await;

        loop {
            interval.tick().await;

            if let Err(error) = cert_resolver.reload_certificate().await {
                tracing::error!(
                    error = &error as &dyn std::error::Error,
                    "failed to reload serving certificate, keeping the current one"
                );
            }
        }
    }
}

pub trait SocketAddrExt {
    fn semantic_convention_network_type(&self) -> &'static str;
}

impl SocketAddrExt for SocketAddr {
    fn semantic_convention_network_type(&self) -> &'static str {
        match self {
            SocketAddr::V4(_) => "ipv4",
            SocketAddr::V6(_) => "ipv6",
        }
    }
}
