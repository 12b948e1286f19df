//! Contains available options to configure the [WebhookServer][crate::WebhookServer].
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use crate::constants::{
    DEFAULT_SOCKET_ADDRESS, DEFAULT_TLS_CERTIFICATE_PATH, DEFAULT_TLS_PRIVATE_KEY_PATH,
};

/// Specifies available webhook server options.
///
/// The [`Default`] implementation for this struct contains the following values:
///
/// - The socket binds to 0.0.0.0 on port 9001 (HTTPS)
/// - The certificate and key are read from `/etc/pv-labeler/tls/tls.{crt,key}`
/// - The certificate is never reloaded from disk
///
/// ### Example with Custom HTTPS IP Address and Port
///
/// ```
/// use pv_labeler_webhook::WebhookServerOptions;
///
/// // Set IP address and port at the same time
/// let options = WebhookServerOptions::builder()
///     .bind_address([0, 0, 0, 0], 12345)
///     .build();
///
/// // Set IP address only
/// let options = WebhookServerOptions::builder()
///     .bind_ip([0, 0, 0, 0])
///     .build();
///
/// // Set port only
/// let options = WebhookServerOptions::builder()
///     .bind_port(12345)
///     .build();
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookServerOptions {
    /// The HTTPS socket address the [`TcpListener`][tokio::net::TcpListener]
    /// binds to.
    pub socket_addr: SocketAddr,

    /// Where the serving certificate and key are read from.
    pub tls: TlsOptions,
}

/// Location of the mounted serving certificate and how often it is re-read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlsOptions {
    /// Path to the PEM encoded certificate chain, leaf first.
    pub certificate_path: PathBuf,

    /// Path to the PEM encoded private key.
    pub private_key_path: PathBuf,

    /// When set, the certificate and key are re-read from disk in this interval, so that rotated
    /// certificates are served without a restart.
    pub reload_interval: Option<Duration>,
}

impl Default for WebhookServerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WebhookServerOptions {
    /// Returns the default [`WebhookServerOptionsBuilder`] which allows to selectively
    /// customize the options. See the documentation for [`WebhookServerOptions`] for more
    /// information on available functions.
    pub fn builder() -> WebhookServerOptionsBuilder {
        WebhookServerOptionsBuilder::default()
    }
}

/// The [`WebhookServerOptionsBuilder`] which allows to selectively customize the webhook
/// server [`WebhookServerOptions`].
///
/// Usually, this struct is not constructed manually, but instead by calling
/// [`WebhookServerOptions::builder()`] or [`WebhookServerOptionsBuilder::default()`].
#[derive(Debug, Default)]
pub struct WebhookServerOptionsBuilder {
    socket_addr: Option<SocketAddr>,
    certificate_path: Option<PathBuf>,
    private_key_path: Option<PathBuf>,
    reload_interval: Option<Duration>,
}

impl WebhookServerOptionsBuilder {
    /// Sets the socket address the webhook server uses to bind for HTTPS.
    pub fn bind_address(mut self, bind_ip: impl Into<IpAddr>, bind_port: u16) -> Self {
        self.socket_addr = Some(SocketAddr::new(bind_ip.into(), bind_port));
        self
    }

    /// Sets the IP address of the socket address the webhook server uses to
    /// bind for HTTPS.
    pub fn bind_ip(mut self, bind_ip: impl Into<IpAddr>) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_ip(bind_ip.into());
        self
    }

    /// Sets the port of the socket address the webhook server uses to bind
    /// for HTTPS.
    pub fn bind_port(mut self, bind_port: u16) -> Self {
        let addr = self.socket_addr.get_or_insert(DEFAULT_SOCKET_ADDRESS);
        addr.set_port(bind_port);
        self
    }

    /// Sets the complete socket address, e.g. parsed from a CLI argument.
    pub fn socket_addr(mut self, socket_addr: SocketAddr) -> Self {
        self.socket_addr = Some(socket_addr);
        self
    }

    /// Sets the path of the PEM encoded certificate chain.
    pub fn tls_certificate_path(mut self, certificate_path: impl Into<PathBuf>) -> Self {
        self.certificate_path = Some(certificate_path.into());
        self
    }

    /// Sets the path of the PEM encoded private key.
    pub fn tls_private_key_path(mut self, private_key_path: impl Into<PathBuf>) -> Self {
        self.private_key_path = Some(private_key_path.into());
        self
    }

    /// Enables periodic re-reading of the certificate and key.
    pub fn tls_reload_interval(mut self, reload_interval: impl Into<Option<Duration>>) -> Self {
        self.reload_interval = reload_interval.into();
        self
    }

    /// Builds the final [`WebhookServerOptions`] by using default values for any not
    /// explicitly set option.
    pub fn build(self) -> WebhookServerOptions {
        WebhookServerOptions {
            socket_addr: self.socket_addr.unwrap_or(DEFAULT_SOCKET_ADDRESS),
            tls: TlsOptions {
                certificate_path: self
                    .certificate_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TLS_CERTIFICATE_PATH)),
                private_key_path: self
                    .private_key_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_TLS_PRIVATE_KEY_PATH)),
                reload_interval: self.reload_interval,
            },
        }
    }
}
