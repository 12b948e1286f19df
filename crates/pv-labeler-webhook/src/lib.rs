//! Utility types and functions to create a ready-to-use admission webhook server. The server only
//! speaks HTTPS, using a certificate that is mounted into the container. This library is fully
//! compatible with the [`tracing`] crate and emits debug level tracing data.
//!
//! Webhooks implement the [`Webhook`] trait and register their routes on an Axum [`Router`]. The
//! [`WebhookServer`] merges all of them, adds a `/health` route and terminates TLS.
//!
//! ```no_run
//! use axum::{Router, routing::post};
//! use pv_labeler_webhook::{Webhook, WebhookServer, WebhookServerOptions};
//!
//! struct Echo;
//!
//! impl Webhook for Echo {
//!     fn register_routes(&self, router: Router) -> Router {
//!         router.route("/echo", post(|body: String| async move { body }))
//!     }
//! }
//!
//! # async fn docs() -> Result<(), pv_labeler_webhook::WebhookError> {
//! let options = WebhookServerOptions::builder()
//!     .bind_port(8443)
//!     .tls_certificate_path("/tmp/tls.crt")
//!     .tls_private_key_path("/tmp/tls.key")
//!     .build();
//!
//! let server = WebhookServer::new(vec![Box::new(Echo)], options).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
use axum::{Router, routing::get};
use futures_util::{FutureExt as _, future::Either, pin_mut, select};
use snafu::{ResultExt, Snafu};
use tokio::signal::unix::{SignalKind, signal};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::tls::TlsServer;

pub mod constants;
pub mod options;
pub mod tls;

// Selected re-exports
pub use crate::options::{TlsOptions, WebhookServerOptions};

/// A result type alias with the [`WebhookError`] type as the default error type.
pub type Result<T, E = WebhookError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum WebhookError {
    #[snafu(display("failed to create TLS server"))]
    CreateTlsServer { source: tls::TlsServerError },

    #[snafu(display("failed to run TLS server"))]
    RunTlsServer { source: tls::TlsServerError },

    #[snafu(display("failed to create unix signal handler"))]
    CreateSignalHandler { source: std::io::Error },
}

/// A webhook (such as the PersistentVolume labeler) needs to implement this trait.
pub trait Webhook: Send + Sync {
    /// The webhook can add arbitrary routes to the passed [`Router`] and needs to return the
    /// resulting [`Router`].
    fn register_routes(&self, router: Router) -> Router;
}

/// A ready-to-use webhook server.
///
/// This server abstracts away lower-level details like TLS termination
/// and other various configurations, validations or middlewares. The routes
/// and their handlers are contributed by the registered [`Webhook`]s.
pub struct WebhookServer {
    tls_server: TlsServer,
}

impl WebhookServer {
    /// Creates a new ready-to-use webhook server.
    ///
    /// The server listens on `socket_addr` which is provided via the [`WebhookServerOptions`].
    /// This reads the serving certificate, so it fails early if the mounted files are missing or
    /// invalid.
    ///
    /// To start the server, use the [`WebhookServer::run()`] function. This will
    /// run the server using the Tokio runtime until it is terminated.
    pub async fn new(webhooks: Vec<Box<dyn Webhook>>, options: WebhookServerOptions) -> Result<Self> {
        tracing::trace!("create new webhook server");

        let router = Self::router(&webhooks);

        tracing::debug!("create TLS server");
        let tls_server = TlsServer::new(options.socket_addr, router, options.tls)
            .await
            .context(CreateTlsServerSnafu)?;

        Ok(Self { tls_server })
    }

    /// Builds the complete [`Router`] served by the webhook server: every webhook's routes behind
    /// a tracing layer, plus the uninstrumented `/health` route.
    pub fn router(webhooks: &[Box<dyn Webhook>]) -> Router {
        tracing::debug!("create core router and register webhook routes");
        let router = webhooks
            .iter()
            .fold(Router::new(), |router, webhook| webhook.register_routes(router));

        // Use a service builder to provide multiple layers at once. Recommended
        // by the Axum project.
        //
        // See https://docs.rs/axum/latest/axum/middleware/index.html#applying-multiple-middleware
        let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

        router
            .layer(service_builder)
            // The health route is below the TraceLayer so as not to be instrumented
            .route("/health", get(|| async { "ok" }))
    }

    /// Runs the Webhook server and sets up signal handlers for shutting down.
    ///
    /// This does not implement graceful shutdown of the underlying server.
    pub async fn run(self) -> Result<()> {
        let mut sigint = signal(SignalKind::interrupt()).context(CreateSignalHandlerSnafu)?;
        let mut sigterm = signal(SignalKind::terminate()).context(CreateSignalHandlerSnafu)?;
        tracing::debug!("created unix signal handlers");

        let future_server = self.run_server();
        let future_signal = async {
            select! {
                signal = sigint.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGINT");
                    }
                },
                signal = sigterm.recv().fuse() => {
                    if signal.is_some() {
                        tracing::debug!("received SIGTERM");
                    }
                },
            };
        };

        // select requires Future + Unpin
        pin_mut!(future_server);
        pin_mut!(future_signal);

        match futures_util::future::select(future_server, future_signal).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => {
                tracing::info!("shutting down webhook server");
                Ok(())
            }
        }
    }

    /// Runs the webhook server by creating a TCP listener and binding it to
    /// the specified socket address.
    async fn run_server(self) -> Result<()> {
        tracing::debug!("run webhook server");

        self.tls_server.run().await.context(RunTlsServerSnafu)
    }
}
