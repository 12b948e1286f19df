use std::sync::Arc;

use clap::Parser;
use pv_labeler::{
    CatalogLabelProvider, ProviderRegistry, PvLabelAdmission, VolumeCatalog,
    provider::CatalogError,
};
use pv_labeler_telemetry::Tracing;
use pv_labeler_webhook::{WebhookError, WebhookServer, WebhookServerOptions};
use snafu::{ResultExt, Snafu};

use crate::cli::Opts;

mod cli;

const APP_NAME: &str = "pv-admission-labeler";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize tracing subscribers"))]
    InitTracing {
        source: pv_labeler_telemetry::tracing::Error,
    },

    #[snafu(display("failed to load volume catalog"))]
    LoadVolumeCatalog { source: CatalogError },

    #[snafu(display("failed to create webhook server"))]
    CreateWebhookServer { source: WebhookError },

    #[snafu(display("failed to run webhook server"))]
    RunWebhookServer { source: WebhookError },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    let opts = Opts::parse();

    // Hold the guard until the end of main, dropping it flushes the file logs
    let _tracing_guard = Tracing::pre_configured(APP_NAME, opts.telemetry)
        .init()
        .context(InitTracingSnafu)?;

    tracing::info!(
        app.name = APP_NAME,
        app.version = env!("CARGO_PKG_VERSION"),
        cloud_provider = %opts.cloud_provider,
        "starting"
    );

    let catalog =
        VolumeCatalog::from_file(opts.cloud_config.as_deref()).context(LoadVolumeCatalogSnafu)?;
    let registry = ProviderRegistry::new().with_provider(
        opts.cloud_provider,
        Arc::new(CatalogLabelProvider::new(opts.cloud_provider, catalog)),
    );
    let admission = PvLabelAdmission::new(Arc::new(registry));

    let options = WebhookServerOptions::builder()
        .socket_addr(opts.addr)
        .tls_certificate_path(opts.tls_cert_path)
        .tls_private_key_path(opts.tls_key_path)
        .tls_reload_interval(opts.tls_reload_interval)
        .build();

    WebhookServer::new(vec![Box::new(admission)], options)
        .await
        .context(CreateWebhookServerSnafu)?
        .run()
        .await
        .context(RunWebhookServerSnafu)
}
