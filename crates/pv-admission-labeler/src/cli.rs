use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::Parser;
use pv_labeler::Backend;
use pv_labeler_telemetry::tracing::TelemetryOptions;
use pv_labeler_webhook::constants::{
    DEFAULT_SOCKET_ADDRESS, DEFAULT_TLS_CERTIFICATE_PATH, DEFAULT_TLS_PRIVATE_KEY_PATH,
};

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(
    name = "pv-admission-labeler",
    author,
    version,
    about = "Mutating admission webhook adding topology labels and node affinity to PersistentVolumes"
)]
pub struct Opts {
    /// Socket ADDRESS the HTTPS server listens on.
    #[arg(long, env, value_name = "ADDRESS", default_value_t = DEFAULT_SOCKET_ADDRESS)]
    pub addr: SocketAddr,

    /// Path to the PEM encoded serving certificate (chain).
    #[arg(long, env, value_name = "FILE", default_value = DEFAULT_TLS_CERTIFICATE_PATH)]
    pub tls_cert_path: PathBuf,

    /// Path to the PEM encoded private key of the serving certificate.
    #[arg(long, env, value_name = "FILE", default_value = DEFAULT_TLS_PRIVATE_KEY_PATH)]
    pub tls_key_path: PathBuf,

    /// Re-read the serving certificate and key every DURATION, e.g. `5m`.
    #[arg(long, env, value_name = "DURATION", value_parser = humantime::parse_duration)]
    pub tls_reload_interval: Option<Duration>,

    /// Storage BACKEND whose volumes are labelled: gce, azure, aws or vsphere.
    #[arg(long, env, value_name = "BACKEND")]
    pub cloud_provider: Backend,

    /// Path to the volume catalog of the storage backend.
    #[arg(long, env, value_name = "FILE")]
    pub cloud_config: Option<PathBuf>,

    // IMPORTANT: All (flattened) sub structs should be placed at the end to ensure the help
    // headings are correct.
    #[command(flatten)]
    pub telemetry: TelemetryOptions,
}
