//! Contains various constant definitions, mostly for default ports, IP
//! addresses and certificate locations.
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// The default HTTPS port `9001`
pub const DEFAULT_HTTPS_PORT: u16 = 9001;

/// The default IP address [`Ipv4Addr::UNSPECIFIED`] (`0.0.0.0`) the webhook server binds to,
/// which represents binding on all network addresses.
pub const DEFAULT_LISTEN_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// The default socket address `0.0.0.0:9001` the webhook server binds to.
pub const DEFAULT_SOCKET_ADDRESS: SocketAddr =
    SocketAddr::new(DEFAULT_LISTEN_ADDRESS, DEFAULT_HTTPS_PORT);

/// The default location of the PEM encoded serving certificate (chain).
pub const DEFAULT_TLS_CERTIFICATE_PATH: &str = "/etc/pv-labeler/tls/tls.crt";

/// The default location of the PEM encoded private key of the serving certificate.
pub const DEFAULT_TLS_PRIVATE_KEY_PATH: &str = "/etc/pv-labeler/tls/tls.key";
