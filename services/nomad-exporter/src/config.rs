//! Exporter configuration.
//!
//! Flag names follow the usual Prometheus exporter conventions (`--web.*`).
//! Everything is resolved once at startup.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen address {0:?}")]
    ListenAddress(String),

    #[error("metrics path must start with '/' and must not be '/': {0:?}")]
    MetricsPath(String),

    #[error("{0} and {1} must be provided together")]
    IncompleteTls(&'static str, &'static str),
}

/// Command-line arguments.
#[derive(Debug, Clone, Parser)]
#[command(name = "nomad_exporter", version, about = "Prometheus exporter for Nomad")]
pub struct Args {
    /// Address to listen on for web interface and telemetry.
    #[arg(
        long = "web.listen-address",
        env = "NOMAD_EXPORTER_LISTEN_ADDRESS",
        default_value = ":9172"
    )]
    pub listen_address: String,

    /// Path under which to expose metrics.
    #[arg(
        long = "web.telemetry-path",
        env = "NOMAD_EXPORTER_TELEMETRY_PATH",
        default_value = "/metrics"
    )]
    pub telemetry_path: String,

    /// HTTP API address of a Nomad server or agent.
    #[arg(long = "nomad.server", env = "NOMAD_ADDR", default_value = "http://localhost:4646")]
    pub nomad_server: String,

    /// HTTP timeout to contact Nomad agent, in seconds.
    #[arg(
        long = "nomad.timeout",
        env = "NOMAD_EXPORTER_TIMEOUT",
        default_value_t = 30,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub nomad_timeout: u64,

    /// Maximum allocations enriched concurrently per scrape (0 = unbounded).
    #[arg(
        long = "nomad.max-concurrency",
        env = "NOMAD_EXPORTER_MAX_CONCURRENCY",
        default_value_t = 0
    )]
    pub max_concurrency: usize,

    /// Path to a PEM-encoded CA cert file to verify the Nomad server.
    #[arg(long = "tls.ca-file", env = "NOMAD_CACERT")]
    pub tls_ca_file: Option<PathBuf>,

    /// Path to a directory of PEM-encoded CA cert files.
    #[arg(long = "tls.ca-path", env = "NOMAD_CAPATH")]
    pub tls_ca_path: Option<PathBuf>,

    /// Path to the client certificate for Nomad communication.
    #[arg(long = "tls.cert-file", env = "NOMAD_CLIENT_CERT")]
    pub tls_cert_file: Option<PathBuf>,

    /// Path to the key for cert-file.
    #[arg(long = "tls.key-file", env = "NOMAD_CLIENT_KEY")]
    pub tls_key_file: Option<PathBuf>,

    /// Disable TLS certificate verification.
    #[arg(long = "tls.insecure", env = "NOMAD_SKIP_VERIFY")]
    pub tls_insecure: bool,

    /// SNI server name for the Nomad TLS connection.
    #[arg(long = "tls.tls-server-name", env = "NOMAD_TLS_SERVER_NAME")]
    pub tls_server_name: Option<String>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long = "log.level", env = "NOMAD_EXPORTER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// TLS material for the Nomad connection.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub ca_file: Option<PathBuf>,
    pub ca_path: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub insecure: bool,
    pub server_name: Option<String>,
}

/// Settings for talking to Nomad.
#[derive(Debug, Clone)]
pub struct NomadConfig {
    /// Nomad HTTP API base URL (example: http://localhost:4646).
    pub address: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Cap on concurrent allocation lookups per scrape; 0 means unbounded.
    pub max_concurrency: usize,

    pub tls: TlsConfig,
}

/// Exporter configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// `host:port` to bind; the host may be a name, resolved when binding.
    pub listen_addr: String,
    pub metrics_path: String,
    pub nomad: NomadConfig,
    pub log_level: String,
}

impl Config {
    /// Validate parsed arguments into a configuration.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let listen_addr = parse_listen_address(&args.listen_address)?;

        let metrics_path = args.telemetry_path;
        if !metrics_path.starts_with('/') || metrics_path == "/" {
            return Err(ConfigError::MetricsPath(metrics_path));
        }

        if args.tls_cert_file.is_some() != args.tls_key_file.is_some() {
            return Err(ConfigError::IncompleteTls("--tls.cert-file", "--tls.key-file"));
        }

        let tls = TlsConfig {
            ca_file: args.tls_ca_file,
            ca_path: args.tls_ca_path,
            cert_file: args.tls_cert_file,
            key_file: args.tls_key_file,
            insecure: args.tls_insecure,
            server_name: args.tls_server_name.filter(|name| !name.is_empty()),
        };

        Ok(Self {
            listen_addr,
            metrics_path,
            nomad: NomadConfig {
                address: args.nomad_server,
                timeout: Duration::from_secs(args.nomad_timeout),
                max_concurrency: args.max_concurrency,
                tls,
            },
            log_level: args.log_level,
        })
    }
}

/// Validate a listen address of the form `host:port`.
///
/// The `:port` shorthand binds all interfaces. Hosts may be IP literals
/// (`[::1]:9172`) or names (`localhost:9172`); names are resolved by the
/// listener at bind time.
pub fn parse_listen_address(raw: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::ListenAddress(raw.to_string());

    let (host, port) = raw.rsplit_once(':').ok_or_else(invalid)?;
    port.parse::<u16>().map_err(|_| invalid())?;

    if host.is_empty() {
        return Ok(format!("0.0.0.0:{port}"));
    }
    if host.contains(char::is_whitespace) {
        return Err(invalid());
    }
    // A bare IPv6 host must be bracketed, otherwise the port is ambiguous.
    if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
        return Err(invalid());
    }

    Ok(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Config, ConfigError> {
        let mut argv = vec!["nomad_exporter"];
        argv.extend_from_slice(args);
        Config::from_args(Args::try_parse_from(argv).unwrap())
    }

    #[test]
    fn test_listen_address_shorthand() {
        assert_eq!(parse_listen_address(":9172").unwrap(), "0.0.0.0:9172");
    }

    #[test]
    fn test_listen_address_full() {
        assert_eq!(parse_listen_address("[::1]:9000").unwrap(), "[::1]:9000");
        assert_eq!(
            parse_listen_address("127.0.0.1:9172").unwrap(),
            "127.0.0.1:9172"
        );
    }

    #[test]
    fn test_listen_address_hostname() {
        assert_eq!(
            parse_listen_address("localhost:9172").unwrap(),
            "localhost:9172"
        );
        let config = parse(&["--web.listen-address", "localhost:9172"]).unwrap();
        assert_eq!(config.listen_addr, "localhost:9172");
    }

    #[tokio::test]
    async fn test_listen_address_hostname_binds() {
        let addr = parse_listen_address("localhost:0").unwrap();
        let listener = tokio::net::TcpListener::bind(addr.as_str()).await.unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[test]
    fn test_listen_address_invalid() {
        assert!(parse_listen_address(":http").is_err());
        assert!(parse_listen_address("localhost").is_err());
        assert!(parse_listen_address("localhost:").is_err());
        assert!(parse_listen_address("localhost:70000").is_err());
        assert!(parse_listen_address("::1:9000").is_err());
        assert!(parse_listen_address("my host:9000").is_err());
    }

    #[test]
    fn test_explicit_flags() {
        let config = parse(&[
            "--web.listen-address",
            "127.0.0.1:9999",
            "--web.telemetry-path",
            "/nomad/metrics",
            "--nomad.server",
            "https://nomad.example:4646",
            "--nomad.timeout",
            "5",
            "--nomad.max-concurrency",
            "16",
            "--tls.insecure",
            "--tls.tls-server-name",
            "server.global.nomad",
        ])
        .unwrap();

        assert_eq!(config.listen_addr, "127.0.0.1:9999");
        assert_eq!(config.metrics_path, "/nomad/metrics");
        assert_eq!(config.nomad.address, "https://nomad.example:4646");
        assert_eq!(config.nomad.timeout, Duration::from_secs(5));
        assert_eq!(config.nomad.max_concurrency, 16);
        assert!(config.nomad.tls.insecure);
        assert_eq!(
            config.nomad.tls.server_name.as_deref(),
            Some("server.global.nomad")
        );
    }

    #[test]
    fn test_non_numeric_timeout_rejected() {
        let result = Args::try_parse_from(["nomad_exporter", "--nomad.timeout", "thirty"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Args::try_parse_from(["nomad_exporter", "--nomad.timeout", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_root_metrics_path_rejected() {
        let err = parse(&["--web.telemetry-path", "/"]).unwrap_err();
        assert!(matches!(err, ConfigError::MetricsPath(_)));
    }

    #[test]
    fn test_relative_metrics_path_rejected() {
        let err = parse(&["--web.telemetry-path", "metrics"]).unwrap_err();
        assert!(matches!(err, ConfigError::MetricsPath(_)));
    }

    #[test]
    fn test_client_cert_requires_key() {
        let err = parse(&["--tls.cert-file", "/etc/nomad/cli.pem"]).unwrap_err();
        assert!(matches!(err, ConfigError::IncompleteTls(_, _)));
    }

    #[test]
    fn test_empty_server_name_ignored() {
        let config = parse(&["--tls.tls-server-name", ""]).unwrap();
        assert!(config.nomad.tls.server_name.is_none());
    }
}
