//! Nomad HTTP API client.
//!
//! Provides the three read operations the collector needs:
//! - Listing allocations cluster-wide
//! - Fetching a single allocation
//! - Fetching a single node
//!
//! None of them retries; a failed lookup is reported to the caller as-is.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use async_trait::async_trait;
use reqwest::{Certificate, Identity, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{NomadConfig, TlsConfig};

/// Errors from Nomad API operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("unexpected status {status} from {path}: {body}")]
    Status {
        status: StatusCode,
        path: String,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response body from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid Nomad address: {0}")]
    InvalidUrl(String),

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read-only view of the scheduler API used by the collector.
#[async_trait]
pub trait SchedulerApi: Send + Sync {
    /// List every allocation in the cluster, regardless of status.
    async fn list_allocations(&self) -> Result<Vec<AllocationStub>, ClientError>;

    /// Fetch the full allocation record by ID.
    async fn get_allocation(&self, alloc_id: &str) -> Result<Allocation, ClientError>;

    /// Fetch a node record by ID.
    async fn get_node(&self, node_id: &str) -> Result<Node, ClientError>;
}

/// Allocation entry as returned by `GET /v1/allocations`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AllocationStub {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "ClientStatus")]
    pub client_status: String,
    #[serde(rename = "JobID", default)]
    pub job_id: String,
    #[serde(rename = "TaskGroup", default)]
    pub task_group: String,
    #[serde(rename = "NodeID", default)]
    pub node_id: String,
}

/// Allocation as returned by `GET /v1/allocation/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct Allocation {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "NodeID")]
    pub node_id: String,
    #[serde(rename = "TaskGroup")]
    pub task_group: String,
    #[serde(rename = "Job")]
    pub job: AllocationJob,
    #[serde(rename = "Resources")]
    pub resources: AllocationResources,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationJob {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Region")]
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AllocationResources {
    #[serde(rename = "MemoryMB")]
    pub memory_mb: i64,
}

/// Node as returned by `GET /v1/node/:id`.
#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Datacenter")]
    pub datacenter: String,
    #[serde(rename = "Name")]
    pub name: String,
}

/// Nomad API client.
#[derive(Debug, Clone)]
pub struct NomadClient {
    client: reqwest::Client,
    base_url: Url,
}

impl NomadClient {
    /// Build a client from the Nomad section of the configuration.
    ///
    /// TLS settings are only applied to `https://` addresses.
    /// With a TLS server name override, the original host is resolved once
    /// here and requests are pinned to those addresses.
    pub async fn new(config: &NomadConfig) -> Result<Self, ClientError> {
        let mut base_url = Url::parse(&config.address)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", config.address)))?;
        if base_url.cannot_be_a_base() || base_url.host_str().is_none() {
            return Err(ClientError::InvalidUrl(config.address.clone()));
        }

        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("nomad-exporter/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout);

        if base_url.scheme() == "https" {
            builder = apply_tls(builder, &config.tls)?;

            if let Some(server_name) = &config.tls.server_name {
                let addrs = resolve_host(&base_url).await?;
                base_url
                    .set_host(Some(server_name))
                    .map_err(|e| ClientError::InvalidUrl(format!("{server_name}: {e}")))?;
                debug!(server_name = %server_name, addrs = ?addrs, "Pinning TLS server name");
                builder = builder.resolve_to_addrs(server_name, &addrs);
            }
        }

        Ok(Self {
            client: builder.build()?,
            base_url,
        })
    }

    /// Base URL requests are issued against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let url = self.endpoint(segments)?;
        let path = url.path().to_string();
        debug!(url = %url, "Querying Nomad");

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { path });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, path, body });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| ClientError::Decode { path, source })
    }
}

#[async_trait]
impl SchedulerApi for NomadClient {
    async fn list_allocations(&self) -> Result<Vec<AllocationStub>, ClientError> {
        self.get_json(&["v1", "allocations"]).await
    }

    async fn get_allocation(&self, alloc_id: &str) -> Result<Allocation, ClientError> {
        self.get_json(&["v1", "allocation", alloc_id]).await
    }

    async fn get_node(&self, node_id: &str) -> Result<Node, ClientError> {
        self.get_json(&["v1", "node", node_id]).await
    }
}

fn apply_tls(
    mut builder: reqwest::ClientBuilder,
    tls: &TlsConfig,
) -> Result<reqwest::ClientBuilder, ClientError> {
    if let Some(ca_file) = &tls.ca_file {
        builder = builder.add_root_certificate(load_certificate(ca_file)?);
    }

    if let Some(ca_path) = &tls.ca_path {
        for cert in load_certificate_dir(ca_path)? {
            builder = builder.add_root_certificate(cert);
        }
    }

    match (&tls.cert_file, &tls.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let mut pem = read_file(cert_file)?;
            pem.push(b'\n');
            pem.extend(read_file(key_file)?);
            let identity = Identity::from_pem(&pem)
                .map_err(|e| ClientError::Tls(format!("invalid client certificate: {e}")))?;
            builder = builder.identity(identity);
        }
        (None, None) => {}
        _ => {
            return Err(ClientError::Tls(
                "client certificate and key must be provided together".to_string(),
            ))
        }
    }

    if tls.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }

    Ok(builder)
}

fn read_file(path: &Path) -> Result<Vec<u8>, ClientError> {
    fs::read(path).map_err(|source| ClientError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn load_certificate(path: &Path) -> Result<Certificate, ClientError> {
    let pem = read_file(path)?;
    Certificate::from_pem(&pem)
        .map_err(|e| ClientError::Tls(format!("invalid CA certificate {}: {e}", path.display())))
}

fn load_certificate_dir(dir: &Path) -> Result<Vec<Certificate>, ClientError> {
    let entries = fs::read_dir(dir).map_err(|source| ClientError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| ClientError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let is_cert = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("pem") | Some("crt")
        );
        if is_cert && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|path| load_certificate(path)).collect()
}

async fn resolve_host(url: &Url) -> Result<Vec<SocketAddr>, ClientError> {
    let host = url
        .host_str()
        .ok_or_else(|| ClientError::InvalidUrl(url.to_string()))?;
    let port = url
        .port_or_known_default()
        .ok_or_else(|| ClientError::InvalidUrl(url.to_string()))?;

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.trim_matches(['[', ']']), port))
        .await
        .map_err(|source| ClientError::Io {
            path: format!("{host}:{port}"),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(ClientError::InvalidUrl(format!(
            "{host}:{port} did not resolve to any address"
        )));
    }

    Ok(addrs)
}
