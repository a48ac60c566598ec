//! # Host Metadata
//!
//! Facts about the host reported at registration. Only the hostname is
//! mandatory; every network probe is best effort and leaves its field empty
//! when it fails.

use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::MetadataConfig;
use crate::error::{AgentError, AgentResult};

/// Provider type when the cloud metadata service answers
pub const PROVIDER_AWS: &str = "AWS";
/// Provider type otherwise
pub const PROVIDER_NON_AWS: &str = "NON_AWS";

const HOSTNAME_FILE: &str = "/etc/hostname";
/// Routing probe target; connecting a UDP socket sends no packets
const ROUTE_PROBE_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(192, 0, 2, 1), 9);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HostMetadata {
    pub hostname: String,
    pub assigned_hostname: String,
    pub provider_id: String,
    pub provider_type: String,
    pub platform: String,
    pub private_ip_address: String,
    pub private_dns_name: String,
    pub public_ip_address: String,
    pub public_dns_name: String,
    pub region: String,
}

/// Cloud provider facts from the instance metadata service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub provider_id: String,
    pub provider_type: String,
    pub region: String,
}

impl HostMetadata {
    /// Gather metadata for this host
    pub async fn collect(config: &MetadataConfig, assigned_hostname: &str) -> AgentResult<Self> {
        debug!("Collecting host metadata");

        let hostname = resolve_hostname(
            std::env::var("HOSTNAME").ok(),
            Path::new(HOSTNAME_FILE),
        )?;

        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .map_err(|e| AgentError::Metadata(format!("could not build HTTP client: {e}")))?;

        let private_ip_address = local_ipv4().await.unwrap_or_default();
        let public_ip_address = query(&http, &config.public_ip_url)
            .await
            .map(|ip| ip.trim().to_string())
            .unwrap_or_default();
        let provider = probe_provider(&http, &config.cloud_metadata_url).await;

        let metadata = Self {
            hostname,
            assigned_hostname: assigned_hostname.to_string(),
            provider_id: provider.provider_id,
            provider_type: provider.provider_type,
            platform: platform(),
            private_ip_address,
            // Reverse lookups are not performed
            private_dns_name: String::new(),
            public_ip_address,
            public_dns_name: String::new(),
            region: provider.region,
        };

        debug!(metadata = ?metadata, "Collected host metadata");
        Ok(metadata)
    }
}

/// `HOSTNAME` when set, otherwise the first line of `hostname_file`
pub fn resolve_hostname(env_value: Option<String>, hostname_file: &Path) -> AgentResult<String> {
    if let Some(name) = env_value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        return Ok(name);
    }

    let contents = std::fs::read_to_string(hostname_file).map_err(|e| {
        AgentError::Metadata(format!(
            "could not read hostname from {}: {e}",
            hostname_file.display()
        ))
    })?;

    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AgentError::Metadata(format!("{} is empty", hostname_file.display())))
}

/// `<os> <arch>`, e.g. `linux x86_64`
pub fn platform() -> String {
    format!("{} {}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Address of the interface the default route would use
async fn local_ipv4() -> Option<String> {
    let socket = match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(error = %e, "Could not open socket to detect local address");
            return None;
        }
    };

    if let Err(e) = socket.connect(ROUTE_PROBE_ADDR).await {
        warn!(error = %e, "Could not detect local address; no IPv4 route");
        return None;
    }

    match socket.local_addr().map(|addr| addr.ip()) {
        Ok(IpAddr::V4(ip)) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip.to_string()),
        Ok(ip) => {
            debug!(ip = %ip, "Ignoring non-routable local address");
            None
        }
        Err(e) => {
            warn!(error = %e, "Could not read local socket address");
            None
        }
    }
}

/// Identify the cloud provider from the metadata service rooted at `base_url`
pub async fn probe_provider(http: &reqwest::Client, base_url: &str) -> ProviderInfo {
    let base_url = base_url.trim_end_matches('/');

    match query(http, &format!("{base_url}/instance-id")).await {
        Some(instance_id) if !instance_id.trim().is_empty() => {
            let region = query(http, &format!("{base_url}/placement/availability-zone"))
                .await
                .map(|zone| zone.trim().to_string())
                .unwrap_or_default();

            ProviderInfo {
                provider_id: instance_id.trim().to_string(),
                provider_type: PROVIDER_AWS.to_string(),
                region,
            }
        }
        _ => ProviderInfo {
            provider_id: String::new(),
            provider_type: PROVIDER_NON_AWS.to_string(),
            region: String::new(),
        },
    }
}

/// GET `url` and return the body of a 2xx response
async fn query(http: &reqwest::Client, url: &str) -> Option<String> {
    debug!(url = %url, "Querying metadata endpoint");

    let response = match http.get(url).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(url = %url, error = %e, "Could not query metadata endpoint");
            return None;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!(url = %url, status = %status, "Unexpected status from metadata endpoint");
        return None;
    }

    match response.text().await {
        Ok(body) => Some(body),
        Err(e) => {
            warn!(url = %url, error = %e, "Could not read metadata response");
            None
        }
    }
}
