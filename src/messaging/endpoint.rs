//! # Queue Endpoint Parsing
//!
//! Queue endpoints encode their region in the host name:
//! `<protocol>://sqs.<region>.<domain>/<path...>`. An endpoint that does not
//! follow this pattern cannot be used to build a client and is reported as a
//! fatal configuration error.

use regex::Regex;
use std::sync::OnceLock;

use super::errors::{MessagingError, MessagingResult};

static QUEUE_ENDPOINT_PATTERN: OnceLock<Regex> = OnceLock::new();

fn queue_endpoint_pattern() -> &'static Regex {
    QUEUE_ENDPOINT_PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*)://(?P<host>sqs\.(?P<region>[A-Za-z0-9-]+)\.(?P<domain>[^/\s]+\.[^/\s]+))(?P<path>/\S*)?$",
        )
        .expect("queue endpoint pattern is a valid regex")
    })
}

/// A validated queue endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEndpoint {
    url: String,
    scheme: String,
    host: String,
    region: String,
    domain: String,
}

impl QueueEndpoint {
    /// Parse an endpoint, extracting its region
    pub fn parse(url: &str) -> MessagingResult<Self> {
        let captures = queue_endpoint_pattern()
            .captures(url.trim())
            .ok_or_else(|| MessagingError::invalid_endpoint(url))?;

        Ok(Self {
            url: url.trim().to_string(),
            scheme: captures["scheme"].to_string(),
            host: captures["host"].to_string(),
            region: captures["region"].to_string(),
            domain: captures["domain"].to_string(),
        })
    }

    /// Full queue URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Region encoded in the host name
    pub fn region(&self) -> &str {
        &self.region
    }

    /// `scheme://host` part of the endpoint
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Whether the endpoint is served by AWS itself, as opposed to an
    /// emulator such as LocalStack or ElasticMQ
    pub fn is_aws_hosted(&self) -> bool {
        let domain = self.domain.split(':').next().unwrap_or_default();
        domain == "amazonaws.com" || domain == "amazonaws.com.cn"
    }
}
