//! Domain Entities - Configuration objects of the load balancer API
//!
//! Plain data carried inside configuration envelopes. Every field is
//! omitted from the JSON output when it holds its zero value and is
//! reconstructed as that zero value when absent on input, so a create
//! followed by a read returns the same object.

use crate::domain::value_objects::IpNetwork;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::IpAddr;

fn is_zero_u16(v: &u16) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// Metadata attached to every envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Unique name of the object; used as the last URL path segment
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Set by the server on creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the server on every update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Metadata {
    /// Metadata carrying only a name, as sent on create.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.created_at.is_none() && self.updated_at.is_none()
    }
}

/// Configuration of a frontend: the public addresses it exposes.
///
/// ```json
/// { "addresses": ["10.40.50.23", "2001:700:fffd::23"] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontendConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<IpAddr>,
}

impl FrontendConfig {
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

/// An upstream target of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backend {
    #[serde(default, alias = "Addrs", skip_serializing_if = "Vec::is_empty")]
    pub addrs: Vec<IpAddr>,
}

/// TCP health check run by the load balancer against each backend.
///
/// The balancer connects to `port`, writes `send` and matches the reply
/// against the `expect` pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub send: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub expect: String,
}

impl HealthCheck {
    pub fn is_empty(&self) -> bool {
        self.port == 0 && self.send.is_empty() && self.expect.is_empty()
    }
}

/// Configuration of a TCP load balanced service.
///
/// ```json
/// {
///   "method": "least_conn",
///   "ports": [80, 443],
///   "backends": {
///     "hostname1.example.com": { "addrs": ["10.3.2.43", "2001:700:f00d::8"] }
///   },
///   "upstream_max_conns": 100,
///   "acl": ["10.10.20.0/24", "2001:700:1337::/48"],
///   "health_check": { "port": 1337, "send": "healthz\n", "expect": "^OK$" },
///   "frontend": "foobar"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Load balancing algorithm, e.g. `least_conn`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
    /// Backends keyed by hostname
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub backends: BTreeMap<String, Backend>,
    /// Connection cap per backend; signed on the wire
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub upstream_max_conns: i64,
    /// Source networks allowed to reach the service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<IpNetwork>,
    #[serde(default, skip_serializing_if = "HealthCheck::is_empty")]
    pub health_check: HealthCheck,
    /// Name of the frontend this service is exposed on
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub frontend: String,
}

impl TcpConfig {
    pub fn is_empty(&self) -> bool {
        self.method.is_empty()
            && self.ports.is_empty()
            && self.backends.is_empty()
            && self.upstream_max_conns == 0
            && self.acl.is_empty()
            && self.health_check.is_empty()
            && self.frontend.is_empty()
    }
}

/// HTTP health check used by shared HTTP services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHealthCheck {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uri: String,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

impl HttpHealthCheck {
    pub fn is_empty(&self) -> bool {
        self.uri.is_empty() && self.status_code == 0 && self.body.is_empty()
    }
}

/// Plain HTTP side of a shared HTTP service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpListener {
    #[serde(default, skip_serializing_if = "is_false")]
    pub redirect_https: bool,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub backend_port: u16,
    #[serde(default, skip_serializing_if = "HttpHealthCheck::is_empty")]
    pub health_check: HttpHealthCheck,
}

impl HttpListener {
    pub fn is_empty(&self) -> bool {
        !self.redirect_https && self.backend_port == 0 && self.health_check.is_empty()
    }
}

/// TLS terminated side of a shared HTTP service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpsListener {
    /// PEM encoded private key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_key: String,
    /// PEM encoded certificate chain
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub certificate: String,
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub backend_port: u16,
    #[serde(default, skip_serializing_if = "HttpHealthCheck::is_empty")]
    pub health_check: HttpHealthCheck,
}

impl HttpsListener {
    pub fn is_empty(&self) -> bool {
        self.private_key.is_empty()
            && self.certificate.is_empty()
            && self.backend_port == 0
            && self.health_check.is_empty()
    }
}

/// Configuration of a name-based HTTP service sharing frontends with
/// other services.
///
/// The server side of this object type is still evolving; the fields
/// here cover its published shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedHttpConfig {
    /// Host names routed to this service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub names: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sticky_backends: bool,
    /// `http`, `https` or `both`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub backend_protocols: String,
    #[serde(default, skip_serializing_if = "HttpListener::is_empty")]
    pub http: HttpListener,
    #[serde(default, skip_serializing_if = "HttpsListener::is_empty")]
    pub https: HttpsListener,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub backends: BTreeMap<String, Backend>,
}

impl SharedHttpConfig {
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
            && !self.sticky_backends
            && self.backend_protocols.is_empty()
            && self.http.is_empty()
            && self.https.is_empty()
            && self.backends.is_empty()
    }
}

/// Externally reachable address assigned to a provisioned service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hostname: String,
}
