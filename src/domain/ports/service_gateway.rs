//! Service Gateway Port
//!
//! Defines the interface for managing services on the load balancer API.

use crate::domain::entities::Ingress;
use crate::domain::envelope::{EnvelopeError, Service};
use crate::infrastructure::cancel::CancelToken;
use async_trait::async_trait;
use std::fmt;

/// Operation a gateway error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Sync,
    Delete,
    /// Follow-up fetch of the address behind a `Location` header
    Ingress,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list services",
            Self::Get => "get service",
            Self::Sync => "sync service",
            Self::Delete => "delete service",
            Self::Ingress => "get ingress",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// API base URL and bearer token for a single call.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: String,
    token: String,
}

impl Endpoint {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

fn with_body(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(", {}", body)
    }
}

/// Errors returned by gateway operations.
///
/// Every variant names the operation and the URL it targeted. Absence of
/// a service on `get` is not an error.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Base URL, Location header or service name did not form a valid URL
    #[error("{operation}: invalid URL '{url}': {reason}")]
    InvalidUrl {
        operation: Operation,
        url: String,
        reason: String,
    },

    /// The HTTP exchange could not be completed
    #[error("{operation}: error connecting to API endpoint {url}: {source}")]
    Transport {
        operation: Operation,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// A response arrived with a status the operation does not accept
    #[error("{operation}: API endpoint {url} returned status {status}{}", with_body(.body))]
    UnexpectedStatus {
        operation: Operation,
        url: String,
        status: reqwest::StatusCode,
        /// Response body with surrounding whitespace trimmed
        body: String,
    },

    /// The response body did not match the expected schema
    #[error("{operation}: error decoding response from {url}: {source}")]
    Decode {
        operation: Operation,
        url: String,
        #[source]
        source: EnvelopeError,
    },

    /// The request body could not be serialised
    #[error("{operation}: error encoding request for {url}: {source}")]
    Encode {
        operation: Operation,
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{operation}: request to {url} cancelled")]
    Cancelled { operation: Operation, url: String },
}

impl GatewayError {
    pub fn operation(&self) -> Operation {
        match self {
            Self::InvalidUrl { operation, .. }
            | Self::Transport { operation, .. }
            | Self::UnexpectedStatus { operation, .. }
            | Self::Decode { operation, .. }
            | Self::Encode { operation, .. }
            | Self::Cancelled { operation, .. } => *operation,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Self::InvalidUrl { url, .. }
            | Self::Transport { url, .. }
            | Self::UnexpectedStatus { url, .. }
            | Self::Decode { url, .. }
            | Self::Encode { url, .. }
            | Self::Cancelled { url, .. } => url,
        }
    }

    /// HTTP status of an unexpected response, if that is what failed.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Create, read, update and delete services on the load balancer API.
///
/// This is an outbound port. Each call performs one request (plus an
/// optional ingress follow-up) and either fully succeeds or fails; no
/// call is retried.
#[async_trait]
pub trait ServiceGateway: Send + Sync {
    /// List every service configured on the load balancers.
    async fn list(
        &self,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Vec<Service>, GatewayError>;

    /// Fetch a service by name. `Ok(None)` when the API reports 404.
    async fn get(
        &self,
        name: &str,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Option<Service>, GatewayError>;

    /// Create or replace a service by name and return its ingress.
    async fn sync(
        &self,
        service: &Service,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<Vec<Ingress>, GatewayError>;

    /// Delete a service by name.
    async fn delete(
        &self,
        name: &str,
        endpoint: &Endpoint,
        cancel: &CancelToken,
    ) -> Result<(), GatewayError>;
}
