//! Client Configuration
//!
//! Settings shared by every request a gateway issues. The API base URL and
//! token are not part of it: callers pass them per operation.

use std::time::Duration;

/// Default path segment appended to the API base URL.
pub const DEFAULT_SERVICES_PATH: &str = "services";

/// Whether the ingress follow-up request carries the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocationAuth {
    /// Always send the token.
    Always,
    /// Send the token only when the Location shares scheme, host and port
    /// with the API endpoint.
    #[default]
    SameOrigin,
    /// Never send the token.
    Never,
}

/// Configuration for the HTTP service gateway.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path segment(s) between the base URL and the service name
    /// (default: "services")
    pub services_path: String,

    /// User-Agent header value
    pub user_agent: String,

    /// Overall per-request timeout; `None` keeps the HTTP client default
    pub timeout: Option<Duration>,

    /// Credential policy for the Location follow-up (default: SameOrigin)
    pub location_auth: LocationAuth,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            services_path: DEFAULT_SERVICES_PATH.to_string(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: None,
            location_auth: LocationAuth::default(),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the services path.
    pub fn services_path(mut self, path: impl Into<String>) -> Self {
        self.services_path = path.into();
        self
    }

    /// Set the User-Agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    /// Set a request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the Location follow-up credential policy.
    pub fn location_auth(mut self, policy: LocationAuth) -> Self {
        self.location_auth = policy;
        self
    }

    /// Path segments of `services_path`, ignoring surrounding slashes.
    pub fn services_segments(&self) -> impl Iterator<Item = &str> {
        self.services_path.split('/').filter(|s| !s.is_empty())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services_segments().next().is_none() {
            return Err(ConfigError::EmptyServicesPath);
        }
        if self
            .services_segments()
            .any(|s| s == "." || s == ".." || s.contains(|c| c == '?' || c == '#'))
        {
            return Err(ConfigError::InvalidServicesPath(self.services_path.clone()));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("services_path is required")]
    EmptyServicesPath,
    #[error("invalid services_path '{0}'")]
    InvalidServicesPath(String),
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
}
