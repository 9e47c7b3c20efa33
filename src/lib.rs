//! Load balancer API client
//!
//! Configuration types for frontends and TCP services, and a gateway that
//! lists, reads, creates or updates, and deletes them over HTTP+JSON.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use adapters::outbound::{HttpServiceGateway, ServiceList};
pub use config::{ClientConfig, ConfigError, LocationAuth};
pub use domain::entities::{
    Backend, FrontendConfig, HealthCheck, HttpHealthCheck, HttpListener, HttpsListener, Ingress,
    Metadata, SharedHttpConfig, TcpConfig,
};
pub use domain::envelope::{Config, EnvelopeError, Message, Service, ServiceStream, StreamStep};
pub use domain::ports::{Endpoint, GatewayError, Operation, ServiceGateway};
pub use domain::value_objects::{IpNetwork, NetworkParseError, ServiceType};
pub use infrastructure::{CancelToken, Cancelled};
