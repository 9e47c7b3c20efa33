mod service_gateway;

pub use service_gateway::{Endpoint, GatewayError, Operation, ServiceGateway};
