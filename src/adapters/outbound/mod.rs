mod http_service_gateway;

pub use http_service_gateway::{HttpServiceGateway, ServiceList};
