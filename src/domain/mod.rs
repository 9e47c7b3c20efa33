//! Domain Layer
//!
//! Configuration objects, the envelope they travel in, and the port
//! through which services are managed.

pub mod entities;
pub mod envelope;
pub mod ports;
pub mod value_objects;
