//! Infrastructure Layer
//!
//! Cross-cutting concerns shared by adapters.

pub mod cancel;

pub use cancel::{CancelToken, Cancelled};
