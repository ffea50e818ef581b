//! Prism - Protocol-translation gateway for conversational AI APIs
//!
//! This library normalizes provider wire formats into a canonical
//! intermediate representation and routes requests across heterogeneous
//! backends with model translation, middleware, and fallback.

pub mod adapter;
pub mod bridge;
pub mod config;
pub mod error;
pub mod ir;
pub mod matcher;
pub mod middleware;
pub mod router;
pub mod stream;

pub use adapter::{Backend, Frontend};
pub use bridge::Bridge;
pub use error::{ErrorCategory, GatewayError};
pub use router::Router;
