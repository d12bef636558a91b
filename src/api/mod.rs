//! API Module
//!
//! The intercepting proxy listener and the `/__agent` control routes that
//! carry messages from the hosting application.

pub mod proxy;
pub mod rest;
pub mod server;

pub use proxy::{CLIENT_HEADER, SOURCE_HEADER, STRATEGY_HEADER};
pub use rest::{AgentRouter, ApiErrorResponse};
pub use server::{ApiServer, ApiServerConfig};
