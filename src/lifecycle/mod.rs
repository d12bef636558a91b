//! Agent Lifecycle
//!
//! ```text
//!   Installing ──prepopulate ok──► Activating ──evict + claim──► Active
//!        │
//!        └──prepopulate failed──► Redundant (previous generations keep serving)
//! ```

pub mod clients;
pub mod controller;

pub use clients::ClientRegistry;
pub use controller::{ActivationReport, LifecycleController, LifecycleState};
