//! Request Interception and Strategy Dispatch
//!
//! Every request from a controlled client is classified and answered by
//! one of four caching strategies.
//!
//! ```text
//!   request ──► Classifier ──► ResourceClass ──► Strategy
//!
//!   Navigation        ──► network-first   (offline document fallback)
//!   ScriptOrStyle     ──► stale-while-revalidate
//!   ApiOrCrossOrigin  ──► network-only
//!   Other             ──► cache-first
//! ```

pub mod classify;
pub mod dispatcher;

pub use classify::{Classifier, ResourceClass, Strategy};
pub use dispatcher::{DispatchOutcome, DispatcherConfig, ResponseSource, StrategyDispatcher};
