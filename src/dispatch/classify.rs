//! Request Classification
//!
//! Maps every intercepted request onto a closed set of resource classes,
//! and each class onto exactly one caching strategy.

use crate::domain::ports::{AgentRequest, Destination};
use reqwest::Url;
use serde::{Deserialize, Serialize};

// =============================================================================
// Resource Class
// =============================================================================

/// Kind of resource a request is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// Top-level page loads
    Navigation,
    /// JavaScript and CSS
    ScriptOrStyle,
    /// Backend calls and anything off-origin
    ApiOrCrossOrigin,
    /// Images, fonts, manifests and the rest
    Other,
}

impl ResourceClass {
    /// The strategy that serves this class
    pub fn strategy(self) -> Strategy {
        match self {
            ResourceClass::Navigation => Strategy::NetworkFirst,
            ResourceClass::ScriptOrStyle => Strategy::StaleWhileRevalidate,
            ResourceClass::ApiOrCrossOrigin => Strategy::NetworkOnly,
            ResourceClass::Other => Strategy::CacheFirst,
        }
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceClass::Navigation => write!(f, "navigation"),
            ResourceClass::ScriptOrStyle => write!(f, "script_or_style"),
            ResourceClass::ApiOrCrossOrigin => write!(f, "api_or_cross_origin"),
            ResourceClass::Other => write!(f, "other"),
        }
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// Caching strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NetworkOnly,
    NetworkFirst,
    StaleWhileRevalidate,
    CacheFirst,
}

impl Strategy {
    /// Metric label / log name
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::NetworkOnly => "network_only",
            Strategy::NetworkFirst => "network_first",
            Strategy::StaleWhileRevalidate => "stale_while_revalidate",
            Strategy::CacheFirst => "cache_first",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Classifies requests relative to the application origin
#[derive(Debug, Clone)]
pub struct Classifier {
    origin: Url,
    api_prefix: String,
}

impl Classifier {
    pub fn new(origin: Url, api_prefix: impl Into<String>) -> Self {
        Self {
            origin,
            api_prefix: api_prefix.into(),
        }
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Deterministic classification. Precedence: non-GET, off-origin and
    /// API paths first, then navigations, then scripts/styles.
    pub fn classify(&self, request: &AgentRequest) -> ResourceClass {
        if request.method != "GET"
            || !request.is_same_origin(&self.origin)
            || request.url.path().starts_with(&self.api_prefix)
        {
            return ResourceClass::ApiOrCrossOrigin;
        }

        if request.is_navigation() || request.destination == Destination::Document {
            return ResourceClass::Navigation;
        }

        match request.destination {
            Destination::Script | Destination::Style => ResourceClass::ScriptOrStyle,
            _ => ResourceClass::Other,
        }
    }
}
