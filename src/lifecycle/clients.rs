//! Hosting-application clients seen by the proxy

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Clients remembered before the least recently seen is forgotten
pub const DEFAULT_MAX_CLIENTS: usize = 10_000;

#[derive(Debug, Clone)]
struct ClientRecord {
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
    controlled: bool,
}

/// Tracks which clients the active agent controls.
///
/// Clients that appear before activation stay uncontrolled until claimed;
/// once claimed, every client seen afterwards is controlled from its first
/// request. Requests that carry no client id follow the claim flag. A
/// forgotten client that comes back is treated as new.
#[derive(Debug)]
pub struct ClientRegistry {
    clients: DashMap<String, ClientRecord>,
    claimed: AtomicBool,
    max_clients: usize,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_CLIENTS)
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(max_clients: usize) -> Self {
        Self {
            clients: DashMap::new(),
            claimed: AtomicBool::new(false),
            max_clients: max_clients.max(1),
        }
    }

    /// Record a request from `client_id`; returns whether it is controlled
    pub fn observe(&self, client_id: Option<&str>) -> bool {
        let Some(id) = client_id else {
            return self.claimed.load(Ordering::SeqCst);
        };

        let now = Utc::now();
        let mut inserted = false;
        let controlled = {
            // The flag is read under the shard lock that `claim` also takes,
            // so a client inserted concurrently with a claim is never missed
            let mut record = self.clients.entry(id.to_string()).or_insert_with(|| {
                inserted = true;
                let controlled = self.claimed.load(Ordering::SeqCst);
                debug!(client_id = %id, controlled, "New client");
                ClientRecord {
                    first_seen: now,
                    last_seen: now,
                    controlled,
                }
            });
            record.last_seen = now;
            record.controlled
        };

        if inserted && self.clients.len() > self.max_clients {
            self.forget_least_recent(id);
        }
        controlled
    }

    pub fn is_controlled(&self, client_id: Option<&str>) -> bool {
        match client_id {
            Some(id) => self.clients.get(id).map(|r| r.controlled).unwrap_or(false),
            None => self.claimed.load(Ordering::SeqCst),
        }
    }

    /// Take control of every open client; returns how many were newly claimed
    pub fn claim(&self) -> usize {
        self.claimed.store(true, Ordering::SeqCst);
        let mut claimed = 0;
        for mut record in self.clients.iter_mut() {
            if !record.controlled {
                record.controlled = true;
                claimed += 1;
            }
        }
        claimed
    }

    pub fn first_seen(&self, client_id: &str) -> Option<DateTime<Utc>> {
        self.clients.get(client_id).map(|r| r.first_seen)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Drop the least recently seen client other than `keep`
    fn forget_least_recent(&self, keep: &str) {
        let oldest = self
            .clients
            .iter()
            .filter(|r| r.key() != keep)
            .min_by_key(|r| r.value().last_seen)
            .map(|r| r.key().clone());

        if let Some(id) = oldest {
            self.clients.remove(&id);
            debug!(client_id = %id, "Forgot idle client");
        }
    }
}
