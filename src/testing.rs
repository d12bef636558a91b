//! Test doubles shared by unit tests

use crate::domain::ports::{AgentRequest, AgentResponse, Fetcher};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Clone)]
enum Scripted {
    Respond(AgentResponse),
    Fail,
    Delayed(Duration, AgentResponse),
}

/// Fetcher answering from a URL -> response script
pub struct ScriptedFetcher {
    routes: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn respond(self, url: &str, response: AgentResponse) -> Self {
        self.set_response(url, response);
        self
    }

    pub fn fail(self, url: &str) -> Self {
        self.routes.lock().insert(url.to_string(), Scripted::Fail);
        self
    }

    pub fn delayed(self, url: &str, delay: Duration, response: AgentResponse) -> Self {
        self.routes
            .lock()
            .insert(url.to_string(), Scripted::Delayed(delay, response));
        self
    }

    pub fn set_response(&self, url: &str, response: AgentResponse) {
        self.routes
            .lock()
            .insert(url.to_string(), Scripted::Respond(response));
    }

    /// Make every request fail with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Total number of fetches issued
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of fetches issued for one URL
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse> {
        let url = request.url.to_string();
        self.calls.lock().push(url.clone());

        let offline_error = || Error::TransientNetwork {
            url: url.clone(),
            reason: "offline".into(),
        };

        if self.offline.load(Ordering::SeqCst) {
            return Err(offline_error());
        }

        let script = self.routes.lock().get(&url).cloned();
        match script {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail) => Err(offline_error()),
            Some(Scripted::Delayed(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Ok(AgentResponse::new(404, "not found")),
        }
    }
}
