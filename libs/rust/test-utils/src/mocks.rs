//! Mock implementations of the provider-side and resolver collaborators.

use async_trait::async_trait;
use cdct_pact::{
    Clock, PactError, PactResult, ProviderClient, ProviderResponse, Request, StateSetup,
    VcsLookup,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::RwLock;

use crate::fixtures;

/// Provider answering from a fixed route table keyed by `METHOD path`.
///
/// Unknown routes answer 404 with `{"error": "Not found"}`.
#[derive(Debug, Default)]
pub struct StubProvider {
    routes: HashMap<String, ProviderResponse>,
    requests: RwLock<Vec<Request>>,
}

impl StubProvider {
    /// Create a provider with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `GET path` with `response`.
    #[must_use]
    pub fn with_get(self, path: &str, response: ProviderResponse) -> Self {
        self.with_route("GET", path, response)
    }

    /// Answer `method path` with `response`.
    #[must_use]
    pub fn with_route(mut self, method: &str, path: &str, response: ProviderResponse) -> Self {
        self.routes
            .insert(format!("{} {path}", method.to_ascii_uppercase()), response);
        self
    }

    /// The users provider: user 123 exists, everything else is missing.
    #[must_use]
    pub fn users() -> Self {
        Self::new().with_get("/users/123", fixtures::user_response(fixtures::stored_user()))
    }

    /// Requests received so far.
    pub async fn requests(&self) -> Vec<Request> {
        self.requests.read().await.clone()
    }

    /// Number of requests received.
    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    async fn call(&self, request: &Request) -> PactResult<ProviderResponse> {
        self.requests.write().await.push(request.clone());
        let key = format!("{} {}", request.method.to_ascii_uppercase(), request.path);
        Ok(self
            .routes
            .get(&key)
            .cloned()
            .unwrap_or_else(fixtures::not_found_response))
    }
}

/// Provider that cannot be reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableProvider;

#[async_trait]
impl ProviderClient for UnreachableProvider {
    async fn call(&self, _request: &Request) -> PactResult<ProviderResponse> {
        Err(PactError::provider_unreachable("connection refused"))
    }
}

/// State setup that records every state it was asked for.
#[derive(Debug, Default)]
pub struct RecordingStateSetup {
    states: RwLock<Vec<String>>,
}

impl RecordingStateSetup {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// States requested so far, in arrival order.
    pub async fn states(&self) -> Vec<String> {
        self.states.read().await.clone()
    }
}

#[async_trait]
impl StateSetup for RecordingStateSetup {
    async fn setup(&self, state: &str) -> PactResult<()> {
        self.states.write().await.push(state.to_string());
        Ok(())
    }
}

/// State setup that fails for one named state.
#[derive(Debug, Clone)]
pub struct FailingStateSetup {
    state: String,
}

impl FailingStateSetup {
    /// Fail whenever `state` is requested.
    #[must_use]
    pub fn for_state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }
}

#[async_trait]
impl StateSetup for FailingStateSetup {
    async fn setup(&self, state: &str) -> PactResult<()> {
        if state == self.state {
            return Err(PactError::state_setup(state, "fixture unavailable"));
        }
        Ok(())
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at `now`.
    #[must_use]
    pub const fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).single().unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// VCS lookup with a fixed answer.
#[derive(Debug, Clone, Default)]
pub struct StaticVcs(pub Option<String>);

impl StaticVcs {
    /// Lookup returning `hash`.
    #[must_use]
    pub fn hash(hash: impl Into<String>) -> Self {
        Self(Some(hash.into()))
    }

    /// Lookup finding nothing, as outside a repository.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }
}

impl VcsLookup for StaticVcs {
    fn short_hash(&self) -> Option<String> {
        self.0.clone()
    }
}
