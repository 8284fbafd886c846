//! Shared test doubles for the behaviour scenarios
//!
//! A scripted HTTP client, a canned DNS-SD browser and a recording
//! advertiser stand in for the production adapters.

#![allow(dead_code)]

use async_trait::async_trait;
use coracle_core::error::Result;
use coracle_core::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, HttpResult};
use coracle_model::{RegistrationService, ServicePriority};
use coracle_registration::{NodeAdvertiser, RegistrationBrowser, TxtRecord};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// =============================================================================
// Scripted HTTP
// =============================================================================

/// One request the engine issued, as the registry saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<Value>,
    pub at: Instant,
}

impl RecordedRequest {
    pub fn is_heartbeat(&self) -> bool {
        self.url.contains("/health/nodes/")
    }
}

#[derive(Default)]
struct ScriptedState {
    requests: Vec<RecordedRequest>,
    resource_responses: VecDeque<HttpResult<HttpResponse>>,
    heartbeat_responses: VecDeque<HttpResult<HttpResponse>>,
    unscripted_resource_requests: usize,
}

/// Serves `/resource` requests from one queue and heartbeats from another;
/// heartbeats fall back to 200 when their queue runs dry, resource requests
/// to 500 (and are counted, so tests can assert none happened)
#[derive(Default)]
pub struct ScriptedHttpClient {
    state: Mutex<ScriptedState>,
}

impl ScriptedHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script_resource(&self, response: HttpResult<HttpResponse>) {
        self.state.lock().resource_responses.push_back(response);
    }

    pub fn script_resource_statuses(&self, statuses: impl IntoIterator<Item = u16>) {
        for status in statuses {
            self.script_resource(Ok(HttpResponse::new(status, "")));
        }
    }

    pub fn script_heartbeat_statuses(&self, statuses: impl IntoIterator<Item = u16>) {
        let mut state = self.state.lock();
        for status in statuses {
            state
                .heartbeat_responses
                .push_back(Ok(HttpResponse::new(status, "")));
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    pub fn resource_requests(&self) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| !request.is_heartbeat())
            .cloned()
            .collect()
    }

    pub fn heartbeat_requests(&self) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|request| request.is_heartbeat())
            .cloned()
            .collect()
    }

    pub fn unscripted_resource_requests(&self) -> usize {
        self.state.lock().unscripted_resource_requests
    }
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(&self, request: HttpRequest) -> HttpResult<HttpResponse> {
        let mut state = self.state.lock();

        let body = request
            .body
            .as_deref()
            .and_then(|body| serde_json::from_str(body).ok());
        state.requests.push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            body,
            at: Instant::now(),
        });

        if request.url.contains("/health/nodes/") {
            state
                .heartbeat_responses
                .pop_front()
                .unwrap_or(Ok(HttpResponse::new(200, "")))
        } else {
            match state.resource_responses.pop_front() {
                Some(response) => response,
                None => {
                    state.unscripted_resource_requests += 1;
                    Ok(HttpResponse::new(500, ""))
                }
            }
        }
    }
}

// =============================================================================
// Canned browser
// =============================================================================

#[derive(Default)]
struct BrowserState {
    queued: VecDeque<Vec<RegistrationService>>,
    default: Vec<RegistrationService>,
    browses: Vec<Instant>,
}

/// Replays queued browse results, then repeats a default result
#[derive(Default)]
pub struct CannedBrowser {
    state: Mutex<BrowserState>,
}

impl CannedBrowser {
    /// Browser that always discovers nothing
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Browser that always discovers the given services
    pub fn discovering(services: Vec<RegistrationService>) -> Arc<Self> {
        let browser = Self::default();
        browser.state.lock().default = services;
        Arc::new(browser)
    }

    pub fn queue_result(&self, services: Vec<RegistrationService>) {
        self.state.lock().queued.push_back(services);
    }

    /// Virtual instants at which browses happened
    pub fn browse_instants(&self) -> Vec<Instant> {
        self.state.lock().browses.clone()
    }

    pub fn browse_count(&self) -> usize {
        self.state.lock().browses.len()
    }
}

#[async_trait]
impl RegistrationBrowser for CannedBrowser {
    async fn browse(&self) -> Result<Vec<RegistrationService>> {
        let mut state = self.state.lock();
        state.browses.push(Instant::now());

        Ok(state
            .queued
            .pop_front()
            .unwrap_or_else(|| state.default.clone()))
    }
}

pub fn service(priority: u32, host: &str) -> RegistrationService {
    RegistrationService::new(
        ServicePriority(priority),
        format!("http://{}:3210/x-nmos/registration/v1.2", host),
    )
}

// =============================================================================
// Recording advertiser
// =============================================================================

/// One advertiser call: the operation name and the TXT records it carried
pub type AdvertiserCall = (&'static str, Vec<TxtRecord>);

#[derive(Default)]
pub struct RecordingAdvertiser {
    calls: Mutex<Vec<AdvertiserCall>>,
}

impl RecordingAdvertiser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<AdvertiserCall> {
        self.calls.lock().clone()
    }

    pub fn updates(&self) -> Vec<Vec<TxtRecord>> {
        self.calls
            .lock()
            .iter()
            .filter(|(operation, _)| *operation == "update")
            .map(|(_, records)| records.clone())
            .collect()
    }
}

impl NodeAdvertiser for RecordingAdvertiser {
    fn register(&self, records: &[TxtRecord]) -> Result<()> {
        self.calls.lock().push(("register", records.to_vec()));
        Ok(())
    }

    fn update(&self, records: &[TxtRecord]) -> Result<()> {
        self.calls.lock().push(("update", records.to_vec()));
        Ok(())
    }

    fn withdraw(&self) -> Result<()> {
        self.calls.lock().push(("withdraw", Vec::new()));
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Poll a condition until it holds, failing after a minute of (virtual) time
pub async fn wait_until_true(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
