//! Shared fixtures: scripted adapters and a mocked address lookup.
#![allow(dead_code)]

use addressiq_backend::adapters::{Adapter, AdapterRegistry, Binding, FetchContext};
use addressiq_backend::cache::ResponseCache;
use addressiq_backend::config::Config;
use addressiq_backend::errors::AdapterError;
use addressiq_backend::models::{ResolvedAddress, Slot, SourceData};
use addressiq_backend::orchestrator::Orchestrator;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What a [`ScriptedAdapter`] does when fetched.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    Fail,
    /// Succeeds after the delay.
    Slow(Duration),
    /// Never finishes on its own.
    Hang,
    Panic,
    /// Returns a record for a different slot.
    WrongSlot,
}

pub struct ScriptedAdapter {
    pub slot: Slot,
    pub behavior: Behavior,
    pub binding: Binding,
    pub credential: Option<&'static str>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedAdapter {
    pub fn new(slot: Slot, behavior: Behavior) -> Self {
        Self {
            slot,
            behavior,
            binding: Binding::Geo,
            credential: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_credential(mut self, provider: &'static str) -> Self {
        self.credential = Some(provider);
        self
    }

    pub fn with_binding(mut self, binding: Binding) -> Self {
        self.binding = binding;
        self
    }

    /// Shared call counter, readable after the adapter moves into a registry.
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

fn neutral(slot: Slot) -> SourceData {
    SourceData::decode(slot, serde_json::json!({})).unwrap()
}

#[async_trait]
impl Adapter for ScriptedAdapter {
    fn slot(&self) -> Slot {
        self.slot
    }

    fn binding(&self) -> Binding {
        self.binding
    }

    fn credential(&self) -> Option<&'static str> {
        self.credential
    }

    fn requests_per_second(&self) -> u32 {
        1_000
    }

    async fn fetch(
        &self,
        _ctx: &FetchContext,
        _address: &ResolvedAddress,
    ) -> Result<SourceData, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Succeed => Ok(neutral(self.slot)),
            Behavior::Fail => Err(AdapterError::Status {
                status: 503,
                body: "unavailable".to_string(),
            }),
            Behavior::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(neutral(self.slot))
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Ok(neutral(self.slot))
            }
            Behavior::Panic => panic!("scripted panic"),
            Behavior::WrongSlot => {
                let other = if self.slot == Slot::Weather {
                    Slot::Solar
                } else {
                    Slot::Weather
                };
                Ok(neutral(other))
            }
        }
    }
}

/// Address lookup answering every query with one building in Utrecht.
pub async fn mock_address_lookup() -> MockServer {
    mock_address_lookup_with(serde_json::json!({
        "weergavenaam": "Domplein 29, 3512JE Utrecht",
        "centroide_ll": "POINT(5.12143 52.09074)",
        "adresseerbaarobject_id": "0344010000012345",
        "gemeentecode": "0344",
        "postcode": "3512JE",
        "huisnummer": 29
    }))
    .await
}

pub async fn mock_address_lookup_with(doc: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": { "numFound": 1, "docs": [doc] }
        })))
        .mount(&server)
        .await;
    server
}

pub fn orchestrator(
    server: &MockServer,
    adapters: Vec<ScriptedAdapter>,
    adapter_timeout: Duration,
) -> Orchestrator {
    let mut config = Config::minimal(server.uri());
    config.adapter_timeout = adapter_timeout;

    let mut registry = AdapterRegistry::new();
    for adapter in adapters {
        registry.register(Arc::new(adapter));
    }
    Orchestrator::new(&config, registry, ResponseCache::in_memory(1_000)).unwrap()
}
