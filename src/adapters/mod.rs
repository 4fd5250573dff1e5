//! Upstream adapters.
//!
//! Every source that can fill a slot of the property record implements
//! [`Adapter`]. The [`AdapterRegistry`] holds the adapters enabled at startup,
//! each paired with its own rate limiter and circuit breaker.

pub mod catalog;
pub mod http_source;
pub mod pdok;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::circuit_breaker::{create_adapter_circuit_breaker, AdapterBreaker};
use crate::config::{Config, Credentials};
use crate::errors::AdapterError;
use crate::models::{split_house_number, ResolvedAddress, Slot, SourceData};
use crate::upstream::UpstreamClient;

pub use http_source::HttpSource;

/// Which resolved inputs an adapter is queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Geo,
    /// Coordinates plus a search radius in metres.
    GeoRadius(u32),
    Building,
    Address,
    /// Neighborhood code, falling back to the municipality code.
    Neighborhood,
    Municipality,
}

impl Binding {
    /// Query parameters for `address`, or the name of the missing input.
    pub fn query(
        &self,
        address: &ResolvedAddress,
    ) -> Result<Vec<(&'static str, String)>, AdapterError> {
        let lat = address.coordinates.lat.to_string();
        let lon = address.coordinates.lon.to_string();
        match self {
            Binding::Geo => Ok(vec![("lat", lat), ("lon", lon)]),
            Binding::GeoRadius(radius) => {
                Ok(vec![("lat", lat), ("lon", lon), ("radius", radius.to_string())])
            }
            Binding::Building => non_empty("buildingId", &address.building_id),
            Binding::Address => {
                let parts = split_house_number(&address.house_number);
                let mut query = vec![
                    ("postcode", address.postcode.clone()),
                    ("houseNumber", parts.number),
                ];
                if let Some(letter) = parts.letter {
                    query.push(("houseLetter", letter));
                }
                if let Some(addition) = parts.addition {
                    query.push(("houseNumberAddition", addition));
                }
                Ok(query)
            }
            Binding::Neighborhood => {
                let code = if address.neighborhood_code.is_empty() {
                    &address.municipality_code
                } else {
                    &address.neighborhood_code
                };
                non_empty("neighborhoodCode", code)
            }
            Binding::Municipality => non_empty("municipalityCode", &address.municipality_code),
        }
    }

    /// Whether `address` carries every input this binding needs.
    pub fn is_satisfied_by(&self, address: &ResolvedAddress) -> bool {
        self.query(address).is_ok()
    }
}

fn non_empty(name: &'static str, value: &str) -> Result<Vec<(&'static str, String)>, AdapterError> {
    if value.trim().is_empty() {
        Err(AdapterError::MissingParameter(name))
    } else {
        Ok(vec![(name, value.to_string())])
    }
}

/// Shared collaborators handed to every fetch of one aggregation.
#[derive(Clone)]
pub struct FetchContext {
    pub client: UpstreamClient,
    pub cache: ResponseCache,
    pub credentials: Arc<Credentials>,
}

impl FetchContext {
    /// Key for `adapter`: a per-request entry under its slot name wins over the
    /// provider credential.
    pub fn credential_for(&self, adapter: &dyn Adapter) -> Option<&str> {
        let provider = adapter.credential()?;
        self.credentials
            .get(adapter.name())
            .or_else(|| self.credentials.get(provider))
    }

    /// Whether the key [`credential_for`](Self::credential_for) picks for
    /// `adapter` was supplied by the request.
    pub fn uses_request_credential(&self, adapter: &dyn Adapter) -> bool {
        let Some(provider) = adapter.credential() else {
            return false;
        };
        if self.credentials.get(adapter.name()).is_some() {
            self.credentials.is_override(adapter.name())
        } else {
            self.credentials.is_override(provider)
        }
    }
}

/// A stateless fetcher for one named upstream source.
#[async_trait]
pub trait Adapter: Send + Sync {
    fn slot(&self) -> Slot;

    /// Source name used in `dataSources`, `errors` and progress events.
    fn name(&self) -> &'static str {
        self.slot().as_str()
    }

    fn binding(&self) -> Binding;

    /// Provider credential name, when the source needs one.
    fn credential(&self) -> Option<&'static str> {
        None
    }

    fn requests_per_second(&self) -> u32 {
        10
    }

    async fn fetch(
        &self,
        ctx: &FetchContext,
        address: &ResolvedAddress,
    ) -> Result<SourceData, AdapterError>;
}

/// An enabled adapter with its resilience wrappers.
pub struct RegisteredAdapter {
    pub adapter: Arc<dyn Adapter>,
    pub limiter: Arc<DefaultDirectRateLimiter>,
    pub breaker: AdapterBreaker,
}

/// The adapters enabled for the process lifetime.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<RegisteredAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every catalog source whose URL is configured.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for spec in catalog::SOURCES {
            if let Some(url) = config.source_urls.get(spec.slot.as_str()) {
                registry.register(Arc::new(HttpSource::new(spec, url.clone())));
            }
        }

        let disabled: Vec<&str> = catalog::SOURCES
            .iter()
            .map(|s| s.slot.as_str())
            .filter(|name| !config.source_urls.contains_key(*name))
            .collect();
        if !disabled.is_empty() {
            tracing::debug!("Sources without a URL (disabled): {}", disabled.join(", "));
        }
        tracing::info!("Registered {} upstream adapter(s)", registry.len());
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        let rps = NonZeroU32::new(adapter.requests_per_second()).unwrap_or(NonZeroU32::MIN);
        self.adapters.push(Arc::new(RegisteredAdapter {
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
            breaker: create_adapter_circuit_breaker(),
            adapter,
        }));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredAdapter>> {
        self.adapters.iter()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
