//! Concurrent fan-out over the adapter registry.
//!
//! One aggregation:
//! 1. Serve `aggregated:<postcode>:<house>` from cache unless bypassed
//! 2. Resolve the address (fatal on failure)
//! 3. Decide eligibility per adapter and schedule one task per attempt
//! 4. Collect results into the shared record as tasks complete
//! 5. Seal the record and write it to cache, unless cancelled

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::adapters::{AdapterRegistry, FetchContext, RegisteredAdapter};
use crate::cache::{keys, CacheClass, ResponseCache};
use crate::circuit_breaker::{guarded, permitted};
use crate::config::{Config, Credentials};
use crate::errors::{AdapterError, AppError};
use crate::models::{
    AddressQuery, ProgressEvent, ProgressStatus, PropertyRecord, ResolvedAddress,
};
use crate::progress::ProgressSink;
use crate::resolver::Resolver;
use crate::single_flight::SingleFlight;
use crate::upstream::UpstreamClient;

/// Per-request switches for [`Orchestrator::aggregate`].
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    /// Skip the aggregated-record cache lookup (the result is still written).
    pub bypass_cache: bool,
    /// Credential overrides for this request only.
    pub key_overrides: HashMap<String, String>,
}

/// Result of one aggregation.
#[derive(Debug, Clone)]
pub struct Aggregated {
    pub record: PropertyRecord,
    pub from_cache: bool,
}

#[derive(Clone)]
pub struct Orchestrator {
    resolver: Resolver,
    registry: Arc<AdapterRegistry>,
    client: UpstreamClient,
    cache: ResponseCache,
    credentials: Arc<HashMap<String, String>>,
    adapter_timeout: Duration,
    flights: SingleFlight,
}

fn emit(sink: &Option<ProgressSink>, event: ProgressEvent) {
    if let Some(sink) = sink {
        sink.send(event);
    }
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        registry: AdapterRegistry,
        cache: ResponseCache,
    ) -> Result<Self, AppError> {
        let client = UpstreamClient::new(config.adapter_timeout)?;
        let resolver = Resolver::new(
            client.clone(),
            &config.address_lookup_url,
            config.reverse_geocode_url.as_deref(),
        );

        Ok(Self {
            resolver,
            registry: Arc::new(registry),
            client,
            cache,
            credentials: Arc::new(config.credentials.clone()),
            adapter_timeout: config.adapter_timeout,
            flights: SingleFlight::new(),
        })
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Cached aggregated record for `query`, if any.
    pub async fn cached(&self, query: &AddressQuery) -> Option<PropertyRecord> {
        self.cache
            .get_value(&keys::aggregated(&query.postcode, &query.house_number))
            .await
    }

    /// Aggregates every eligible source for `query`.
    ///
    /// Progress events go to `sink` when given. Cancelling `cancel` aborts all
    /// in-flight adapter tasks and returns [`AppError::Cancelled`] without
    /// writing to cache.
    pub async fn aggregate(
        &self,
        query: &AddressQuery,
        options: AggregateOptions,
        sink: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> Result<Aggregated, AppError> {
        let key = keys::aggregated(&query.postcode, &query.house_number);

        if !options.bypass_cache {
            if let Some(record) = self.cache.get_value(&key).await {
                tracing::info!("Cache hit for {}", key);
                return Ok(Aggregated {
                    record,
                    from_cache: true,
                });
            }
        }

        let _flight = tokio::select! {
            guard = self.flights.acquire(&key) => guard,
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        // Another request may have filled the cache while we waited.
        if !options.bypass_cache {
            if let Some(record) = self.cache.get_value(&key).await {
                tracing::info!("Cache filled by concurrent request for {}", key);
                return Ok(Aggregated {
                    record,
                    from_cache: true,
                });
            }
        }

        let resolved = tokio::select! {
            resolved = self.resolver.resolve(query) => resolved?,
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
        };

        let record = self.fan_out(resolved, &options, sink, &cancel).await?;

        if !self.cache.set_value(&key, &record, CacheClass::Property.ttl()).await {
            tracing::debug!("Aggregated record for {} not cached", key);
        }
        if !record.building_id.is_empty() {
            self.cache
                .set_value(
                    &keys::property(&record.building_id),
                    &record,
                    CacheClass::Property.ttl(),
                )
                .await;
            // scores derived from the previous record are stale now
            self.cache.delete(&keys::scores(&record.building_id)).await;
        }

        Ok(Aggregated {
            record,
            from_cache: false,
        })
    }

    async fn fan_out(
        &self,
        resolved: ResolvedAddress,
        options: &AggregateOptions,
        sink: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> Result<PropertyRecord, AppError> {
        let started = Instant::now();
        let ctx = FetchContext {
            client: self.client.clone(),
            cache: self.cache.clone(),
            credentials: Arc::new(Credentials::merged(&self.credentials, &options.key_overrides)),
        };
        let record = Arc::new(Mutex::new(PropertyRecord::new(&resolved)));
        let resolved = Arc::new(resolved);

        let mut tasks = JoinSet::new();
        let mut skipped = 0usize;
        for registered in self.registry.iter() {
            let adapter = registered.adapter.as_ref();
            let name = adapter.name();

            if adapter.credential().is_some() && ctx.credential_for(adapter).is_none() {
                emit(&sink, ProgressEvent::new(name, ProgressStatus::SkippedNoCredential));
                skipped += 1;
                continue;
            }
            if !adapter.binding().is_satisfied_by(&resolved) {
                emit(&sink, ProgressEvent::new(name, ProgressStatus::SkippedNoKey));
                skipped += 1;
                continue;
            }

            emit(&sink, ProgressEvent::new(name, ProgressStatus::Pending));
            tasks.spawn(run_adapter(
                registered.clone(),
                ctx.clone(),
                resolved.clone(),
                record.clone(),
                sink.clone(),
                self.adapter_timeout,
            ));
        }

        tracing::info!(
            "Fan-out for {}: {} adapter(s) scheduled, {} skipped",
            resolved.address,
            tasks.len(),
            skipped
        );

        let completed = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    break false;
                }
                next = tasks.join_next() => match next {
                    None => break true,
                    Some(Err(e)) if !e.is_cancelled() => {
                        tracing::error!("Adapter task failed to complete: {}", e);
                    }
                    Some(_) => {}
                },
            }
        };

        if !completed {
            tracing::info!(
                "Aggregation for {} cancelled after {}ms",
                resolved.address,
                started.elapsed().as_millis()
            );
            return Err(AppError::Cancelled);
        }

        let mut record = record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        record.aggregated_at = chrono::Utc::now();

        tracing::info!(
            "✓ Aggregated {} in {}ms: {} source(s), {} error(s)",
            record.address,
            started.elapsed().as_millis(),
            record.data_sources.len(),
            record.errors.len()
        );

        Ok(record)
    }
}

async fn run_adapter(
    registered: Arc<RegisteredAdapter>,
    ctx: FetchContext,
    address: Arc<ResolvedAddress>,
    record: Arc<Mutex<PropertyRecord>>,
    sink: Option<ProgressSink>,
    timeout: Duration,
) {
    let adapter = registered.adapter.as_ref();
    let name = adapter.name();

    emit(&sink, ProgressEvent::new(name, ProgressStatus::Running));
    registered.limiter.until_ready().await;

    let started = Instant::now();
    let call = async {
        let fetch = AssertUnwindSafe(adapter.fetch(&ctx, &address)).catch_unwind();
        match tokio::time::timeout(timeout, fetch).await {
            Err(_) => Err(AdapterError::Timeout),
            Ok(Err(_)) => Err(AdapterError::Internal("adapter panicked".to_string())),
            Ok(Ok(result)) => result,
        }
    };
    // request-supplied keys must not move the shared breaker
    let result = if ctx.uses_request_credential(adapter) {
        permitted(&registered.breaker, call).await
    } else {
        guarded(&registered.breaker, call).await
    };
    let result = result.and_then(|data| {
        if data.slot() == adapter.slot() {
            Ok(data)
        } else {
            Err(AdapterError::Internal(format!(
                "returned {} data",
                data.slot().as_str()
            )))
        }
    });

    match result {
        Ok(data) => {
            let payload = data.to_json();
            record
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .record_success(data);
            tracing::debug!("✓ {} in {}ms", name, started.elapsed().as_millis());
            emit(&sink, ProgressEvent::success(name, payload));
        }
        Err(e) => {
            let message = e.to_string();
            record
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .record_failure(name, message.clone());
            tracing::warn!(
                "{} failed after {}ms: {}",
                name,
                started.elapsed().as_millis(),
                message
            );
            emit(&sink, ProgressEvent::failure(name, message));
        }
    }
}
