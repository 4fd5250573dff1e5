use async_trait::async_trait;
use serde_json::Value;

use crate::adapters::catalog::SourceSpec;
use crate::adapters::{Adapter, Binding, FetchContext};
use crate::errors::AdapterError;
use crate::models::{ResolvedAddress, Slot, SourceData};

/// A catalog source served by a JSON GET endpoint.
pub struct HttpSource {
    spec: &'static SourceSpec,
    url: String,
}

impl HttpSource {
    pub fn new(spec: &'static SourceSpec, url: String) -> Self {
        Self { spec, url }
    }

    async fn cached(&self, ctx: &FetchContext, key: &str) -> Option<SourceData> {
        let value: Value = ctx.cache.get_value(key).await?;
        match SourceData::decode(self.spec.slot, value) {
            Ok(data) => {
                tracing::debug!("{}: served from cache ({})", self.name(), key);
                Some(data)
            }
            Err(e) => {
                tracing::warn!("{}: cached entry {} no longer decodes: {}", self.name(), key, e);
                ctx.cache.delete(key).await;
                None
            }
        }
    }
}

#[async_trait]
impl Adapter for HttpSource {
    fn slot(&self) -> Slot {
        self.spec.slot
    }

    fn binding(&self) -> Binding {
        self.spec.binding
    }

    fn credential(&self) -> Option<&'static str> {
        self.spec.credential
    }

    fn requests_per_second(&self) -> u32 {
        self.spec.requests_per_second
    }

    async fn fetch(
        &self,
        ctx: &FetchContext,
        address: &ResolvedAddress,
    ) -> Result<SourceData, AdapterError> {
        let params = self.spec.binding.query(address)?;
        let api_key = match self.spec.credential {
            Some(_) => Some(
                ctx.credential_for(self)
                    .ok_or(AdapterError::MissingParameter("credential"))?,
            ),
            None => None,
        };

        let cache_key = self.spec.cache_key(address);
        if let Some(key) = cache_key.as_deref() {
            if let Some(data) = self.cached(ctx, key).await {
                return Ok(data);
            }
        }

        let body = ctx
            .client
            .get_json(&self.url, &params, self.spec.auth(), api_key)
            .await?;

        let data = match body {
            Some(value) => SourceData::decode(self.spec.slot, value)
                .map_err(|e| AdapterError::Decode(e.to_string()))?,
            None => match self.spec.soft_default {
                Some(neutral) => {
                    tracing::debug!("{}: no data upstream, using neutral record", self.name());
                    return Ok(neutral());
                }
                None => return Err(AdapterError::NoData),
            },
        };

        if let (Some(key), Some(class)) = (cache_key.as_deref(), self.spec.cache) {
            ctx.cache.set_value(key, &data.to_json(), class.ttl()).await;
        }

        Ok(data)
    }
}
