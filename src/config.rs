use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::adapters::catalog;
use crate::errors::AppError;

/// Upper bound for a single upstream request.
pub const MAX_ADAPTER_TIMEOUT_SECS: u64 = 30;
/// The stream endpoint needs at least this long to finish a slow aggregation.
pub const MIN_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const MIN_PROGRESS_BUFFER: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub address_lookup_url: String,
    pub reverse_geocode_url: Option<String>,
    pub admin_secret: Option<String>,
    pub cache_max_entries: u64,
    pub adapter_timeout: Duration,
    pub request_timeout: Duration,
    pub progress_buffer: usize,
    /// Source name → base URL, for every HTTP source that is enabled.
    pub source_urls: HashMap<String, String>,
    /// Provider credential name → API key.
    pub credentials: HashMap<String, String>,
}

fn validate_url(var: &str, url: String) -> anyhow::Result<String> {
    let url = url.trim().trim_end_matches('/').to_string();
    if url.is_empty() {
        anyhow::bail!("{} cannot be empty", var);
    }
    let parsed =
        url::Url::parse(&url).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", var, e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("{} must start with http:// or https://", var);
    }
    Ok(url)
}

fn optional_url(var: &str) -> anyhow::Result<Option<String>> {
    match std::env::var(var) {
        Ok(url) if !url.trim().is_empty() => validate_url(var, url).map(Some),
        _ => Ok(None),
    }
}

fn optional_secret(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", var)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Configuration with only the address lookup enabled and defaults
    /// everywhere else.
    pub fn minimal(address_lookup_url: impl Into<String>) -> Self {
        Self {
            port: 8080,
            address_lookup_url: address_lookup_url.into(),
            reverse_geocode_url: None,
            admin_secret: None,
            cache_max_entries: 100_000,
            adapter_timeout: Duration::from_secs(MAX_ADAPTER_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(120),
            progress_buffer: 64,
            source_urls: HashMap::new(),
            credentials: HashMap::new(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let address_lookup_url = std::env::var("ADDRESS_LOOKUP_URL")
            .map_err(|_| anyhow::anyhow!("ADDRESS_LOOKUP_URL environment variable required"))
            .and_then(|url| validate_url("ADDRESS_LOOKUP_URL", url))?;

        let port: u16 = parse_or("PORT", 8080)
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?;

        let adapter_timeout_secs: u64 = parse_or("ADAPTER_TIMEOUT_SECS", MAX_ADAPTER_TIMEOUT_SECS)?;
        if adapter_timeout_secs == 0 {
            anyhow::bail!("ADAPTER_TIMEOUT_SECS must be at least 1");
        }
        let request_timeout_secs: u64 = parse_or("REQUEST_TIMEOUT_SECS", 120)?;
        let progress_buffer: usize = parse_or("PROGRESS_BUFFER", 64)?;

        let mut source_urls = HashMap::new();
        for spec in catalog::SOURCES {
            let var = format!("{}_URL", spec.env_prefix);
            if let Some(url) = optional_url(&var)? {
                source_urls.insert(spec.slot.as_str().to_string(), url);
            }
        }

        let mut credentials = HashMap::new();
        for provider in catalog::PROVIDERS {
            if let Some(key) = optional_secret(provider.env_var) {
                credentials.insert(provider.name.to_string(), key);
            }
        }

        let config = Self {
            port,
            address_lookup_url,
            reverse_geocode_url: optional_url("REVERSE_GEOCODE_URL")?,
            admin_secret: optional_secret("ADMIN_SECRET"),
            cache_max_entries: parse_or("CACHE_MAX_ENTRIES", 100_000)?,
            adapter_timeout: Duration::from_secs(
                adapter_timeout_secs.min(MAX_ADAPTER_TIMEOUT_SECS),
            ),
            request_timeout: Duration::from_secs(
                request_timeout_secs.max(MIN_REQUEST_TIMEOUT_SECS),
            ),
            progress_buffer: progress_buffer.max(MIN_PROGRESS_BUFFER),
            source_urls,
            credentials,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Address lookup URL: {}", config.address_lookup_url);
        if let Some(ref reverse) = config.reverse_geocode_url {
            tracing::debug!("Reverse geocode URL: {}", reverse);
        } else {
            tracing::warn!("REVERSE_GEOCODE_URL not set; neighborhood codes will be empty");
        }
        if config.admin_secret.is_none() {
            tracing::warn!("ADMIN_SECRET not set; cache bypass is disabled");
        }
        tracing::info!(
            "{} upstream source(s) configured, {} credential(s) present",
            config.source_urls.len(),
            config.credentials.len()
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Credentials in effect for one request: process configuration shadowed by
/// per-request overrides. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    keys: HashMap<String, String>,
    overridden: HashSet<String>,
}

impl Credentials {
    pub fn merged(base: &HashMap<String, String>, overrides: &HashMap<String, String>) -> Self {
        let mut keys = base.clone();
        let mut overridden = HashSet::new();
        for (name, key) in overrides {
            let key = key.trim();
            if !key.is_empty() {
                keys.insert(name.clone(), key.to_string());
                overridden.insert(name.clone());
            }
        }
        Self { keys, overridden }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.keys.get(name).map(String::as_str)
    }

    /// Whether the key under `name` came from the request rather than the
    /// process configuration.
    pub fn is_override(&self, name: &str) -> bool {
        self.overridden.contains(name)
    }
}

/// Parses the `apiKeys` request parameter: a JSON object of name → key.
pub fn parse_api_keys(raw: &str) -> Result<HashMap<String, String>, AppError> {
    if raw.trim().is_empty() {
        return Ok(HashMap::new());
    }
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| AppError::BadRequest(format!("apiKeys must be a JSON object: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| AppError::BadRequest("apiKeys must be a JSON object".to_string()))?;

    Ok(object
        .iter()
        .filter_map(|(name, key)| key.as_str().map(|k| (name.clone(), k.to_string())))
        .filter(|(_, key)| !key.trim().is_empty())
        .collect())
}
