//! AddressIQ property intelligence backend.
//!
//! Resolves a Dutch postcode and house number to a building, fans out to the
//! configured upstream data sources, aggregates their answers into one
//! property record and scores it.
//!
//! # Modules
//!
//! - `adapters`: Upstream adapter trait, catalog and registry.
//! - `build_info`: Build metadata injected into the app state.
//! - `cache`: Response cache with per-entry TTL.
//! - `cache_validator`: Checksummed cache entry encoding.
//! - `circuit_breaker`: Per-adapter circuit breakers.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers and routes.
//! - `models`: Property record, slots, progress events and request types.
//! - `orchestrator`: Concurrent fan-out and aggregation.
//! - `progress`: Bounded progress channel.
//! - `render`: HTML fragments.
//! - `resolver`: Address resolution.
//! - `response`: Client-facing response shapes.
//! - `scoring`: Scoring engine.
//! - `single_flight`: Per-key request coalescing.
//! - `source_models`: Typed upstream records.
//! - `stream`: Server-sent event search stream.
//! - `upstream`: Shared upstream HTTP client.

pub mod adapters;
pub mod build_info;
pub mod cache;
pub mod cache_validator;
pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod render;
pub mod resolver;
pub mod response;
pub mod scoring;
pub mod single_flight;
pub mod source_models;
pub mod stream;
pub mod upstream;
