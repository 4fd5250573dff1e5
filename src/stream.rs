//! Server-sent event stream for one address search.
//!
//! Event sequence: `start`, any number of `update`s, then `data` and
//! `complete`, or a single `error`. A cached record skips straight to
//! `data` + `complete`.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::parse_api_keys;
use crate::errors::AppError;
use crate::handlers::{bypass_authorized, AppState};
use crate::models::{AddressQuery, ProgressEvent, PropertyRecord, StreamQueryParams};
use crate::orchestrator::{AggregateOptions, Orchestrator};
use crate::progress::progress_channel;
use crate::render::header_fragment;
use crate::response::ComprehensiveSearchResponse;
use crate::scoring;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(2);

/// One event of the search stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Start,
    Update(ProgressEvent),
    Data(Box<ComprehensiveSearchResponse>),
    Complete { html: String },
    Error { message: String },
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Start => "start",
            StreamEvent::Update(_) => "update",
            StreamEvent::Data(_) => "data",
            StreamEvent::Complete { .. } => "complete",
            StreamEvent::Error { .. } => "error",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            StreamEvent::Start => json!({ "message": "Starting search..." }),
            StreamEvent::Update(event) => serde_json::to_value(event).unwrap_or(Value::Null),
            StreamEvent::Data(response) => serde_json::to_value(response).unwrap_or(Value::Null),
            StreamEvent::Complete { html } => json!({ "html": html }),
            StreamEvent::Error { message } => json!({ "message": message }),
        }
    }

    pub fn into_sse(self) -> Event {
        Event::default()
            .event(self.name())
            .data(self.payload().to_string())
    }
}

/// A validated stream request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: AddressQuery,
    pub options: AggregateOptions,
}

fn final_events(record: &PropertyRecord) -> [StreamEvent; 2] {
    let scores = scoring::score(record);
    let html = header_fragment(record, &scores);
    [
        StreamEvent::Data(Box::new(ComprehensiveSearchResponse::build(record, Some(scores)))),
        StreamEvent::Complete { html },
    ]
}

/// Events for one search.
///
/// Dropping the stream cancels the aggregation; nothing is cached then.
pub fn search_events(
    orchestrator: Orchestrator,
    progress_buffer: usize,
    request: SearchRequest,
) -> impl Stream<Item = StreamEvent> + Send + 'static {
    async_stream::stream! {
        let SearchRequest { query, options } = request;

        if !options.bypass_cache {
            if let Some(record) = orchestrator.cached(&query).await {
                tracing::info!("SSE: cache hit for {} {}", query.postcode, query.house_number);
                for event in final_events(&record) {
                    yield event;
                }
                return;
            }
        }

        yield StreamEvent::Start;

        let cancel = CancellationToken::new();
        // cancels the aggregation when the client goes away
        let _cancel_on_drop = cancel.clone().drop_guard();

        let (sink, mut progress) = progress_channel(progress_buffer);
        let task = {
            let orchestrator = orchestrator.clone();
            let query = query.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                orchestrator.aggregate(&query, options, Some(sink), cancel).await
            })
        };

        while let Some(event) = progress.recv().await {
            yield StreamEvent::Update(event);
        }
        if progress.dropped() > 0 {
            tracing::debug!("SSE: {} progress event(s) dropped", progress.dropped());
        }

        match task.await {
            Ok(Ok(aggregated)) => {
                for event in final_events(&aggregated.record) {
                    yield event;
                }
            }
            Ok(Err(e)) if e.is_cancelled() => {
                tracing::debug!("SSE: aggregation cancelled");
            }
            Ok(Err(e)) => {
                tracing::warn!(
                    "SSE: search for {} {} failed: {}",
                    query.postcode,
                    query.house_number,
                    e
                );
                yield StreamEvent::Error { message: e.public_message() };
            }
            Err(e) => {
                tracing::error!("SSE: aggregation task failed: {}", e);
                yield StreamEvent::Error { message: "Internal server error".to_string() };
            }
        }
    }
}

/// GET /api/search/stream
pub async fn search_stream(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<StreamQueryParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let query = AddressQuery::parse(
        params.postcode.as_deref().unwrap_or_default(),
        params.house_number.as_deref().unwrap_or_default(),
    )?;
    let key_overrides = parse_api_keys(params.api_keys.as_deref().unwrap_or_default())?;

    let bypass_cache = params.wants_bypass()
        && bypass_authorized(&state.config, &headers, params.admin_secret.as_deref());
    if params.wants_bypass() && !bypass_cache {
        tracing::warn!("Cache bypass requested without a valid admin secret; using cache");
    }

    tracing::info!(
        "GET /api/search/stream - {} {} (bypass: {}, overrides: {})",
        query.postcode,
        query.house_number,
        bypass_cache,
        key_overrides.len()
    );

    let request = SearchRequest {
        query,
        options: AggregateOptions {
            bypass_cache,
            key_overrides,
        },
    };
    let events = search_events(state.orchestrator.clone(), state.config.progress_buffer, request)
        .map(|event| Ok(event.into_sse()));

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(KEEPALIVE_INTERVAL)
            .text("keepalive"),
    ))
}
