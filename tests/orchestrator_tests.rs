/// Orchestrator tests with scripted adapters
/// Covers partial failure, cancellation, caching, credentials and request coalescing
mod common;

use addressiq_backend::adapters::Binding;
use addressiq_backend::cache::keys;
use addressiq_backend::errors::AppError;
use addressiq_backend::models::{AddressQuery, ProgressEvent, ProgressStatus, Slot};
use addressiq_backend::orchestrator::AggregateOptions;
use addressiq_backend::progress::progress_channel;
use addressiq_backend::scoring::score;
use common::{
    mock_address_lookup, mock_address_lookup_with, orchestrator, Behavior, ScriptedAdapter,
};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const TIMEOUT: Duration = Duration::from_secs(5);

fn query() -> AddressQuery {
    AddressQuery::new("3512JE", "29")
}

fn events_for<'a>(events: &'a [ProgressEvent], source: &str) -> Vec<&'a ProgressEvent> {
    events.iter().filter(|e| e.source == source).collect()
}

#[tokio::test]
async fn test_partial_failure_keeps_successful_sources() {
    let server = mock_address_lookup().await;
    let orchestrator = orchestrator(
        &server,
        vec![
            ScriptedAdapter::new(Slot::Solar, Behavior::Succeed),
            ScriptedAdapter::new(Slot::Safety, Behavior::Succeed),
            ScriptedAdapter::new(Slot::FloodRisk, Behavior::Fail),
            ScriptedAdapter::new(Slot::NoisePollution, Behavior::Fail),
            ScriptedAdapter::new(Slot::AirQuality, Behavior::Fail),
            ScriptedAdapter::new(Slot::Parking, Behavior::Fail),
        ],
        TIMEOUT,
    );

    let aggregated = orchestrator
        .aggregate(&query(), AggregateOptions::default(), None, CancellationToken::new())
        .await
        .unwrap();
    let record = aggregated.record;

    assert!(!aggregated.from_cache);
    assert_eq!(record.data_sources.len(), 2);
    assert_eq!(record.errors.len(), 4);
    for source in &record.data_sources {
        assert!(!record.errors.contains_key(source));
    }
    assert_eq!(
        record.errors.get("floodRisk").map(String::as_str),
        Some("upstream returned 503: unavailable")
    );

    let scores = score(&record);
    for value in [
        scores.esg_score,
        scores.profit_score,
        scores.opportunity_score,
        scores.overall_score,
    ] {
        assert!((0.0..=100.0).contains(&value));
    }
}

#[tokio::test]
async fn test_all_adapters_failing_still_returns_resolved_record() {
    let server = mock_address_lookup().await;
    let orchestrator = orchestrator(
        &server,
        vec![
            ScriptedAdapter::new(Slot::Weather, Behavior::Fail),
            ScriptedAdapter::new(Slot::Solar, Behavior::Panic),
            ScriptedAdapter::new(Slot::Elevation, Behavior::WrongSlot),
        ],
        TIMEOUT,
    );

    let record = orchestrator
        .aggregate(&query(), AggregateOptions::default(), None, CancellationToken::new())
        .await
        .unwrap()
        .record;

    assert_eq!(record.address, "Domplein 29, 3512JE Utrecht");
    assert!((record.coordinates.lat - 52.09074).abs() < 1e-9);
    assert_eq!(record.building_id, "0344010000012345");
    assert!(record.data_sources.is_empty());
    assert_eq!(record.errors.len(), 3);
    assert!(record.errors["solar"].contains("panicked"));
    assert!(record.errors["elevation"].contains("weather"));
}

#[tokio::test]
async fn test_slow_adapter_times_out() {
    let server = mock_address_lookup().await;
    let orchestrator = orchestrator(
        &server,
        vec![
            ScriptedAdapter::new(Slot::Weather, Behavior::Hang),
            ScriptedAdapter::new(Slot::Solar, Behavior::Succeed),
        ],
        Duration::from_millis(500),
    );

    let record = orchestrator
        .aggregate(&query(), AggregateOptions::default(), None, CancellationToken::new())
        .await
        .unwrap()
        .record;

    assert_eq!(record.data_sources, vec!["solar".to_string()]);
    assert_eq!(record.errors["weather"], "timed out");
}

#[tokio::test]
async fn test_second_aggregate_is_served_from_cache() {
    let server = mock_address_lookup().await;
    let adapter = ScriptedAdapter::new(Slot::Solar, Behavior::Succeed);
    let calls = adapter.counter();
    let orchestrator = orchestrator(&server, vec![adapter], TIMEOUT);

    let first = orchestrator
        .aggregate(&query(), AggregateOptions::default(), None, CancellationToken::new())
        .await
        .unwrap();
    let second = orchestrator
        .aggregate(
            &AddressQuery::new(" 3512 je ", "29 "),
            AggregateOptions::default(),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        serde_json::to_vec(&first.record).unwrap(),
        serde_json::to_vec(&second.record).unwrap()
    );
    assert!(
        orchestrator
            .cache()
            .exists(&keys::property("0344010000012345"))
            .await
    );
}

#[tokio::test]
async fn test_bypass_skips_cache_read() {
    let server = mock_address_lookup().await;
    let adapter = ScriptedAdapter::new(Slot::Solar, Behavior::Succeed);
    let calls = adapter.counter();
    let orchestrator = orchestrator(&server, vec![adapter], TIMEOUT);

    orchestrator
        .aggregate(&query(), AggregateOptions::default(), None, CancellationToken::new())
        .await
        .unwrap();
    let bypassed = orchestrator
        .aggregate(
            &query(),
            AggregateOptions {
                bypass_cache: true,
                ..Default::default()
            },
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(!bypassed.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fresh_record_invalidates_cached_scores() {
    let server = mock_address_lookup().await;
    let orchestrator = orchestrator(
        &server,
        vec![ScriptedAdapter::new(Slot::Solar, Behavior::Succeed)],
        TIMEOUT,
    );

    let first = orchestrator
        .aggregate(&query(), AggregateOptions::default(), None, CancellationToken::new())
        .await
        .unwrap();
    let scores_key = keys::scores("0344010000012345");
    assert!(
        orchestrator
            .cache()
            .set_value(&scores_key, &score(&first.record), Duration::from_secs(60))
            .await
    );

    let cached = orchestrator
        .aggregate(&query(), AggregateOptions::default(), None, CancellationToken::new())
        .await
        .unwrap();
    assert!(cached.from_cache);
    assert!(orchestrator.cache().exists(&scores_key).await);

    orchestrator
        .aggregate(
            &query(),
            AggregateOptions {
                bypass_cache: true,
                ..Default::default()
            },
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(!orchestrator.cache().exists(&scores_key).await);
}

#[tokio::test]
async fn test_cancellation_returns_promptly_without_caching() {
    let server = mock_address_lookup().await;
    let orchestrator = orchestrator(
        &server,
        vec![
            ScriptedAdapter::new(Slot::Weather, Behavior::Hang),
            ScriptedAdapter::new(Slot::Solar, Behavior::Succeed),
        ],
        Duration::from_secs(30),
    );

    let cancel = CancellationToken::new();
    let task = {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            orchestrator
                .aggregate(&query(), AggregateOptions::default(), None, cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(200)).await;
    let cancelled_at = Instant::now();
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("aggregate did not return after cancellation")
        .unwrap();

    assert!(matches!(result, Err(AppError::Cancelled)));
    assert!(cancelled_at.elapsed() < Duration::from_secs(5));
    assert!(!orchestrator.cache().exists(&keys::aggregated("3512JE", "29")).await);
    assert!(orchestrator.cached(&query()).await.is_none());
}

#[tokio::test]
async fn test_missing_credential_skips_adapter() {
    let server = mock_address_lookup().await;
    let keyed = ScriptedAdapter::new(Slot::WozData, Behavior::Succeed)
        .with_credential("altum")
        .with_binding(Binding::Building);
    let keyed_calls = keyed.counter();
    let orchestrator = orchestrator(
        &server,
        vec![keyed, ScriptedAdapter::new(Slot::Solar, Behavior::Succeed)],
        TIMEOUT,
    );

    let (sink, mut progress) = progress_channel(64);
    let record = orchestrator
        .aggregate(
            &query(),
            AggregateOptions::default(),
            Some(sink),
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .record;

    let mut events = Vec::new();
    while let Some(event) = progress.recv().await {
        events.push(event);
    }

    assert_eq!(keyed_calls.load(Ordering::SeqCst), 0);
    assert!(!record.errors.contains_key("wozData"));
    assert!(!record.data_sources.contains(&"wozData".to_string()));

    let woz = events_for(&events, "wozData");
    assert_eq!(woz.len(), 1);
    assert_eq!(woz[0].status, ProgressStatus::SkippedNoCredential);
}

#[tokio::test]
async fn test_request_key_override_enables_adapter() {
    let server = mock_address_lookup().await;
    let keyed = ScriptedAdapter::new(Slot::WozData, Behavior::Succeed).with_credential("altum");
    let keyed_calls = keyed.counter();
    let orchestrator = orchestrator(&server, vec![keyed], TIMEOUT);

    let options = AggregateOptions {
        bypass_cache: false,
        key_overrides: HashMap::from([("wozData".to_string(), "per-request".to_string())]),
    };
    let record = orchestrator
        .aggregate(&query(), options, None, CancellationToken::new())
        .await
        .unwrap()
        .record;

    assert_eq!(keyed_calls.load(Ordering::SeqCst), 1);
    assert_eq!(record.data_sources, vec!["wozData".to_string()]);
}

#[tokio::test]
async fn test_missing_building_id_skips_building_adapters() {
    let server = mock_address_lookup_with(serde_json::json!({
        "weergavenaam": "Nieuwbouwlaan 1, 1234AB Almere",
        "centroide_ll": "POINT(5.2 52.37)",
        "gemeentecode": "0034"
    }))
    .await;
    let building =
        ScriptedAdapter::new(Slot::Pdok, Behavior::Succeed).with_binding(Binding::Building);
    let building_calls = building.counter();
    let orchestrator = orchestrator(
        &server,
        vec![building, ScriptedAdapter::new(Slot::Weather, Behavior::Succeed)],
        TIMEOUT,
    );

    let (sink, mut progress) = progress_channel(64);
    let record = orchestrator
        .aggregate(
            &AddressQuery::new("1234AB", "1"),
            AggregateOptions::default(),
            Some(sink),
            CancellationToken::new(),
        )
        .await
        .unwrap()
        .record;

    let mut events = Vec::new();
    while let Some(event) = progress.recv().await {
        events.push(event);
    }

    assert_eq!(building_calls.load(Ordering::SeqCst), 0);
    assert_eq!(record.data_sources, vec!["weather".to_string()]);
    let pdok = events_for(&events, "pdok");
    assert_eq!(pdok.len(), 1);
    assert_eq!(pdok[0].status, ProgressStatus::SkippedNoKey);
}

#[tokio::test]
async fn test_progress_events_follow_lifecycle() {
    let server = mock_address_lookup().await;
    let orchestrator = orchestrator(
        &server,
        vec![
            ScriptedAdapter::new(Slot::Solar, Behavior::Succeed),
            ScriptedAdapter::new(Slot::Weather, Behavior::Fail),
            ScriptedAdapter::new(Slot::Parking, Behavior::Slow(Duration::from_millis(50))),
        ],
        TIMEOUT,
    );

    let (sink, mut progress) = progress_channel(64);
    orchestrator
        .aggregate(
            &query(),
            AggregateOptions::default(),
            Some(sink),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Some(event) = progress.recv().await {
        events.push(event);
    }

    for source in ["solar", "weather", "parking"] {
        let lifecycle = events_for(&events, source);
        let statuses: Vec<ProgressStatus> = lifecycle.iter().map(|e| e.status).collect();
        assert_eq!(statuses.first(), Some(&ProgressStatus::Pending), "{source}");
        assert!(
            statuses.windows(2).all(|w| w[0].rank() <= w[1].rank()),
            "{source}: {statuses:?}"
        );
        assert_eq!(statuses.iter().filter(|s| s.is_terminal()).count(), 1);
        assert!(statuses.last().unwrap().is_terminal());
    }

    let solar = events_for(&events, "solar");
    assert!(solar.last().unwrap().data.is_some());
    let weather = events_for(&events, "weather");
    assert_eq!(weather.last().unwrap().status, ProgressStatus::Failure);
    assert!(weather.last().unwrap().error.is_some());
}

#[tokio::test]
async fn test_concurrent_requests_share_one_fan_out() {
    let server = mock_address_lookup().await;
    let adapter = ScriptedAdapter::new(Slot::Solar, Behavior::Slow(Duration::from_millis(200)));
    let calls = adapter.counter();
    let orchestrator = orchestrator(&server, vec![adapter], TIMEOUT);

    let q = query();
    let request = || {
        orchestrator.aggregate(&q, AggregateOptions::default(), None, CancellationToken::new())
    };
    let (a, b) = tokio::join!(request(), request());
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(a.from_cache != b.from_cache);
    assert_eq!(a.record, b.record);
}

#[tokio::test]
async fn test_unknown_address_fails_request() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::path("/free"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": { "docs": [] }
        })))
        .mount(&server)
        .await;
    let adapter = ScriptedAdapter::new(Slot::Solar, Behavior::Succeed);
    let calls = adapter.counter();
    let orchestrator = orchestrator(&server, vec![adapter], TIMEOUT);

    let result = orchestrator
        .aggregate(&query(), AggregateOptions::default(), None, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AppError::AddressNotFound(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
