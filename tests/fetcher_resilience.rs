//! Integration tests for fetcher resilience: cache expiry, circuit
//! transitions, retry budget, and the fallback tiers.

use blaze_sync::testing::{ScriptedOperation, ScriptedOutcome};
use blaze_sync::{
    default_team_catalog, CircuitState, Config, FallbackTable, FetchOptions, FetchOutcome,
    ResilientFetcher, SyncError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn test_config() -> Config {
    Config {
        max_retries: 0,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 40,
        request_timeout_ms: 200,
        failure_threshold: 5,
        failure_window_ms: 60_000,
        circuit_open_base_ms: 60,
        circuit_open_max_ms: 240,
        ..Config::default()
    }
}

fn options(max_retries: u32, ttl: Duration) -> FetchOptions {
    FetchOptions {
        timeout: Duration::from_millis(200),
        max_retries,
        cache_ttl: ttl,
        fallback: None,
    }
}

#[tokio::test]
async fn roster_cache_hit_then_exactly_one_refresh_after_expiry() {
    init_logging();
    let fetcher = ResilientFetcher::new(&test_config());
    let opts = options(0, Duration::from_millis(120));
    let scripted = ScriptedOperation::new(vec![
        ScriptedOutcome::Value(json!({"roster": ["Arenado", "Goldschmidt"]})),
        ScriptedOutcome::Value(json!({"roster": ["Arenado", "Goldschmidt", "Winn"]})),
    ]);

    let first = fetcher
        .request(
            "/mlb/teams/138/roster",
            "GET /mlb/teams/138/roster",
            scripted.operation(),
            &opts,
        )
        .await
        .unwrap();
    assert!(first.is_fresh());
    assert_eq!(scripted.calls(), 1);

    // Inside the TTL: served from cache, network untouched
    let second = fetcher
        .request(
            "/mlb/teams/138/roster",
            "GET /mlb/teams/138/roster",
            scripted.operation(),
            &opts,
        )
        .await
        .unwrap();
    assert!(second.is_cached());
    assert_eq!(scripted.calls(), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    // Past the TTL: exactly one fresh network call
    let third = fetcher
        .request(
            "/mlb/teams/138/roster",
            "GET /mlb/teams/138/roster",
            scripted.operation(),
            &opts,
        )
        .await
        .unwrap();
    assert!(third.is_fresh());
    assert_eq!(
        third.into_inner(),
        json!({"roster": ["Arenado", "Goldschmidt", "Winn"]})
    );
    assert_eq!(scripted.calls(), 2);
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_sixth_call_skips_network() {
    init_logging();
    let mut table = FallbackTable::new();
    table.insert("/scores", json!([]));
    let fetcher = ResilientFetcher::with_fallback(&test_config(), table);
    // TTL of zero keeps every call going to the network
    let opts = options(0, Duration::from_millis(0));
    let scripted =
        ScriptedOperation::always(ScriptedOutcome::Transport("conn refused".to_string()), 5);

    for _ in 0..5 {
        let outcome = fetcher
            .request("/scores", "GET /scores", scripted.operation(), &opts)
            .await
            .unwrap();
        assert!(outcome.is_fallback());
    }
    assert_eq!(scripted.calls(), 5);
    assert_eq!(fetcher.circuit_state("/scores"), Some(CircuitState::Open));

    // Sixth call: circuit open, fallback served without touching the
    // network (the script is exhausted, so any extra call would fail
    // loudly with a different outcome)
    let sixth = fetcher
        .request("/scores", "GET /scores", scripted.operation(), &opts)
        .await
        .unwrap();
    assert!(sixth.is_fallback());
    assert_eq!(scripted.calls(), 5);
}

#[tokio::test]
async fn circuit_half_opens_and_recovers_on_successful_probe() {
    init_logging();
    let fetcher = ResilientFetcher::with_fallback(&test_config(), FallbackTable::new());
    let opts = options(0, Duration::from_millis(0));

    let failing =
        ScriptedOperation::always(ScriptedOutcome::Transport("conn refused".to_string()), 5);
    for _ in 0..5 {
        let result = fetcher
            .request("/standings", "GET /standings", failing.operation(), &opts)
            .await;
        assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));
    }
    assert_eq!(
        fetcher.circuit_state("/standings"),
        Some(CircuitState::Open)
    );

    // Wait out the open duration, then let the single probe succeed
    tokio::time::sleep(Duration::from_millis(80)).await;
    let probe = ScriptedOperation::new(vec![ScriptedOutcome::Value(json!({"leader": "STL"}))]);
    let outcome = fetcher
        .request("/standings", "probe-key", probe.operation(), &opts)
        .await
        .unwrap();
    assert!(outcome.is_fresh());
    assert_eq!(probe.calls(), 1);
    assert_eq!(
        fetcher.circuit_state("/standings"),
        Some(CircuitState::Closed)
    );
    assert_eq!(fetcher.circuit_failure_count("/standings"), 0);

    // Closed again: subsequent calls proceed normally
    let follow_up = ScriptedOperation::new(vec![ScriptedOutcome::Value(json!({"leader": "CHC"}))]);
    let outcome = fetcher
        .request("/standings", "follow-up-key", follow_up.operation(), &opts)
        .await
        .unwrap();
    assert!(outcome.is_fresh());
    assert_eq!(follow_up.calls(), 1);
}

#[tokio::test]
async fn failing_operation_attempts_exactly_retries_plus_one_with_backoff() {
    init_logging();
    let fetcher = ResilientFetcher::with_fallback(&test_config(), FallbackTable::new());
    let opts = options(3, Duration::from_millis(0));
    let scripted =
        ScriptedOperation::always(ScriptedOutcome::HttpStatus(503), 4);

    let result = fetcher
        .request("/schedule", "GET /schedule", scripted.operation(), &opts)
        .await;
    assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));
    assert_eq!(scripted.calls(), 4);

    // Inter-attempt gaps are non-decreasing (exponential backoff)
    let times = scripted.call_times();
    let gaps: Vec<Duration> = times.windows(2).map(|w| w[1] - w[0]).collect();
    assert_eq!(gaps.len(), 3);
    for pair in gaps.windows(2) {
        assert!(
            pair[1] >= pair[0],
            "backoff shrank: {:?} then {:?}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn teams_endpoint_serves_static_cardinals_fallback_below_threshold() {
    init_logging();
    let fetcher = ResilientFetcher::new(&test_config());
    let opts = options(2, Duration::from_millis(0));
    let scripted = ScriptedOperation::always(ScriptedOutcome::HttpStatus(500), 3);

    let outcome = fetcher
        .request("/teams", "GET /teams", scripted.operation(), &opts)
        .await
        .unwrap();

    // Three attempts (two retries), three circuit failures, no open
    // circuit, and the bundled catalog instead of RemoteUnavailable
    assert_eq!(scripted.calls(), 3);
    assert_eq!(fetcher.circuit_failure_count("/teams"), 3);
    assert_eq!(fetcher.circuit_state("/teams"), Some(CircuitState::Closed));
    match outcome {
        FetchOutcome::Fallback(value) => {
            assert_eq!(value, default_team_catalog());
            assert_eq!(value[0]["id"], 138);
            assert_eq!(value[0]["code"], "STL");
        }
        other => panic!("expected static fallback, got {:?}", other),
    }
}

#[tokio::test]
async fn last_known_good_beats_static_fallback() {
    init_logging();
    let fetcher = ResilientFetcher::new(&test_config());
    let opts = options(0, Duration::from_millis(10));

    // Seed the cache with a short-lived successful response
    let seed = ScriptedOperation::new(vec![ScriptedOutcome::Value(json!([{ "id": 138 }]))]);
    let outcome = fetcher
        .request("/teams", "GET /teams", seed.operation(), &opts)
        .await
        .unwrap();
    assert!(outcome.is_fresh());

    tokio::time::sleep(Duration::from_millis(30)).await;

    // Entry expired; the failed refresh falls back to last-known-good,
    // not the static catalog
    let failing = ScriptedOperation::always(ScriptedOutcome::Timeout, 1);
    let outcome = fetcher
        .request("/teams", "GET /teams", failing.operation(), &opts)
        .await
        .unwrap();
    assert_eq!(outcome, FetchOutcome::Fallback(json!([{ "id": 138 }])));
}

#[tokio::test]
async fn remote_unavailable_when_every_tier_is_empty() {
    init_logging();
    let fetcher = ResilientFetcher::with_fallback(&test_config(), FallbackTable::new());
    let opts = options(1, Duration::from_millis(0));
    let scripted =
        ScriptedOperation::always(ScriptedOutcome::Transport("dns failure".to_string()), 2);

    let result = fetcher
        .request("/injuries", "GET /injuries", scripted.operation(), &opts)
        .await;
    match result {
        Err(SyncError::RemoteUnavailable(reason)) => {
            assert!(reason.contains("/injuries"), "reason: {}", reason);
        }
        other => panic!("expected RemoteUnavailable, got {:?}", other),
    }
}
