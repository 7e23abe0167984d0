use httpmock::prelude::*;
use market_data_ingestor::{
    models::timeframe::NativeTimeframe,
    providers::{
        ProviderError, ProviderInitError, QuoteSource,
        bridge_rest::{BridgeConfig, BridgeRestProvider, PASSWORD_ENV},
    },
};
use serde_json::json;
use serial_test::serial;

fn config_for(server: &MockServer) -> BridgeConfig {
    BridgeConfig {
        base_url: server.base_url(),
        ..Default::default()
    }
}

#[tokio::test]
#[serial]
async fn fetch_recent_bars_maps_rates() {
    let server = MockServer::start_async().await;
    let rates = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/api/v1/rates")
                .query_param("symbol", "EURUSD")
                .query_param("timeframe", "16385")
                .query_param("start_pos", "0")
                .query_param("count", "2");
            then.status(200).json_body(json!({
                "rates": [
                    {
                        "time": 3600, "open": 1.1, "high": 1.2, "low": 1.0, "close": 1.15,
                        "tick_volume": 42, "spread": 3
                    },
                    {
                        "time": 7200, "open": 1.15, "high": 1.16, "low": 1.14, "close": 1.155,
                        "tick_volume": 7
                    }
                ]
            }));
        })
        .await;

    let provider = BridgeRestProvider::new(&config_for(&server)).expect("provider");
    let bars = provider
        .fetch_recent_bars("EURUSD", NativeTimeframe::H1, 2)
        .await
        .expect("fetch");

    rates.assert_async().await;
    assert_eq!(bars.len(), 2);
    assert_eq!(bars[0].open_time, 3600);
    assert_eq!(bars[0].spread, Some(3));
    assert_eq!(bars[1].real_volume, None);
    assert_eq!(bars[1].close, 1.155);
}

#[tokio::test]
#[serial]
async fn non_success_status_becomes_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/v1/rates");
            then.status(503).body("terminal not connected");
        })
        .await;

    let provider = BridgeRestProvider::new(&config_for(&server)).expect("provider");
    let err = provider
        .fetch_recent_bars("EURUSD", NativeTimeframe::M1, 10)
        .await
        .unwrap_err();

    match err {
        ProviderError::Api { status, message, .. } => {
            assert_eq!(status, 503);
            assert_eq!(message, "terminal not connected");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
#[serial]
async fn refused_selection_is_instrument_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/symbols/NOPE/select");
            then.status(200).json_body(json!({"selected": false}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/symbols/EURUSD/select");
            then.status(200).json_body(json!({"selected": true}));
        })
        .await;

    let provider = BridgeRestProvider::new(&config_for(&server)).expect("provider");
    assert!(provider.select_instrument("EURUSD").await.is_ok());
    assert!(matches!(
        provider.select_instrument("NOPE").await,
        Err(ProviderError::InstrumentUnavailable { .. })
    ));
}

#[tokio::test]
#[serial]
async fn symbols_with_reserved_characters_stay_one_path_segment() {
    let server = MockServer::start_async().await;
    let hashed = server
        .mock_async(|when, then| {
            when.method(POST).path_includes("AAPL/select");
            then.status(200).json_body(json!({"selected": true}));
        })
        .await;
    let truncated = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/symbols/");
            then.status(404).body("no such route");
        })
        .await;

    let provider = BridgeRestProvider::new(&BridgeConfig {
        base_url: format!("{}/", server.base_url()),
        ..Default::default()
    })
    .expect("provider");
    assert!(provider.select_instrument("#AAPL").await.is_ok());
    hashed.assert_async().await;
    assert_eq!(truncated.hits_async().await, 0);
}

#[tokio::test]
#[serial]
async fn connect_sends_credentials_from_env() {
    let server = MockServer::start_async().await;
    let session = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/v1/session").json_body(json!({
                "account": 5551234,
                "password": "hunter2",
                "server": "Broker-Demo"
            }));
            then.status(200)
                .json_body(json!({"connected": true, "terminal": "Terminal 5"}));
        })
        .await;

    // SAFETY: tests touching the environment are serialized.
    unsafe { std::env::set_var(PASSWORD_ENV, "hunter2") };
    let provider = BridgeRestProvider::new(&BridgeConfig {
        account: Some(5551234),
        server: Some("Broker-Demo".into()),
        ..config_for(&server)
    })
    .expect("provider");
    unsafe { std::env::remove_var(PASSWORD_ENV) };

    provider.connect().await.expect("connect");
    session.assert_async().await;
}

#[test]
#[serial]
fn account_without_password_fails_init() {
    unsafe { std::env::remove_var(PASSWORD_ENV) };
    let result = BridgeRestProvider::new(&BridgeConfig {
        account: Some(1),
        ..Default::default()
    });
    assert!(matches!(result, Err(ProviderInitError::MissingEnvVar { .. })));
}

#[test]
fn non_http_base_url_is_rejected() {
    let result = BridgeRestProvider::new(&BridgeConfig {
        base_url: "localhost:8228".into(),
        ..Default::default()
    });
    assert!(matches!(result, Err(ProviderInitError::InvalidConfig { .. })));
}
