use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use streamsource::channel::STREAM_PATH;
use streamsource::health::{AlwaysOkProbe, HealthStatus};
use streamsource::prelude::*;
use streamsource::stream::{PublishStreamStatus, SubscribeStreamStatus};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const CONFIG: &str = r#"
[stream]
interval_ms = 40

[health]
probe = "always_ok"
"#;

fn plugin() -> Arc<Plugin<SampleDatasource>> {
    let config: PluginConfig = ConfigBuilder::new().add_toml(CONFIG).build().unwrap();
    Arc::new(Plugin::sample("sample-datasource", &config).unwrap())
}

fn settings() -> DataSourceInstanceSettings {
    DataSourceInstanceSettings::new(5, "lifecycle")
}

fn ctx(settings: DataSourceInstanceSettings) -> PluginContext {
    PluginContext::for_datasource("sample-datasource", settings)
}

fn run_request(settings: DataSourceInstanceSettings) -> RunStreamRequest {
    RunStreamRequest {
        plugin_context: ctx(settings),
        path: STREAM_PATH.to_string(),
        data: None,
    }
}

#[tokio::test]
async fn query_health_subscribe_publish() {
    let plugin = plugin();
    let now = Utc::now();
    let range = TimeRange {
        from: now - ChronoDuration::minutes(5),
        to: now,
    };

    let response = plugin
        .query_data(QueryDataRequest {
            plugin_context: ctx(settings()),
            queries: vec![
                DataQuery::new("A", r#"{"withStreaming": true}"#, range),
                DataQuery::new("B", "oops", range),
            ],
        })
        .await
        .unwrap();
    assert_eq!(response.get("A").unwrap().frames[0].channel(), Some("ds/5/stream"));
    assert!(response.get("B").unwrap().is_error());

    let health = plugin
        .check_health(CheckHealthRequest {
            plugin_context: ctx(settings()),
        })
        .await
        .unwrap();
    assert_eq!(health.status, HealthStatus::Ok);

    let subscribed = plugin
        .subscribe_stream(SubscribeStreamRequest {
            plugin_context: ctx(settings()),
            path: STREAM_PATH.to_string(),
            data: None,
        })
        .await
        .unwrap();
    assert_eq!(subscribed.status, SubscribeStreamStatus::Ok);
    assert!(subscribed.use_run_stream);

    let published = plugin
        .publish_stream(PublishStreamRequest {
            plugin_context: ctx(settings()),
            path: STREAM_PATH.to_string(),
            data: b"{}".to_vec(),
        })
        .await
        .unwrap();
    assert_eq!(published.status, PublishStreamStatus::PermissionDenied);

    assert_eq!(plugin.instances().count().unwrap(), 1);
}

#[tokio::test]
async fn settings_change_closes_running_stream() {
    let plugin = plugin();
    let original = settings();
    let (tx, mut rx) = mpsc::channel::<StreamPacket>(16);

    let handle = tokio::spawn({
        let plugin = Arc::clone(&plugin);
        let req = run_request(original.clone());
        async move { plugin.run_stream(req, CancellationToken::new(), &tx).await }
    });

    timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();

    let changed = original.with_updated(Utc::now() + ChronoDuration::seconds(1));
    let replacement = plugin.instances().get(&ctx(changed)).unwrap();
    assert!(!replacement.is_disposed());

    let result = timeout(Duration::from_millis(40), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.unwrap_err().is_closed());
}

#[tokio::test]
async fn cancel_stops_stream_cleanly_and_instance_survives() {
    let plugin = plugin();
    let (tx, mut rx) = mpsc::channel::<StreamPacket>(16);
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let plugin = Arc::clone(&plugin);
        let cancel = cancel.clone();
        let req = run_request(settings());
        async move { plugin.run_stream(req, cancel, &tx).await }
    });

    for _ in 0..2 {
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    }
    cancel.cancel();

    let result = timeout(Duration::from_millis(40), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
    assert!(!plugin.instances().get(&ctx(settings())).unwrap().is_disposed());
}

#[tokio::test]
async fn shutdown_closes_every_stream() {
    let plugin = plugin();
    let mut handles = Vec::new();
    let mut receivers = Vec::new();

    for id in [1, 2] {
        let (tx, rx) = mpsc::channel::<StreamPacket>(16);
        receivers.push(rx);
        let plugin = Arc::clone(&plugin);
        let req = run_request(DataSourceInstanceSettings::new(id, "multi"));
        handles.push(tokio::spawn(async move {
            plugin.run_stream(req, CancellationToken::new(), &tx).await
        }));
    }

    for rx in receivers.iter_mut() {
        timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
    }
    plugin.shutdown().unwrap();

    for handle in handles {
        let result = timeout(Duration::from_millis(40), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.unwrap_err().is_closed());
    }
}

#[tokio::test]
async fn missing_settings_is_rejected() {
    let plugin = plugin();
    let (tx, _rx) = mpsc::channel::<StreamPacket>(1);
    let req = RunStreamRequest {
        plugin_context: PluginContext::default(),
        path: STREAM_PATH.to_string(),
        data: None,
    };
    let err = plugin
        .run_stream(req, CancellationToken::new(), &tx)
        .await
        .unwrap_err();
    assert!(matches!(err, DatasourceError::Instance(_)));
}

#[tokio::test]
async fn injected_probe_overrides_config() {
    let defaults = DatasourceDefaults::default().with_probe(Arc::new(AlwaysOkProbe));
    let plugin = Plugin::with_defaults("sample-datasource", defaults);
    for _ in 0..8 {
        let health = plugin
            .check_health(CheckHealthRequest {
                plugin_context: ctx(settings()),
            })
            .await
            .unwrap();
        assert_eq!(health.status, HealthStatus::Ok);
    }
}

#[test]
fn zero_interval_config_is_rejected() {
    let err = ConfigBuilder::new()
        .add_toml("[stream]\ninterval_ms = 0")
        .build()
        .unwrap_err();
    assert!(matches!(err, DatasourceError::Config(_)));

    let mut config = PluginConfig::default();
    config.stream.interval_ms = 0;
    assert!(matches!(
        Plugin::sample("sample-datasource", &config),
        Err(DatasourceError::Config(_))
    ));
}

#[tokio::test]
async fn zero_interval_stream_fails_without_panicking() {
    let mut defaults = DatasourceDefaults::default();
    defaults.stream.interval = Duration::ZERO;
    let plugin = Arc::new(Plugin::with_defaults("sample-datasource", defaults));
    let (tx, _rx) = mpsc::channel::<StreamPacket>(1);

    let running = Arc::clone(&plugin);
    let handle = tokio::spawn(async move {
        running
            .run_stream(run_request(settings()), CancellationToken::new(), &tx)
            .await
    });

    let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert!(matches!(result, Err(DatasourceError::Config(_))));
}
