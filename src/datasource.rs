//! The sample datasource: queries, health, and a synthetic live stream
use async_trait::async_trait;
use log::info;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::channel::{Channel, STREAM_PATH};
use crate::config::PluginConfig;
use crate::context::DataSourceInstanceSettings;
use crate::error::{DatasourceError, Result};
use crate::health::{
    CheckHealthHandler, CheckHealthRequest, CheckHealthResult, HealthProbe, HealthReporter,
    probe_for,
};
use crate::instance::Instance;
use crate::query::{
    QueryDataHandler, QueryDataRequest, QueryDataResponse, QueryOptions, build_frames,
    execute_batch,
};
use crate::stream::{
    DenyPublish, PublishAuthorizer, PublishStreamRequest, PublishStreamResponse, RunStreamRequest,
    StreamConfig, StreamHandler, StreamPacketSender, StreamSession, SubscribeStreamRequest,
    SubscribeStreamResponse,
};

/// Flat per-datasource options stored in the host's `jsonData`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasourceOptions {
    #[serde(default)]
    pub path: Option<String>,
    /// Overrides the configured stream interval
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

impl DatasourceOptions {
    pub fn parse(settings: &DataSourceInstanceSettings) -> Result<Self> {
        if settings.json_data.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(settings.json_data.clone()).map_err(|e| {
            DatasourceError::Settings(format!("datasource {}: {}", settings.id, e))
        })
    }
}

/// Shared behaviour applied to every instance the registry creates
#[derive(Clone)]
pub struct DatasourceDefaults {
    pub stream: StreamConfig,
    pub query: QueryOptions,
    pub probe: Arc<dyn HealthProbe>,
    pub publish: Arc<dyn PublishAuthorizer>,
}

impl DatasourceDefaults {
    pub fn from_config(config: &PluginConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stream: StreamConfig {
                interval: config.stream.interval(),
                send_failure: config.stream.send_failure_policy(),
            },
            query: QueryOptions {
                batch_policy: config.query.batch_policy,
                require_format: config.query.require_format,
            },
            probe: probe_for(config.health.probe),
            publish: Arc::new(DenyPublish),
        })
    }

    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_publish(mut self, publish: Arc<dyn PublishAuthorizer>) -> Self {
        self.publish = publish;
        self
    }
}

impl Default for DatasourceDefaults {
    fn default() -> Self {
        let config = PluginConfig::default();
        Self {
            stream: StreamConfig::default(),
            query: QueryOptions::default(),
            probe: probe_for(config.health.probe),
            publish: Arc::new(DenyPublish),
        }
    }
}

/// One configured datasource
pub struct SampleDatasource {
    settings: DataSourceInstanceSettings,
    options: DatasourceOptions,
    generation: Uuid,
    channel: Channel,
    stream: StreamConfig,
    query: QueryOptions,
    health: HealthReporter,
    publish: Arc<dyn PublishAuthorizer>,
    closed: CancellationToken,
}

impl SampleDatasource {
    /// Create an instance from host settings
    pub fn new(settings: &DataSourceInstanceSettings, defaults: &DatasourceDefaults) -> Result<Self> {
        let options = DatasourceOptions::parse(settings)?;

        let mut stream = defaults.stream.clone();
        if let Some(ms) = options.interval_ms {
            if ms == 0 {
                return Err(DatasourceError::Settings(format!(
                    "datasource {}: intervalMs must be positive",
                    settings.id
                )));
            }
            stream.interval = Duration::from_millis(ms);
        }

        let generation = Uuid::new_v4();
        info!(
            "Creating datasource {} ({}) generation {}",
            settings.id, settings.name, generation
        );

        Ok(Self {
            channel: Channel::datasource(settings.id, STREAM_PATH),
            settings: settings.clone(),
            options,
            generation,
            stream,
            query: defaults.query.clone(),
            health: HealthReporter::new(Arc::clone(&defaults.probe)),
            publish: Arc::clone(&defaults.publish),
            closed: CancellationToken::new(),
        })
    }

    pub fn settings(&self) -> &DataSourceInstanceSettings {
        &self.settings
    }

    pub fn options(&self) -> &DatasourceOptions {
        &self.options
    }

    /// Unique per instance, never reused after disposal
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// Channel clients subscribe to for this instance's live data
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn is_disposed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Open and run a stream session in one call
    pub async fn run_stream<S>(
        &self,
        req: RunStreamRequest,
        cancel: CancellationToken,
        sender: &S,
    ) -> Result<()>
    where
        S: StreamPacketSender + ?Sized,
    {
        self.open_stream(&req)?.run(cancel, sender).await
    }
}

impl Instance for SampleDatasource {
    fn dispose(&self) {
        if !self.closed.is_cancelled() {
            info!(
                "Disposing datasource {} generation {}",
                self.settings.id, self.generation
            );
            self.closed.cancel();
        }
    }
}

#[async_trait]
impl QueryDataHandler for SampleDatasource {
    async fn query_data(&self, req: QueryDataRequest) -> Result<QueryDataResponse> {
        info!(
            "QueryData called for datasource {} with {} queries",
            self.settings.id,
            req.queries.len()
        );

        execute_batch(&req.queries, self.query.batch_policy, |query| {
            build_frames(query, &self.query, &self.channel)
        })
    }
}

#[async_trait]
impl CheckHealthHandler for SampleDatasource {
    async fn check_health(&self, _req: CheckHealthRequest) -> Result<CheckHealthResult> {
        info!("CheckHealth called for datasource {}", self.settings.id);
        Ok(self.health.report().await)
    }
}

#[async_trait]
impl StreamHandler for SampleDatasource {
    async fn subscribe_stream(&self, req: SubscribeStreamRequest) -> Result<SubscribeStreamResponse> {
        info!(
            "SubscribeStream called for datasource {} on path {}",
            self.settings.id, req.path
        );
        // Every path is accepted here; a real datasource would validate it
        Ok(SubscribeStreamResponse::accept())
    }

    async fn publish_stream(&self, req: PublishStreamRequest) -> Result<PublishStreamResponse> {
        info!(
            "PublishStream called for datasource {} on path {}",
            self.settings.id, req.path
        );
        Ok(self.publish.authorize(&req).into())
    }

    fn open_stream(&self, req: &RunStreamRequest) -> Result<StreamSession> {
        info!(
            "RunStream called for datasource {} on path {}",
            self.settings.id, req.path
        );
        Ok(StreamSession::new(
            req.path.clone(),
            self.stream.clone(),
            self.closed.clone(),
        ))
    }
}
