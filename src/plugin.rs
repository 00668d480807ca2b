//! Routes host requests to the right datasource instance
use log::{debug, info};
use tokio_util::sync::CancellationToken;

use crate::config::PluginConfig;
use crate::context::DataSourceInstanceSettings;
use crate::datasource::{DatasourceDefaults, SampleDatasource};
use crate::error::Result;
use crate::health::{CheckHealthHandler, CheckHealthRequest, CheckHealthResult};
use crate::instance::{Instance, InstanceManager};
use crate::query::{QueryDataHandler, QueryDataRequest, QueryDataResponse};
use crate::stream::{
    PublishStreamRequest, PublishStreamResponse, RunStreamRequest, StreamHandler,
    StreamPacketSender, SubscribeStreamRequest, SubscribeStreamResponse,
};

/// A backend plugin serving one kind of instance
pub struct Plugin<I: Instance> {
    plugin_id: String,
    instances: InstanceManager<I>,
}

impl<I: Instance> Plugin<I> {
    pub fn new<F>(plugin_id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&DataSourceInstanceSettings) -> Result<I> + Send + Sync + 'static,
    {
        Self {
            plugin_id: plugin_id.into(),
            instances: InstanceManager::new(factory),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn instances(&self) -> &InstanceManager<I> {
        &self.instances
    }

    /// Dispose every instance; running streams end with the closed condition
    pub fn shutdown(&self) -> Result<()> {
        info!("Shutting down plugin {}", self.plugin_id);
        self.instances.dispose_all()
    }
}

impl Plugin<SampleDatasource> {
    /// Plugin serving [`SampleDatasource`] instances built from `config`
    pub fn sample(plugin_id: impl Into<String>, config: &PluginConfig) -> Result<Self> {
        Ok(Self::with_defaults(plugin_id, DatasourceDefaults::from_config(config)?))
    }

    pub fn with_defaults(plugin_id: impl Into<String>, defaults: DatasourceDefaults) -> Self {
        Self::new(plugin_id, move |settings| SampleDatasource::new(settings, &defaults))
    }
}

impl<I: Instance + QueryDataHandler> Plugin<I> {
    pub async fn query_data(&self, req: QueryDataRequest) -> Result<QueryDataResponse> {
        let instance = self.instances.get(&req.plugin_context)?;
        instance.query_data(req).await
    }
}

impl<I: Instance + CheckHealthHandler> Plugin<I> {
    pub async fn check_health(&self, req: CheckHealthRequest) -> Result<CheckHealthResult> {
        let instance = self.instances.get(&req.plugin_context)?;
        instance.check_health(req).await
    }
}

impl<I: Instance + StreamHandler> Plugin<I> {
    pub async fn subscribe_stream(
        &self,
        req: SubscribeStreamRequest,
    ) -> Result<SubscribeStreamResponse> {
        let instance = self.instances.get(&req.plugin_context)?;
        instance.subscribe_stream(req).await
    }

    pub async fn publish_stream(&self, req: PublishStreamRequest) -> Result<PublishStreamResponse> {
        let instance = self.instances.get(&req.plugin_context)?;
        instance.publish_stream(req).await
    }

    /// Run a stream until `cancel` fires or its instance is disposed
    ///
    /// The instance handle is released before the loop starts, so a settings
    /// change can replace it while the session is still running.
    pub async fn run_stream<S>(
        &self,
        req: RunStreamRequest,
        cancel: CancellationToken,
        sender: &S,
    ) -> Result<()>
    where
        S: StreamPacketSender + ?Sized,
    {
        let session = {
            let instance = self.instances.get(&req.plugin_context)?;
            instance.open_stream(&req)?
        };
        debug!("Running stream {} for plugin {}", session.path(), self.plugin_id);
        session.run(cancel, sender).await
    }
}
