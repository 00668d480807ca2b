//! Backend for a dashboard datasource plugin: time-series queries, health
//! checks and a periodic live stream pushed to subscribed clients

pub mod channel;
pub mod config;
pub mod context;
pub mod datasource;
pub mod error;
pub mod frame;
pub mod health;
pub mod instance;
pub mod plugin;
pub mod query;
pub mod stream;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::channel::{Channel, Scope};
    pub use crate::config::{ConfigBuilder, PluginConfig};
    pub use crate::context::{DataSourceInstanceSettings, PluginContext};
    pub use crate::datasource::{DatasourceDefaults, SampleDatasource};
    pub use crate::error::{DatasourceError, Result};
    pub use crate::frame::{Field, FieldValues, Frame};
    pub use crate::health::{CheckHealthRequest, HealthProbe, HealthStatus};
    pub use crate::instance::{Instance, InstanceManager};
    pub use crate::plugin::Plugin;
    pub use crate::query::{DataQuery, QueryDataRequest, TimeRange};
    pub use crate::stream::{
        PublishStreamRequest, RunStreamRequest, SendFailurePolicy, StreamConfig, StreamPacket,
        StreamPacketSender, StreamSession, SubscribeStreamRequest,
    };
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
