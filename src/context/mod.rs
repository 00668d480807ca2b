use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DatasourceError, Result};

/// Settings of one configured datasource, as supplied by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceInstanceSettings {
    /// Numeric datasource id, also the stream channel namespace
    pub id: i64,
    pub uid: String,
    pub name: String,
    /// Opaque, plugin-specific JSON settings
    #[serde(default)]
    pub json_data: serde_json::Value,
    /// Changes whenever the user saves the datasource
    pub updated: DateTime<Utc>,
}

impl DataSourceInstanceSettings {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            uid: format!("ds-{}", id),
            name: name.into(),
            json_data: serde_json::Value::Object(Default::default()),
            updated: Utc::now(),
        }
    }

    pub fn with_json_data(mut self, json_data: serde_json::Value) -> Self {
        self.json_data = json_data;
        self
    }

    pub fn with_updated(mut self, updated: DateTime<Utc>) -> Self {
        self.updated = updated;
        self
    }
}

/// Identity of the caller attached to every inbound request
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    pub org_id: i64,
    pub plugin_id: String,
    #[serde(default)]
    pub datasource_instance_settings: Option<DataSourceInstanceSettings>,
}

impl PluginContext {
    pub fn for_datasource(plugin_id: impl Into<String>, settings: DataSourceInstanceSettings) -> Self {
        Self {
            org_id: 1,
            plugin_id: plugin_id.into(),
            datasource_instance_settings: Some(settings),
        }
    }

    /// The datasource settings, required by every datasource request
    pub fn settings(&self) -> Result<&DataSourceInstanceSettings> {
        self.datasource_instance_settings.as_ref().ok_or_else(|| {
            DatasourceError::Instance(format!(
                "plugin context for '{}' carries no datasource settings",
                self.plugin_id
            ))
        })
    }
}
