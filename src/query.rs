//! Query model and batch orchestration
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::channel::Channel;
use crate::context::PluginContext;
use crate::error::{DatasourceError, Result};
use crate::frame::{Frame, FrameMeta, response_frame};

/// Requested time window of a query
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// One query of a batch
#[derive(Debug, Clone)]
pub struct DataQuery {
    /// Unique within the batch, keys the response
    pub ref_id: String,
    pub query_type: String,
    /// Raw JSON parameters from the query editor
    pub json: String,
    pub time_range: TimeRange,
}

impl DataQuery {
    pub fn new(ref_id: impl Into<String>, json: impl Into<String>, time_range: TimeRange) -> Self {
        Self {
            ref_id: ref_id.into(),
            query_type: String::new(),
            json: json.into(),
            time_range,
        }
    }
}

/// Parameters understood by this datasource
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryModel {
    /// Ask for a live channel to be attached to the result
    #[serde(default)]
    pub with_streaming: bool,
    #[serde(default)]
    pub format: String,
}

impl QueryModel {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A batch of queries sharing one plugin context
#[derive(Debug, Clone)]
pub struct QueryDataRequest {
    pub plugin_context: PluginContext,
    pub queries: Vec<DataQuery>,
}

/// Result of a single query: frames, or an error message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataResponse {
    pub frames: Vec<Frame>,
    pub error: Option<String>,
}

impl DataResponse {
    pub fn frames(frames: Vec<Frame>) -> Self {
        Self {
            frames,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            frames: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Responses keyed by query ref id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryDataResponse {
    pub responses: BTreeMap<String, DataResponse>,
}

impl QueryDataResponse {
    pub fn get(&self, ref_id: &str) -> Option<&DataResponse> {
        self.responses.get(ref_id)
    }
}

/// How a failing query affects the rest of its batch
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchErrorPolicy {
    /// Record the error for that query and keep going
    #[default]
    Isolate,
    /// Fail the whole request on the first error
    AbortBatch,
}

/// Knobs for query handling
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub batch_policy: BatchErrorPolicy,
    pub require_format: bool,
}

/// Handler for batched data queries
#[async_trait]
pub trait QueryDataHandler: Send + Sync {
    async fn query_data(&self, req: QueryDataRequest) -> Result<QueryDataResponse>;
}

/// Run `handle` once per query and collect the results by ref id
pub fn execute_batch<F>(
    queries: &[DataQuery],
    policy: BatchErrorPolicy,
    mut handle: F,
) -> Result<QueryDataResponse>
where
    F: FnMut(&DataQuery) -> Result<Vec<Frame>>,
{
    let mut response = QueryDataResponse::default();

    for query in queries {
        let result = match handle(query) {
            Ok(frames) => DataResponse::frames(frames),
            Err(e) => match policy {
                BatchErrorPolicy::Isolate => {
                    debug!("Query {} failed: {}", query.ref_id, e);
                    DataResponse::error(e.to_string())
                }
                BatchErrorPolicy::AbortBatch => {
                    return Err(DatasourceError::Query(format!(
                        "query {} failed: {}",
                        query.ref_id, e
                    )));
                }
            },
        };

        if response.responses.insert(query.ref_id.clone(), result).is_some() {
            warn!("Duplicate query ref id {}, keeping the last result", query.ref_id);
        }
    }

    Ok(response)
}

/// Build the frames for one query
///
/// When streaming is requested the frame is annotated with `channel`.
pub fn build_frames(query: &DataQuery, options: &QueryOptions, channel: &Channel) -> Result<Vec<Frame>> {
    let model = QueryModel::parse(&query.json)?;

    if options.require_format && model.format.is_empty() {
        return Err(DatasourceError::Query("format cannot be empty".to_string()));
    }

    let mut frame = response_frame(&query.time_range);
    if model.with_streaming {
        frame.set_meta(FrameMeta {
            channel: Some(channel.to_string()),
        });
    }

    Ok(vec![frame])
}
