//! Contracts between the host and a streaming datasource
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::session::StreamSession;
use crate::context::PluginContext;
use crate::error::Result;

/// Outcome of a subscribe request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStreamStatus {
    Ok,
    NotFound,
    PermissionDenied,
}

#[derive(Debug, Clone)]
pub struct SubscribeStreamRequest {
    pub plugin_context: PluginContext,
    /// Channel path within the datasource namespace
    pub path: String,
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeStreamResponse {
    pub status: SubscribeStreamStatus,
    /// Ask the host to open a run stream while subscribers exist
    pub use_run_stream: bool,
    pub initial_data: Option<Vec<u8>>,
}

impl SubscribeStreamResponse {
    /// Accept and request a run loop
    pub fn accept() -> Self {
        Self {
            status: SubscribeStreamStatus::Ok,
            use_run_stream: true,
            initial_data: None,
        }
    }

    /// Accept without a run loop, e.g. for publish-only channels
    pub fn accept_without_stream() -> Self {
        Self {
            use_run_stream: false,
            ..Self::accept()
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: SubscribeStreamStatus::NotFound,
            use_run_stream: false,
            initial_data: None,
        }
    }

    pub fn permission_denied() -> Self {
        Self {
            status: SubscribeStreamStatus::PermissionDenied,
            ..Self::not_found()
        }
    }

    pub fn with_initial_data(mut self, data: Vec<u8>) -> Self {
        self.initial_data = Some(data);
        self
    }
}

/// Outcome of a publish request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStreamStatus {
    Ok,
    NotFound,
    PermissionDenied,
}

#[derive(Debug, Clone)]
pub struct PublishStreamRequest {
    pub plugin_context: PluginContext,
    pub path: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishStreamResponse {
    pub status: PublishStreamStatus,
    pub data: Option<Vec<u8>>,
}

impl From<PublishStreamStatus> for PublishStreamResponse {
    fn from(status: PublishStreamStatus) -> Self {
        Self { status, data: None }
    }
}

/// Decides whether externally published data is accepted
pub trait PublishAuthorizer: Send + Sync + 'static {
    fn authorize(&self, req: &PublishStreamRequest) -> PublishStreamStatus;
}

/// Rejects every publish request
pub struct DenyPublish;

impl PublishAuthorizer for DenyPublish {
    fn authorize(&self, _req: &PublishStreamRequest) -> PublishStreamStatus {
        PublishStreamStatus::PermissionDenied
    }
}

impl<F> PublishAuthorizer for F
where
    F: Fn(&PublishStreamRequest) -> PublishStreamStatus + Send + Sync + 'static,
{
    fn authorize(&self, req: &PublishStreamRequest) -> PublishStreamStatus {
        self(req)
    }
}

#[derive(Debug, Clone)]
pub struct RunStreamRequest {
    pub plugin_context: PluginContext,
    pub path: String,
    pub data: Option<Vec<u8>>,
}

/// One serialized frame pushed to subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct StreamPacket {
    pub data: Vec<u8>,
}

/// Downstream end of a run stream
#[async_trait]
pub trait StreamPacketSender: Send + Sync {
    async fn send(&self, packet: StreamPacket) -> Result<()>;
}

#[async_trait]
impl StreamPacketSender for mpsc::Sender<StreamPacket> {
    async fn send(&self, packet: StreamPacket) -> Result<()> {
        mpsc::Sender::send(self, packet).await?;
        Ok(())
    }
}

/// Handler for live subscriptions
#[async_trait]
pub trait StreamHandler: Send + Sync {
    /// Decide whether a client may subscribe to a channel path
    async fn subscribe_stream(&self, req: SubscribeStreamRequest) -> Result<SubscribeStreamResponse>;

    /// Handle data pushed by a client
    async fn publish_stream(&self, req: PublishStreamRequest) -> Result<PublishStreamResponse>;

    /// Prepare the session backing a run stream
    ///
    /// The session only borrows the instance's disposal signal, so the
    /// caller can drop the instance before running it.
    fn open_stream(&self, req: &RunStreamRequest) -> Result<StreamSession>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish_request() -> PublishStreamRequest {
        PublishStreamRequest {
            plugin_context: PluginContext::default(),
            path: "stream".to_string(),
            data: b"{}".to_vec(),
        }
    }

    #[test]
    fn test_subscribe_response_variants() {
        let accepted = SubscribeStreamResponse::accept();
        assert_eq!(accepted.status, SubscribeStreamStatus::Ok);
        assert!(accepted.use_run_stream);

        let passive = SubscribeStreamResponse::accept_without_stream();
        assert_eq!(passive.status, SubscribeStreamStatus::Ok);
        assert!(!passive.use_run_stream);

        assert_eq!(
            SubscribeStreamResponse::not_found().status,
            SubscribeStreamStatus::NotFound
        );
        let denied = SubscribeStreamResponse::permission_denied();
        assert_eq!(denied.status, SubscribeStreamStatus::PermissionDenied);
        assert!(!denied.use_run_stream);
    }

    #[test]
    fn test_authorizers() {
        assert_eq!(
            DenyPublish.authorize(&publish_request()),
            PublishStreamStatus::PermissionDenied
        );

        let by_path = |req: &PublishStreamRequest| {
            if req.path == "stream" {
                PublishStreamStatus::Ok
            } else {
                PublishStreamStatus::NotFound
            }
        };
        assert_eq!(by_path.authorize(&publish_request()), PublishStreamStatus::Ok);
    }

    #[tokio::test]
    async fn test_channel_sender_reports_closed_receiver() {
        let (tx, rx) = mpsc::channel::<StreamPacket>(1);
        drop(rx);
        let packet = StreamPacket { data: vec![1] };
        assert!(StreamPacketSender::send(&tx, packet).await.is_err());
    }
}
