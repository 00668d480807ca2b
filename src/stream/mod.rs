mod config;
mod core;
mod session;

// Re-export public items
pub use config::{SendFailurePolicy, StreamConfig, StreamConfigBuilder};
pub use core::{
    DenyPublish, PublishAuthorizer, PublishStreamRequest, PublishStreamResponse,
    PublishStreamStatus, RunStreamRequest, StreamHandler, StreamPacket, StreamPacketSender,
    SubscribeStreamRequest, SubscribeStreamResponse, SubscribeStreamStatus,
};
pub use session::StreamSession;
