use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::config::{SendFailurePolicy, StreamConfig};
use super::core::{StreamPacket, StreamPacketSender};
use crate::error::{DatasourceError, Result};
use crate::frame::{Frame, LOW_VALUE, stream_frame};

/// One live subscription: a loop pushing a fresh frame every interval
///
/// The loop ends when the caller's token is cancelled (clean stop), when the
/// owning instance is disposed ([`DatasourceError::Closed`]), or when the
/// send failure policy gives up ([`DatasourceError::DeliveryFailed`]).
pub struct StreamSession {
    path: String,
    config: StreamConfig,
    closed: CancellationToken,
    frame: Frame,
    ticks: u64,
}

impl StreamSession {
    /// Create a session bound to the owning instance's disposal token
    pub fn new(path: impl Into<String>, config: StreamConfig, closed: CancellationToken) -> Self {
        Self {
            path: path.into(),
            config,
            closed,
            frame: stream_frame(),
            ticks: 0,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Number of ticks produced so far
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Refresh the frame for the next tick and serialize it
    fn next_packet(&mut self) -> Result<StreamPacket> {
        let value = LOW_VALUE * ((self.ticks % 2) as i64 + 1);
        self.ticks += 1;

        self.frame.field_mut(0)?.set_time(0, Utc::now())?;
        self.frame.field_mut(1)?.set_int64(0, value)?;

        Ok(StreamPacket {
            data: self.frame.to_json()?,
        })
    }

    /// Resolves once the session has been told to stop
    async fn stopped(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(()),
            _ = self.closed.cancelled() => Err(DatasourceError::Closed),
        }
    }

    fn finish(&self, outcome: Result<()>) -> Result<()> {
        match &outcome {
            Ok(()) => info!(
                "Stream on {} cancelled after {} ticks",
                self.path, self.ticks
            ),
            Err(e) => info!("Stream on {} terminated after {} ticks: {}", self.path, self.ticks, e),
        }
        outcome
    }

    /// Run the production loop until cancelled, disposed or given up
    pub async fn run<S>(mut self, cancel: CancellationToken, sender: &S) -> Result<()>
    where
        S: StreamPacketSender + ?Sized,
    {
        let interval = self.config.interval;
        if interval.is_zero() {
            error!("Stream on {} has a zero interval, not starting", self.path);
            return Err(DatasourceError::Config(
                "stream interval must be positive".to_string(),
            ));
        }
        info!("Stream on {} started (interval {:?})", self.path, interval);

        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_failures = 0usize;

        loop {
            tokio::select! {
                biased;
                outcome = self.stopped(&cancel) => return self.finish(outcome),
                _ = ticker.tick() => {}
            }

            let packet = match self.next_packet() {
                Ok(packet) => packet,
                Err(e) => {
                    error!("Error marshaling frame on {}: {}", self.path, e);
                    continue;
                }
            };

            // A blocked sender must not delay cancellation
            let sent = tokio::select! {
                biased;
                outcome = self.stopped(&cancel) => return self.finish(outcome),
                sent = sender.send(packet) => sent,
            };

            match sent {
                Ok(()) => {
                    consecutive_failures = 0;
                    debug!("Sent tick {} on {}", self.ticks, self.path);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        "Error sending frame on {} ({} consecutive failures): {}",
                        self.path, consecutive_failures, e
                    );

                    if let SendFailurePolicy::GiveUpAfter(max) = self.config.send_failure {
                        if consecutive_failures >= max {
                            error!(
                                "Giving up on stream {} after {} failed sends",
                                self.path, consecutive_failures
                            );
                            return self.finish(Err(DatasourceError::DeliveryFailed {
                                attempts: consecutive_failures,
                                reason: e.to_string(),
                            }));
                        }
                    }
                }
            }
        }
    }
}
