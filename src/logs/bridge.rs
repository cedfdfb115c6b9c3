//! Adapts the engine's push-style log feed to the two consumption modes.
//!
//! - **Bounded**: collect the last N lines and return them once the engine
//!   closes the stream.
//! - **Following**: forward each line to one connection until the client
//!   leaves or the engine ends the stream.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::engine::{ContainerEngine, LogFrame, LogTail};
use crate::error::EngineError;
use crate::metrics::MetricsCollector;

use super::registry::{ConnectionId, StreamAttachment, StreamEvent, StreamRegistry};

/// Buffered events per following connection before the forwarder waits.
const FOLLOW_CHANNEL_CAPACITY: usize = 256;

/// Splits a frame into trimmed, non-blank lines.
pub fn frame_lines(frame: &LogFrame) -> Vec<String> {
    frame
        .text()
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Bridge between the engine log API and log consumers.
#[derive(Clone)]
pub struct LogBridge {
    engine: Arc<dyn ContainerEngine>,
    registry: StreamRegistry,
    metrics: MetricsCollector,
}

impl LogBridge {
    pub fn new(engine: Arc<dyn ContainerEngine>, registry: StreamRegistry) -> Self {
        Self {
            engine,
            registry,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    /// Reads at most `line_count` recent lines, in emission order.
    ///
    /// A collector task drains the engine stream and hands the result back
    /// through a oneshot; an engine error mid-stream fails the whole read.
    pub async fn tail(&self, engine_id: &str, line_count: usize) -> Result<Vec<String>, EngineError> {
        if line_count == 0 {
            return Ok(Vec::new());
        }

        let mut stream = self
            .engine
            .stream_logs(engine_id, LogTail::Lines(line_count), false);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut lines = VecDeque::with_capacity(line_count);
            let mut outcome = Ok(());

            while let Some(item) = stream.next().await {
                match item {
                    Ok(frame) => {
                        for line in frame_lines(&frame) {
                            if lines.len() == line_count {
                                lines.pop_front();
                            }
                            lines.push_back(line);
                        }
                    }
                    Err(e) => {
                        outcome = Err(e);
                        break;
                    }
                }
            }

            let _ = done_tx.send(outcome.map(|()| Vec::from(lines)));
        });

        done_rx
            .await
            .map_err(|_| EngineError::LogStream("log collector ended without a result".into()))?
    }

    /// Attaches a following stream for one connection.
    ///
    /// The stream stays attached until the returned subscription is dropped
    /// or the engine ends it.
    pub fn follow(&self, engine_id: &str) -> LogSubscription {
        let connection = ConnectionId::new();
        let (tx, rx) = mpsc::channel(FOLLOW_CHANNEL_CAPACITY);
        let mut stream = self.engine.stream_logs(engine_id, LogTail::All, true);
        let metrics = self.metrics.clone();
        let engine_label = engine_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(frame) => {
                        for line in frame_lines(&frame) {
                            if tx.send(StreamEvent::Line(line)).await.is_err() {
                                debug!(connection = %connection, "Log receiver gone");
                                return;
                            }
                            metrics.record_log_line();
                        }
                    }
                    Err(e) => {
                        warn!(
                            connection = %connection,
                            engine_id = %engine_label,
                            error = %e,
                            "Log stream failed"
                        );
                        let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                        return;
                    }
                }
            }

            let _ = tx.send(StreamEvent::Complete).await;
        });

        self.registry
            .register(connection, engine_id, task.abort_handle());

        LogSubscription {
            attachment: StreamAttachment::new(connection, self.registry.clone()),
            events: rx,
        }
    }
}

/// One connection's following stream: its registry guard plus the event feed.
pub struct LogSubscription {
    attachment: StreamAttachment,
    events: mpsc::Receiver<StreamEvent>,
}

impl LogSubscription {
    pub fn id(&self) -> ConnectionId {
        self.attachment.id()
    }

    /// Next event, or `None` once the forwarder is gone.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Unregisters the stream and stops forwarding.
    pub fn close(self) {
        self.attachment.detach();
    }
}
