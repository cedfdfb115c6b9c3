//! Registry of attached following-mode log streams.
//!
//! Each websocket connection owns at most one attachment, keyed by its
//! [`ConnectionId`]. The attachment guard removes its entry and aborts the
//! forwarding task when dropped, which in turn drops the engine subscription.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

use crate::metrics::MetricsCollector;

/// Identity of one streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a forwarder delivers to its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One trimmed, non-blank log line.
    Line(String),
    /// The engine ended the stream.
    Complete,
    /// The engine stream failed.
    Error(String),
}

struct StreamEntry {
    engine_id: String,
    abort: AbortHandle,
    attached_at: DateTime<Utc>,
}

/// Live log stream attachments, shared across connections.
#[derive(Clone, Default)]
pub struct StreamRegistry {
    entries: Arc<Mutex<HashMap<ConnectionId, StreamEntry>>>,
    metrics: MetricsCollector,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a forwarder for `id`. A previous attachment under the same id
    /// is aborted and replaced.
    pub(crate) fn register(&self, id: ConnectionId, engine_id: &str, abort: AbortHandle) {
        let previous = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.insert(
                id,
                StreamEntry {
                    engine_id: engine_id.to_string(),
                    abort,
                    attached_at: Utc::now(),
                },
            )
        };

        match previous {
            Some(old) => old.abort.abort(),
            None => self.metrics.inc_log_streams(),
        }
        debug!(connection = %id, engine_id = %engine_id, "Log stream attached");
    }

    /// Removes and aborts the attachment for `id`. Returns false if none existed.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);

        match removed {
            Some(entry) => {
                entry.abort.abort();
                self.metrics.dec_log_streams();
                debug!(
                    connection = %id,
                    engine_id = %entry.engine_id,
                    attached_secs = (Utc::now() - entry.attached_at).num_seconds(),
                    "Log stream detached"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self, id: ConnectionId) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// Number of connections following the given engine container.
    pub fn viewers_of(&self, engine_id: &str) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|entry| entry.engine_id == engine_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scoped ownership of one registered stream.
///
/// Dropping the guard (or calling [`StreamAttachment::detach`]) unregisters
/// the connection and stops its forwarder.
pub struct StreamAttachment {
    id: ConnectionId,
    registry: StreamRegistry,
}

impl StreamAttachment {
    pub(crate) fn new(id: ConnectionId, registry: StreamRegistry) -> Self {
        Self { id, registry }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn detach(self) {}
}

impl Drop for StreamAttachment {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
