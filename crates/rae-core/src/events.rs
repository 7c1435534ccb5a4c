//! Structured engine events
//!
//! Components never write logs or files for observability directly; they emit
//! [`EngineEvent`]s to an injected [`EventSink`]. [`TracingSink`] turns events
//! into `tracing` records, [`RecordingSink`] keeps them in memory.

use crate::types::{ExecutionId, SessionId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Event payloads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    StageStarted {
        task_id: String,
        stage: String,
    },
    StageCompleted {
        task_id: String,
        stage: String,
        duration_ms: u64,
    },
    StageFailed {
        task_id: String,
        stage: String,
        error: String,
        required: bool,
    },
    StageSkipped {
        task_id: String,
        stage: String,
        reason: String,
    },
    StageHeartbeat {
        task_id: String,
        stage: String,
        beats: u32,
        elapsed_secs: u64,
    },
    StageStalled {
        task_id: String,
        stage: String,
        elapsed_secs: u64,
    },
    BreakerOpened {
        resource: String,
        failure_count: u32,
    },
    BreakerHalfOpen {
        resource: String,
    },
    BreakerClosed {
        resource: String,
    },
    RetryAttempted {
        session_id: SessionId,
        attempt: u32,
        confidence: f64,
        succeeded: bool,
    },
    MementoCreated {
        execution_id: ExecutionId,
        learnings: usize,
    },
    PassCompleted {
        execution_id: ExecutionId,
        pass: String,
        quality: f64,
        success: bool,
    },
    RollbackPerformed {
        execution_id: ExecutionId,
        reason: String,
        quality_delta: f64,
    },
    StreamStopped {
        reason: String,
        chunk_count: u64,
    },
}

impl EventKind {
    /// Short event name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::StageStarted { .. } => "StageStarted",
            Self::StageCompleted { .. } => "StageCompleted",
            Self::StageFailed { .. } => "StageFailed",
            Self::StageSkipped { .. } => "StageSkipped",
            Self::StageHeartbeat { .. } => "StageHeartbeat",
            Self::StageStalled { .. } => "StageStalled",
            Self::BreakerOpened { .. } => "BreakerOpened",
            Self::BreakerHalfOpen { .. } => "BreakerHalfOpen",
            Self::BreakerClosed { .. } => "BreakerClosed",
            Self::RetryAttempted { .. } => "RetryAttempted",
            Self::MementoCreated { .. } => "MementoCreated",
            Self::PassCompleted { .. } => "PassCompleted",
            Self::RollbackPerformed { .. } => "RollbackPerformed",
            Self::StreamStopped { .. } => "StreamStopped",
        }
    }
}

/// Timestamped event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineEvent {
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
    /// Payload
    #[serde(flatten)]
    pub kind: EventKind,
}

impl EngineEvent {
    /// Stamp an event with the current time
    #[inline]
    #[must_use]
    pub fn now(kind: EventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Observer collaborator receiving engine events
pub trait EventSink: Send + Sync {
    /// Receive one event
    fn emit(&self, event: EngineEvent);

    /// Stamp and emit
    fn record(&self, kind: EventKind) {
        self.emit(EngineEvent::now(kind));
    }
}

/// Drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Forwards events to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        let name = event.kind.name();
        match &event.kind {
            EventKind::StageFailed { task_id, stage, error, required } => {
                tracing::warn!(event = name, task_id = %task_id, stage = %stage, required, error = %error);
            }
            EventKind::StageStalled { task_id, stage, elapsed_secs } => {
                tracing::warn!(event = name, task_id = %task_id, stage = %stage, elapsed_secs);
            }
            EventKind::BreakerOpened { resource, failure_count } => {
                tracing::warn!(event = name, resource = %resource, failure_count);
            }
            EventKind::RollbackPerformed { execution_id, reason, quality_delta } => {
                tracing::warn!(event = name, execution_id = %execution_id, quality_delta, reason = %reason);
            }
            EventKind::StreamStopped { reason, chunk_count } => {
                tracing::info!(event = name, chunk_count, reason = %reason);
            }
            EventKind::StageHeartbeat { task_id, stage, beats, elapsed_secs } => {
                tracing::debug!(event = name, task_id = %task_id, stage = %stage, beats, elapsed_secs);
            }
            other => {
                tracing::info!(event = name, detail = ?other);
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    inner: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    /// Create empty recorder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    #[must_use]
    pub fn events(&self) -> Vec<EngineEvent> {
        self.inner.lock().clone()
    }

    /// Names of recorded events, in emission order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.inner.lock().iter().map(|e| e.kind.name()).collect()
    }

    /// Count events with the given name
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.inner.lock().iter().filter(|e| e.kind.name() == name).count()
    }

    /// Drop recorded events
    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.inner.lock().push(event);
    }
}

/// Forwards every event to several sinks
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    /// Create empty fanout
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink
    #[inline]
    #[must_use]
    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: EngineEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
