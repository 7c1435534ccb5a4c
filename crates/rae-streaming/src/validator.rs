//! Early-stop validator for streamed output
//!
//! Chunks are appended to a buffer; every `interval` chunks the text added
//! since the last pass is scanned line by line. Complete lines are scanned
//! once. The pending partial line is scanned on every pass up to its last
//! delimiter, so a stream without newlines still stops early.
//! `finish()` scans the trailing partial line in full. The first offending
//! line stops the stream, so an earlier violation always wins.

use crate::checks::{CheckSet, Violation};
use chrono::{DateTime, Utc};
use rae_core::{EngineError, EventKind, EventSink, NullSink, StreamingConfig};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Answer to one chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkDecision {
    /// False once the stream must be abandoned
    pub should_continue: bool,
    /// Why the stream was stopped
    pub reason: Option<String>,
}

impl ChunkDecision {
    fn proceed() -> Self {
        Self {
            should_continue: true,
            reason: None,
        }
    }

    fn stop(reason: impl Into<String>) -> Self {
        Self {
            should_continue: false,
            reason: Some(reason.into()),
        }
    }
}

/// Recorded early stop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopEvent {
    /// When the stop was decided
    pub timestamp: DateTime<Utc>,
    /// Same text as the stopping `ChunkDecision::reason`
    pub reason: String,
    /// Chunks received up to and including the stopping one
    pub chunk_count: u64,
    /// Last few characters of the buffer at stop time
    pub tail: String,
    /// Check that fired
    pub violation: Violation,
}

/// Periodic validation point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamingCheckpoint {
    /// Bytes of buffer covered by this pass
    pub buffer_len: usize,
    /// Chunks received when the pass ran
    pub chunk_count: u64,
    /// When the pass ran
    pub checked_at: DateTime<Utc>,
}

/// Counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Chunks received since the last reset
    pub chunk_count: u64,
    /// Validation passes run since the last reset
    pub check_count: u64,
    /// Stop events recorded across resets
    pub stop_events: usize,
}

/// Chunk-level validator with early termination
pub struct StreamingValidator {
    checks: CheckSet,
    interval: u64,
    tail_chars: usize,
    buffer: String,
    scanned: usize,
    chunk_count: u64,
    check_count: u64,
    last_checkpoint: Option<StreamingCheckpoint>,
    stopped: Option<String>,
    journal: Vec<StopEvent>,
    sink: Arc<dyn EventSink>,
}

impl StreamingValidator {
    /// Create validator
    ///
    /// # Errors
    /// `EngineError::Configuration` for a zero interval.
    pub fn new(config: &StreamingConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            checks: CheckSet {
                placeholders: config.check_placeholders,
                forbidden: config.check_forbidden,
                allowed_modules: config.allowed_modules.clone(),
            },
            interval: config.interval() as u64,
            tail_chars: config.tail_chars,
            buffer: String::new(),
            scanned: 0,
            chunk_count: 0,
            check_count: 0,
            last_checkpoint: None,
            stopped: None,
            journal: Vec::new(),
            sink: Arc::new(NullSink),
        })
    }

    /// With event sink
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Feed one chunk
    pub fn on_chunk(&mut self, chunk: &str) -> ChunkDecision {
        if let Some(reason) = &self.stopped {
            return ChunkDecision::stop(reason.clone());
        }

        self.buffer.push_str(chunk);
        self.chunk_count += 1;

        if self.chunk_count % self.interval == 0 {
            self.validate_pass(false)
        } else {
            ChunkDecision::proceed()
        }
    }

    /// Validate whatever has not been scanned yet, including a partial last line
    pub fn finish(&mut self) -> ChunkDecision {
        if let Some(reason) = &self.stopped {
            return ChunkDecision::stop(reason.clone());
        }
        self.validate_pass(true)
    }

    /// Clear buffer and counters; the stop journal is kept
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
        self.chunk_count = 0;
        self.check_count = 0;
        self.last_checkpoint = None;
        self.stopped = None;
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            chunk_count: self.chunk_count,
            check_count: self.check_count,
            stop_events: self.journal.len(),
        }
    }

    /// Every stop recorded since construction
    #[must_use]
    pub fn stop_events(&self) -> &[StopEvent] {
        &self.journal
    }

    /// Last validation point
    #[must_use]
    pub fn last_checkpoint(&self) -> Option<&StreamingCheckpoint> {
        self.last_checkpoint.as_ref()
    }

    /// Accumulated text
    #[must_use]
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether the stream has been stopped
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.is_some()
    }

    fn validate_pass(&mut self, final_pass: bool) -> ChunkDecision {
        let started = Instant::now();
        self.check_count += 1;

        let pending = &self.buffer[self.scanned..];
        let end = if final_pass {
            pending.len()
        } else {
            pending.rfind('\n').map_or(0, |i| i + 1)
        };

        let violation = pending[..end]
            .lines()
            .find_map(|line| self.checks.check_line(line))
            .or_else(|| {
                if final_pass {
                    return None;
                }
                // Partial line up to its last delimiter, so every match is final.
                // Rescanned on later passes until its newline arrives.
                let partial = pending[end..].trim_end_matches(|c: char| {
                    c.is_alphanumeric() || c.is_whitespace() || matches!(c, '_' | '.' | ':' | '…')
                });
                self.checks.check_line(partial)
            });
        self.scanned += end;
        self.last_checkpoint = Some(StreamingCheckpoint {
            buffer_len: self.scanned,
            chunk_count: self.chunk_count,
            checked_at: Utc::now(),
        });

        tracing::trace!(
            chunk_count = self.chunk_count,
            scanned = end,
            elapsed_us = started.elapsed().as_micros() as u64,
            "streaming check"
        );

        match violation {
            None => ChunkDecision::proceed(),
            Some(violation) => self.stop(violation),
        }
    }

    fn stop(&mut self, violation: Violation) -> ChunkDecision {
        let reason = violation.reason();
        let event = StopEvent {
            timestamp: Utc::now(),
            reason: reason.clone(),
            chunk_count: self.chunk_count,
            tail: tail(&self.buffer, self.tail_chars),
            violation,
        };

        tracing::info!(chunk_count = self.chunk_count, reason = %reason, "stream stopped early");
        self.sink.record(EventKind::StreamStopped {
            reason: reason.clone(),
            chunk_count: self.chunk_count,
        });

        self.journal.push(event);
        self.stopped = Some(reason.clone());
        ChunkDecision::stop(reason)
    }
}

impl std::fmt::Debug for StreamingValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingValidator")
            .field("interval", &self.interval)
            .field("chunk_count", &self.chunk_count)
            .field("stopped", &self.stopped)
            .finish_non_exhaustive()
    }
}

fn tail(text: &str, chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(chars)).collect()
}
