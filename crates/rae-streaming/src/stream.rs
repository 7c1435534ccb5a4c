//! Driving a chunk stream through the validator

use crate::validator::{ChunkDecision, StreamingValidator};
use futures::{Stream, StreamExt};
use serde::Serialize;

/// Result of consuming a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamOutcome {
    /// Text accepted before the stream ended or was stopped
    pub text: String,
    /// Chunks pulled from the stream
    pub chunks: u64,
    /// Final decision (after `finish()` when the stream ran out)
    pub decision: ChunkDecision,
}

impl StreamOutcome {
    #[inline]
    #[must_use]
    pub fn completed(&self) -> bool {
        self.decision.should_continue
    }
}

/// Pull chunks until the stream ends or a chunk is rejected
///
/// The stream is not polled again after a rejection.
pub async fn consume_stream<S, C>(stream: S, validator: &mut StreamingValidator) -> StreamOutcome
where
    S: Stream<Item = C>,
    C: AsRef<str>,
{
    futures::pin_mut!(stream);
    let mut chunks = 0u64;

    while let Some(chunk) = stream.next().await {
        chunks += 1;
        let decision = validator.on_chunk(chunk.as_ref());
        if !decision.should_continue {
            return StreamOutcome {
                text: validator.buffer().to_string(),
                chunks,
                decision,
            };
        }
    }

    let decision = validator.finish();
    StreamOutcome {
        text: validator.buffer().to_string(),
        chunks,
        decision,
    }
}
