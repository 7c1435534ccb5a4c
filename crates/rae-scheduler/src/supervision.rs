//! Heartbeat supervision for running stages
//!
//! A stage collaborator reports nothing while it works, so every heartbeat
//! tick without completion counts as silent. After `stall_after` silent beats
//! one `StageStalled` event is emitted; the stage keeps running.

use rae_core::{EventKind, EventSink};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Heartbeat settings for one stage run
#[derive(Clone)]
pub struct Supervision {
    pub task_id: String,
    pub stage: String,
    pub heartbeat: Duration,
    /// Zero disables stall reporting
    pub stall_after: u32,
    pub sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Supervision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervision")
            .field("task_id", &self.task_id)
            .field("stage", &self.stage)
            .field("heartbeat", &self.heartbeat)
            .field("stall_after", &self.stall_after)
            .finish_non_exhaustive()
    }
}

/// Drive `fut` to completion, emitting heartbeats while it runs
pub async fn supervise<F: Future>(fut: F, supervision: &Supervision) -> F::Output {
    let started = Instant::now();
    let period = supervision.heartbeat.max(Duration::from_millis(1));
    let mut ticker = interval_at(started + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(fut);
    let mut beats: u32 = 0;

    loop {
        tokio::select! {
            biased;
            output = &mut fut => return output,
            _ = ticker.tick() => {
                beats += 1;
                let elapsed_secs = started.elapsed().as_secs();
                tracing::debug!(
                    task = %supervision.task_id,
                    stage = %supervision.stage,
                    beats,
                    elapsed_secs,
                    "stage heartbeat"
                );
                supervision.sink.record(EventKind::StageHeartbeat {
                    task_id: supervision.task_id.clone(),
                    stage: supervision.stage.clone(),
                    beats,
                    elapsed_secs,
                });

                if supervision.stall_after > 0 && beats == supervision.stall_after {
                    tracing::warn!(
                        task = %supervision.task_id,
                        stage = %supervision.stage,
                        elapsed_secs,
                        "stage stalled"
                    );
                    supervision.sink.record(EventKind::StageStalled {
                        task_id: supervision.task_id.clone(),
                        stage: supervision.stage.clone(),
                        elapsed_secs,
                    });
                }
            }
        }
    }
}
