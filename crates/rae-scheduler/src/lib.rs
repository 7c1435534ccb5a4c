//! RAE Scheduler - adaptive stage scheduling
//!
//! Turns a task into a supervised pipeline run:
//! - [`SystemProbe`] and [`ResourceAllocator`] derive concurrency limits from the host
//! - [`TaskComplexityClassifier`] scores the task and extracts routing signals
//! - [`StageSelector`] filters the stage catalog into an [`ExecutionPlan`]
//! - [`PipelineScheduler`] runs the plan through breakers, retries and two-pass execution
//!
//! # Example
//!
//! ```rust,ignore
//! use rae_scheduler::{PipelineScheduler, SystemProbe, Task};
//!
//! let scheduler = PipelineScheduler::new(executor, Arc::new(SystemProbe), EngineConfig::default())?;
//! let report = scheduler.run(&Task::new("t-1", "Add login page", "")).await;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod allocator;
pub mod catalog;
pub mod complexity;
pub mod platform;
pub mod scheduler;
pub mod selector;
pub mod simulate;
pub mod supervision;

pub use allocator::{ResourceAllocation, ResourceAllocator, MAX_PARALLEL_STAGES};
pub use catalog::{StageCost, StageKind};
pub use complexity::{developers_for, Complexity, Task, TaskComplexityClassifier, TaskSignals};
pub use platform::SystemProbe;
pub use scheduler::{PipelineScheduler, StageOutcome, StagePolicy, TaskReport};
pub use selector::{ExecutionPlan, Requirement, StageDecision, StageSelector};
pub use simulate::SimulatedExecutor;
pub use supervision::{supervise, Supervision};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
