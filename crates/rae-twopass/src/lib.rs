//! RAE Two-Pass - memento-based two-pass execution with rollback
//!
//! A quick first pass explores; its learnings are captured in a
//! [`PassMemento`] and folded into a thorough second pass. If the second
//! pass regresses beyond the rollback threshold the first-pass result is
//! restored.
//!
//! # Example
//!
//! ```rust,ignore
//! use rae_twopass::{PassContext, TwoPassExecutor};
//!
//! let executor = TwoPassExecutor::with_worker(worker, &config.two_pass);
//! let outcome = executor.execute(&PassContext::new("task-1", input)).await?;
//! if outcome.rolled_back {
//!     println!("kept first pass: {:?}", outcome.rollback_reason);
//! }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod compare;
pub mod executor;
pub mod policy;
pub mod strategy;
pub mod types;
pub mod worker;

pub use compare::{PassComparator, RollbackManager, ROLLBACK_EPSILON};
pub use executor::{ExecutionRecord, TwoPassExecutor, TwoPassOutcome};
pub use policy::PassRetryPolicy;
pub use strategy::{FirstPassStrategy, PassStrategy, SecondPassStrategy, SUCCESS_RATIO};
pub use types::{PassContext, PassDelta, PassMemento, PassResult, FIRST_PASS, SECOND_PASS};
pub use worker::{
    CheckOutcome, LearningKind, PassError, PassMode, PassWorker, Refinement, WorkOutput,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
