//! RAE Streaming - early-stop validation of streamed generation
//!
//! A [`StreamingValidator`] watches chunks as they arrive and tells the
//! generation loop to stop as soon as the output is known to be unusable:
//! - placeholders (`TODO`, bare `pass`, `not implemented`, ...)
//! - forbidden constructs (`eval(`, `os.system(`, `shell=True`, ...)
//! - imports outside a caller-supplied allow-list
//!
//! Checks run every 25/50/100 chunks depending on [`StreamingMode`](rae_core::StreamingMode),
//! keeping per-chunk overhead to a buffer append.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod checks;
pub mod stream;
pub mod validator;

pub use checks::{module_allowed, CheckKind, CheckSet, Violation};
pub use stream::{consume_stream, StreamOutcome};
pub use validator::{
    ChunkDecision, StopEvent, StreamStats, StreamingCheckpoint, StreamingValidator,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
