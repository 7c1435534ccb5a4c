//! RAE Core - shared vocabulary of the execution engine
//!
//! Everything the resilient execution components agree on:
//! - Error taxonomy (transient, circuit-open, configuration, pass, stage)
//! - Narrow collaborator contracts (generate, validate, execute stage, probe platform)
//! - Structured engine events and the sinks that receive them
//! - Engine configuration with defaults and TOML loading
//!
//! # Example
//!
//! ```rust,ignore
//! use rae_core::{EngineConfig, EventSink, TracingSink};
//!
//! let config = EngineConfig::from_toml_str("[retry]\nmax_retries = 5\n")?;
//! config.validate()?;
//! let sink: std::sync::Arc<dyn EventSink> = std::sync::Arc::new(TracingSink);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod types;

pub use config::{
    BreakerConfig, EngineConfig, RetryConfig, SchedulerConfig, StreamingConfig, StreamingMode,
    TwoPassConfig,
};
pub use contracts::{
    FnGenerator, FnValidator, Generator, OsFamily, PlatformInfo, PlatformProbe, StageExecutor,
    Validator,
};
pub use error::{CollaboratorError, EngineError};
pub use events::{
    EngineEvent, EventKind, EventSink, FanoutSink, NullSink, RecordingSink, TracingSink,
};
pub use types::{ExecutionId, SessionId, StageContext, StageResult, StageStatus, ValidationResult};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with RAE Core
    pub use crate::{
        CollaboratorError, EngineConfig, EngineError, EngineEvent, EventSink, Generator,
        StageExecutor, ValidationResult, Validator,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
