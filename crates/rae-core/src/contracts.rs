//! Collaborator contracts
//!
//! The engine never generates, validates, or runs stages itself. It calls out
//! through these narrow, function-shaped traits. Closures can be adapted with
//! [`FnGenerator`] and [`FnValidator`].

use crate::error::CollaboratorError;
use crate::types::{StageContext, StageResult, ValidationResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Produces an output from an input (`Generate(input) -> (output, error)`)
#[async_trait::async_trait]
pub trait Generator<O: Send>: Send + Sync {
    /// Generate output for the given input
    async fn generate(&self, input: &str) -> Result<O, CollaboratorError>;
}

/// Judges an output (`Validate(output) -> ValidationResult`)
#[async_trait::async_trait]
pub trait Validator<O: Send + Sync>: Send + Sync {
    /// Validate a generated output
    async fn validate(&self, output: &O) -> Result<ValidationResult, CollaboratorError>;
}

/// Runs one pipeline stage (`ExecuteStage(stageName, context) -> StageResult`)
#[async_trait::async_trait]
pub trait StageExecutor: Send + Sync {
    /// Execute the named stage
    async fn execute_stage(
        &self,
        stage: &str,
        ctx: &StageContext,
    ) -> Result<StageResult, CollaboratorError>;
}

#[async_trait::async_trait]
impl<O: Send + 'static, T: Generator<O> + ?Sized> Generator<O> for Arc<T> {
    async fn generate(&self, input: &str) -> Result<O, CollaboratorError> {
        (**self).generate(input).await
    }
}

#[async_trait::async_trait]
impl<O: Send + Sync + 'static, T: Validator<O> + ?Sized> Validator<O> for Arc<T> {
    async fn validate(&self, output: &O) -> Result<ValidationResult, CollaboratorError> {
        (**self).validate(output).await
    }
}

#[async_trait::async_trait]
impl<T: StageExecutor + ?Sized> StageExecutor for Arc<T> {
    async fn execute_stage(
        &self,
        stage: &str,
        ctx: &StageContext,
    ) -> Result<StageResult, CollaboratorError> {
        (**self).execute_stage(stage, ctx).await
    }
}

/// Adapts an async closure `Fn(String) -> Future<Result<O, _>>` into a [`Generator`]
#[derive(Clone)]
pub struct FnGenerator<F>(pub F);

#[async_trait::async_trait]
impl<O, F, Fut> Generator<O> for FnGenerator<F>
where
    O: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<O, CollaboratorError>> + Send,
{
    async fn generate(&self, input: &str) -> Result<O, CollaboratorError> {
        (self.0)(input.to_string()).await
    }
}

/// Adapts a synchronous closure `Fn(&O) -> Result<ValidationResult, _>` into a [`Validator`]
#[derive(Clone)]
pub struct FnValidator<F>(pub F);

#[async_trait::async_trait]
impl<O, F> Validator<O> for FnValidator<F>
where
    O: Send + Sync + 'static,
    F: Fn(&O) -> Result<ValidationResult, CollaboratorError> + Send + Sync,
{
    async fn validate(&self, output: &O) -> Result<ValidationResult, CollaboratorError> {
        (self.0)(output)
    }
}

/// Operating system family of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OsFamily {
    /// Linux distributions
    Linux,
    /// macOS / Darwin
    MacOs,
    /// Other Unix-like systems
    Unix,
    /// Windows
    Windows,
    /// Anything else
    Other,
}

impl OsFamily {
    /// Family of the current build target
    #[must_use]
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(unix) {
            Self::Unix
        } else if cfg!(windows) {
            Self::Windows
        } else {
            Self::Other
        }
    }

    /// POSIX-like systems get async I/O
    #[inline]
    #[must_use]
    pub fn is_posix(&self) -> bool {
        matches!(self, Self::Linux | Self::MacOs | Self::Unix)
    }
}

/// Host capabilities (`DetectPlatform() -> PlatformInfo`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Logical CPU count
    pub logical_cores: usize,
    /// Physical CPU count
    pub physical_cores: usize,
    /// Installed memory
    pub total_memory_gb: f64,
    /// Memory currently available
    pub available_memory_gb: f64,
    /// OS family
    pub os_family: OsFamily,
}

impl PlatformInfo {
    /// Create platform description
    #[inline]
    #[must_use]
    pub fn new(
        logical_cores: usize,
        total_memory_gb: f64,
        available_memory_gb: f64,
        os_family: OsFamily,
    ) -> Self {
        Self {
            logical_cores,
            physical_cores: logical_cores,
            total_memory_gb,
            available_memory_gb,
            os_family,
        }
    }

    /// With physical core count
    #[inline]
    #[must_use]
    pub fn with_physical_cores(mut self, physical_cores: usize) -> Self {
        self.physical_cores = physical_cores;
        self
    }
}

/// Platform-probe collaborator
pub trait PlatformProbe: Send + Sync {
    /// Detect the host platform
    fn detect(&self) -> PlatformInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fn_generator_adapts_closure() {
        let generator = FnGenerator(|input: String| async move {
            Ok::<_, CollaboratorError>(input.to_uppercase())
        });
        let out = generator.generate("abc").await.unwrap();
        assert_eq!(out, "ABC");
    }

    #[tokio::test]
    async fn fn_validator_adapts_closure() {
        let validator = FnValidator(|out: &String| {
            if out.is_empty() {
                Ok(ValidationResult::fail(["empty output"]))
            } else {
                Ok(ValidationResult::pass())
            }
        });
        assert!(validator.validate(&"x".to_string()).await.unwrap().passed);
        assert!(!validator.validate(&String::new()).await.unwrap().passed);
    }

    #[tokio::test]
    async fn arc_generator_delegates() {
        let generator: Arc<dyn Generator<usize>> =
            Arc::new(FnGenerator(|input: String| async move { Ok(input.len()) }));
        assert_eq!(generator.generate("four").await.unwrap(), 4);
    }

    #[test]
    fn os_family_posix() {
        assert!(OsFamily::Linux.is_posix());
        assert!(OsFamily::MacOs.is_posix());
        assert!(!OsFamily::Windows.is_posix());
    }
}
