//! Testing utilities for RAE workspace
//!
//! Scripted collaborators, fixed platforms, and event recording.

#![allow(missing_docs)]

use parking_lot::Mutex;
use rae_core::{
    CollaboratorError, Generator, OsFamily, PlatformInfo, PlatformProbe, StageContext,
    StageExecutor, StageResult, ValidationResult, Validator,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub use rae_core::RecordingSink;

/// Generator replaying a script; the last entry repeats once the script is used up
#[derive(Debug)]
pub struct ScriptedGenerator<O> {
    script: Mutex<VecDeque<Result<O, CollaboratorError>>>,
    last: Mutex<Option<Result<O, CollaboratorError>>>,
    inputs: Mutex<Vec<String>>,
}

impl<O: Clone> ScriptedGenerator<O> {
    pub fn new(script: Vec<Result<O, CollaboratorError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Always returns `output`
    pub fn always(output: O) -> Self {
        Self::new(vec![Ok(output)])
    }

    /// Inputs received, in call order
    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().len()
    }
}

#[async_trait::async_trait]
impl<O: Clone + Send + Sync + 'static> Generator<O> for ScriptedGenerator<O> {
    async fn generate(&self, input: &str) -> Result<O, CollaboratorError> {
        self.inputs.lock().push(input.to_string());
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone()
            .unwrap_or_else(|| Err(CollaboratorError::permanent("empty generator script")))
    }
}

/// Validator replaying verdicts; the last verdict repeats
#[derive(Debug)]
pub struct ScriptedValidator {
    script: Mutex<VecDeque<ValidationResult>>,
    last: Mutex<ValidationResult>,
    calls: AtomicUsize,
}

impl ScriptedValidator {
    pub fn new(script: Vec<ValidationResult>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(ValidationResult::fail(["empty validator script"])),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always fails with the given score
    pub fn always_score(score: f64) -> Self {
        Self::new(vec![ValidationResult::fail(["missing required element"]).with_score(score)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl<O: Send + Sync + 'static> Validator<O> for ScriptedValidator {
    async fn validate(&self, _output: &O) -> Result<ValidationResult, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(next) = next {
            *last = next;
        }
        Ok(last.clone())
    }
}

/// Scripted outcome of one stage call
#[derive(Debug, Clone)]
pub enum StageScript {
    Complete,
    Fail(String),
    Error(CollaboratorError),
    /// Complete after sleeping
    Slow(Duration),
}

/// Stage executor with per-stage scripts; unscripted stages complete
#[derive(Debug, Default)]
pub struct ScriptedStageExecutor {
    scripts: Mutex<HashMap<String, VecDeque<StageScript>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedStageExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for `stage`; the last one repeats
    pub fn with_script(self, stage: &str, script: Vec<StageScript>) -> Self {
        self.scripts.lock().insert(stage.to_string(), script.into());
        self
    }

    /// Stage names in call order (repeated on retries)
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, stage: &str) -> usize {
        self.calls.lock().iter().filter(|s| *s == stage).count()
    }

    fn next(&self, stage: &str) -> StageScript {
        let mut scripts = self.scripts.lock();
        match scripts.get_mut(stage) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(StageScript::Complete),
            Some(queue) => queue.front().cloned().unwrap_or(StageScript::Complete),
            None => StageScript::Complete,
        }
    }
}

#[async_trait::async_trait]
impl StageExecutor for ScriptedStageExecutor {
    async fn execute_stage(
        &self,
        stage: &str,
        ctx: &StageContext,
    ) -> Result<StageResult, CollaboratorError> {
        self.calls.lock().push(stage.to_string());
        match self.next(stage) {
            StageScript::Complete => Ok(StageResult::completed(serde_json::json!({
                "stage": stage,
                "task_id": ctx.task_id,
                "upstream": ctx.upstream.len(),
            }))),
            StageScript::Fail(message) => Ok(StageResult::failed(message)),
            StageScript::Error(e) => Err(e),
            StageScript::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(StageResult::completed(serde_json::json!({ "stage": stage })))
            }
        }
    }
}

/// Probe returning a fixed platform
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe(pub PlatformInfo);

impl PlatformProbe for FixedProbe {
    fn detect(&self) -> PlatformInfo {
        self.0
    }
}

/// Linux platform with the given cores and memory
pub fn platform(logical_cores: usize, total_gb: f64, available_gb: f64) -> PlatformInfo {
    PlatformInfo::new(logical_cores, total_gb, available_gb, OsFamily::Linux)
}

/// Stage context with no upstream data
pub fn stage_context(task_id: &str, stage: &str) -> StageContext {
    StageContext::new(task_id, stage, "input")
}
