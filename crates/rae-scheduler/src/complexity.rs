//! Task complexity and routing signals
//!
//! Story points win when present. Otherwise title and description are scored
//! by keyword: each heavy keyword adds 2, each moderate keyword adds 1, a long
//! description adds 1. Score 4 or more is complex, 2 or more is medium.

use crate::allocator::ResourceAllocation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Description length that counts as a complexity signal
const LONG_DESCRIPTION_CHARS: usize = 400;

const HEAVY_KEYWORDS: &[&str] = &[
    "architecture",
    "distributed",
    "migration",
    "migrate",
    "refactor",
    "security",
    "concurrency",
    "concurrent",
    "performance",
    "scalability",
    "redesign",
    "protocol",
];

const MODERATE_KEYWORDS: &[&str] = &[
    "api",
    "database",
    "endpoint",
    "validation",
    "service",
    "cache",
    "auth",
    "schema",
    "workflow",
    "integration",
];

const UI_KEYWORDS: &[&str] = &[
    "ui",
    "ux",
    "frontend",
    "accessibility",
    "a11y",
    "button",
    "page",
    "css",
    "component",
    "screen",
    "layout",
    "form",
];

const EXTERNAL_KEYWORDS: &[&str] = &[
    "third-party",
    "sdk",
    "dependency",
    "dependencies",
    "library",
    "crate",
    "package",
    "external",
    "webhook",
    "vendor",
];

const DATA_KEYWORDS: &[&str] = &[
    "data",
    "dataset",
    "analysis",
    "analytics",
    "etl",
    "notebook",
    "csv",
    "report",
    "metrics",
    "statistics",
];

/// Unit of work handed to the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Estimate, when the caller has one
    #[serde(default)]
    pub story_points: Option<u32>,
}

impl Task {
    /// Create task
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            story_points: None,
        }
    }

    /// With story points
    #[inline]
    #[must_use]
    pub fn with_story_points(mut self, points: u32) -> Self {
        self.story_points = Some(points);
        self
    }

    /// Text handed to stages as their input
    #[must_use]
    pub fn input(&self) -> String {
        if self.description.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.description)
        }
    }
}

/// Complexity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// Tier for a story point estimate
    #[must_use]
    pub fn from_story_points(points: u32) -> Self {
        match points {
            0..=3 => Self::Simple,
            4..=8 => Self::Medium,
            _ => Self::Complex,
        }
    }

    /// Tier for a keyword score
    #[must_use]
    pub fn from_score(score: u32) -> Self {
        match score {
            0..=1 => Self::Simple,
            2..=3 => Self::Medium,
            _ => Self::Complex,
        }
    }

    /// Developers a task of this tier asks for
    #[must_use]
    pub fn base_developers(self) -> usize {
        match self {
            Self::Simple => 1,
            Self::Medium => 2,
            Self::Complex => 3,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signals the stage guard rules look at
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSignals {
    pub complexity: Complexity,
    pub touches_ui: bool,
    pub has_external_deps: bool,
    pub is_data_task: bool,
    /// How the complexity tier was reached
    pub justification: String,
}

impl TaskSignals {
    /// Signals with only a complexity tier set
    #[must_use]
    pub fn new(complexity: Complexity) -> Self {
        Self {
            complexity,
            touches_ui: false,
            has_external_deps: false,
            is_data_task: false,
            justification: String::new(),
        }
    }
}

/// Derives [`TaskSignals`] from a task
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskComplexityClassifier;

impl TaskComplexityClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify `task`
    #[must_use]
    pub fn classify(&self, task: &Task) -> TaskSignals {
        let words = tokenize(&format!("{} {}", task.title, task.description));
        let hits = |list: &[&str]| list.iter().filter(|k| words.contains(**k)).count();

        let (complexity, justification) = match task.story_points {
            Some(points) => (
                Complexity::from_story_points(points),
                format!("{points} story points"),
            ),
            None => {
                let heavy = hits(HEAVY_KEYWORDS);
                let moderate = hits(MODERATE_KEYWORDS);
                let long = task.description.chars().count() >= LONG_DESCRIPTION_CHARS;
                let score = u32::try_from(heavy * 2 + moderate).unwrap_or(u32::MAX) + u32::from(long);
                (
                    Complexity::from_score(score),
                    format!("keyword score {score} ({heavy} heavy, {moderate} moderate, long={long})"),
                )
            }
        };

        let signals = TaskSignals {
            complexity,
            touches_ui: hits(UI_KEYWORDS) > 0,
            has_external_deps: hits(EXTERNAL_KEYWORDS) > 0,
            is_data_task: hits(DATA_KEYWORDS) > 0,
            justification,
        };
        tracing::debug!(
            task = %task.id,
            complexity = %signals.complexity,
            ui = signals.touches_ui,
            external = signals.has_external_deps,
            data = signals.is_data_task,
            "task classified"
        );
        signals
    }
}

/// Developers assigned to a task: tier lookup capped by the allocation and by producers
#[must_use]
pub fn developers_for(complexity: Complexity, allocation: &ResourceAllocation, producers: u32) -> usize {
    let producers = usize::try_from(producers).unwrap_or(usize::MAX).max(1);
    complexity
        .base_developers()
        .min(allocation.max_parallel_developers)
        .min(producers)
        .max(1)
}

fn tokenize(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}
