//! Failure analysis
//!
//! Turns a failed [`ValidationResult`] into a category and a list of
//! corrective constraints. Classification is keyword based over the
//! validator's issues; the first category whose keywords match any issue
//! wins, checked in the order of [`FailureCategory::ALL`].

use rae_core::{CollaboratorError, ValidationResult};
use serde::Serialize;

/// Why an attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureCategory {
    /// Output contains a construct that must never appear
    ForbiddenPattern,
    /// Documentation is missing
    MissingDocumentation,
    /// Output does not match the expected contract or signature
    SignatureMismatch,
    /// Output is truncated or contains placeholders
    Incomplete,
    /// Required elements are absent
    MissingElements,
    /// Nothing matched
    Unknown,
}

impl FailureCategory {
    /// Classified categories in match priority
    pub const ALL: [FailureCategory; 5] = [
        Self::ForbiddenPattern,
        Self::MissingDocumentation,
        Self::SignatureMismatch,
        Self::Incomplete,
        Self::MissingElements,
    ];

    /// Stable category name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ForbiddenPattern => "forbidden_pattern",
            Self::MissingDocumentation => "missing_documentation",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Incomplete => "incomplete",
            Self::MissingElements => "missing_elements",
            Self::Unknown => "unknown",
        }
    }

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::ForbiddenPattern => &["forbidden", "not allowed", "disallowed", "unsafe", "eval("],
            Self::MissingDocumentation => &["docstring", "documentation", "undocumented", "doc comment"],
            Self::SignatureMismatch => &["signature", "contract", "parameter", "return type", "mismatch"],
            Self::Incomplete => &["incomplete", "todo", "placeholder", "not implemented", "truncated", "stub"],
            Self::MissingElements => &["missing", "required", "absent", "expected"],
            Self::Unknown => &[],
        }
    }

    fn matches(self, issue_lower: &str) -> bool {
        self.keywords().iter().any(|k| issue_lower.contains(k))
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured diagnosis of one failed attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureAnalysis {
    /// Failure category
    pub category: FailureCategory,
    /// Corrective constraints for the next attempt
    pub constraints: Vec<String>,
    /// Issues that led to the classification
    pub evidence: Vec<String>,
}

impl FailureAnalysis {
    /// Analysis of a generate/validate call that errored instead of returning a verdict
    #[must_use]
    pub fn from_error(error: &CollaboratorError) -> Self {
        Self {
            category: FailureCategory::Unknown,
            constraints: vec!["Produce a complete output; the previous call did not return one".to_string()],
            evidence: vec![error.to_string()],
        }
    }
}

/// Classifies failed validations
#[derive(Debug, Clone, Copy, Default)]
pub struct FailureAnalyzer;

impl FailureAnalyzer {
    /// Create analyzer
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Classify a failed validation
    #[must_use]
    pub fn analyze(&self, result: &ValidationResult) -> FailureAnalysis {
        let lowered: Vec<String> = result.issues.iter().map(|i| i.to_lowercase()).collect();

        let category = FailureCategory::ALL
            .into_iter()
            .find(|c| lowered.iter().any(|issue| c.matches(issue)))
            .unwrap_or(FailureCategory::Unknown);

        let evidence: Vec<String> = match category {
            FailureCategory::Unknown => result.issues.clone(),
            c => result
                .issues
                .iter()
                .zip(&lowered)
                .filter(|(_, low)| c.matches(low))
                .map(|(issue, _)| issue.clone())
                .collect(),
        };

        let mut constraints: Vec<String> = evidence
            .iter()
            .map(|issue| format!("Resolve: {}", issue.trim()))
            .collect();
        if constraints.is_empty() && category != FailureCategory::Unknown {
            constraints.push(format!("Fix the {} problem", category.as_str().replace('_', " ")));
        }

        tracing::debug!(
            category = %category,
            constraints = constraints.len(),
            "failure analyzed"
        );

        FailureAnalysis {
            category,
            constraints,
            evidence,
        }
    }
}
