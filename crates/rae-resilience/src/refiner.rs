//! Input refinement between attempts
//!
//! The refined input is always built from the *original* input, never from
//! the previous refinement, so constraints do not nest. Constraints learned
//! earlier in the session are carried forward.

use crate::failure::{FailureAnalysis, FailureCategory};
use serde::Serialize;

/// Next input to try
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefinedInput {
    /// Payload for the next attempt
    pub text: String,
    /// Constraints that are new with this refinement
    pub constraints_added: Vec<String>,
    /// Every constraint carried by this refinement
    pub constraints: Vec<String>,
    /// Attempt this input is for
    pub attempt_number: u32,
    /// Escalation level in [0, 1]
    pub refinement_level: f64,
    /// Category the refinement responds to
    pub category: FailureCategory,
}

/// Escalation level after the given failed attempt
#[must_use]
pub fn refinement_level(failed_attempt: u32) -> f64 {
    match failed_attempt {
        0 => 0.0,
        1 => 0.3,
        2 => 0.6,
        3 => 0.9,
        _ => 1.0,
    }
}

fn heading(category: FailureCategory) -> &'static str {
    match category {
        FailureCategory::MissingElements => "MISSING REQUIRED ELEMENTS - include all of the following:",
        FailureCategory::Incomplete => "INCOMPLETE OUTPUT - deliver a complete result, no placeholders:",
        FailureCategory::SignatureMismatch => "CONTRACT MISMATCH - match the expected signature exactly:",
        FailureCategory::MissingDocumentation => "MISSING DOCUMENTATION - document every public item:",
        FailureCategory::ForbiddenPattern => "FORBIDDEN PATTERN PRESENT - remove and never use:",
        FailureCategory::Unknown => "MANDATORY REQUIREMENTS:",
    }
}

fn emphasis(level: f64) -> Option<&'static str> {
    if level >= 0.9 {
        Some("FINAL ATTEMPT: exact compliance with every requirement below is required.")
    } else if level >= 0.6 {
        Some("The previous attempt failed. Follow all requirements below.")
    } else if level >= 0.3 {
        Some("Reminder: observe the requirements below.")
    } else {
        None
    }
}

/// Builds progressively constrained inputs
#[derive(Debug, Clone, Copy, Default)]
pub struct InputRefiner;

impl InputRefiner {
    /// Create refiner
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Refine `original` after `failed_attempt` failed with `analysis`
    ///
    /// `prior` holds the constraints already in force this session.
    #[must_use]
    pub fn refine(
        &self,
        original: &str,
        analysis: &FailureAnalysis,
        failed_attempt: u32,
        prior: &[String],
    ) -> RefinedInput {
        let level = refinement_level(failed_attempt);

        let mut constraints = prior.to_vec();
        let mut constraints_added = Vec::new();
        for c in &analysis.constraints {
            if !constraints.contains(c) {
                constraints.push(c.clone());
                constraints_added.push(c.clone());
            }
        }

        let mut text = String::from(original);
        if !constraints.is_empty() || level > 0.0 {
            text.push_str("\n\n");
            if let Some(line) = emphasis(level) {
                text.push_str(line);
                text.push('\n');
            }
            text.push_str(heading(analysis.category));
            for c in &constraints {
                text.push_str("\n- ");
                text.push_str(c);
            }
        }

        RefinedInput {
            text,
            constraints_added,
            constraints,
            attempt_number: failed_attempt + 1,
            refinement_level: level,
            category: analysis.category,
        }
    }
}
