//! Evalon Registration Review
//!
//! This crate provides the summary shown on the final confirmation screen of
//! a registration wizard: every step's answers grouped under the step title,
//! secrets masked, and the verification state of each contact channel.
//! Summaries can be serialized to JSON for a UI or rendered to Markdown.
//!
//! # Types
//!
//! - [`ReviewSummary`] - The complete summary of one registration
//! - [`ReviewSection`] - Labelled answers belonging to one wizard step
//! - [`ReviewValue`] - A single answer (text, list, flag, masked secret)
//! - [`Verification`] - Verification badge for a contact channel
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Compact or pretty JSON
//! - [`MarkdownGenerator`] - Human-readable Markdown
//!
//! # Example
//!
//! ```rust
//! use evalon_review::{ReviewSection, ReviewStatus, ReviewSummary, MarkdownGenerator};
//!
//! let summary = ReviewSummary::new("Teacher Registration", ReviewStatus::InProgress, 1, 3)
//!     .section(
//!         ReviewSection::new("Basic Details")
//!             .text("Full Name", "Asha Rao")
//!             .secret("Password", "hunter22"),
//!     );
//!
//! let markdown = MarkdownGenerator::new(&summary).generate();
//! assert!(markdown.contains("| Full Name | Asha Rao |"));
//! assert!(!markdown.contains("hunter22"));
//! ```

pub mod json;
mod markdown;

pub use markdown::MarkdownGenerator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while producing a review.
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Failed to serialize the summary to JSON.
    #[error("failed to serialize review: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The summary does not describe a registration.
    #[error("invalid review data: {0}")]
    InvalidData(String),
}

/// Result type for review operations.
pub type Result<T> = std::result::Result<T, ReviewError>;

// ============================================================================
// ReviewStatus
// ============================================================================

/// How far the registration has progressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Steps remain before the final submission.
    #[default]
    InProgress,
    /// The user is on the final step.
    ReadyToSubmit,
    /// The final step was accepted by the backend.
    Completed,
}

impl ReviewStatus {
    /// Returns a human-readable description of the status.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::InProgress => "In progress",
            Self::ReadyToSubmit => "Ready to submit",
            Self::Completed => "Completed",
        }
    }
}

// ============================================================================
// ReviewValue
// ============================================================================

/// Placeholder shown for secrets.
pub const SECRET_MASK: &str = "********";

/// A single answer in a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ReviewValue {
    /// Free text.
    Text(String),
    /// Multiple selections.
    List(Vec<String>),
    /// Yes/no answer.
    Flag(bool),
    /// A filled-in secret; the value itself is never stored.
    Secret,
    /// Left blank.
    Missing,
}

impl ReviewValue {
    /// Text answer, or `Missing` when blank.
    #[must_use]
    pub fn text(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            Self::Missing
        } else {
            Self::Text(trimmed.to_string())
        }
    }

    /// List answer, or `Missing` when empty.
    #[must_use]
    pub fn list(values: &[String]) -> Self {
        if values.is_empty() {
            Self::Missing
        } else {
            Self::List(values.to_vec())
        }
    }

    /// Secret answer, or `Missing` when blank.
    #[must_use]
    pub fn secret(value: &str) -> Self {
        if value.is_empty() {
            Self::Missing
        } else {
            Self::Secret
        }
    }

    /// Returns `true` if the answer was left blank.
    #[must_use]
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Plain-text rendering of the answer.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::List(items) => items.join(", "),
            Self::Flag(true) => "Yes".to_string(),
            Self::Flag(false) => "No".to_string(),
            Self::Secret => SECRET_MASK.to_string(),
            Self::Missing => "Not provided".to_string(),
        }
    }
}

// ============================================================================
// ReviewEntry / ReviewSection
// ============================================================================

/// A labelled answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// Field label as shown on the form.
    pub label: String,
    /// The answer.
    pub value: ReviewValue,
}

/// Answers belonging to one wizard step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSection {
    /// Step title.
    pub title: String,
    /// Answers in form order.
    pub entries: Vec<ReviewEntry>,
}

impl ReviewSection {
    /// Creates an empty section.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
        }
    }

    /// Appends an answer.
    #[must_use]
    pub fn entry(mut self, label: impl Into<String>, value: ReviewValue) -> Self {
        self.entries.push(ReviewEntry {
            label: label.into(),
            value,
        });
        self
    }

    /// Appends a text answer.
    #[must_use]
    pub fn text(self, label: impl Into<String>, value: &str) -> Self {
        self.entry(label, ReviewValue::text(value))
    }

    /// Appends a list answer.
    #[must_use]
    pub fn list(self, label: impl Into<String>, values: &[String]) -> Self {
        self.entry(label, ReviewValue::list(values))
    }

    /// Appends a yes/no answer.
    #[must_use]
    pub fn flag(self, label: impl Into<String>, value: bool) -> Self {
        self.entry(label, ReviewValue::Flag(value))
    }

    /// Appends a masked secret.
    #[must_use]
    pub fn secret(self, label: impl Into<String>, value: &str) -> Self {
        self.entry(label, ReviewValue::secret(value))
    }
}

// ============================================================================
// Verification
// ============================================================================

/// Verification state of a contact channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Channel name, e.g. `email`.
    pub channel: String,
    /// The contact being verified.
    pub contact: String,
    /// Whether verification succeeded.
    pub verified: bool,
}

// ============================================================================
// ReviewSummary
// ============================================================================

/// Review of a registration in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSummary {
    /// Heading, e.g. "Organisation Registration".
    pub title: String,
    /// Progress of the registration.
    pub status: ReviewStatus,
    /// One-based step the user is on.
    pub current_step: usize,
    /// Number of steps in the wizard.
    pub total_steps: usize,
    /// Organisation code, once issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_code: Option<String>,
    /// Answers grouped by step.
    pub sections: Vec<ReviewSection>,
    /// Contact verification badges.
    pub verifications: Vec<Verification>,
    /// When the summary was produced.
    pub generated_at: DateTime<Utc>,
}

impl ReviewSummary {
    /// Creates a summary with no sections, stamped now.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        status: ReviewStatus,
        current_step: usize,
        total_steps: usize,
    ) -> Self {
        Self {
            title: title.into(),
            status,
            current_step,
            total_steps,
            org_code: None,
            sections: Vec::new(),
            verifications: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// Appends a section.
    #[must_use]
    pub fn section(mut self, section: ReviewSection) -> Self {
        self.sections.push(section);
        self
    }

    /// Appends a verification badge.
    #[must_use]
    pub fn verification(
        mut self,
        channel: impl Into<String>,
        contact: impl Into<String>,
        verified: bool,
    ) -> Self {
        self.verifications.push(Verification {
            channel: channel.into(),
            contact: contact.into(),
            verified,
        });
        self
    }

    /// Sets the organisation code.
    #[must_use]
    pub fn with_org_code(mut self, org_code: Option<String>) -> Self {
        self.org_code = org_code.filter(|code| !code.is_empty());
        self
    }

    /// Overrides the generation timestamp.
    #[must_use]
    pub const fn generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = at;
        self
    }

    /// Number of answers left blank.
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|section| &section.entries)
            .filter(|entry| entry.value.is_missing())
            .count()
    }

    /// Returns `true` if every listed contact is verified.
    #[must_use]
    pub fn all_verified(&self) -> bool {
        self.verifications.iter().all(|v| v.verified)
    }

    /// Checks that the summary is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::InvalidData`] when there are no sections or the
    /// step counters are out of range.
    pub fn validate(&self) -> Result<()> {
        if self.sections.is_empty() {
            return Err(ReviewError::InvalidData(
                "review has no sections".to_string(),
            ));
        }
        if self.total_steps == 0 || self.current_step == 0 || self.current_step > self.total_steps
        {
            return Err(ReviewError::InvalidData(format!(
                "step {} of {} is out of range",
                self.current_step, self.total_steps
            )));
        }
        Ok(())
    }
}
