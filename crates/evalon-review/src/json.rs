//! JSON rendering of a registration review.
//!
//! # Example
//!
//! ```rust
//! use evalon_review::{ReviewSection, ReviewStatus, ReviewSummary};
//! use evalon_review::json::JsonGenerator;
//!
//! let summary = ReviewSummary::new("Organisation Registration", ReviewStatus::InProgress, 1, 3)
//!     .section(ReviewSection::new("Organisation Details").text("City", "Pune"));
//!
//! let json = JsonGenerator::new(&summary).generate().unwrap();
//! assert!(!json.contains('\n'));
//! ```

use crate::{ReviewError, ReviewSummary, Result};

/// JSON review generator.
pub struct JsonGenerator<'a> {
    summary: &'a ReviewSummary,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given summary.
    #[must_use]
    pub const fn new(summary: &'a ReviewSummary) -> Self {
        Self { summary }
    }

    /// Generates compact JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(self.summary).map_err(ReviewError::from)
    }

    /// Generates pretty-printed JSON output with 2-space indentation.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self.summary).map_err(ReviewError::from)
    }

    /// Generates a JSON value, for embedding in a larger response.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewError::Serialization`] if JSON serialization fails.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self.summary).map_err(ReviewError::from)
    }
}
