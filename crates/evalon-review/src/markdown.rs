//! Markdown rendering of a registration review.
//!
//! The document contains a progress table, one table per wizard step and,
//! when the wizard verifies contacts, a verification table.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::{ReviewSection, ReviewSummary, ReviewValue, Verification, SECRET_MASK};

/// Generates Markdown reviews.
pub struct MarkdownGenerator<'a> {
    summary: &'a ReviewSummary,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given summary.
    #[must_use]
    pub const fn new(summary: &'a ReviewSummary) -> Self {
        Self { summary }
    }

    /// Generates the complete Markdown document.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_progress(&mut output);
        for section in &self.summary.sections {
            Self::write_section(&mut output, section);
        }
        self.write_verifications(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# {} Review\n",
            escape_markdown(&self.summary.title)
        );
    }

    fn write_progress(&self, output: &mut String) {
        let _ = writeln!(output, "| Progress | Status |");
        let _ = writeln!(output, "|----------|--------|");
        let _ = writeln!(
            output,
            "| Step {} of {} | {} |",
            self.summary.current_step,
            self.summary.total_steps,
            self.summary.status.description()
        );
        let _ = writeln!(output);

        if let Some(code) = &self.summary.org_code {
            let _ = writeln!(
                output,
                "**Organisation Code**: `{}`\n",
                code.replace('`', "'")
            );
        }

        let missing = self.summary.missing_count();
        if missing > 0 {
            let _ = writeln!(output, "**Missing answers**: {missing}\n");
        }
    }

    fn write_section(output: &mut String, section: &ReviewSection) {
        let _ = writeln!(output, "## {}\n", escape_markdown(&section.title));

        if section.entries.is_empty() {
            let _ = writeln!(output, "*Nothing to review.*\n");
            return;
        }

        let _ = writeln!(output, "| Field | Value |");
        let _ = writeln!(output, "|-------|-------|");
        for entry in &section.entries {
            let _ = writeln!(
                output,
                "| {} | {} |",
                escape_markdown(&entry.label),
                render_value(&entry.value)
            );
        }
        let _ = writeln!(output);
    }

    fn write_verifications(&self, output: &mut String) {
        if self.summary.verifications.is_empty() {
            return;
        }

        let _ = writeln!(output, "## Verification\n");
        let _ = writeln!(output, "| Channel | Contact | Status |");
        let _ = writeln!(output, "|---------|---------|--------|");
        for verification in &self.summary.verifications {
            Self::write_verification(output, verification);
        }
        let _ = writeln!(output);
    }

    fn write_verification(output: &mut String, verification: &Verification) {
        let status = if verification.verified {
            "✅ Verified"
        } else {
            "❌ Not verified"
        };
        let contact = if verification.contact.trim().is_empty() {
            "*Not provided*".to_string()
        } else {
            escape_markdown(&verification.contact)
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            capitalize(&verification.channel),
            contact,
            status
        );
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let _ = writeln!(
            output,
            "*Generated at {}*",
            format_timestamp(&self.summary.generated_at)
        );
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn render_value(value: &ReviewValue) -> String {
    match value {
        ReviewValue::Secret => format!("`{SECRET_MASK}`"),
        ReviewValue::Missing => "*Not provided*".to_string(),
        other => escape_markdown(&other.display()),
    }
}

/// Format: "YYYY-MM-DD HH:MM:SS UTC"
fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Escapes characters that would break Markdown table cells.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}
