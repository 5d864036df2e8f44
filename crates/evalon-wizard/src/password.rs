//! Password strength scoring.
//!
//! The score counts how many of five checks hold:
//!
//! - at least 8 characters
//! - an uppercase letter `A-Z`
//! - a digit `0-9`
//! - a character outside `A-Za-z0-9`
//! - at least 12 characters
//!
//! and maps the count to a label, a colour and a meter percentage.

use serde::{Deserialize, Serialize};

/// Meter colour for a strength level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrengthColor {
    /// Neutral colour used for an empty password.
    #[default]
    Default,
    /// Very weak.
    Error,
    /// Weak or fair.
    Warning,
    /// Good.
    Info,
    /// Strong or excellent.
    Success,
}

/// Result of scoring a password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordStrength {
    /// Number of checks that hold, `0..=5`.
    pub score: u8,
    /// Human-readable level, empty for an empty password.
    pub label: String,
    /// Meter colour.
    pub color: StrengthColor,
    /// Meter fill, `0..=100`.
    pub percentage: u8,
}

const LEVELS: [(&str, StrengthColor, u8); 6] = [
    ("Very Weak", StrengthColor::Error, 20),
    ("Weak", StrengthColor::Warning, 40),
    ("Fair", StrengthColor::Warning, 60),
    ("Good", StrengthColor::Info, 80),
    ("Strong", StrengthColor::Success, 90),
    ("Excellent", StrengthColor::Success, 100),
];

fn has_uppercase(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_uppercase())
}

fn has_digit(password: &str) -> bool {
    password.chars().any(|c| c.is_ascii_digit())
}

fn has_symbol(password: &str) -> bool {
    password.chars().any(|c| !c.is_ascii_alphanumeric())
}

/// Scores `password`.
///
/// # Examples
///
/// ```
/// use evalon_wizard::password::{score_password, StrengthColor};
///
/// let strength = score_password("password");
/// assert_eq!(strength.score, 1);
/// assert_eq!(strength.label, "Weak");
///
/// let empty = score_password("");
/// assert_eq!(empty.color, StrengthColor::Default);
/// assert_eq!(empty.percentage, 0);
/// ```
#[must_use]
pub fn score_password(password: &str) -> PasswordStrength {
    if password.is_empty() {
        return PasswordStrength {
            score: 0,
            label: String::new(),
            color: StrengthColor::Default,
            percentage: 0,
        };
    }

    let length = password.chars().count();
    let score = [
        length >= 8,
        has_uppercase(password),
        has_digit(password),
        has_symbol(password),
        length >= 12,
    ]
    .into_iter()
    .fold(0_u8, |acc, held| acc + u8::from(held));

    let (label, color, percentage) = LEVELS[usize::from(score)];
    PasswordStrength {
        score,
        label: label.to_string(),
        color,
        percentage,
    }
}

/// Lists the basic requirements `password` does not meet yet.
///
/// An empty password yields no tips; the form shows "required" instead.
#[must_use]
pub fn password_tips(password: &str) -> Vec<&'static str> {
    if password.is_empty() {
        return Vec::new();
    }

    let mut tips = Vec::new();
    if password.chars().count() < 8 {
        tips.push("At least 8 characters");
    }
    if !has_uppercase(password) {
        tips.push("Include uppercase letter");
    }
    if !has_digit(password) {
        tips.push("Include a number");
    }
    if !has_symbol(password) {
        tips.push("Include special character");
    }
    tips
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_password() {
        let strength = score_password("");
        assert_eq!(strength.score, 0);
        assert_eq!(strength.label, "");
        assert_eq!(strength.color, StrengthColor::Default);
        assert_eq!(strength.percentage, 0);
        assert!(password_tips("").is_empty());
    }

    #[test]
    fn test_score_table() {
        let cases = [
            ("abc", 0, "Very Weak", StrengthColor::Error, 20),
            ("abcdefgh", 1, "Weak", StrengthColor::Warning, 40),
            ("Abcdefgh", 2, "Fair", StrengthColor::Warning, 60),
            ("Abcdefg1", 3, "Good", StrengthColor::Info, 80),
            ("Abcdef12!", 4, "Strong", StrengthColor::Success, 90),
            ("Abcdefgh12!x", 5, "Excellent", StrengthColor::Success, 100),
        ];

        for (password, score, label, color, percentage) in cases {
            let strength = score_password(password);
            assert_eq!(strength.score, score, "score for {password:?}");
            assert_eq!(strength.label, label, "label for {password:?}");
            assert_eq!(strength.color, color, "color for {password:?}");
            assert_eq!(strength.percentage, percentage, "percentage for {password:?}");
        }
    }

    #[test]
    fn test_short_password_can_still_score() {
        // Character classes count even below the length threshold.
        let strength = score_password("A1!");
        assert_eq!(strength.score, 3);
        assert_eq!(strength.label, "Good");
    }

    #[test]
    fn test_score_is_monotonic_as_checks_are_added() {
        let progression = ["abcd", "abcdefgh", "Abcdefgh", "Abcdefg1", "Abcdef1!", "Abcdefgh12!x"];
        let scores: Vec<u8> = progression.iter().map(|p| score_password(p).score).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]), "{scores:?}");
    }

    #[test]
    fn test_space_counts_as_symbol() {
        assert!(score_password("abc def").score >= 1);
        assert!(!password_tips("abc def").contains(&"Include special character"));
    }

    #[test]
    fn test_tips_list_missing_requirements_in_order() {
        assert_eq!(
            password_tips("abc"),
            vec![
                "At least 8 characters",
                "Include uppercase letter",
                "Include a number",
                "Include special character",
            ]
        );
        assert_eq!(password_tips("Abcdefg1"), vec!["Include special character"]);
        assert!(password_tips("Abcdef12!").is_empty());
    }
}
