//! Format checks shared by the step validators.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

#[allow(clippy::expect_used)]
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern is valid"));

#[allow(clippy::expect_used)]
static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

/// Returns `true` if `email` looks like `local@domain.tld`.
///
/// The check is deliberately loose: non-whitespace, an `@`, more
/// non-whitespace, a dot, more non-whitespace.
///
/// # Examples
///
/// ```
/// use evalon_wizard::validate::is_valid_email;
///
/// assert!(is_valid_email("admin@school.edu"));
/// assert!(!is_valid_email("admin@school"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Returns `true` if `pincode` is exactly six ASCII digits.
///
/// # Examples
///
/// ```
/// use evalon_wizard::validate::is_six_digit_pincode;
///
/// assert!(is_six_digit_pincode("411001"));
/// assert!(!is_six_digit_pincode("41100"));
/// ```
#[must_use]
pub fn is_six_digit_pincode(pincode: &str) -> bool {
    pincode.len() == 6 && pincode.bytes().all(|b| b.is_ascii_digit())
}

/// Parses a `YYYY-MM-DD` date, rejecting other layouts and impossible days.
#[must_use]
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    if !ISO_DATE_RE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Whole years between `birth` and `today`.
#[must_use]
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_email_pattern() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last+tag@mail.school.in"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("plainaddress"));
        assert!(!is_valid_email("user@localhost"));
        assert!(!is_valid_email("@ .com"));
    }

    #[test]
    fn test_pincode_pattern() {
        assert!(is_six_digit_pincode("560001"));
        assert!(!is_six_digit_pincode("5600011"));
        assert!(!is_six_digit_pincode("56O001"));
        assert!(!is_six_digit_pincode(""));
        assert!(!is_six_digit_pincode("５６０００１"));
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(
            parse_iso_date("2012-02-29"),
            NaiveDate::from_ymd_opt(2012, 2, 29)
        );
        assert_eq!(parse_iso_date("2013-02-29"), None);
        assert_eq!(parse_iso_date("2012-2-9"), None);
        assert_eq!(parse_iso_date("29/02/2012"), None);
    }

    #[test]
    fn test_age_counts_birthday() {
        let birth = NaiveDate::from_ymd_opt(2010, 6, 15).unwrap();
        let before = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        let on = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(age_on(birth, before), 15);
        assert_eq!(age_on(birth, on), 16);
    }
}
