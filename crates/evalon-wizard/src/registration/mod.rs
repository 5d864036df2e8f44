//! The three registration flows Evalon offers.
//!
//! Each submodule defines a typed form record and a function returning the
//! flow's [`WizardDefinition`](crate::wizard::WizardDefinition). Validators
//! and payload builders are plain functions so they can be tested on their
//! own.

pub mod organisation;
pub mod student;
pub mod teacher;

pub use organisation::OrganisationForm;
pub use student::StudentForm;
pub use teacher::TeacherForm;

use serde_json::Value;

use crate::form::ErrorMap;
use crate::validate::{is_six_digit_pincode, is_valid_email};

/// Token value for a payload; `null` when absent.
fn token_value(token: Option<&str>) -> Value {
    token.map_or(Value::Null, |t| Value::String(t.to_string()))
}

/// Email rule shared by the teacher and student basic details steps.
fn check_email(errors: &mut ErrorMap, field: &str, value: &str, required: &str) {
    if errors.require(field, value, required) {
        errors.check(is_valid_email(value), field, "Please Enter A Valid Email");
    }
}

/// Pincode rule shared by the teacher and student basic details steps.
fn check_pincode(errors: &mut ErrorMap, value: &str) {
    if errors.require("pincode", value, "Pincode Is Required") {
        errors.check(
            is_six_digit_pincode(value.trim()),
            "pincode",
            "Pincode Must Be 6 Digits",
        );
    }
}

/// Maps duplicate-email rejections to friendly text.
fn duplicate_email_message(message: &str, invited_hint: &str) -> Option<String> {
    if !(message.contains("already exists") || message.contains("duplicate")) {
        return None;
    }
    if message.contains(invited_hint) {
        Some(
            "This email address is already registered. If you were invited by an admin, please contact them for your registration link."
                .to_string(),
        )
    } else {
        Some(
            "This email address is already registered. Please use a different email or try logging in."
                .to_string(),
        )
    }
}
