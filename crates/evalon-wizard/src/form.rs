//! Form records and the per-field error map.
//!
//! Every wizard owns one typed form struct. Updates arrive as a field name
//! plus a JSON value (exactly what a UI sends), so they are applied through
//! the struct's serde representation: the patched object must still
//! deserialize into the form type, which gives type checking for free.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EvalonError, Result};
use crate::otp::Channel;

/// Field name → validation message for the current step.
///
/// Keys use the same camelCase names as the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorMap(BTreeMap<String, String>);

impl ErrorMap {
    /// Creates an empty error map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `message` for `field`, replacing any earlier message.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.insert(field.into(), message.into());
    }

    /// Records `message` for `field` unless `value` has non-blank content.
    ///
    /// Returns `true` when the value is present, so callers can chain a
    /// format check that only runs on present values.
    pub fn require(&mut self, field: &str, value: &str, message: &str) -> bool {
        if value.trim().is_empty() {
            self.insert(field, message);
            false
        } else {
            true
        }
    }

    /// Records `message` for `field` when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.insert(field, message);
        }
    }

    /// Returns the message for `field`, if any.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Removes and returns the message for `field`.
    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.0.remove(field)
    }

    /// Returns `true` if `field` has an error.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Returns `true` if no field has an error.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over `(field, message)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Drops every entry whose field is not in `fields`.
    pub fn retain_fields(&mut self, fields: &[&str]) {
        self.0.retain(|key, _| fields.contains(&key.as_str()));
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(String, String)> for ErrorMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Values a freshly created form is seeded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDefaults {
    /// Dialling code preselected in phone inputs.
    pub country_code: String,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            country_code: "+91".to_string(),
        }
    }
}

/// A typed registration form driven by a wizard.
pub trait FormRecord:
    Serialize + DeserializeOwned + Clone + std::fmt::Debug + Send + Sync + 'static
{
    /// Creates an empty form seeded with `defaults`.
    fn new(defaults: &FormDefaults) -> Self;

    /// Fields that only the wizard itself may write (verification flags,
    /// values returned by the backend).
    const MANAGED_FIELDS: &'static [&'static str];

    /// Fields holding secrets; never echoed back to clients.
    const SECRET_FIELDS: &'static [&'static str] = &["password", "confirmPassword"];

    /// Name of the field holding the contact verified over `channel`.
    fn contact_field(channel: Channel) -> Option<&'static str>;

    /// Name of the flag recording the verification of `channel`.
    fn verified_field(_channel: Channel) -> Option<&'static str> {
        None
    }

    /// Current value of the contact verified over `channel`.
    fn contact(&self, channel: Channel) -> Option<&str>;

    /// Dialling code used for phone OTPs.
    fn country_code(&self) -> &str;

    /// Whether the contact on `channel` has been verified.
    fn is_verified(&self, channel: Channel) -> bool;

    /// Records the verification result for `channel`.
    fn set_verified(&mut self, channel: Channel, verified: bool);
}

/// Applies `value` to `field` on `form`.
///
/// The form is left untouched when the update fails.
///
/// # Errors
///
/// Returns `EvalonError::UnknownField` if the form has no such field and
/// `EvalonError::InvalidFieldValue` if the field is managed by the wizard or
/// the value has the wrong type.
pub fn apply_field<F: FormRecord>(form: &mut F, field: &str, value: Value) -> Result<()> {
    if F::MANAGED_FIELDS.contains(&field) {
        return Err(EvalonError::invalid_field_value(
            field,
            "this field is set by the wizard and cannot be edited directly",
        ));
    }

    let mut json = serde_json::to_value(&*form)?;
    let slot = json
        .as_object_mut()
        .and_then(|object| object.get_mut(field))
        .ok_or_else(|| EvalonError::unknown_field(field))?;
    *slot = value;

    *form = serde_json::from_value(json)
        .map_err(|e| EvalonError::invalid_field_value(field, e.to_string()))?;
    Ok(())
}

/// Reads `field` from `form` as JSON.
///
/// # Errors
///
/// Returns `EvalonError::UnknownField` if the form has no such field.
pub fn field_value<F: FormRecord>(form: &F, field: &str) -> Result<Value> {
    let json = serde_json::to_value(form)?;
    json.get(field)
        .cloned()
        .ok_or_else(|| EvalonError::unknown_field(field))
}

/// Serializes `form` with secret fields blanked out.
///
/// # Errors
///
/// Returns `EvalonError::Json` if the form cannot be serialized.
pub fn redacted<F: FormRecord>(form: &F) -> Result<Value> {
    let mut json = serde_json::to_value(form)?;
    if let Some(object) = json.as_object_mut() {
        for secret in F::SECRET_FIELDS {
            if let Some(slot) = object.get_mut(*secret) {
                let filled = slot.as_str().is_some_and(|s| !s.is_empty());
                *slot = Value::String(if filled { "********" } else { "" }.to_string());
            }
        }
    }
    Ok(json)
}

/// Empties every secret field of `form` in place.
///
/// # Errors
///
/// Returns `EvalonError::Json` if the form cannot be round-tripped.
pub fn clear_secrets<F: FormRecord>(form: &mut F) -> Result<()> {
    let mut json = serde_json::to_value(&*form)?;
    if let Some(object) = json.as_object_mut() {
        for secret in F::SECRET_FIELDS {
            if let Some(slot) = object.get_mut(*secret) {
                *slot = Value::String(String::new());
            }
        }
    }
    *form = serde_json::from_value(json)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase", default)]
    struct Sample {
        email: String,
        email_verified: bool,
        subjects: Vec<String>,
        password: String,
        country_code: String,
    }

    impl FormRecord for Sample {
        const MANAGED_FIELDS: &'static [&'static str] = &["emailVerified"];

        fn new(defaults: &FormDefaults) -> Self {
            Self {
                country_code: defaults.country_code.clone(),
                ..Self::default()
            }
        }

        fn contact_field(channel: Channel) -> Option<&'static str> {
            matches!(channel, Channel::Email).then_some("email")
        }

        fn contact(&self, channel: Channel) -> Option<&str> {
            matches!(channel, Channel::Email).then_some(self.email.as_str())
        }

        fn country_code(&self) -> &str {
            &self.country_code
        }

        fn is_verified(&self, _channel: Channel) -> bool {
            self.email_verified
        }

        fn set_verified(&mut self, _channel: Channel, verified: bool) {
            self.email_verified = verified;
        }
    }

    #[test]
    fn test_apply_field_updates_typed_value() {
        let mut form = Sample::new(&FormDefaults::default());
        apply_field(&mut form, "email", json!("a@b.co")).unwrap();
        apply_field(&mut form, "subjects", json!(["Maths", "Physics"])).unwrap();

        assert_eq!(form.email, "a@b.co");
        assert_eq!(form.subjects, vec!["Maths", "Physics"]);
        assert_eq!(form.country_code, "+91");
    }

    #[test]
    fn test_apply_field_rejects_unknown_field() {
        let mut form = Sample::default();
        let err = apply_field(&mut form, "favouriteColour", json!("blue")).unwrap_err();
        assert!(matches!(err, EvalonError::UnknownField { field } if field == "favouriteColour"));
    }

    #[test]
    fn test_apply_field_rejects_wrong_type_and_keeps_form() {
        let mut form = Sample {
            subjects: vec!["Maths".to_string()],
            ..Sample::default()
        };
        let err = apply_field(&mut form, "subjects", json!("Maths")).unwrap_err();
        assert!(matches!(err, EvalonError::InvalidFieldValue { .. }));
        assert_eq!(form.subjects, vec!["Maths"]);
    }

    #[test]
    fn test_apply_field_rejects_managed_field() {
        let mut form = Sample::default();
        let err = apply_field(&mut form, "emailVerified", json!(true)).unwrap_err();
        assert!(matches!(err, EvalonError::InvalidFieldValue { .. }));
        assert!(!form.email_verified);
    }

    #[test]
    fn test_redacted_masks_secrets() {
        let form = Sample {
            password: "hunter22".to_string(),
            ..Sample::default()
        };
        let json = redacted(&form).unwrap();
        assert_eq!(json["password"], "********");
        assert_eq!(json["email"], "");
    }

    #[test]
    fn test_clear_secrets_keeps_other_fields() {
        let mut form = Sample {
            email: "a@b.co".to_string(),
            password: "hunter22".to_string(),
            ..Sample::default()
        };
        clear_secrets(&mut form).unwrap();
        assert!(form.password.is_empty());
        assert_eq!(form.email, "a@b.co");
    }

    #[test]
    fn test_error_map_require_and_retain() {
        let mut errors = ErrorMap::new();
        assert!(!errors.require("fullName", "   ", "Full Name Is Required"));
        assert!(errors.require("city", "Pune", "City Is Required"));
        errors.check(false, "pincode", "Pincode Must Be 6 Digits");

        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("fullName"), Some("Full Name Is Required"));

        errors.retain_fields(&["pincode"]);
        assert!(!errors.contains("fullName"));
        assert!(errors.contains("pincode"));
    }

    #[test]
    fn test_error_map_serializes_as_plain_object() {
        let mut errors = ErrorMap::new();
        errors.insert("email", "Email Is Required");
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({"email": "Email Is Required"})
        );
    }
}
