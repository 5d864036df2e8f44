//! Organisation (institution) registration.
//!
//! Three steps, all submitted to the backend:
//!
//! 1. Organisation Details - issues the registration token and `orgCode`
//! 2. Admin Details - requires a verified admin email
//! 3. Setup & Preferences - completes the registration and signs the admin in

use evalon_review::{ReviewSection, ReviewSummary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::token_value;
use crate::backend::RegistrationStatus;
use crate::form::{ErrorMap, FormDefaults, FormRecord};
use crate::otp::Channel;
use crate::validate::is_valid_email;
use crate::wizard::{StepDefinition, StepSubmit, WizardDefinition, WizardKind};

/// Minimum admin password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Form record of the organisation wizard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrganisationForm {
    /// Institution name.
    pub organisation_name: String,
    /// Country code.
    pub country: String,
    /// State code.
    pub state: String,
    /// City name.
    pub city: String,
    /// Postal code.
    pub pincode: String,
    /// School, college, coaching centre, ...
    pub organisation_type: String,
    /// Approximate student count.
    pub student_strength: String,
    /// Government recognition.
    pub is_government_recognized: bool,

    /// Primary admin's name.
    pub admin_name: String,
    /// Primary admin's email; verified by OTP.
    pub admin_email: String,
    /// Primary admin's phone, optional.
    pub admin_phone: String,
    /// Dialling code for `admin_phone`.
    pub country_code: String,
    /// Admin password.
    pub password: String,
    /// Must equal `password`.
    pub confirm_password: String,
    /// Set by a successful email OTP verification.
    pub email_verified: bool,
    /// Always false; phone verification is not offered in this flow.
    pub phone_verified: bool,

    /// Base64-encoded logo image.
    pub logo: Option<String>,
    /// Single campus, multi-branch, ...
    pub institution_structure: String,
    /// Department names.
    pub departments: Vec<String>,
    /// Invite sub-admins after setup.
    pub add_sub_admins: bool,
    /// IANA time zone.
    pub time_zone: String,
    /// Require two-factor sign-in.
    pub two_factor_auth: bool,

    /// Issued by the backend after step 1.
    pub org_code: String,
}

impl FormRecord for OrganisationForm {
    const MANAGED_FIELDS: &'static [&'static str] = &["emailVerified", "phoneVerified", "orgCode"];

    fn new(defaults: &FormDefaults) -> Self {
        Self {
            country_code: defaults.country_code.clone(),
            ..Self::default()
        }
    }

    fn contact_field(channel: Channel) -> Option<&'static str> {
        match channel {
            Channel::Email => Some("adminEmail"),
            Channel::Phone => None,
        }
    }

    fn verified_field(channel: Channel) -> Option<&'static str> {
        match channel {
            Channel::Email => Some("emailVerified"),
            Channel::Phone => None,
        }
    }

    fn contact(&self, channel: Channel) -> Option<&str> {
        match channel {
            Channel::Email => Some(&self.admin_email),
            Channel::Phone => None,
        }
    }

    fn country_code(&self) -> &str {
        &self.country_code
    }

    fn is_verified(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_verified,
            Channel::Phone => self.phone_verified,
        }
    }

    fn set_verified(&mut self, channel: Channel, verified: bool) {
        match channel {
            Channel::Email => self.email_verified = verified,
            Channel::Phone => self.phone_verified = verified,
        }
    }
}

// ============================================================================
// Validators
// ============================================================================

/// Organisation Details.
#[must_use]
pub fn validate_details(form: &OrganisationForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    errors.require(
        "organisationName",
        &form.organisation_name,
        "Organisation Name Is Required",
    );
    errors.require("country", &form.country, "Country Is Required");
    errors.require("state", &form.state, "State Is Required");
    errors.require("city", &form.city, "City Is Required");
    errors.require("pincode", &form.pincode, "Pincode Is Required");
    errors.require(
        "organisationType",
        &form.organisation_type,
        "Organisation Type Is Required",
    );
    errors
}

/// Admin Details.
#[must_use]
pub fn validate_admin(form: &OrganisationForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    errors.require("adminName", &form.admin_name, "Admin Name Is Required");
    if errors.require("adminEmail", &form.admin_email, "Email Is Required") {
        errors.check(
            is_valid_email(&form.admin_email),
            "adminEmail",
            "Please Enter A Valid Email",
        );
    }
    errors.require("adminPhone", &form.admin_phone, "Phone Number Is Required");
    if !form.password.is_empty() {
        errors.check(
            form.password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            "Password Must Be At Least 8 Characters",
        );
    } else {
        errors.insert("password", "Password Is Required");
    }
    errors.check(
        form.password == form.confirm_password,
        "confirmPassword",
        "Passwords Do Not Match",
    );
    errors.check(form.email_verified, "emailVerified", "Please Verify Your Email");
    errors
}

/// Setup & Preferences.
#[must_use]
pub fn validate_preferences(form: &OrganisationForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    errors.require(
        "institutionStructure",
        &form.institution_structure,
        "Please Select Institution Structure",
    );
    errors.require("timeZone", &form.time_zone, "Please Select Time Zone");
    errors
}

// ============================================================================
// Payloads
// ============================================================================

fn details_payload(form: &OrganisationForm, _token: Option<&str>) -> Value {
    json!({
        "organisationName": form.organisation_name.trim(),
        "country": form.country,
        "state": form.state,
        "city": form.city.trim(),
        "pincode": form.pincode.trim(),
        "organisationType": form.organisation_type,
        "studentStrength": form.student_strength,
        "isGovernmentRecognized": form.is_government_recognized,
    })
}

fn admin_payload(form: &OrganisationForm, token: Option<&str>) -> Value {
    let mut payload = json!({
        "adminName": form.admin_name.trim(),
        "adminEmail": form.admin_email.trim(),
        "adminPhone": form.admin_phone.trim(),
        "registrationToken": token_value(token),
        "password": form.password,
        "confirmPassword": form.confirm_password,
    });
    if !form.country_code.is_empty() {
        payload["countryCode"] = json!(form.country_code);
    }
    payload
}

fn preferences_payload(form: &OrganisationForm, token: Option<&str>) -> Value {
    json!({
        "institutionStructure": form.institution_structure,
        "departments": form.departments,
        "addSubAdmins": form.add_sub_admins,
        "timeZone": form.time_zone,
        "twoFactorAuth": form.two_factor_auth,
        "logo": form.logo,
        "registrationToken": token_value(token),
    })
}

fn apply_details(form: &mut OrganisationForm, data: &Value) {
    if let Some(code) = data.get("orgCode").and_then(Value::as_str) {
        form.org_code = code.to_string();
    }
}

fn apply_resume(form: &mut OrganisationForm, status: &RegistrationStatus) {
    if let Some(code) = &status.org_code {
        form.org_code.clone_from(code);
    }
    if let Some(name) = &status.organization_name {
        form.organisation_name.clone_from(name);
    }
}

fn review(form: &OrganisationForm, summary: ReviewSummary) -> ReviewSummary {
    summary
        .with_org_code(Some(form.org_code.clone()))
        .section(
            ReviewSection::new("Organisation Details")
                .text("Organisation Name", &form.organisation_name)
                .text("Country", &form.country)
                .text("State", &form.state)
                .text("City", &form.city)
                .text("Pincode", &form.pincode)
                .text("Organisation Type", &form.organisation_type)
                .text("Student Strength", &form.student_strength)
                .flag("Government Recognised", form.is_government_recognized),
        )
        .section(
            ReviewSection::new("Admin Details")
                .text("Admin Name", &form.admin_name)
                .text("Admin Email", &form.admin_email)
                .text("Admin Phone", &form.admin_phone)
                .secret("Password", &form.password),
        )
        .section(
            ReviewSection::new("Setup & Preferences")
                .text("Institution Structure", &form.institution_structure)
                .list("Departments", &form.departments)
                .flag("Add Sub-Admins", form.add_sub_admins)
                .text("Time Zone", &form.time_zone)
                .flag("Two-Factor Authentication", form.two_factor_auth),
        )
}

/// Builds the organisation wizard.
#[must_use]
pub fn definition() -> WizardDefinition<OrganisationForm> {
    WizardDefinition::builder(
        WizardKind::Organisation,
        "Organisation Registration",
        StepDefinition::new(
            "Organisation Details",
            &[
                "organisationName",
                "country",
                "state",
                "city",
                "pincode",
                "organisationType",
                "studentStrength",
                "isGovernmentRecognized",
            ],
            validate_details,
        )
        .submit(
            StepSubmit::new(1, details_payload)
                .apply(apply_details)
                .success_message("Organization details saved successfully!"),
        ),
    )
    .step(
        StepDefinition::new(
            "Admin Details",
            &[
                "adminName",
                "adminEmail",
                "adminPhone",
                "countryCode",
                "password",
                "confirmPassword",
                "emailVerified",
            ],
            validate_admin,
        )
        .submit(StepSubmit::new(2, admin_payload).success_message("Moving to setup preferences!")),
    )
    .step(
        StepDefinition::new(
            "Setup & Preferences",
            &[
                "logo",
                "institutionStructure",
                "departments",
                "addSubAdmins",
                "timeZone",
                "twoFactorAuth",
            ],
            validate_preferences,
        )
        .submit(StepSubmit::new(3, preferences_payload)),
    )
    .verifies(Channel::Email)
    .completion_message("Organization registered successfully!")
    .on_resume(apply_resume)
    .review(review)
    .build()
}
