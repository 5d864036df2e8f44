//! Student registration.
//!
//! Four steps. Basic details and organisation verification are saved to the
//! backend as they validate; security verification (email and phone OTPs
//! plus password) is client-side only; the auto-mapping step completes the
//! registration.

use chrono::{NaiveDate, Utc};
use evalon_review::{ReviewSection, ReviewSummary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{check_email, check_pincode, duplicate_email_message, token_value};
use crate::form::{ErrorMap, FormDefaults, FormRecord};
use crate::otp::Channel;
use crate::validate::{age_on, parse_iso_date};
use crate::wizard::{StepDefinition, StepSubmit, WizardDefinition, WizardKind};

/// Youngest age accepted at registration.
pub const MIN_AGE: i32 = 5;
/// Oldest age accepted at registration.
pub const MAX_AGE: i32 = 100;

/// `registrationType` value for students without an institution.
pub const STANDALONE: &str = "standalone";

const DEFAULT_SUBJECTS: [&str; 4] = ["Mathematics", "Physics", "Chemistry", "English"];

/// Form record of the student wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudentForm {
    /// Student's full name.
    pub full_name: String,
    /// Phone number; verified by OTP.
    pub phone_number: String,
    /// Dialling code for `phone_number`.
    pub country_code: String,
    /// Email; verified by OTP.
    pub email_address: String,
    /// `YYYY-MM-DD`.
    pub date_of_birth: String,
    /// Gender.
    pub gender: String,
    /// Country code.
    pub country: String,
    /// City name.
    pub city: String,
    /// Six-digit postal code.
    pub pincode: String,

    /// `organization` or `standalone`.
    pub registration_type: String,
    /// Code of the organisation to join.
    pub organization_code: String,
    /// Resolved by the backend from `organization_code`.
    pub organization_name: String,
    /// Whether the backend accepted `organization_code`.
    pub is_organization_valid: bool,
    /// `verified`, `pending`, `not_found` or `standalone`.
    pub association_status: String,
    /// Registering without an organisation.
    pub is_standalone: bool,
    /// Current school or college, free text.
    pub current_institution: String,
    /// Grade or class.
    pub academic_level: String,

    /// Set by a successful email OTP verification.
    pub email_verified: bool,
    /// Set by a successful phone OTP verification.
    pub phone_verified: bool,
    /// Account password.
    pub password: String,
    /// Must equal `password`.
    pub confirm_password: String,

    /// Department, used as the subject list when present.
    pub department: String,
    /// Section.
    pub batch: String,
    /// Academic year.
    pub year: String,
    /// Set when the backend mapped the student automatically.
    pub is_auto_mapped: bool,
}

impl Default for StudentForm {
    fn default() -> Self {
        Self {
            full_name: String::new(),
            phone_number: String::new(),
            country_code: String::new(),
            email_address: String::new(),
            date_of_birth: String::new(),
            gender: String::new(),
            country: String::new(),
            city: String::new(),
            pincode: String::new(),
            registration_type: "organization".to_string(),
            organization_code: String::new(),
            organization_name: String::new(),
            is_organization_valid: false,
            association_status: String::new(),
            is_standalone: false,
            current_institution: String::new(),
            academic_level: String::new(),
            email_verified: false,
            phone_verified: false,
            password: String::new(),
            confirm_password: String::new(),
            department: String::new(),
            batch: String::new(),
            year: String::new(),
            is_auto_mapped: false,
        }
    }
}

impl StudentForm {
    /// Whether the student registers without an organisation.
    #[must_use]
    pub fn standalone(&self) -> bool {
        self.is_standalone || self.registration_type == STANDALONE
    }
}

impl FormRecord for StudentForm {
    const MANAGED_FIELDS: &'static [&'static str] = &[
        "emailVerified",
        "phoneVerified",
        "organizationName",
        "isOrganizationValid",
        "associationStatus",
        "isAutoMapped",
    ];

    fn new(defaults: &FormDefaults) -> Self {
        Self {
            country_code: defaults.country_code.clone(),
            ..Self::default()
        }
    }

    fn contact_field(channel: Channel) -> Option<&'static str> {
        Some(match channel {
            Channel::Email => "emailAddress",
            Channel::Phone => "phoneNumber",
        })
    }

    fn verified_field(channel: Channel) -> Option<&'static str> {
        Some(match channel {
            Channel::Email => "emailVerified",
            Channel::Phone => "phoneVerified",
        })
    }

    fn contact(&self, channel: Channel) -> Option<&str> {
        Some(match channel {
            Channel::Email => &self.email_address,
            Channel::Phone => &self.phone_number,
        })
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

/// Basic Details.
#[must_use]
pub fn validate_basic(form: &StudentForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    errors.require("fullName", &form.full_name, "Full Name Is Required");
    errors.require("phoneNumber", &form.phone_number, "Phone Number Is Required");
    check_email(
        &mut errors,
        "emailAddress",
        &form.email_address,
        "Email Address Is Required",
    );
    errors.require("dateOfBirth", &form.date_of_birth, "Date of Birth Is Required");
    errors.require("gender", &form.gender, "Gender Is Required");
    errors.require("country", &form.country, "Country Is Required");
    errors.require("city", &form.city, "City Is Required");
    check_pincode(&mut errors, &form.pincode);
    errors
}

/// Organization Verification.
#[must_use]
pub fn validate_organization(form: &StudentForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    if !form.standalone() {
        errors.require(
            "organizationCode",
            &form.organization_code,
            "Organization Code Is Required",
        );
    }
    errors
}

/// Security Verification.
#[must_use]
pub fn validate_security(form: &StudentForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    errors.check(form.email_verified, "emailVerified", "Please Verify Your Email");
    errors.check(
        form.phone_verified,
        "phoneVerified",
        "Please Verify Your Phone Number",
    );
    errors.require("password", &form.password, "Password Is Required");
    if errors.require(
        "confirmPassword",
        &form.confirm_password,
        "Confirm Password Is Required",
    ) {
        errors.check(
            form.password == form.confirm_password,
            "confirmPassword",
            "Passwords Do Not Match",
        );
    }
    errors
}

fn validate_nothing(_form: &StudentForm) -> ErrorMap {
    ErrorMap::new()
}

/// Checks a date of birth against `today`; returns the notification text on
/// failure.
#[must_use]
pub fn check_date_of_birth(date_of_birth: &str, today: NaiveDate) -> Option<String> {
    let trimmed = date_of_birth.trim();
    if trimmed.is_empty() {
        return Some("Please enter a valid date of birth".to_string());
    }
    let Some(birth) = parse_iso_date(trimmed) else {
        return Some("Please enter a valid date format (YYYY-MM-DD)".to_string());
    };
    let age = age_on(birth, today);
    if age < MIN_AGE {
        return Some(
            "You must be at least 5 years old to register. Please enter a valid birth date."
                .to_string(),
        );
    }
    if age > MAX_AGE {
        return Some(
            "Please enter a valid birth date. Age must be less than 100 years.".to_string(),
        );
    }
    None
}

fn date_of_birth_precheck(form: &StudentForm) -> Option<String> {
    check_date_of_birth(&form.date_of_birth, Utc::now().date_naive())
}

// ============================================================================
// Payloads
// ============================================================================

fn basic_payload(form: &StudentForm, _token: Option<&str>) -> Value {
    json!({
        "fullName": form.full_name.trim(),
        "phoneNumber": form.phone_number.trim(),
        "countryCode": form.country_code,
        "emailAddress": form.email_address.trim(),
        "dateOfBirth": form.date_of_birth.trim(),
        "gender": form.gender,
        "country": form.country,
        "city": form.city.trim(),
        "pincode": form.pincode.trim(),
    })
}

fn organization_payload(form: &StudentForm, token: Option<&str>) -> Value {
    let registration_type = if form.standalone() {
        STANDALONE
    } else {
        form.registration_type.as_str()
    };
    json!({
        "organizationCode": form.organization_code.trim(),
        "registrationToken": token_value(token),
        "registrationType": registration_type,
        "academicLevel": form.academic_level,
    })
}

fn completion_payload(form: &StudentForm, token: Option<&str>) -> Value {
    let or_default = |value: &str, default: &str| {
        if value.trim().is_empty() {
            default.to_string()
        } else {
            value.trim().to_string()
        }
    };
    let subjects: Vec<String> = if form.department.trim().is_empty() {
        DEFAULT_SUBJECTS.iter().map(ToString::to_string).collect()
    } else {
        vec![form.department.trim().to_string()]
    };
    json!({
        "password": form.password,
        "confirmPassword": form.confirm_password,
        "academicYear": or_default(&form.year, "2024-25"),
        "grade": or_default(&form.academic_level, "10"),
        "section": or_default(&form.batch, "A"),
        "subjects": subjects,
        "registrationToken": token_value(token),
    })
}

fn apply_organization(form: &mut StudentForm, data: &Value) {
    if let Some(name) = data.get("organizationName").and_then(Value::as_str) {
        form.organization_name = name.to_string();
    }
    if let Some(valid) = data.get("isOrganizationValid").and_then(Value::as_bool) {
        form.is_organization_valid = valid;
    }
    if let Some(status) = data.get("associationStatus").and_then(Value::as_str) {
        form.association_status = status.to_string();
    }
    if let Some(standalone) = data.get("isStandalone").and_then(Value::as_bool) {
        form.is_standalone = standalone;
    }
}

fn rejection_message(message: &str) -> String {
    duplicate_email_message(message, "Student with this email already exists")
        .unwrap_or_else(|| message.to_string())
}

fn review(form: &StudentForm, summary: ReviewSummary) -> ReviewSummary {
    let organization = if form.standalone() {
        ReviewSection::new("Organization Verification")
            .flag("Standalone", true)
            .text("Current Institution", &form.current_institution)
    } else {
        ReviewSection::new("Organization Verification")
            .text("Organization Code", &form.organization_code)
            .text("Organization", &form.organization_name)
            .text("Association Status", &form.association_status)
    };
    summary
        .section(
            ReviewSection::new("Basic Details")
                .text("Full Name", &form.full_name)
                .text("Date of Birth", &form.date_of_birth)
                .text("Gender", &form.gender)
                .text("Country", &form.country)
                .text("City", &form.city)
                .text("Pincode", &form.pincode),
        )
        .section(organization.text("Academic Level", &form.academic_level))
        .section(ReviewSection::new("Security Verification").secret("Password", &form.password))
        .section(
            ReviewSection::new("Auto Mapping")
                .text("Department", &form.department)
                .text("Batch", &form.batch)
                .text("Year", &form.year),
        )
}

/// Builds the student wizard.
#[must_use]
pub fn definition() -> WizardDefinition<StudentForm> {
    WizardDefinition::builder(
        WizardKind::Student,
        "Student Registration",
        StepDefinition::new(
            "Basic Details",
            &[
                "fullName",
                "phoneNumber",
                "countryCode",
                "emailAddress",
                "dateOfBirth",
                "gender",
                "country",
                "city",
                "pincode",
            ],
            validate_basic,
        )
        .submit(
            StepSubmit::new(1, basic_payload)
                .precheck(date_of_birth_precheck)
                .success_message("Basic details saved successfully!"),
        ),
    )
    .step(
        StepDefinition::new(
            "Organization Verification",
            &[
                "registrationType",
                "organizationCode",
                "isStandalone",
                "currentInstitution",
                "academicLevel",
            ],
            validate_organization,
        )
        .submit(StepSubmit::new(2, organization_payload).apply(apply_organization)),
    )
    .step(StepDefinition::new(
        "Security Verification",
        &["emailVerified", "phoneVerified", "password", "confirmPassword"],
        validate_security,
    ))
    .step(
        StepDefinition::new(
            "Auto Mapping",
            &["department", "batch", "year"],
            validate_nothing,
        )
        .submit(StepSubmit::new(4, completion_payload)),
    )
    .verifies(Channel::Email)
    .verifies(Channel::Phone)
    .completion_message("Registration completed successfully!")
    .rejection_message(rejection_message)
    .review(review)
    .build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::mock::{MockBackend, MOCK_OTP_CODE};
    use crate::session::UserType;
    use crate::wizard::{AdvanceOutcome, Wizard, WizardOptions};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn fill_basic(wizard: &mut Wizard<StudentForm>) {
        let now = Instant::now();
        for (field, value) in [
            ("fullName", json!("Meera Iyer")),
            ("phoneNumber", json!("9876543210")),
            ("emailAddress", json!("meera@mail.com")),
            ("dateOfBirth", json!("2010-05-01")),
            ("gender", json!("female")),
            ("country", json!("IN")),
            ("city", json!("Pune")),
            ("pincode", json!("411001")),
        ] {
            wizard.change_field(field, value, now).unwrap();
        }
    }

    #[test]
    fn test_basic_rules() {
        let errors = validate_basic(&StudentForm::default());
        assert_eq!(errors.get("phoneNumber"), Some("Phone Number Is Required"));
        assert_eq!(errors.get("dateOfBirth"), Some("Date of Birth Is Required"));
        assert_eq!(errors.get("gender"), Some("Gender Is Required"));
        assert_eq!(errors.len(), 8);
    }

    #[test]
    fn test_standalone_skips_organization_code() {
        let form = StudentForm::default();
        assert_eq!(
            validate_organization(&form).get("organizationCode"),
            Some("Organization Code Is Required")
        );

        let standalone = StudentForm {
            registration_type: STANDALONE.to_string(),
            ..StudentForm::default()
        };
        assert!(validate_organization(&standalone).is_empty());
    }

    #[test]
    fn test_security_rules() {
        let errors = validate_security(&StudentForm {
            password: "abc".to_string(),
            confirm_password: "abd".to_string(),
            ..StudentForm::default()
        });
        assert_eq!(errors.get("emailVerified"), Some("Please Verify Your Email"));
        assert_eq!(
            errors.get("phoneVerified"),
            Some("Please Verify Your Phone Number")
        );
        assert_eq!(errors.get("confirmPassword"), Some("Passwords Do Not Match"));
        assert!(!errors.contains("password"));
    }

    #[test]
    fn test_date_of_birth_checks() {
        assert_eq!(check_date_of_birth("2010-05-01", today()), None);
        assert_eq!(
            check_date_of_birth("01/05/2010", today()).as_deref(),
            Some("Please enter a valid date format (YYYY-MM-DD)")
        );
        assert!(check_date_of_birth("2023-01-01", today())
            .unwrap()
            .starts_with("You must be at least 5"));
        assert!(check_date_of_birth("1920-01-01", today())
            .unwrap()
            .contains("less than 100 years"));
        assert!(check_date_of_birth(" ", today()).is_some());
    }

    #[test]
    fn test_completion_payload_defaults() {
        let payload = completion_payload(&StudentForm::default(), Some("reg_9"));
        assert_eq!(payload["academicYear"], "2024-25");
        assert_eq!(payload["grade"], "10");
        assert_eq!(payload["section"], "A");
        assert_eq!(payload["subjects"].as_array().unwrap().len(), 4);

        let mapped = StudentForm {
            department: "Biology".to_string(),
            ..StudentForm::default()
        };
        assert_eq!(completion_payload(&mapped, None)["subjects"], json!(["Biology"]));
    }

    #[tokio::test]
    async fn test_underage_student_is_stopped_before_backend() {
        let backend = MockBackend::new();
        let mut wizard = Wizard::new(definition(), &WizardOptions::default());
        fill_basic(&mut wizard);
        let recent = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        wizard
            .change_field("dateOfBirth", json!(recent), Instant::now())
            .unwrap();

        let outcome = wizard.advance(&backend, Instant::now()).await;
        assert!(matches!(outcome, AdvanceOutcome::Rejected { .. }));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_organization_code_is_rejected() {
        let backend = MockBackend::new();
        let now = Instant::now();
        let mut wizard = Wizard::new(definition(), &WizardOptions::default());
        fill_basic(&mut wizard);
        wizard.advance(&backend, now).await;
        wizard
            .change_field("organizationCode", json!("XX-NOPE-2026-000"), now)
            .unwrap();

        let AdvanceOutcome::Rejected { notification } = wizard.advance(&backend, now).await else {
            panic!("expected rejection");
        };
        assert_eq!(notification.message, "Organization not found with this code");
        assert_eq!(wizard.step(), 1);
    }

    #[tokio::test]
    async fn test_complete_student_registration() {
        let backend = MockBackend::new().with_organization("IN-GRE-2026-K7Q", "Green Valley School");
        let now = Instant::now();
        let mut wizard = Wizard::new(definition(), &WizardOptions::default());

        fill_basic(&mut wizard);
        assert!(matches!(
            wizard.advance(&backend, now).await,
            AdvanceOutcome::Advanced { to: 1, .. }
        ));

        wizard
            .change_field("organizationCode", json!("in-gre-2026-k7q"), now)
            .unwrap();
        assert!(matches!(
            wizard.advance(&backend, now).await,
            AdvanceOutcome::Advanced { to: 2, .. }
        ));
        assert_eq!(wizard.form().organization_name, "Green Valley School");
        assert!(wizard.form().is_organization_valid);
        assert_eq!(wizard.form().association_status, "verified");

        for channel in [Channel::Email, Channel::Phone] {
            wizard.send_otp(channel, &backend, now).await.unwrap();
            let status = wizard
                .verify_otp(channel, MOCK_OTP_CODE, &backend, now)
                .await
                .unwrap();
            assert!(status.verified);
        }
        wizard.change_field("password", json!("Str0ng!pass"), now).unwrap();
        wizard
            .change_field("confirmPassword", json!("Str0ng!pass"), now)
            .unwrap();
        let calls_before = backend.call_count();
        assert!(matches!(
            wizard.advance(&backend, now).await,
            AdvanceOutcome::Advanced { to: 3, .. }
        ));
        assert_eq!(backend.call_count(), calls_before, "security step is local");

        let AdvanceOutcome::Completed { session } = wizard.advance(&backend, now).await else {
            panic!("expected completion");
        };
        let session = session.unwrap();
        assert_eq!(session.user_type, UserType::Student);
        assert!(session.organization_id.is_some());

        let review = wizard.review();
        assert!(review.all_verified());
    }
}
