//! Teacher registration.
//!
//! Three steps, each saved to the backend as soon as it validates. The last
//! one sets the password and completes the registration. No contact is
//! OTP-verified in this flow.

use evalon_review::{ReviewSection, ReviewSummary};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{check_email, check_pincode, duplicate_email_message, token_value};
use crate::form::{ErrorMap, FormDefaults, FormRecord};
use crate::otp::Channel;
use crate::wizard::{StepDefinition, StepSubmit, WizardDefinition, WizardKind};

/// Affiliation value that makes `experienceLevel` mandatory.
pub const FREELANCE: &str = "freelance";

const STEP_SAVED: &str = "Step saved successfully!";

/// Form record of the teacher wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TeacherForm {
    /// Teacher's full name.
    pub full_name: String,
    /// Optional phone number.
    pub phone_number: String,
    /// Dialling code for `phone_number`.
    pub country_code: String,
    /// Sign-in email.
    pub email_address: String,
    /// Country code.
    pub country: String,
    /// City name.
    pub city: String,
    /// Six-digit postal code.
    pub pincode: String,

    /// Subjects taught.
    pub subjects: Vec<String>,
    /// Teaching role.
    pub role: String,
    /// `organization` or `freelance`.
    pub affiliation_type: String,
    /// Required for freelancers.
    pub experience_level: String,
    /// Where the teacher works today.
    pub current_institution: String,
    /// Free-form years of experience.
    pub years_of_experience: String,

    /// Account password.
    pub password: String,
    /// Must equal `password`.
    pub confirm_password: String,
}

impl Default for TeacherForm {
    fn default() -> Self {
        Self {
            full_name: String::new(),
            phone_number: String::new(),
            country_code: String::new(),
            email_address: String::new(),
            country: String::new(),
            city: String::new(),
            pincode: String::new(),
            subjects: Vec::new(),
            role: String::new(),
            affiliation_type: "organization".to_string(),
            experience_level: String::new(),
            current_institution: String::new(),
            years_of_experience: String::new(),
            password: String::new(),
            confirm_password: String::new(),
        }
    }
}

impl FormRecord for TeacherForm {
    const MANAGED_FIELDS: &'static [&'static str] = &[];

    fn new(defaults: &FormDefaults) -> Self {
        Self {
            country_code: defaults.country_code.clone(),
            ..Self::default()
        }
    }

    fn contact_field(_channel: Channel) -> Option<&'static str> {
        None
    }

    fn contact(&self, _channel: Channel) -> Option<&str> {
        None
    }

    fn country_code(&self) -> &str {
        &self.country_code
    }

    fn is_verified(&self, _channel: Channel) -> bool {
        false
    }

    fn set_verified(&mut self, _channel: Channel, _verified: bool) {}
}

/// Basic Details.
#[must_use]
pub fn validate_basic(form: &TeacherForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    errors.require("fullName", &form.full_name, "Full Name Is Required");
    check_email(
        &mut errors,
        "emailAddress",
        &form.email_address,
        "Email Address Is Required",
    );
    errors.require("country", &form.country, "Country Is Required");
    errors.require("city", &form.city, "City Is Required");
    check_pincode(&mut errors, &form.pincode);
    errors
}

/// Professional Details.
#[must_use]
pub fn validate_professional(form: &TeacherForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    errors.check(
        !form.subjects.is_empty(),
        "subjects",
        "Please Select At Least One Subject",
    );
    errors.require("role", &form.role, "Role Is Required");
    errors.require(
        "affiliationType",
        &form.affiliation_type,
        "Affiliation Type Is Required",
    );
    if form.affiliation_type == FREELANCE {
        errors.require(
            "experienceLevel",
            &form.experience_level,
            "Experience Level Is Required",
        );
    }
    errors
}

/// Complete Registration.
#[must_use]
pub fn validate_password(form: &TeacherForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    if errors.require("password", &form.password, "Password Is Required") {
        errors.check(
            form.password.chars().count() >= 8,
            "password",
            "Password must be at least 8 characters",
        );
    }
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

fn basic_payload(form: &TeacherForm, _token: Option<&str>) -> Value {
    json!({
        "fullName": form.full_name.trim(),
        "phoneNumber": form.phone_number.trim(),
        "countryCode": form.country_code,
        "emailAddress": form.email_address.trim(),
        "country": form.country,
        "city": form.city.trim(),
        "pincode": form.pincode.trim(),
    })
}

fn professional_payload(form: &TeacherForm, token: Option<&str>) -> Value {
    json!({
        "subjects": form.subjects,
        "role": form.role,
        "affiliationType": form.affiliation_type,
        "experienceLevel": form.experience_level,
        "currentInstitution": form.current_institution,
        "yearsOfExperience": form.years_of_experience,
        "registrationToken": token_value(token),
    })
}

fn password_payload(form: &TeacherForm, token: Option<&str>) -> Value {
    json!({
        "password": form.password,
        "confirmPassword": form.confirm_password,
        "registrationToken": token_value(token),
    })
}

fn rejection_message(message: &str) -> String {
    duplicate_email_message(message, "Teacher with this email already exists")
        .unwrap_or_else(|| message.to_string())
}

fn review(form: &TeacherForm, summary: ReviewSummary) -> ReviewSummary {
    let phone = if form.phone_number.trim().is_empty() {
        String::new()
    } else {
        format!("{} {}", form.country_code, form.phone_number.trim())
    };
    summary
        .section(
            ReviewSection::new("Basic Details")
                .text("Full Name", &form.full_name)
                .text("Email Address", &form.email_address)
                .text("Phone Number", &phone)
                .text("Country", &form.country)
                .text("City", &form.city)
                .text("Pincode", &form.pincode),
        )
        .section(
            ReviewSection::new("Professional Details")
                .list("Subjects", &form.subjects)
                .text("Role", &form.role)
                .text("Affiliation", &form.affiliation_type)
                .text("Experience Level", &form.experience_level)
                .text("Current Institution", &form.current_institution)
                .text("Years of Experience", &form.years_of_experience),
        )
        .section(ReviewSection::new("Complete Registration").secret("Password", &form.password))
}

/// Builds the teacher wizard.
#[must_use]
pub fn definition() -> WizardDefinition<TeacherForm> {
    WizardDefinition::builder(
        WizardKind::Teacher,
        "Teacher Registration",
        StepDefinition::new(
            "Basic Details",
            &[
                "fullName",
                "phoneNumber",
                "countryCode",
                "emailAddress",
                "country",
                "city",
                "pincode",
            ],
            validate_basic,
        )
        .submit(StepSubmit::new(1, basic_payload).success_message(STEP_SAVED)),
    )
    .step(
        StepDefinition::new(
            "Professional Details",
            &[
                "subjects",
                "role",
                "affiliationType",
                "experienceLevel",
                "currentInstitution",
                "yearsOfExperience",
            ],
            validate_professional,
        )
        .submit(StepSubmit::new(2, professional_payload).success_message(STEP_SAVED)),
    )
    .step(
        StepDefinition::new(
            "Complete Registration",
            &["password", "confirmPassword"],
            validate_password,
        )
        .submit(StepSubmit::new(3, password_payload)),
    )
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
    use crate::mock::MockBackend;
    use crate::session::UserType;
    use crate::wizard::{AdvanceOutcome, Severity, Wizard, WizardOptions};

    fn basic_fields(wizard: &mut Wizard<TeacherForm>, email: &str) {
        let now = Instant::now();
        for (field, value) in [
            ("fullName", json!("Asha Rao")),
            ("emailAddress", json!(email)),
            ("country", json!("IN")),
            ("city", json!("Bengaluru")),
            ("pincode", json!("560001")),
        ] {
            wizard.change_field(field, value, now).unwrap();
        }
    }

    #[test]
    fn test_basic_rules() {
        let errors = validate_basic(&TeacherForm::default());
        assert_eq!(errors.get("fullName"), Some("Full Name Is Required"));
        assert_eq!(errors.get("emailAddress"), Some("Email Address Is Required"));
        assert_eq!(errors.get("pincode"), Some("Pincode Is Required"));
        assert!(!errors.contains("phoneNumber"), "phone is optional");

        let form = TeacherForm {
            email_address: "asha@".to_string(),
            pincode: "5600".to_string(),
            ..TeacherForm::default()
        };
        let errors = validate_basic(&form);
        assert_eq!(errors.get("emailAddress"), Some("Please Enter A Valid Email"));
        assert_eq!(errors.get("pincode"), Some("Pincode Must Be 6 Digits"));
    }

    #[test]
    fn test_freelance_needs_experience_level() {
        let mut form = TeacherForm {
            subjects: vec!["Physics".to_string()],
            role: "lecturer".to_string(),
            ..TeacherForm::default()
        };
        assert!(validate_professional(&form).is_empty());

        form.affiliation_type = FREELANCE.to_string();
        let errors = validate_professional(&form);
        assert_eq!(
            errors.get("experienceLevel"),
            Some("Experience Level Is Required")
        );

        form.subjects.clear();
        assert_eq!(
            validate_professional(&form).get("subjects"),
            Some("Please Select At Least One Subject")
        );
    }

    #[test]
    fn test_password_rules() {
        let form = TeacherForm {
            password: "short".to_string(),
            confirm_password: "shorter".to_string(),
            ..TeacherForm::default()
        };
        let errors = validate_password(&form);
        assert_eq!(
            errors.get("password"),
            Some("Password must be at least 8 characters")
        );
        assert_eq!(errors.get("confirmPassword"), Some("Passwords Do Not Match"));

        let errors = validate_password(&TeacherForm::default());
        assert_eq!(errors.get("password"), Some("Password Is Required"));
        assert_eq!(
            errors.get("confirmPassword"),
            Some("Confirm Password Is Required")
        );
    }

    #[test]
    fn test_rejection_message_mapping() {
        assert!(rejection_message("Teacher with this email already exists")
            .contains("invited by an admin"));
        assert_eq!(rejection_message("Invalid pincode"), "Invalid pincode");
    }

    #[tokio::test]
    async fn test_duplicate_email_becomes_friendly_notification() {
        let backend = MockBackend::new().with_registered_email("asha@school.edu");
        let mut wizard = Wizard::new(definition(), &WizardOptions::default());
        basic_fields(&mut wizard, "asha@school.edu");

        let outcome = wizard.advance(&backend, Instant::now()).await;
        let AdvanceOutcome::Rejected { notification } = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(notification.severity, Severity::Error);
        assert!(notification.message.contains("invited by an admin"));
        assert_eq!(wizard.step(), 0);
    }

    #[tokio::test]
    async fn test_complete_teacher_registration() {
        let backend = MockBackend::new();
        let now = Instant::now();
        let mut wizard = Wizard::new(definition(), &WizardOptions::default());
        basic_fields(&mut wizard, "asha@school.edu");
        assert!(matches!(
            wizard.advance(&backend, now).await,
            AdvanceOutcome::Advanced { to: 1, .. }
        ));

        wizard.change_field("subjects", json!(["Physics"]), now).unwrap();
        wizard.change_field("role", json!("lecturer"), now).unwrap();
        assert!(matches!(
            wizard.advance(&backend, now).await,
            AdvanceOutcome::Advanced { to: 2, .. }
        ));

        wizard.change_field("password", json!("Str0ng!pass"), now).unwrap();
        wizard
            .change_field("confirmPassword", json!("Str0ng!pass"), now)
            .unwrap();
        let AdvanceOutcome::Completed { session } = wizard.advance(&backend, now).await else {
            panic!("expected completion");
        };
        assert_eq!(session.unwrap().user_type, UserType::Teacher);
        assert_eq!(wizard.step(), 2);
        assert!(wizard.form().password.is_empty());
        assert_eq!(wizard.view(now).unwrap().form["password"], "");
    }
}
