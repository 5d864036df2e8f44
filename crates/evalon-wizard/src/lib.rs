//! Evalon Onboarding Wizards
//!
//! Multi-step registration for organisations, teachers and students, with
//! OTP contact verification, password strength scoring, login, and the HTTP
//! API a thin UI drives them through.

pub mod any;
pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod form;
pub mod login;
pub mod mock;
pub mod otp;
pub mod password;
pub mod registration;
pub mod session;
pub mod validate;
pub mod wizard;

pub use any::AnyWizard;
pub use api::{
    create_router, AdvanceResponse, AppState, CreateWizardRequest, ErrorResponse,
    FieldUpdateRequest, HealthResponse, PasswordResponse, ResumeWizardRequest, SessionView,
    VerifyOtpRequest,
};
pub use backend::{
    ApiEnvelope, City, Country, LocationLookup, LoginRequest, OtpTarget, RegistrationBackend,
    RegistrationStatus, State, VerifyRoute,
};
pub use config::Config;
pub use error::{BackendErrorKind, EvalonError, Result};
pub use form::{ErrorMap, FormDefaults, FormRecord};
pub use login::{login, validate_login, LoginForm, LoginOutcome};
pub use otp::{Channel, OtpState, OtpWidget, VerificationStatus};
pub use password::{password_tips, score_password, PasswordStrength, StrengthColor};
pub use registration::{OrganisationForm, StudentForm, TeacherForm};
pub use session::{Session, UserType};
pub use wizard::{
    AdvanceOutcome, Notification, Severity, StepChange, Wizard, WizardDefinition, WizardKind,
    WizardOptions, WizardView,
};
