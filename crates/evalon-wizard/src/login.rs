//! Login form validation and submission.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::{LoginRequest, RegistrationBackend};
use crate::error::{BackendErrorKind, EvalonError, Result};
use crate::form::ErrorMap;
use crate::session::{Session, UserType};
use crate::validate::is_valid_email;

/// Sign-in form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginForm {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Account type; defaults to organisation admin.
    pub user_type: UserType,
}

/// Result of a login attempt that reached the point of deciding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The form has inline errors; nothing was sent.
    Invalid(ErrorMap),
    /// The backend refused the credentials.
    Rejected(String),
    /// Signed in.
    SignedIn(Session),
}

/// Validates a login form.
#[must_use]
pub fn validate_login(form: &LoginForm) -> ErrorMap {
    let mut errors = ErrorMap::new();
    if errors.require("email", &form.email, "Email Is Required") {
        errors.check(
            is_valid_email(&form.email),
            "email",
            "Please Enter A Valid Email",
        );
    }
    errors.require("password", &form.password, "Password Is Required");
    errors
}

/// Validates `form` and, when valid, signs in through `backend`.
///
/// # Errors
///
/// Returns transport failures (network, timeout, undecodable responses).
/// Refused credentials are reported as [`LoginOutcome::Rejected`].
pub async fn login(backend: &dyn RegistrationBackend, form: &LoginForm) -> Result<LoginOutcome> {
    let errors = validate_login(form);
    if !errors.is_empty() {
        return Ok(LoginOutcome::Invalid(errors));
    }

    let request = LoginRequest {
        email: form.email.trim().to_lowercase(),
        password: form.password.clone(),
        user_type: form.user_type,
    };

    match backend.login(&request).await {
        Ok(session) => {
            info!(user_id = %session.user_id, user_type = %session.user_type, "Signed in");
            Ok(LoginOutcome::SignedIn(session))
        }
        Err(
            err @ EvalonError::Backend {
                kind: BackendErrorKind::Unauthorized | BackendErrorKind::Rejected,
                ..
            },
        ) => {
            warn!(email = %request.email, "Login rejected");
            Ok(LoginOutcome::Rejected(err.user_message()))
        }
        Err(err) => Err(err),
    }
}
