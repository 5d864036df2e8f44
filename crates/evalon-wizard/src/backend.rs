//! Seams to the registration backend.
//!
//! The wizard never talks HTTP itself. It calls a [`RegistrationBackend`]
//! (and the API layer a [`LocationLookup`]); production wiring uses the
//! reqwest client from `evalon-backend`, tests use
//! [`MockBackend`](crate::mock::MockBackend).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EvalonError, Result};
use crate::otp::Channel;
use crate::session::{Session, UserType};
use crate::wizard::WizardKind;

// ============================================================================
// Wire types
// ============================================================================

/// Response envelope used by every backend route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the call succeeded.
    #[serde(default)]
    pub success: bool,
    /// Payload, present on success.
    pub data: Option<T>,
    /// Human-readable message, usually present on failure.
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Converts the envelope into its payload.
    ///
    /// # Errors
    ///
    /// Returns a rejected backend error carrying the envelope message when
    /// `success` is false or no payload is present.
    pub fn into_result(self) -> Result<T> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(EvalonError::backend(
                crate::error::BackendErrorKind::Decode,
                "response is missing its data payload",
            )),
            (false, _) => Err(EvalonError::rejected(self.message.unwrap_or_default())),
        }
    }
}

/// Where a registration session stands on the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatus {
    /// Whether the token still refers to a live session.
    pub session_valid: bool,
    /// Number of steps the backend has stored, `0` if none.
    #[serde(default)]
    pub last_completed_step: usize,
    /// Why the session is not valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Organisation name stored with the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    /// Organisation code issued at step 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_code: Option<String>,
}

/// Contact an OTP is sent to or verified for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpTarget {
    /// Channel being verified.
    pub channel: Channel,
    /// Email address or national phone number.
    pub contact: String,
    /// Dialling code, used for phone targets.
    pub country_code: String,
}

impl OtpTarget {
    /// JSON body for the send route.
    #[must_use]
    pub fn send_body(&self) -> Value {
        match self.channel {
            Channel::Email => serde_json::json!({
                "email": self.contact,
                "purpose": "registration",
            }),
            Channel::Phone => serde_json::json!({
                "phone": self.contact,
                "countryCode": self.country_code,
                "purpose": "registration",
            }),
        }
    }

    /// JSON body for the verify route.
    #[must_use]
    pub fn verify_body(&self, code: &str) -> Value {
        match self.channel {
            Channel::Email => serde_json::json!({
                "email": self.contact.to_lowercase(),
                "otp": code,
            }),
            Channel::Phone => serde_json::json!({
                "phone": self.contact,
                "countryCode": self.country_code,
                "otp": code,
            }),
        }
    }

    /// Full phone number or lowercased email, as the backend keys OTPs.
    #[must_use]
    pub fn key(&self) -> String {
        match self.channel {
            Channel::Email => self.contact.to_lowercase(),
            Channel::Phone => format!("{}{}", self.country_code, self.contact),
        }
    }
}

/// Which verify route an OTP check goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyRoute {
    /// `/organizations/register/verify-*-otp`, used during organisation signup.
    Registration,
    /// `/organizations/auth/verify-*-otp`, used by the other flows.
    Auth,
}

/// Credentials sent to the login route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
    /// Account type being signed into.
    pub user_type: UserType,
}

// ============================================================================
// Location types
// ============================================================================

/// A country offered in address pickers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    /// ISO 3166-1 alpha-2 code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Dialling code, with or without `+`.
    #[serde(default, alias = "phonecode")]
    pub phone_code: String,
    /// ISO 4217 currency code.
    #[serde(default)]
    pub currency: String,
    /// Currency symbol.
    #[serde(default, alias = "currency_symbol")]
    pub currency_symbol: String,
}

/// A state or province.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct State {
    /// State code, unique within its country.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Owning country code.
    #[serde(default, alias = "country_code")]
    pub country_code: String,
}

/// A city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct City {
    /// Display name.
    pub name: String,
    /// Owning state code.
    #[serde(default, alias = "state_code")]
    pub state_code: String,
    /// Owning country code.
    #[serde(default, alias = "country_code")]
    pub country_code: String,
}

// ============================================================================
// Traits
// ============================================================================

/// Registration, OTP and login calls against the backend.
#[async_trait]
pub trait RegistrationBackend: Send + Sync {
    /// Submits step `step` (1-based) of a registration and returns the
    /// response `data` object.
    async fn submit_step(&self, kind: WizardKind, step: usize, payload: &Value) -> Result<Value>;

    /// Looks up a registration session by token.
    async fn registration_status(
        &self,
        kind: WizardKind,
        registration_token: &str,
    ) -> Result<RegistrationStatus>;

    /// Asks the backend to deliver an OTP.
    async fn send_otp(&self, target: &OtpTarget) -> Result<()>;

    /// Checks an OTP.
    async fn verify_otp(&self, target: &OtpTarget, code: &str, route: VerifyRoute) -> Result<()>;

    /// Signs in and returns the resulting session.
    async fn login(&self, request: &LoginRequest) -> Result<Session>;
}

/// Country, state and city lookups.
#[async_trait]
pub trait LocationLookup: Send + Sync {
    /// All countries.
    async fn countries(&self) -> Result<Vec<Country>>;

    /// States of `country`.
    async fn states(&self, country: &str) -> Result<Vec<State>>;

    /// Cities of `state` in `country`.
    async fn cities(&self, country: &str, state: &str) -> Result<Vec<City>>;
}
