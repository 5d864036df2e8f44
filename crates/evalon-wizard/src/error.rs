//! Error types for the Evalon onboarding engine.
//!
//! Field validation problems are *not* errors: they are reported through
//! [`ErrorMap`](crate::ErrorMap) and never leave the wizard. The variants here
//! cover configuration loading, malformed field updates, backend failures and
//! OTP widget misuse.

use std::path::PathBuf;

/// A specialized `Result` type for Evalon onboarding operations.
pub type Result<T> = std::result::Result<T, EvalonError>;

/// Errors that can occur while driving an onboarding flow.
#[derive(Debug, thiserror::Error)]
pub enum EvalonError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your evalon.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Field Update Errors
    // ========================================================================
    /// The form has no field with this name.
    #[error("Unknown form field '{field}'")]
    UnknownField {
        /// The rejected field name.
        field: String,
    },

    /// The value does not fit the field's type.
    #[error("Invalid value for field '{field}': {message}")]
    InvalidFieldValue {
        /// The field being updated.
        field: String,
        /// Why the value was rejected.
        message: String,
    },

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// A step needs a registration token but none has been issued yet.
    #[error("Registration session expired. Please start registration from step 1.")]
    MissingRegistrationToken,

    /// The registration backend failed or rejected a request.
    #[error("Backend error ({kind}): {message}")]
    Backend {
        /// Failure category.
        kind: BackendErrorKind,
        /// Message from the backend or the transport.
        message: String,
    },

    // ========================================================================
    // OTP Errors
    // ========================================================================
    /// A resend was requested while the cooldown is still running.
    #[error("Please wait {remaining_secs}s before requesting another {channel} OTP")]
    OtpCooldown {
        /// Channel the OTP was requested for.
        channel: String,
        /// Seconds left on the cooldown.
        remaining_secs: u64,
    },

    /// The OTP widget cannot perform this transition from its current state.
    #[error("Invalid OTP transition: cannot go from {from} to {to}")]
    InvalidOtpTransition {
        /// The current widget state.
        from: String,
        /// The attempted target state.
        to: String,
    },

    /// The wizard does not verify this contact channel.
    #[error("This wizard does not verify the {channel} channel")]
    UnsupportedChannel {
        /// The requested channel.
        channel: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// No wizard session exists with this id.
    #[error("Wizard session not found: {id}")]
    SessionNotFound {
        /// The requested session id.
        id: String,
    },

    /// The wizard has already completed; its form is read-only.
    #[error("The {kind} registration is already completed")]
    WizardCompleted {
        /// Flow of the completed wizard.
        kind: String,
    },

    // ========================================================================
    // General Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A review summary could not be rendered.
    #[error("Review error: {0}")]
    Review(#[from] evalon_review::ReviewError),
}

/// Categories of backend failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The backend could not be reached.
    Network,
    /// The request exceeded the client timeout.
    Timeout,
    /// Credentials were refused.
    Unauthorized,
    /// The backend answered with `success: false` or an error status.
    Rejected,
    /// The response body could not be decoded.
    Decode,
}

impl std::fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::Rejected => write!(f, "rejected"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

impl EvalonError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `UnknownField` error.
    #[must_use]
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
        }
    }

    /// Creates a new `InvalidFieldValue` error.
    #[must_use]
    pub fn invalid_field_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self::Backend {
            kind,
            message: message.into(),
        }
    }

    /// Creates a `Backend` error for a request the backend refused.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::backend(BackendErrorKind::Rejected, message)
    }

    /// Creates a new `OtpCooldown` error.
    #[must_use]
    pub fn otp_cooldown(channel: impl std::fmt::Display, remaining_secs: u64) -> Self {
        Self::OtpCooldown {
            channel: channel.to_string(),
            remaining_secs,
        }
    }

    /// Creates a new `InvalidOtpTransition` error.
    #[must_use]
    pub fn invalid_otp_transition(
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::InvalidOtpTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new `UnsupportedChannel` error.
    #[must_use]
    pub fn unsupported_channel(channel: impl std::fmt::Display) -> Self {
        Self::UnsupportedChannel {
            channel: channel.to_string(),
        }
    }

    /// Creates a new `SessionNotFound` error.
    #[must_use]
    pub fn session_not_found(id: impl std::fmt::Display) -> Self {
        Self::SessionNotFound { id: id.to_string() }
    }

    /// Creates a new `WizardCompleted` error.
    #[must_use]
    pub fn wizard_completed(kind: impl std::fmt::Display) -> Self {
        Self::WizardCompleted {
            kind: kind.to_string(),
        }
    }

    /// Returns `true` if the user may simply retry the same action.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Backend {
                kind: BackendErrorKind::Network | BackendErrorKind::Timeout,
                ..
            } | Self::OtpCooldown { .. }
        )
    }

    /// Returns the text shown to the user in a top-level notification.
    ///
    /// Backend rejections carry their own message; transport problems get a
    /// generic retry prompt.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend {
                kind: BackendErrorKind::Network,
                ..
            } => "Backend server is not connected. Please try again.".to_string(),
            Self::Backend {
                kind: BackendErrorKind::Timeout,
                ..
            } => "The server took too long to respond. Please try again.".to_string(),
            Self::Backend { message, .. } if message.trim().is_empty() => {
                "An error occurred. Please try again.".to_string()
            }
            Self::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
