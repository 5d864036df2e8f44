//! OTP verification widget state.
//!
//! One [`OtpWidget`] exists per verified contact channel of a wizard. The
//! widget only tracks state; the wizard performs the backend calls and
//! reports their outcome back through the `*_succeeded`/`*_failed` methods.
//!
//! Time is passed in explicitly (`now`) so cooldown behaviour is
//! deterministic under test.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{EvalonError, Result};

/// Inline message shown when verify is pressed with an empty code.
pub const EMPTY_CODE_MESSAGE: &str = "Please enter the OTP";

// ============================================================================
// Channel
// ============================================================================

/// A contact channel that can be verified with a one-time password.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Email address.
    Email,
    /// Phone number.
    Phone,
}

impl Channel {
    /// Both channels, in display order.
    pub const ALL: [Self; 2] = [Self::Email, Self::Phone];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Phone => write!(f, "phone"),
        }
    }
}

impl FromStr for Channel {
    type Err = EvalonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            _ => Err(EvalonError::unsupported_channel(s)),
        }
    }
}

// ============================================================================
// OtpState
// ============================================================================

/// State of an OTP widget.
///
/// The state transitions:
/// - `Idle` -> `Sending` -> `Sent` (or back to `Idle` when sending fails)
/// - `Sent` -> `Verifying` -> `Verified` (or back to `Sent` when verification fails)
/// - `Sent` -> `Sending` once the resend cooldown has elapsed
///
/// Any state returns to `Idle` when the contact value changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpState {
    /// Nothing sent yet.
    #[default]
    Idle,
    /// Send request in flight.
    Sending,
    /// Code delivered; waiting for the user to enter it.
    Sent,
    /// Verify request in flight.
    Verifying,
    /// Contact verified.
    Verified,
}

impl OtpState {
    /// Returns `true` while a backend request is in flight.
    ///
    /// # Examples
    ///
    /// ```
    /// use evalon_wizard::otp::OtpState;
    ///
    /// assert!(OtpState::Sending.is_busy());
    /// assert!(OtpState::Verifying.is_busy());
    /// assert!(!OtpState::Sent.is_busy());
    /// ```
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Sending | Self::Verifying)
    }

    /// Returns `true` once a code has been delivered.
    #[must_use]
    pub const fn has_sent(&self) -> bool {
        matches!(self, Self::Sent | Self::Verifying | Self::Verified)
    }
}

impl fmt::Display for OtpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Sending => write!(f, "sending"),
            Self::Sent => write!(f, "sent"),
            Self::Verifying => write!(f, "verifying"),
            Self::Verified => write!(f, "verified"),
        }
    }
}

// ============================================================================
// VerificationStatus
// ============================================================================

/// Snapshot of a widget, as reported to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatus {
    /// Current widget state.
    pub state: OtpState,
    /// Whether a code has been delivered.
    pub sent: bool,
    /// Whether the contact is verified.
    pub verified: bool,
    /// Seconds until a resend is allowed; zero when allowed.
    pub countdown: u64,
    /// Inline error from the last send or verify attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        Self {
            state: OtpState::Idle,
            sent: false,
            verified: false,
            countdown: 0,
            error: None,
        }
    }
}

// ============================================================================
// OtpWidget
// ============================================================================

/// Per-channel OTP widget.
#[derive(Debug, Clone)]
pub struct OtpWidget {
    state: OtpState,
    cooldown: Duration,
    sent_at: Option<Instant>,
    error: Option<String>,
}

impl OtpWidget {
    /// Creates an idle widget with the given resend cooldown.
    #[must_use]
    pub const fn new(cooldown: Duration) -> Self {
        Self {
            state: OtpState::Idle,
            cooldown,
            sent_at: None,
            error: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> OtpState {
        self.state
    }

    /// Inline error from the last attempt.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Seconds left before a resend is allowed, rounded up.
    #[must_use]
    pub fn countdown(&self, now: Instant) -> u64 {
        if self.state != OtpState::Sent {
            return 0;
        }
        self.sent_at.map_or(0, |sent_at| {
            let remaining = self.cooldown.saturating_sub(now.saturating_duration_since(sent_at));
            let secs = remaining.as_secs();
            if remaining.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
    }

    /// Moves to `Sending`.
    ///
    /// Allowed from `Idle`, and from `Sent` once the cooldown has elapsed.
    ///
    /// # Errors
    ///
    /// Returns `EvalonError::OtpCooldown` while the cooldown is running and
    /// `EvalonError::InvalidOtpTransition` from any other state.
    pub fn begin_send(&mut self, channel: Channel, now: Instant) -> Result<()> {
        match self.state {
            OtpState::Idle => {}
            OtpState::Sent => {
                let remaining = self.countdown(now);
                if remaining > 0 {
                    return Err(EvalonError::otp_cooldown(channel, remaining));
                }
            }
            other => return Err(EvalonError::invalid_otp_transition(other, OtpState::Sending)),
        }
        self.state = OtpState::Sending;
        self.error = None;
        Ok(())
    }

    /// Records a delivered code and starts the cooldown.
    pub fn send_succeeded(&mut self, now: Instant) {
        if self.state == OtpState::Sending {
            self.state = OtpState::Sent;
            self.sent_at = Some(now);
            self.error = None;
        }
    }

    /// Records a failed send; the widget returns to `Idle`.
    pub fn send_failed(&mut self, message: impl Into<String>) {
        if self.state == OtpState::Sending {
            self.state = OtpState::Idle;
            self.sent_at = None;
            self.error = Some(message.into());
        }
    }

    /// Moves to `Verifying` if `code` is non-empty.
    ///
    /// An empty code leaves the widget in `Sent` with an inline error and
    /// returns `Ok(false)`; no backend call should be made.
    ///
    /// # Errors
    ///
    /// Returns `EvalonError::InvalidOtpTransition` unless the widget is `Sent`.
    pub fn begin_verify(&mut self, code: &str) -> Result<bool> {
        if self.state != OtpState::Sent {
            return Err(EvalonError::invalid_otp_transition(
                self.state,
                OtpState::Verifying,
            ));
        }
        if code.trim().is_empty() {
            self.error = Some(EMPTY_CODE_MESSAGE.to_string());
            return Ok(false);
        }
        self.state = OtpState::Verifying;
        self.error = None;
        Ok(true)
    }

    /// Records a successful verification.
    pub fn verify_succeeded(&mut self) {
        if self.state == OtpState::Verifying {
            self.state = OtpState::Verified;
            self.error = None;
        }
    }

    /// Records a failed verification; the widget returns to `Sent`.
    pub fn verify_failed(&mut self, message: impl Into<String>) {
        if self.state == OtpState::Verifying {
            self.state = OtpState::Sent;
            self.error = Some(message.into());
        }
    }

    /// Returns the widget to `Idle`, forgetting any sent code.
    pub fn reset(&mut self) {
        self.state = OtpState::Idle;
        self.sent_at = None;
        self.error = None;
    }

    /// Snapshot for the UI.
    #[must_use]
    pub fn status(&self, now: Instant) -> VerificationStatus {
        VerificationStatus {
            state: self.state,
            sent: self.state.has_sent(),
            verified: self.state == OtpState::Verified,
            countdown: self.countdown(now),
            error: self.error.clone(),
        }
    }
}
