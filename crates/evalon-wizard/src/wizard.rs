//! The generic registration wizard engine.
//!
//! A wizard is a [`WizardDefinition`] (the ordered steps, each with a
//! validator and an optional backend submission) plus the mutable state of
//! one user's run through it: the typed form, the current step index, the
//! per-field error map, OTP widgets and the registration token issued by the
//! backend.
//!
//! The engine is deliberately synchronous about time: every operation that
//! depends on the clock takes `now` so behaviour is reproducible in tests.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use evalon_review::{ReviewStatus, ReviewSummary};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::{OtpTarget, RegistrationBackend, RegistrationStatus, VerifyRoute};
use crate::config::Config;
use crate::error::{BackendErrorKind, EvalonError, Result};
use crate::form::{apply_field, clear_secrets, redacted, ErrorMap, FormDefaults, FormRecord};
use crate::otp::{Channel, OtpWidget, VerificationStatus};
use crate::session::{Session, UserType};

/// Notification shown when a later step is submitted without a token.
pub const SESSION_EXPIRED_MESSAGE: &str =
    "Registration session expired. Please start registration from step 1.";

// ============================================================================
// WizardKind
// ============================================================================

/// The registration flows Evalon offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WizardKind {
    /// Organisation (institution) signup.
    #[serde(rename = "organization", alias = "organisation")]
    Organisation,
    /// Teacher signup.
    Teacher,
    /// Student signup.
    Student,
}

impl WizardKind {
    /// Path segment of the backend's registration routes.
    #[must_use]
    pub const fn route_segment(&self) -> &'static str {
        match self {
            Self::Organisation => "organizations",
            Self::Teacher => "teachers",
            Self::Student => "students",
        }
    }

    /// Account type created by this flow.
    #[must_use]
    pub const fn user_type(&self) -> UserType {
        match self {
            Self::Organisation => UserType::OrganizationAdmin,
            Self::Teacher => UserType::Teacher,
            Self::Student => UserType::Student,
        }
    }

    /// Route used to verify OTPs in this flow.
    #[must_use]
    pub const fn verify_route(&self) -> VerifyRoute {
        match self {
            Self::Organisation => VerifyRoute::Registration,
            Self::Teacher | Self::Student => VerifyRoute::Auth,
        }
    }
}

impl fmt::Display for WizardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organisation => write!(f, "organization"),
            Self::Teacher => write!(f, "teacher"),
            Self::Student => write!(f, "student"),
        }
    }
}

impl FromStr for WizardKind {
    type Err = EvalonError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "organization" | "organisation" => Ok(Self::Organisation),
            "teacher" => Ok(Self::Teacher),
            "student" => Ok(Self::Student),
            _ => Err(EvalonError::invalid_field_value(
                "kind",
                format!("unknown wizard kind '{s}': expected organization, teacher or student"),
            )),
        }
    }
}

// ============================================================================
// Notification
// ============================================================================

/// Severity of a top-level notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Operation succeeded.
    Success,
    /// Neutral information.
    Info,
    /// Something needs attention.
    Warning,
    /// Operation failed.
    Error,
}

/// A message shown above the form rather than next to a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Text to show.
    pub message: String,
    /// Severity.
    pub severity: Severity,
}

impl Notification {
    /// Creates a success notification.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Success,
        }
    }

    /// Creates a warning notification.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    /// Creates an error notification.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

// ============================================================================
// Definitions
// ============================================================================

/// Backend submission attached to a step.
pub struct StepSubmit<F> {
    /// One-based step number on the backend.
    pub backend_step: usize,
    /// Whether the call needs the registration token from step 1.
    pub requires_token: bool,
    /// Builds the request body from the form and the current token.
    pub payload: fn(&F, Option<&str>) -> Value,
    /// Checks run after field validation; a message aborts the submission.
    pub precheck: Option<fn(&F) -> Option<String>>,
    /// Folds response data back into the form.
    pub apply: Option<fn(&mut F, &Value)>,
    /// Notification shown when the step is accepted.
    pub success_message: Option<&'static str>,
}

impl<F> Clone for StepSubmit<F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<F> Copy for StepSubmit<F> {}

impl<F> StepSubmit<F> {
    /// Creates a submission for backend step `backend_step`.
    #[must_use]
    pub const fn new(backend_step: usize, payload: fn(&F, Option<&str>) -> Value) -> Self {
        Self {
            backend_step,
            requires_token: backend_step > 1,
            payload,
            precheck: None,
            apply: None,
            success_message: None,
        }
    }

    /// Adds a pre-submission check.
    #[must_use]
    pub const fn precheck(mut self, check: fn(&F) -> Option<String>) -> Self {
        self.precheck = Some(check);
        self
    }

    /// Adds a response applier.
    #[must_use]
    pub const fn apply(mut self, apply: fn(&mut F, &Value)) -> Self {
        self.apply = Some(apply);
        self
    }

    /// Sets the success notification.
    #[must_use]
    pub const fn success_message(mut self, message: &'static str) -> Self {
        self.success_message = Some(message);
        self
    }
}

/// One step of a wizard.
pub struct StepDefinition<F> {
    /// Title shown in the stepper.
    pub title: &'static str,
    /// Fields rendered on this step; error keys are restricted to these.
    pub fields: &'static [&'static str],
    /// Pure validator for the step.
    pub validate: fn(&F) -> ErrorMap,
    /// Backend submission run before leaving the step.
    pub submit: Option<StepSubmit<F>>,
}

impl<F> StepDefinition<F> {
    /// Creates a step without a submission.
    #[must_use]
    pub const fn new(
        title: &'static str,
        fields: &'static [&'static str],
        validate: fn(&F) -> ErrorMap,
    ) -> Self {
        Self {
            title,
            fields,
            validate,
            submit: None,
        }
    }

    /// Attaches a backend submission.
    #[must_use]
    pub fn submit(mut self, submit: StepSubmit<F>) -> Self {
        self.submit = Some(submit);
        self
    }
}

/// Builds the review shown on the confirmation screen.
pub type ReviewBuilder<F> = fn(&F, ReviewSummary) -> ReviewSummary;

/// The full description of a wizard flow.
pub struct WizardDefinition<F> {
    kind: WizardKind,
    title: &'static str,
    steps: Vec<StepDefinition<F>>,
    channels: Vec<Channel>,
    completion_message: &'static str,
    rejection_message: fn(&str) -> String,
    resume: Option<fn(&mut F, &RegistrationStatus)>,
    review: Option<ReviewBuilder<F>>,
}

impl<F> WizardDefinition<F> {
    /// Starts a definition with its first step.
    #[must_use]
    pub fn builder(
        kind: WizardKind,
        title: &'static str,
        first: StepDefinition<F>,
    ) -> WizardDefinitionBuilder<F> {
        WizardDefinitionBuilder {
            definition: Self {
                kind,
                title,
                steps: vec![first],
                channels: Vec::new(),
                completion_message: "Registration completed successfully!",
                rejection_message: str::to_string,
                resume: None,
                review: None,
            },
        }
    }

    /// The flow this definition describes.
    #[must_use]
    pub const fn kind(&self) -> WizardKind {
        self.kind
    }

    /// Number of steps; always at least one.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Step titles in order.
    #[must_use]
    pub fn step_titles(&self) -> Vec<&'static str> {
        self.steps.iter().map(|step| step.title).collect()
    }

    /// Channels this flow verifies with OTPs.
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

/// Builder for [`WizardDefinition`].
pub struct WizardDefinitionBuilder<F> {
    definition: WizardDefinition<F>,
}

impl<F> WizardDefinitionBuilder<F> {
    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: StepDefinition<F>) -> Self {
        self.definition.steps.push(step);
        self
    }

    /// Declares a channel verified with an OTP widget.
    #[must_use]
    pub fn verifies(mut self, channel: Channel) -> Self {
        if !self.definition.channels.contains(&channel) {
            self.definition.channels.push(channel);
        }
        self
    }

    /// Sets the notification shown after the final step.
    #[must_use]
    pub fn completion_message(mut self, message: &'static str) -> Self {
        self.definition.completion_message = message;
        self
    }

    /// Maps backend rejection messages to user-facing text.
    #[must_use]
    pub fn rejection_message(mut self, map: fn(&str) -> String) -> Self {
        self.definition.rejection_message = map;
        self
    }

    /// Restores form fields from a resumed registration session.
    #[must_use]
    pub fn on_resume(mut self, apply: fn(&mut F, &RegistrationStatus)) -> Self {
        self.definition.resume = Some(apply);
        self
    }

    /// Sets the review summary builder.
    #[must_use]
    pub fn review(mut self, review: ReviewBuilder<F>) -> Self {
        self.definition.review = Some(review);
        self
    }

    /// Finishes the definition.
    #[must_use]
    pub fn build(self) -> WizardDefinition<F> {
        self.definition
    }
}

// ============================================================================
// Options and outcomes
// ============================================================================

/// Runtime knobs for a wizard, usually derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WizardOptions {
    /// Resend cooldown for OTP widgets.
    pub otp_cooldown: Duration,
    /// Delay between editing a field and its error disappearing.
    pub clear_delay: Duration,
    /// Values new forms are seeded with.
    pub defaults: FormDefaults,
}

impl Default for WizardOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl WizardOptions {
    /// Builds options from configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            otp_cooldown: config.otp_resend_cooldown(),
            clear_delay: config.field_error_clear_delay(),
            defaults: FormDefaults {
                country_code: config.default_country_code.clone(),
            },
        }
    }
}

/// Result of [`Wizard::advance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// The current step has field errors; the index did not change.
    Invalid {
        /// Errors now shown on the form.
        errors: ErrorMap,
    },
    /// Validation passed but the submission failed; the index did not change.
    Rejected {
        /// Notification now shown.
        notification: Notification,
    },
    /// Moved to the next step.
    Advanced {
        /// Previous step index.
        from: usize,
        /// New step index.
        to: usize,
        /// The UI should scroll to the top of the form.
        scroll_to_top: bool,
    },
    /// The final step was accepted.
    Completed {
        /// Session issued by the backend, when the response carried one.
        #[serde(skip_serializing_if = "Option::is_none")]
        session: Option<Session>,
    },
}

/// Result of [`Wizard::retreat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepChange {
    /// Previous step index.
    pub from: usize,
    /// New step index.
    pub to: usize,
    /// The UI should scroll to the top of the form.
    pub scroll_to_top: bool,
}

/// Serializable snapshot of a wizard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardView {
    /// Flow.
    pub kind: WizardKind,
    /// Current step index.
    pub step: usize,
    /// Number of steps.
    pub total_steps: usize,
    /// Step titles.
    pub steps: Vec<&'static str>,
    /// Form data with secrets masked.
    pub form: Value,
    /// Field errors of the current step.
    pub errors: ErrorMap,
    /// OTP widget snapshots.
    pub otp: BTreeMap<Channel, VerificationStatus>,
    /// Current notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
    /// Whether the backend has issued a registration token.
    pub has_registration_token: bool,
    /// Whether the final step has been accepted.
    pub completed: bool,
}

// ============================================================================
// Wizard
// ============================================================================

/// One user's run through a wizard definition.
pub struct Wizard<F: FormRecord> {
    definition: WizardDefinition<F>,
    form: F,
    step: usize,
    errors: ErrorMap,
    pending_clears: Vec<(String, Instant)>,
    clear_delay: Duration,
    otp: BTreeMap<Channel, OtpWidget>,
    registration_token: Option<String>,
    notification: Option<Notification>,
    completed: bool,
    session: Option<Session>,
}

impl<F: FormRecord> fmt::Debug for Wizard<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wizard")
            .field("kind", &self.definition.kind)
            .field("step", &self.step)
            .field("errors", &self.errors)
            .field("completed", &self.completed)
            .finish_non_exhaustive()
    }
}

impl<F: FormRecord> Wizard<F> {
    /// Starts a fresh run at step 0.
    #[must_use]
    pub fn new(definition: WizardDefinition<F>, options: &WizardOptions) -> Self {
        let otp = definition
            .channels
            .iter()
            .map(|channel| (*channel, OtpWidget::new(options.otp_cooldown)))
            .collect();
        Self {
            form: F::new(&options.defaults),
            definition,
            step: 0,
            errors: ErrorMap::new(),
            pending_clears: Vec::new(),
            clear_delay: options.clear_delay,
            otp,
            registration_token: None,
            notification: None,
            completed: false,
            session: None,
        }
    }

    /// Restores a run from a registration token.
    ///
    /// An invalid session starts over at step 0 with a warning. A valid one
    /// restores the token and jumps to the first step the backend has not
    /// stored yet, which is step 0 when nothing has been stored.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the status lookup itself fails.
    pub async fn resume(
        definition: WizardDefinition<F>,
        options: &WizardOptions,
        backend: &dyn RegistrationBackend,
        registration_token: &str,
    ) -> Result<Self> {
        let kind = definition.kind;
        let status = backend
            .registration_status(kind, registration_token)
            .await?;
        let mut wizard = Self::new(definition, options);

        if !status.session_valid {
            let reason = status
                .reason
                .clone()
                .unwrap_or_else(|| "Registration session not found or expired".to_string());
            info!(kind = %kind, reason = %reason, "Registration session not resumable");
            wizard.notification = Some(Notification::warning(SESSION_EXPIRED_MESSAGE));
            return Ok(wizard);
        }

        wizard.registration_token = Some(registration_token.to_string());
        wizard.step = status
            .last_completed_step
            .min(wizard.definition.total_steps() - 1);
        if let Some(apply) = wizard.definition.resume {
            apply(&mut wizard.form, &status);
        }
        info!(kind = %kind, step = wizard.step, "Registration session resumed");
        Ok(wizard)
    }

    /// The flow this wizard runs.
    #[must_use]
    pub const fn kind(&self) -> WizardKind {
        self.definition.kind
    }

    /// Current step index.
    #[must_use]
    pub const fn step(&self) -> usize {
        self.step
    }

    /// Number of steps.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.definition.total_steps()
    }

    /// The form record.
    #[must_use]
    pub const fn form(&self) -> &F {
        &self.form
    }

    /// Field errors shown on the current step.
    #[must_use]
    pub const fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    /// Current top-level notification.
    #[must_use]
    pub const fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    /// Registration token issued by the backend.
    #[must_use]
    pub fn registration_token(&self) -> Option<&str> {
        self.registration_token.as_deref()
    }

    /// Whether the final step has been accepted.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Session issued on completion.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Clears the current notification.
    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }

    /// OTP widget snapshot for `channel`.
    ///
    /// # Errors
    ///
    /// Returns `EvalonError::UnsupportedChannel` if this flow does not verify
    /// `channel`.
    pub fn otp_status(&self, channel: Channel, now: Instant) -> Result<VerificationStatus> {
        self.otp
            .get(&channel)
            .map(|widget| widget.status(now))
            .ok_or_else(|| EvalonError::unsupported_channel(channel))
    }

    /// Validates the current step without storing the result.
    #[must_use]
    pub fn validate_current(&self) -> ErrorMap {
        let step = &self.definition.steps[self.step];
        let mut errors = (step.validate)(&self.form);
        errors.retain_fields(step.fields);
        errors
    }

    /// Applies one field update.
    ///
    /// An existing error on the field is cleared `clear_delay` after `now`
    /// (see [`settle`](Self::settle)). Changing a verified contact resets its
    /// OTP widget and verification flag.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` or `InvalidFieldValue`; the form is unchanged.
    /// Returns `WizardCompleted` once the registration is done.
    pub fn change_field(&mut self, field: &str, value: Value, now: Instant) -> Result<()> {
        self.ensure_open()?;
        let contacts_before: Vec<(Channel, String)> = self
            .definition
            .channels
            .iter()
            .filter_map(|c| self.form.contact(*c).map(|v| (*c, v.to_string())))
            .collect();

        apply_field(&mut self.form, field, value)?;
        debug!(kind = %self.definition.kind, field, "Field updated");

        if self.errors.contains(field) {
            let deadline = now + self.clear_delay;
            self.pending_clears.retain(|(pending, _)| pending != field);
            self.pending_clears.push((field.to_string(), deadline));
        }

        for (channel, before) in contacts_before {
            let changed = F::contact_field(channel) == Some(field)
                && self.form.contact(channel) != Some(before.as_str());
            if changed {
                if let Some(widget) = self.otp.get_mut(&channel) {
                    widget.reset();
                }
                self.form.set_verified(channel, false);
                debug!(channel = %channel, "Contact changed, verification reset");
            }
        }

        self.settle(now);
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.completed {
            return Err(EvalonError::wizard_completed(self.definition.kind));
        }
        Ok(())
    }

    /// Drops errors whose clear deadline has passed.
    pub fn settle(&mut self, now: Instant) {
        let errors = &mut self.errors;
        self.pending_clears.retain(|(field, deadline)| {
            if *deadline <= now {
                errors.remove(field);
                false
            } else {
                true
            }
        });
    }

    /// Validates the current step, runs its submission and moves forward.
    pub async fn advance(
        &mut self,
        backend: &dyn RegistrationBackend,
        now: Instant,
    ) -> AdvanceOutcome {
        let kind = self.definition.kind;
        if self.completed {
            return AdvanceOutcome::Completed {
                session: self.session.clone(),
            };
        }

        self.settle(now);
        let errors = self.validate_current();
        if !errors.is_empty() {
            debug!(kind = %kind, step = self.step, count = errors.len(), "Step validation failed");
            self.errors = errors.clone();
            self.pending_clears.clear();
            return AdvanceOutcome::Invalid { errors };
        }
        self.errors.clear();
        self.pending_clears.clear();

        let mut response = None;
        if let Some(submit) = self.definition.steps[self.step].submit {
            match self.run_submit(backend, submit).await {
                Ok(data) => response = Some(data),
                Err(notification) => {
                    self.notification = Some(notification.clone());
                    return AdvanceOutcome::Rejected { notification };
                }
            }
        }

        let last = self.definition.total_steps() - 1;
        if self.step == last {
            self.completed = true;
            self.session = response.as_ref().and_then(|data| {
                let key = match kind {
                    WizardKind::Organisation => "admin",
                    WizardKind::Teacher => "teacher",
                    WizardKind::Student => "student",
                };
                let session = Session::from_response(data, key, kind.user_type())?;
                let organization_id = data
                    .get("organization")
                    .and_then(crate::session::json_id);
                Some(match organization_id {
                    Some(id) => session.with_organization(id),
                    None => session,
                })
            });
            if let Err(err) = clear_secrets(&mut self.form) {
                warn!(kind = %kind, error = %err, "Failed to clear secrets after completion");
            }
            self.notification = Some(Notification::success(self.definition.completion_message));
            info!(kind = %kind, "Registration completed");
            return AdvanceOutcome::Completed {
                session: self.session.clone(),
            };
        }

        let from = self.step;
        self.step += 1;
        info!(kind = %kind, from, to = self.step, "Advanced to next step");
        AdvanceOutcome::Advanced {
            from,
            to: self.step,
            scroll_to_top: true,
        }
    }

    async fn run_submit(
        &mut self,
        backend: &dyn RegistrationBackend,
        submit: StepSubmit<F>,
    ) -> std::result::Result<Value, Notification> {
        let kind = self.definition.kind;
        if submit.requires_token && self.registration_token.is_none() {
            warn!(kind = %kind, step = submit.backend_step, "Submission without registration token");
            return Err(Notification::error(SESSION_EXPIRED_MESSAGE));
        }
        if let Some(message) = submit.precheck.and_then(|check| check(&self.form)) {
            return Err(Notification::error(message));
        }

        let payload = (submit.payload)(&self.form, self.registration_token.as_deref());
        let data = match backend
            .submit_step(kind, submit.backend_step, &payload)
            .await
        {
            Ok(data) => data,
            Err(err) => {
                warn!(kind = %kind, step = submit.backend_step, error = %err, "Step submission failed");
                let message = match &err {
                    EvalonError::Backend {
                        kind: BackendErrorKind::Rejected,
                        ..
                    } => (self.definition.rejection_message)(&err.user_message()),
                    other => other.user_message(),
                };
                return Err(Notification::error(message));
            }
        };

        if let Some(token) = data.get("registrationToken").and_then(Value::as_str) {
            self.registration_token = Some(token.to_string());
        }
        if let Some(apply) = submit.apply {
            apply(&mut self.form, &data);
        }
        self.notification = submit.success_message.map(Notification::success);
        Ok(data)
    }

    /// Moves back one step without validation.
    ///
    /// Returns `None` at step 0 or once the wizard is completed.
    pub fn retreat(&mut self) -> Option<StepChange> {
        if self.step == 0 || self.completed {
            return None;
        }
        let from = self.step;
        self.step -= 1;
        self.errors.clear();
        self.pending_clears.clear();
        debug!(kind = %self.definition.kind, from, to = self.step, "Moved back a step");
        Some(StepChange {
            from,
            to: self.step,
            scroll_to_top: true,
        })
    }

    fn otp_target(&self, channel: Channel) -> Result<(OtpTarget, bool)> {
        if !self.otp.contains_key(&channel) {
            return Err(EvalonError::unsupported_channel(channel));
        }
        let contact = self.form.contact(channel).unwrap_or_default().trim().to_string();
        let present = !contact.is_empty();
        Ok((
            OtpTarget {
                channel,
                contact,
                country_code: self.form.country_code().to_string(),
            },
            present,
        ))
    }

    /// Sends an OTP to the contact on `channel`.
    ///
    /// Backend failures end up as an inline widget error, not as `Err`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedChannel`, `OtpCooldown` while the resend cooldown
    /// runs, `InvalidOtpTransition` from a busy or verified widget, or
    /// `WizardCompleted`.
    pub async fn send_otp(
        &mut self,
        channel: Channel,
        backend: &dyn RegistrationBackend,
        now: Instant,
    ) -> Result<VerificationStatus> {
        self.ensure_open()?;
        let (target, present) = self.otp_target(channel)?;
        let widget = self
            .otp
            .get_mut(&channel)
            .ok_or_else(|| EvalonError::unsupported_channel(channel))?;
        widget.begin_send(channel, now)?;

        if !present {
            widget.send_failed(match channel {
                Channel::Email => "Please enter your email address first",
                Channel::Phone => "Please enter your phone number first",
            });
            return Ok(widget.status(now));
        }

        match backend.send_otp(&target).await {
            Ok(()) => {
                info!(channel = %channel, "OTP sent");
                widget.send_succeeded(now);
            }
            Err(err) => {
                warn!(channel = %channel, error = %err, "OTP send failed");
                widget.send_failed(err.user_message());
            }
        }
        Ok(widget.status(now))
    }

    /// Verifies `code` for the contact on `channel`.
    ///
    /// An empty code or a backend rejection ends up as an inline widget
    /// error. Success marks the contact verified on the form.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedChannel`, `WizardCompleted`, or
    /// `InvalidOtpTransition` unless a code has been sent.
    pub async fn verify_otp(
        &mut self,
        channel: Channel,
        code: &str,
        backend: &dyn RegistrationBackend,
        now: Instant,
    ) -> Result<VerificationStatus> {
        self.ensure_open()?;
        let (target, _) = self.otp_target(channel)?;
        let route = self.definition.kind.verify_route();
        let widget = self
            .otp
            .get_mut(&channel)
            .ok_or_else(|| EvalonError::unsupported_channel(channel))?;
        if !widget.begin_verify(code)? {
            return Ok(widget.status(now));
        }

        match backend.verify_otp(&target, code.trim(), route).await {
            Ok(()) => {
                info!(channel = %channel, "OTP verified");
                widget.verify_succeeded();
                let status = widget.status(now);
                self.form.set_verified(channel, true);
                if let Some(field) = F::verified_field(channel) {
                    self.errors.remove(field);
                }
                Ok(status)
            }
            Err(err) => {
                warn!(channel = %channel, error = %err, "OTP verification failed");
                widget.verify_failed(err.user_message());
                Ok(widget.status(now))
            }
        }
    }

    /// Builds the confirmation-screen review.
    #[must_use]
    pub fn review(&self) -> ReviewSummary {
        let status = if self.completed {
            ReviewStatus::Completed
        } else if self.step + 1 == self.total_steps() {
            ReviewStatus::ReadyToSubmit
        } else {
            ReviewStatus::InProgress
        };
        let mut summary = ReviewSummary::new(
            self.definition.title,
            status,
            self.step + 1,
            self.total_steps(),
        );
        if let Some(review) = self.definition.review {
            summary = review(&self.form, summary);
        }
        for channel in &self.definition.channels {
            let contact = self.form.contact(*channel).unwrap_or_default();
            let contact = match channel {
                Channel::Phone if !contact.is_empty() => {
                    format!("{} {contact}", self.form.country_code())
                }
                _ => contact.to_string(),
            };
            summary = summary.verification(
                channel.to_string(),
                contact,
                self.form.is_verified(*channel),
            );
        }
        summary
    }

    /// Serializable snapshot for the UI.
    ///
    /// # Errors
    ///
    /// Returns `EvalonError::Json` if the form cannot be serialized.
    pub fn view(&self, now: Instant) -> Result<WizardView> {
        Ok(WizardView {
            kind: self.definition.kind,
            step: self.step,
            total_steps: self.total_steps(),
            steps: self.definition.step_titles(),
            form: redacted(&self.form)?,
            errors: self.errors.clone(),
            otp: self
                .otp
                .iter()
                .map(|(channel, widget)| (*channel, widget.status(now)))
                .collect(),
            notification: self.notification.clone(),
            has_registration_token: self.registration_token.is_some(),
            completed: self.completed,
        })
    }
}
