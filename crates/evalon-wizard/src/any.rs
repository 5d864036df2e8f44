//! A wizard of any kind.
//!
//! The API keeps wizards of all three flows in one session table, so it
//! needs a single type; [`AnyWizard`] forwards every operation to the typed
//! wizard inside.

use std::time::Instant;

use evalon_review::ReviewSummary;
use serde_json::Value;

use crate::backend::RegistrationBackend;
use crate::error::Result;
use crate::form::ErrorMap;
use crate::otp::{Channel, VerificationStatus};
use crate::registration::{organisation, student, teacher, OrganisationForm, StudentForm, TeacherForm};
use crate::session::Session;
use crate::wizard::{AdvanceOutcome, Notification, StepChange, Wizard, WizardKind, WizardOptions, WizardView};

/// One of the three registration wizards.
#[derive(Debug)]
pub enum AnyWizard {
    /// Organisation registration.
    Organisation(Wizard<OrganisationForm>),
    /// Teacher registration.
    Teacher(Wizard<TeacherForm>),
    /// Student registration.
    Student(Wizard<StudentForm>),
}

macro_rules! dispatch {
    ($self:expr, $wizard:ident => $body:expr) => {
        match $self {
            AnyWizard::Organisation($wizard) => $body,
            AnyWizard::Teacher($wizard) => $body,
            AnyWizard::Student($wizard) => $body,
        }
    };
}

impl AnyWizard {
    /// Starts a fresh wizard of `kind`.
    #[must_use]
    pub fn new(kind: WizardKind, options: &WizardOptions) -> Self {
        match kind {
            WizardKind::Organisation => Self::Organisation(Wizard::new(organisation::definition(), options)),
            WizardKind::Teacher => Self::Teacher(Wizard::new(teacher::definition(), options)),
            WizardKind::Student => Self::Student(Wizard::new(student::definition(), options)),
        }
    }

    /// Restores a wizard of `kind` from a registration token.
    pub async fn resume(
        kind: WizardKind,
        options: &WizardOptions,
        backend: &dyn RegistrationBackend,
        registration_token: &str,
    ) -> Result<Self> {
        Ok(match kind {
            WizardKind::Organisation => Self::Organisation(
                Wizard::resume(organisation::definition(), options, backend, registration_token).await?,
            ),
            WizardKind::Teacher => Self::Teacher(
                Wizard::resume(teacher::definition(), options, backend, registration_token).await?,
            ),
            WizardKind::Student => Self::Student(
                Wizard::resume(student::definition(), options, backend, registration_token).await?,
            ),
        })
    }

    /// The flow this wizard runs.
    #[must_use]
    pub fn kind(&self) -> WizardKind {
        dispatch!(self, w => w.kind())
    }

    /// Current step index.
    #[must_use]
    pub fn step(&self) -> usize {
        dispatch!(self, w => w.step())
    }

    /// Number of steps.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        dispatch!(self, w => w.total_steps())
    }

    /// Field errors of the current step.
    #[must_use]
    pub fn errors(&self) -> &ErrorMap {
        dispatch!(self, w => w.errors())
    }

    /// Current notification.
    #[must_use]
    pub fn notification(&self) -> Option<&Notification> {
        dispatch!(self, w => w.notification())
    }

    /// Whether the final step has been accepted.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        dispatch!(self, w => w.is_completed())
    }

    /// Session issued on completion.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        dispatch!(self, w => w.session())
    }

    /// See [`Wizard::change_field`].
    pub fn change_field(&mut self, field: &str, value: Value, now: Instant) -> Result<()> {
        dispatch!(self, w => w.change_field(field, value, now))
    }

    /// See [`Wizard::settle`].
    pub fn settle(&mut self, now: Instant) {
        dispatch!(self, w => w.settle(now));
    }

    /// See [`Wizard::advance`].
    pub async fn advance(&mut self, backend: &dyn RegistrationBackend, now: Instant) -> AdvanceOutcome {
        dispatch!(self, w => w.advance(backend, now).await)
    }

    /// See [`Wizard::retreat`].
    pub fn retreat(&mut self) -> Option<StepChange> {
        dispatch!(self, w => w.retreat())
    }

    /// See [`Wizard::send_otp`].
    pub async fn send_otp(
        &mut self,
        channel: Channel,
        backend: &dyn RegistrationBackend,
        now: Instant,
    ) -> Result<VerificationStatus> {
        dispatch!(self, w => w.send_otp(channel, backend, now).await)
    }

    /// See [`Wizard::verify_otp`].
    pub async fn verify_otp(
        &mut self,
        channel: Channel,
        code: &str,
        backend: &dyn RegistrationBackend,
        now: Instant,
    ) -> Result<VerificationStatus> {
        dispatch!(self, w => w.verify_otp(channel, code, backend, now).await)
    }

    /// See [`Wizard::otp_status`].
    pub fn otp_status(&self, channel: Channel, now: Instant) -> Result<VerificationStatus> {
        dispatch!(self, w => w.otp_status(channel, now))
    }

    /// See [`Wizard::review`].
    #[must_use]
    pub fn review(&self) -> ReviewSummary {
        dispatch!(self, w => w.review())
    }

    /// See [`Wizard::view`].
    pub fn view(&self, now: Instant) -> Result<WizardView> {
        dispatch!(self, w => w.view(now))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::mock::MockBackend;

    #[test]
    fn test_new_picks_definition() {
        let options = WizardOptions::default();
        for (kind, steps) in [
            (WizardKind::Organisation, 3),
            (WizardKind::Teacher, 3),
            (WizardKind::Student, 4),
        ] {
            let wizard = AnyWizard::new(kind, &options);
            assert_eq!(wizard.kind(), kind);
            assert_eq!(wizard.total_steps(), steps);
            assert_eq!(wizard.step(), 0);
        }
    }

    #[test]
    fn test_view_lists_step_titles() {
        let wizard = AnyWizard::new(WizardKind::Student, &WizardOptions::default());
        let view = wizard.view(Instant::now()).unwrap();
        assert_eq!(
            view.steps,
            vec![
                "Basic Details",
                "Organization Verification",
                "Security Verification",
                "Auto Mapping"
            ]
        );
        assert_eq!(view.otp.len(), 2);
    }

    #[tokio::test]
    async fn test_forwarding_advance_and_retreat() {
        let backend = MockBackend::new();
        let now = Instant::now();
        let mut wizard = AnyWizard::new(WizardKind::Teacher, &WizardOptions::default());

        let outcome = wizard.advance(&backend, now).await;
        assert!(matches!(outcome, AdvanceOutcome::Invalid { .. }));
        assert!(wizard.errors().contains("fullName"));

        for (field, value) in [
            ("fullName", json!("Asha Rao")),
            ("emailAddress", json!("asha@school.edu")),
            ("country", json!("IN")),
            ("city", json!("Mysuru")),
            ("pincode", json!("570001")),
        ] {
            wizard.change_field(field, value, now).unwrap();
        }
        assert!(matches!(
            wizard.advance(&backend, now).await,
            AdvanceOutcome::Advanced { to: 1, .. }
        ));
        assert!(wizard.retreat().is_some());
        assert_eq!(wizard.step(), 0);
    }

    #[tokio::test]
    async fn test_teacher_has_no_otp_channels() {
        let backend = MockBackend::new();
        let mut wizard = AnyWizard::new(WizardKind::Teacher, &WizardOptions::default());
        assert!(wizard
            .send_otp(Channel::Email, &backend, Instant::now())
            .await
            .is_err());
    }
}
