//! In-memory backend for tests and offline mode.
//!
//! [`MockBackend`] behaves like the Evalon REST backend closely enough to
//! drive every wizard end to end: it issues registration tokens and
//! organisation codes, tracks registration progress, accepts the fixed OTP
//! [`MOCK_OTP_CODE`] and signs in accounts created by completed
//! registrations.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Datelike;
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::backend::{
    City, Country, LocationLookup, LoginRequest, OtpTarget, RegistrationBackend,
    RegistrationStatus, State, VerifyRoute,
};
use crate::error::{BackendErrorKind, EvalonError, Result};
use crate::session::{Session, UserType};
use crate::wizard::WizardKind;

/// The only OTP the mock accepts.
pub const MOCK_OTP_CODE: &str = "123456";

/// Failed verifications allowed before a code is burned.
pub const MAX_OTP_ATTEMPTS: u32 = 5;

const ORG_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

#[derive(Debug)]
struct Registration {
    kind: WizardKind,
    last_completed_step: usize,
    email: Option<String>,
    password: Option<String>,
    organization_name: Option<String>,
    org_code: Option<String>,
    organization_id: Option<String>,
}

#[derive(Debug, Clone)]
struct Account {
    user_id: String,
    password: String,
    user_type: UserType,
    organization_id: Option<String>,
}

#[derive(Debug, Clone)]
struct Organization {
    id: String,
    name: String,
}

#[derive(Debug, Default)]
struct PendingOtp {
    attempts: u32,
    verified: bool,
}

#[derive(Debug, Default)]
struct MockState {
    registrations: HashMap<String, Registration>,
    accounts: HashMap<String, Account>,
    registered_emails: HashSet<String>,
    organizations: HashMap<String, Organization>,
    otps: HashMap<String, PendingOtp>,
    step_failures: HashMap<(WizardKind, usize), (BackendErrorKind, String)>,
    otp_send_failure: Option<(BackendErrorKind, String)>,
}

impl MockState {
    fn email_taken(&self, email: &str) -> bool {
        self.accounts.contains_key(email) || self.registered_emails.contains(email)
    }
}

/// A backend that keeps everything in memory.
pub struct MockBackend {
    state: Mutex<MockState>,
    call_count: AtomicU32,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("call_count", &self.call_count())
            .finish_non_exhaustive()
    }
}

impl MockBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            call_count: AtomicU32::new(0),
        }
    }

    /// Adds an account that can sign in.
    #[must_use]
    pub fn with_account(mut self, email: &str, password: &str, user_type: UserType) -> Self {
        let state = self.state_mut();
        state.accounts.insert(
            email.trim().to_lowercase(),
            Account {
                user_id: new_id(user_type_prefix(user_type)),
                password: password.to_string(),
                user_type,
                organization_id: None,
            },
        );
        self
    }

    /// Adds an organisation students can link to by code.
    #[must_use]
    pub fn with_organization(mut self, code: &str, name: &str) -> Self {
        self.state_mut().organizations.insert(
            code.trim().to_uppercase(),
            Organization {
                id: new_id("org"),
                name: name.to_string(),
            },
        );
        self
    }

    /// Marks an email as already registered.
    #[must_use]
    pub fn with_registered_email(mut self, email: &str) -> Self {
        self.state_mut()
            .registered_emails
            .insert(email.trim().to_lowercase());
        self
    }

    /// Adds a live registration session under `token` with no step stored yet.
    #[must_use]
    pub fn with_open_registration(mut self, kind: WizardKind, token: &str) -> Self {
        self.state_mut().registrations.insert(
            token.to_string(),
            Registration {
                kind,
                last_completed_step: 0,
                email: None,
                password: None,
                organization_name: None,
                org_code: None,
                organization_id: None,
            },
        );
        self
    }

    /// Makes every submission of `step` in `kind` fail.
    pub fn fail_step(
        &self,
        kind: WizardKind,
        step: usize,
        error: BackendErrorKind,
        message: impl Into<String>,
    ) {
        self.lock()
            .step_failures
            .insert((kind, step), (error, message.into()));
    }

    /// Makes every OTP send fail.
    pub fn fail_otp_send(&self, error: BackendErrorKind, message: impl Into<String>) {
        self.lock().otp_send_failure = Some((error, message.into()));
    }

    /// Removes injected failures.
    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.step_failures.clear();
        state.otp_send_failure = None;
    }

    /// Number of [`RegistrationBackend`] calls made so far.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_call(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Registration steps
// ============================================================================

fn final_step(kind: WizardKind) -> usize {
    match kind {
        WizardKind::Organisation | WizardKind::Teacher => 3,
        WizardKind::Student => 4,
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn start_registration(state: &mut MockState, kind: WizardKind, payload: &Value) -> Result<Value> {
    let email_key = match kind {
        WizardKind::Organisation => None,
        WizardKind::Teacher | WizardKind::Student => Some("emailAddress"),
    };
    let email = email_key
        .and_then(|key| str_field(payload, key))
        .map(str::to_lowercase);

    if let Some(email) = &email {
        if state.email_taken(email) {
            return Err(EvalonError::rejected(match kind {
                WizardKind::Teacher => "Teacher with this email already exists",
                _ => "Student with this email already exists",
            }));
        }
    }

    let token = format!("reg_{}", Uuid::new_v4().simple());
    let mut data = json!({ "registrationToken": token });
    let mut registration = Registration {
        kind,
        last_completed_step: 1,
        email,
        password: None,
        organization_name: None,
        org_code: None,
        organization_id: None,
    };

    if kind == WizardKind::Organisation {
        let name = str_field(payload, "organisationName")
            .ok_or_else(|| EvalonError::rejected("Organisation name is required"))?;
        let country = str_field(payload, "country").unwrap_or("XX");
        let code = generate_org_code(country, name, chrono::Utc::now().year());
        data["orgCode"] = json!(code);
        registration.organization_name = Some(name.to_string());
        registration.org_code = Some(code);
    }

    state.registrations.insert(token, registration);
    Ok(data)
}

fn continue_registration(
    state: &mut MockState,
    kind: WizardKind,
    step: usize,
    payload: &Value,
) -> Result<Value> {
    let token = str_field(payload, "registrationToken")
        .ok_or_else(|| EvalonError::rejected("Registration token is required"))?
        .to_string();
    let registration = state
        .registrations
        .get(&token)
        .filter(|r| r.kind == kind)
        .ok_or_else(|| EvalonError::rejected("Registration session not found or expired"))?;
    // Student step 3 is client-side only.
    let previous = if kind == WizardKind::Student && step == 4 {
        2
    } else {
        step - 1
    };
    if registration.last_completed_step < previous {
        return Err(EvalonError::rejected(format!(
            "Please complete step {previous} first"
        )));
    }

    let mut data = json!({ "registrationToken": token });
    let mut organization = None;

    match (kind, step) {
        (WizardKind::Organisation, 2) => {
            let email = str_field(payload, "adminEmail")
                .ok_or_else(|| EvalonError::rejected("Admin email is required"))?
                .to_lowercase();
            let verified = state.otps.get(&email).is_some_and(|otp| otp.verified);
            if !verified {
                return Err(EvalonError::rejected(
                    "Please verify your email before proceeding",
                ));
            }
            if state.email_taken(&email) {
                return Err(EvalonError::rejected(
                    "An account with this email already exists",
                ));
            }
            let password = str_field(payload, "password").map(str::to_string);
            if let Some(reg) = state.registrations.get_mut(&token) {
                reg.email = Some(email);
                reg.password = password;
            }
        }
        (WizardKind::Teacher, 3) | (WizardKind::Student, 4) => {
            let password = str_field(payload, "password").map(str::to_string);
            if let Some(reg) = state.registrations.get_mut(&token) {
                reg.password = password;
            }
        }
        (WizardKind::Student, 2) => {
            let standalone = str_field(payload, "registrationType") == Some("standalone");
            if standalone {
                data["organizationName"] = json!("");
                data["isOrganizationValid"] = json!(false);
                data["associationStatus"] = json!("standalone");
                data["isStandalone"] = json!(true);
            } else {
                let code = str_field(payload, "organizationCode")
                    .ok_or_else(|| EvalonError::rejected("Organization code is required"))?
                    .to_uppercase();
                let org = state
                    .organizations
                    .get(&code)
                    .cloned()
                    .ok_or_else(|| EvalonError::rejected("Organization not found with this code"))?;
                data["organizationName"] = json!(org.name);
                data["isOrganizationValid"] = json!(true);
                data["associationStatus"] = json!("verified");
                data["isStandalone"] = json!(false);
                organization = Some(org);
            }
        }
        _ => {}
    }

    if let Some(reg) = state.registrations.get_mut(&token) {
        reg.last_completed_step = reg.last_completed_step.max(step);
        if let Some(org) = organization {
            reg.organization_name = Some(org.name);
            reg.organization_id = Some(org.id);
        }
    }

    if step == final_step(kind) {
        return complete_registration(state, &token);
    }
    Ok(data)
}

fn complete_registration(state: &mut MockState, token: &str) -> Result<Value> {
    let registration = state
        .registrations
        .remove(token)
        .ok_or_else(|| EvalonError::rejected("Registration session not found or expired"))?;
    let user_type = registration.kind.user_type();
    let user_id = new_id(user_type_prefix(user_type));
    let auth_token = format!("mock-jwt-{}", Uuid::new_v4().simple());

    let organization_id = match registration.kind {
        WizardKind::Organisation => {
            let id = new_id("org");
            if let Some(code) = &registration.org_code {
                state.organizations.insert(
                    code.clone(),
                    Organization {
                        id: id.clone(),
                        name: registration.organization_name.clone().unwrap_or_default(),
                    },
                );
            }
            Some(id)
        }
        _ => registration.organization_id.clone(),
    };

    if let (Some(email), Some(password)) = (&registration.email, &registration.password) {
        state.accounts.insert(
            email.clone(),
            Account {
                user_id: user_id.clone(),
                password: password.clone(),
                user_type,
                organization_id: organization_id.clone(),
            },
        );
    }

    let user_key = match registration.kind {
        WizardKind::Organisation => "admin",
        WizardKind::Teacher => "teacher",
        WizardKind::Student => "student",
    };
    let mut data = json!({ "token": auth_token });
    data[user_key] = json!({ "id": user_id, "email": registration.email });
    if let Some(id) = organization_id {
        data["organization"] = json!({
            "id": id,
            "name": registration.organization_name,
            "orgCode": registration.org_code,
        });
    }
    Ok(data)
}

#[async_trait]
impl RegistrationBackend for MockBackend {
    async fn submit_step(&self, kind: WizardKind, step: usize, payload: &Value) -> Result<Value> {
        self.record_call();
        let mut state = self.lock();
        if let Some((error, message)) = state.step_failures.get(&(kind, step)) {
            return Err(EvalonError::backend(*error, message.clone()));
        }
        if step == 0 || step > final_step(kind) {
            return Err(EvalonError::rejected(format!("Invalid registration step {step}")));
        }
        if step == 1 {
            start_registration(&mut state, kind, payload)
        } else {
            continue_registration(&mut state, kind, step, payload)
        }
    }

    async fn registration_status(
        &self,
        kind: WizardKind,
        registration_token: &str,
    ) -> Result<RegistrationStatus> {
        self.record_call();
        if registration_token.trim().is_empty() {
            return Ok(RegistrationStatus {
                reason: Some("No registration token provided".to_string()),
                ..RegistrationStatus::default()
            });
        }
        let state = self.lock();
        Ok(state
            .registrations
            .get(registration_token)
            .filter(|r| r.kind == kind)
            .map_or_else(
                || RegistrationStatus {
                    reason: Some("Registration session not found or expired".to_string()),
                    ..RegistrationStatus::default()
                },
                |r| RegistrationStatus {
                    session_valid: true,
                    last_completed_step: r.last_completed_step,
                    reason: None,
                    organization_name: r.organization_name.clone(),
                    org_code: r.org_code.clone(),
                },
            ))
    }

    async fn send_otp(&self, target: &OtpTarget) -> Result<()> {
        self.record_call();
        let mut state = self.lock();
        if let Some((error, message)) = &state.otp_send_failure {
            return Err(EvalonError::backend(*error, message.clone()));
        }
        if target.contact.trim().is_empty() {
            return Err(EvalonError::rejected(format!("{} is required", target.channel)));
        }
        state.otps.insert(target.key(), PendingOtp::default());
        Ok(())
    }

    async fn verify_otp(&self, target: &OtpTarget, code: &str, _route: VerifyRoute) -> Result<()> {
        self.record_call();
        let mut state = self.lock();
        let otp = state.otps.get_mut(&target.key()).ok_or_else(|| {
            EvalonError::rejected("OTP not found or expired. Please request a new OTP.")
        })?;
        if otp.attempts >= MAX_OTP_ATTEMPTS {
            return Err(EvalonError::rejected(
                "Too many failed attempts. Please request a new OTP.",
            ));
        }
        if code.trim() != MOCK_OTP_CODE {
            otp.attempts += 1;
            return Err(EvalonError::rejected("Invalid or expired OTP"));
        }
        otp.verified = true;
        Ok(())
    }

    async fn login(&self, request: &LoginRequest) -> Result<Session> {
        self.record_call();
        let state = self.lock();
        let account = state
            .accounts
            .get(&request.email.trim().to_lowercase())
            .filter(|a| a.password == request.password && a.user_type == request.user_type)
            .ok_or_else(|| {
                EvalonError::backend(BackendErrorKind::Unauthorized, "Invalid email or password")
            })?;
        let session = Session::new(
            format!("mock-jwt-{}", Uuid::new_v4().simple()),
            account.user_id.clone(),
            account.user_type,
        );
        Ok(match &account.organization_id {
            Some(id) => session.with_organization(id.clone()),
            None => session,
        })
    }
}

// ============================================================================
// Locations
// ============================================================================

fn country(code: &str, name: &str, phone: &str, currency: &str, symbol: &str) -> Country {
    Country {
        code: code.to_string(),
        name: name.to_string(),
        phone_code: phone.to_string(),
        currency: currency.to_string(),
        currency_symbol: symbol.to_string(),
    }
}

const STATES: &[(&str, &str, &str)] = &[
    ("IN", "MH", "Maharashtra"),
    ("IN", "KA", "Karnataka"),
    ("IN", "DL", "Delhi"),
    ("US", "CA", "California"),
    ("US", "NY", "New York"),
    ("GB", "ENG", "England"),
];

const CITIES: &[(&str, &str, &str)] = &[
    ("IN", "MH", "Mumbai"),
    ("IN", "MH", "Pune"),
    ("IN", "KA", "Bengaluru"),
    ("IN", "KA", "Mysuru"),
    ("IN", "DL", "New Delhi"),
    ("US", "CA", "San Francisco"),
    ("US", "CA", "Los Angeles"),
    ("US", "NY", "New York City"),
    ("GB", "ENG", "London"),
    ("GB", "ENG", "Manchester"),
];

#[async_trait]
impl LocationLookup for MockBackend {
    async fn countries(&self) -> Result<Vec<Country>> {
        Ok(vec![
            country("IN", "India", "+91", "INR", "₹"),
            country("US", "United States", "+1", "USD", "$"),
            country("GB", "United Kingdom", "+44", "GBP", "£"),
        ])
    }

    async fn states(&self, country: &str) -> Result<Vec<State>> {
        Ok(STATES
            .iter()
            .filter(|(c, _, _)| c.eq_ignore_ascii_case(country))
            .map(|(c, code, name)| State {
                code: (*code).to_string(),
                name: (*name).to_string(),
                country_code: (*c).to_string(),
            })
            .collect())
    }

    async fn cities(&self, country: &str, state: &str) -> Result<Vec<City>> {
        Ok(CITIES
            .iter()
            .filter(|(c, s, _)| c.eq_ignore_ascii_case(country) && s.eq_ignore_ascii_case(state))
            .map(|(c, s, name)| City {
                name: (*name).to_string(),
                state_code: (*s).to_string(),
                country_code: (*c).to_string(),
            })
            .collect())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

const fn user_type_prefix(user_type: UserType) -> &'static str {
    match user_type {
        UserType::OrganizationAdmin => "adm",
        UserType::Teacher => "tch",
        UserType::Student => "stu",
    }
}

/// Builds an organisation code: `{CC}-{ABC}-{YEAR}-{RND}`.
///
/// `CC` is the first two letters of `country`, `ABC` the first three
/// letters of `name` without spaces (padded with `X`), `RND` three random
/// characters from `A-Z0-9`.
#[must_use]
pub fn generate_org_code(country: &str, name: &str, year: i32) -> String {
    let prefix: String = country
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(2)
        .collect::<String>()
        .to_uppercase();
    let mut short: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    while short.chars().count() < 3 {
        short.push('X');
    }
    let mut rng = rand::thread_rng();
    let suffix: String = (0..3)
        .map(|_| char::from(ORG_CODE_ALPHABET[rng.gen_range(0..ORG_CODE_ALPHABET.len())]))
        .collect();
    format!("{prefix}-{short}-{year}-{suffix}")
}
