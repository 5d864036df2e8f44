//! HTTP API for the Evalon onboarding wizards.
//!
//! A thin UI drives every wizard through this API: it creates a session,
//! patches fields as the user types, and asks the server to advance, go
//! back, or send and verify OTPs. Each response carries the full
//! [`WizardView`] so the UI never has to track wizard state itself.
//!
//! # Endpoints
//!
//! - `GET /api/health` - Liveness probe
//! - `POST /api/wizards` - Start a wizard session
//! - `POST /api/wizards/resume` - Restore a session from a registration token
//! - `GET /api/wizards/:id` - Current view of a session
//! - `DELETE /api/wizards/:id` - Discard a session
//! - `PATCH /api/wizards/:id/fields` - Update one form field
//! - `POST /api/wizards/:id/advance` - Validate and submit the current step (a completed session is released)
//! - `POST /api/wizards/:id/retreat` - Go back one step
//! - `POST /api/wizards/:id/otp/:channel/send` - Send an OTP
//! - `POST /api/wizards/:id/otp/:channel/verify` - Verify an OTP
//! - `GET /api/wizards/:id/summary` - Review summary (`?format=markdown|json`)
//! - `POST /api/password/strength` - Score a password
//! - `POST /api/login` - Sign in
//! - `GET /api/locations/countries[/:country/states[/:state/cities]]` - Location lookups
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use evalon_wizard::{create_router, mock::MockBackend, AppState, Config};
//!
//! # async fn example() {
//! let backend = Arc::new(MockBackend::new());
//! let state = AppState::new(Config::default(), backend.clone(), backend);
//!
//! let router = create_router(state);
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:4000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use evalon_review::{json::JsonGenerator, MarkdownGenerator};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::any::AnyWizard;
use crate::backend::{City, Country, LocationLookup, RegistrationBackend, State as Region};
use crate::error::{BackendErrorKind, EvalonError};
use crate::form::ErrorMap;
use crate::login::{login, LoginForm, LoginOutcome};
use crate::otp::Channel;
use crate::password::{password_tips, score_password, PasswordStrength};
use crate::session::Session;
use crate::wizard::{AdvanceOutcome, WizardKind, WizardOptions, WizardView};
use crate::Config;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
}

/// Request body for starting a wizard.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWizardRequest {
    /// Which registration flow to run.
    pub kind: WizardKind,
}

/// Request body for resuming a wizard.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeWizardRequest {
    /// Which registration flow the token belongs to.
    pub kind: WizardKind,
    /// Token issued by the backend after step 1.
    pub registration_token: String,
}

/// Request body for a field update.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldUpdateRequest {
    /// camelCase field name.
    pub field: String,
    /// New value.
    pub value: Value,
}

/// Request body for OTP verification.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOtpRequest {
    /// Code typed by the user.
    #[serde(default)]
    pub code: String,
}

/// Query of the summary endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryQuery {
    /// `markdown` or `json` (default).
    pub format: Option<String>,
}

/// Request body for password scoring.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordRequest {
    /// Password to score.
    #[serde(default)]
    pub password: String,
}

/// Response body for password scoring.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordResponse {
    /// Score, label, colour and meter fill.
    #[serde(flatten)]
    pub strength: PasswordStrength,
    /// Requirements not met yet.
    pub tips: Vec<&'static str>,
}

/// A wizard view together with its session id.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    /// Session id used in every `/api/wizards/:id` route.
    pub id: Uuid,
    /// The wizard snapshot.
    #[serde(flatten)]
    pub view: WizardView,
}

/// Response body for the advance endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AdvanceResponse {
    /// What happened.
    #[serde(flatten)]
    pub outcome: AdvanceOutcome,
    /// Wizard state afterwards.
    pub wizard: SessionView,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
    /// Field errors, for validation failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<ErrorMap>,
}

// ============================================================================
// Application State
// ============================================================================

type SessionMap = HashMap<Uuid, Arc<Mutex<AnyWizard>>>;

/// Shared application state for the API handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,
    /// Options every new wizard is created with.
    pub options: WizardOptions,
    /// Registration, OTP and login calls.
    pub backend: Arc<dyn RegistrationBackend>,
    /// Country, state and city lookups.
    pub locations: Arc<dyn LocationLookup>,
    /// Live wizard sessions; each is locked on its own.
    sessions: Arc<RwLock<SessionMap>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Creates state with no sessions.
    #[must_use]
    pub fn new(
        config: Config,
        backend: Arc<dyn RegistrationBackend>,
        locations: Arc<dyn LocationLookup>,
    ) -> Self {
        let options = WizardOptions::from_config(&config);
        Self {
            config,
            options,
            backend,
            locations,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live wizard sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, id: Uuid) -> Result<Arc<Mutex<AnyWizard>>, ApiError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::from(EvalonError::session_not_found(id)))
    }

    async fn insert(&self, wizard: AnyWizard) -> Result<SessionView, ApiError> {
        let id = Uuid::new_v4();
        let view = session_view(id, &wizard)?;
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(wizard)));
        Ok(view)
    }
}

fn session_view(id: Uuid, wizard: &AnyWizard) -> Result<SessionView, ApiError> {
    Ok(SessionView {
        id,
        view: wizard.view(Instant::now())?,
    })
}

// ============================================================================
// Error Handling
// ============================================================================

/// API error type that converts to HTTP responses.
#[derive(Debug)]
enum ApiError {
    /// An engine error; the status depends on the variant.
    Evalon(EvalonError),
    /// A login form with inline errors.
    Invalid(ErrorMap),
    /// Refused credentials.
    Unauthorized(String),
    /// A malformed query.
    BadRequest(String),
}

impl From<EvalonError> for ApiError {
    fn from(err: EvalonError) -> Self {
        Self::Evalon(err)
    }
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Evalon(err) => match err {
                EvalonError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
                EvalonError::UnknownField { .. } | EvalonError::InvalidFieldValue { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                EvalonError::OtpCooldown { .. }
                | EvalonError::InvalidOtpTransition { .. }
                | EvalonError::WizardCompleted { .. }
                | EvalonError::MissingRegistrationToken => StatusCode::CONFLICT,
                EvalonError::UnsupportedChannel { .. } => StatusCode::BAD_REQUEST,
                EvalonError::Backend {
                    kind: BackendErrorKind::Unauthorized,
                    ..
                } => StatusCode::UNAUTHORIZED,
                EvalonError::Backend {
                    kind: BackendErrorKind::Timeout,
                    ..
                } => StatusCode::GATEWAY_TIMEOUT,
                EvalonError::Backend { .. } => StatusCode::BAD_GATEWAY,
                EvalonError::ConfigParseError { .. }
                | EvalonError::ConfigValidationError { .. }
                | EvalonError::Review(_)
                | EvalonError::Io(_)
                | EvalonError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Invalid(errors) => ErrorResponse {
                error: "Please fix the highlighted fields".to_string(),
                errors: Some(errors),
            },
            Self::Unauthorized(message) | Self::BadRequest(message) => ErrorResponse {
                error: message,
                errors: None,
            },
            Self::Evalon(err) => ErrorResponse {
                error: err.user_message(),
                errors: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the API router with all endpoints.
///
/// The router includes CORS configuration allowing any origin, so a UI
/// served from another port can call it during development.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handle_health))
        .route("/wizards", post(handle_create_wizard))
        .route("/wizards/resume", post(handle_resume_wizard))
        .route(
            "/wizards/:id",
            get(handle_get_wizard).delete(handle_delete_wizard),
        )
        .route("/wizards/:id/fields", patch(handle_update_field))
        .route("/wizards/:id/advance", post(handle_advance))
        .route("/wizards/:id/retreat", post(handle_retreat))
        .route("/wizards/:id/otp/:channel/send", post(handle_send_otp))
        .route("/wizards/:id/otp/:channel/verify", post(handle_verify_otp))
        .route("/wizards/:id/summary", get(handle_summary))
        .route("/password/strength", post(handle_password_strength))
        .route("/login", post(handle_login))
        .route("/locations/countries", get(handle_countries))
        .route("/locations/countries/:country/states", get(handle_states))
        .route(
            "/locations/countries/:country/states/:state/cities",
            get(handle_cities),
        );

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn handle_create_wizard(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateWizardRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let wizard = AnyWizard::new(request.kind, &state.options);
    let view = state.insert(wizard).await?;
    info!(id = %view.id, kind = %request.kind, "Wizard session started");
    Ok((StatusCode::CREATED, Json(view)))
}

async fn handle_resume_wizard(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResumeWizardRequest>,
) -> Result<(StatusCode, Json<SessionView>), ApiError> {
    let wizard = AnyWizard::resume(
        request.kind,
        &state.options,
        state.backend.as_ref(),
        &request.registration_token,
    )
    .await
    .map_err(|e| {
        warn!(kind = %request.kind, error = %e, "Registration status lookup failed");
        e
    })?;
    let view = state.insert(wizard).await?;
    info!(id = %view.id, kind = %request.kind, step = view.view.step, "Wizard session resumed");
    Ok((StatusCode::CREATED, Json(view)))
}

async fn handle_get_wizard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(id).await?;
    let mut wizard = session.lock().await;
    wizard.settle(Instant::now());
    Ok(Json(session_view(id, &wizard)?))
}

async fn handle_delete_wizard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.write().await.remove(&id).is_none() {
        return Err(EvalonError::session_not_found(id).into());
    }
    info!(id = %id, "Wizard session discarded");
    Ok(StatusCode::NO_CONTENT)
}

async fn handle_update_field(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<FieldUpdateRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(id).await?;
    let mut wizard = session.lock().await;
    let now = Instant::now();
    wizard.settle(now);
    wizard
        .change_field(&request.field, request.value, now)
        .map_err(|e| {
            debug!(id = %id, field = %request.field, error = %e, "Field update refused");
            e
        })?;
    Ok(Json(session_view(id, &wizard)?))
}

async fn handle_advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdvanceResponse>, ApiError> {
    let session = state.session(id).await?;
    let (response, completed) = {
        let mut wizard = session.lock().await;
        let outcome = wizard.advance(state.backend.as_ref(), Instant::now()).await;
        info!(id = %id, step = wizard.step(), completed = wizard.is_completed(), "Advance requested");
        let response = AdvanceResponse {
            outcome,
            wizard: session_view(id, &wizard)?,
        };
        (response, wizard.is_completed())
    };

    // A finished registration has nothing left to edit.
    if completed {
        state.sessions.write().await.remove(&id);
        info!(id = %id, "Completed wizard session released");
    }
    Ok(Json(response))
}

async fn handle_retreat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let session = state.session(id).await?;
    let mut wizard = session.lock().await;
    if wizard.retreat().is_none() {
        debug!(id = %id, "Retreat ignored");
    }
    Ok(Json(session_view(id, &wizard)?))
}

async fn handle_send_otp(
    State(state): State<Arc<AppState>>,
    Path((id, channel)): Path<(Uuid, String)>,
) -> Result<Json<SessionView>, ApiError> {
    let channel: Channel = channel.parse()?;
    let session = state.session(id).await?;
    let mut wizard = session.lock().await;
    wizard
        .send_otp(channel, state.backend.as_ref(), Instant::now())
        .await?;
    Ok(Json(session_view(id, &wizard)?))
}

async fn handle_verify_otp(
    State(state): State<Arc<AppState>>,
    Path((id, channel)): Path<(Uuid, String)>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let channel: Channel = channel.parse()?;
    let session = state.session(id).await?;
    let mut wizard = session.lock().await;
    wizard
        .verify_otp(
            channel,
            &request.code,
            state.backend.as_ref(),
            Instant::now(),
        )
        .await?;
    Ok(Json(session_view(id, &wizard)?))
}

async fn handle_summary(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<SummaryQuery>,
) -> Result<Response, ApiError> {
    let session = state.session(id).await?;
    let summary = session.lock().await.review();
    summary.validate().map_err(EvalonError::from)?;

    match query.format.as_deref().unwrap_or("json") {
        "markdown" | "md" => Ok((
            [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
            MarkdownGenerator::new(&summary).generate(),
        )
            .into_response()),
        "json" => {
            let value = JsonGenerator::new(&summary)
                .to_value()
                .map_err(EvalonError::from)?;
            Ok(Json(value).into_response())
        }
        other => Err(ApiError::BadRequest(format!(
            "Unknown summary format '{other}'; use 'markdown' or 'json'"
        ))),
    }
}

async fn handle_password_strength(Json(request): Json<PasswordRequest>) -> Json<PasswordResponse> {
    Json(PasswordResponse {
        strength: score_password(&request.password),
        tips: password_tips(&request.password),
    })
}

async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(form): Json<LoginForm>,
) -> Result<Json<Session>, ApiError> {
    match login(state.backend.as_ref(), &form).await? {
        LoginOutcome::SignedIn(session) => Ok(Json(session)),
        LoginOutcome::Invalid(errors) => Err(ApiError::Invalid(errors)),
        LoginOutcome::Rejected(message) => Err(ApiError::Unauthorized(message)),
    }
}

async fn handle_countries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Country>>, ApiError> {
    Ok(Json(state.locations.countries().await?))
}

async fn handle_states(
    State(state): State<Arc<AppState>>,
    Path(country): Path<String>,
) -> Result<Json<Vec<Region>>, ApiError> {
    Ok(Json(state.locations.states(&country).await?))
}

async fn handle_cities(
    State(state): State<Arc<AppState>>,
    Path((country, region)): Path<(String, String)>,
) -> Result<Json<Vec<City>>, ApiError> {
    Ok(Json(state.locations.cities(&country, &region).await?))
}
