//! reqwest implementation of the backend seams.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use evalon_wizard::{
    ApiEnvelope, BackendErrorKind, Channel, City, Config, Country, EvalonError, LocationLookup,
    LoginRequest, OtpTarget, RegistrationBackend, RegistrationStatus, Result, Session, State,
    VerifyRoute, WizardKind,
};

/// Client for the Evalon registration backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    api_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Creates a client for the backend at `base_url` (without `/api`).
    ///
    /// # Errors
    ///
    /// Returns a network error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                EvalonError::backend(
                    BackendErrorKind::Network,
                    format!("failed to build HTTP client: {e}"),
                )
            })?;

        Ok(Self {
            api_url: format!("{}/api", base_url.trim_end_matches('/')),
            timeout,
            client,
        })
    }

    /// Creates a client from the `backendUrl` and `requestTimeoutSecs`
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns a network error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.backend_url, config.request_timeout())
    }

    /// Base URL every route is appended to, ending in `/api`.
    #[must_use]
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiEnvelope<T>> {
        let url = format!("{}{path}", self.api_url);
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        Self::read_envelope(response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiEnvelope<T>> {
        let url = format!("{}{path}", self.api_url);
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;
        Self::read_envelope(response).await
    }

    fn transport_error(&self, e: &reqwest::Error) -> EvalonError {
        if e.is_timeout() {
            EvalonError::backend(
                BackendErrorKind::Timeout,
                format!("no response within {}s", self.timeout.as_secs()),
            )
        } else if e.is_connect() {
            EvalonError::backend(
                BackendErrorKind::Network,
                format!("backend not reachable at {}", self.api_url),
            )
        } else {
            EvalonError::backend(BackendErrorKind::Network, e.to_string())
        }
    }

    /// Reads the envelope of any response, including error statuses, which
    /// still carry `{ success: false, message }`.
    async fn read_envelope<T: DeserializeOwned>(response: Response) -> Result<ApiEnvelope<T>> {
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            EvalonError::backend(BackendErrorKind::Decode, format!("failed to read body: {e}"))
        })?;

        if status.is_success() {
            return serde_json::from_str(&body).map_err(|e| {
                EvalonError::backend(
                    BackendErrorKind::Decode,
                    format!("failed to parse response: {e}"),
                )
            });
        }

        let message = serde_json::from_str::<ApiEnvelope<Value>>(&body)
            .ok()
            .and_then(|envelope| envelope.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
        warn!(status = status.as_u16(), message = %message, "Backend returned an error status");

        let kind = if status == StatusCode::UNAUTHORIZED {
            BackendErrorKind::Unauthorized
        } else {
            BackendErrorKind::Rejected
        };
        Err(EvalonError::backend(kind, message))
    }
}

/// Checks an envelope whose payload is irrelevant.
fn expect_success(envelope: ApiEnvelope<Value>) -> Result<()> {
    if envelope.success {
        Ok(())
    } else {
        Err(EvalonError::rejected(envelope.message.unwrap_or_default()))
    }
}

fn otp_path(action: &str, channel: Channel) -> String {
    format!("{action}-{channel}-otp")
}

#[async_trait]
impl RegistrationBackend for HttpBackend {
    #[instrument(skip(self, payload), fields(kind = %kind))]
    async fn submit_step(&self, kind: WizardKind, step: usize, payload: &Value) -> Result<Value> {
        let path = format!("/{}/register/step{step}", kind.route_segment());
        self.post::<_, Value>(&path, payload).await?.into_result()
    }

    #[instrument(skip(self, registration_token), fields(kind = %kind))]
    async fn registration_status(
        &self,
        kind: WizardKind,
        registration_token: &str,
    ) -> Result<RegistrationStatus> {
        let path = format!("/{}/register/status", kind.route_segment());
        self.get(&path, &[("registrationToken", registration_token)])
            .await?
            .into_result()
    }

    #[instrument(skip(self, target), fields(channel = %target.channel))]
    async fn send_otp(&self, target: &OtpTarget) -> Result<()> {
        let path = format!("/organizations/auth/{}", otp_path("send", target.channel));
        expect_success(self.post(&path, &target.send_body()).await?)
    }

    #[instrument(skip(self, target, code), fields(channel = %target.channel))]
    async fn verify_otp(&self, target: &OtpTarget, code: &str, route: VerifyRoute) -> Result<()> {
        let scope = match route {
            VerifyRoute::Registration => "register",
            VerifyRoute::Auth => "auth",
        };
        let path = format!(
            "/organizations/{scope}/{}",
            otp_path("verify", target.channel)
        );
        expect_success(self.post(&path, &target.verify_body(code)).await?)
    }

    #[instrument(skip(self, request), fields(user_type = %request.user_type))]
    async fn login(&self, request: &LoginRequest) -> Result<Session> {
        let data: Value = self.post("/auth/login", request).await?.into_result()?;
        Session::from_login_response(&data, request.user_type).ok_or_else(|| {
            EvalonError::backend(
                BackendErrorKind::Decode,
                "login response is missing the token or user id",
            )
        })
    }
}

#[async_trait]
impl LocationLookup for HttpBackend {
    #[instrument(skip(self))]
    async fn countries(&self) -> Result<Vec<Country>> {
        self.get("/locations/countries", &[]).await?.into_result()
    }

    #[instrument(skip(self))]
    async fn states(&self, country: &str) -> Result<Vec<State>> {
        self.get(&format!("/locations/countries/{country}/states"), &[])
            .await?
            .into_result()
    }

    #[instrument(skip(self))]
    async fn cities(&self, country: &str, state: &str) -> Result<Vec<City>> {
        self.get(
            &format!("/locations/countries/{country}/states/{state}/cities"),
            &[],
        )
        .await?
        .into_result()
    }
}
