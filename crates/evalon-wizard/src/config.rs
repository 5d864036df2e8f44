//! Configuration for the Evalon onboarding service.
//!
//! Settings are read from `evalon.json` (camelCase keys). Every key is
//! optional; a missing file yields the defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EvalonError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "evalon.json";

/// Default base URL of the registration backend.
fn default_backend_url() -> String {
    "http://localhost:5001".to_string()
}

/// Default HTTP client timeout in seconds.
const fn default_request_timeout_secs() -> u64 {
    10
}

/// Default OTP resend cooldown in seconds.
const fn default_otp_resend_cooldown_secs() -> u64 {
    60
}

/// Default delay before an edited field's error is cleared.
const fn default_field_error_clear_delay_ms() -> u64 {
    100
}

/// Default dialling code for new forms.
fn default_country_code() -> String {
    "+91".to_string()
}

/// Default bind address for the HTTP API.
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

/// Default port for the HTTP API.
const fn default_port() -> u16 {
    4000
}

/// Main configuration for the onboarding service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Base URL of the registration backend (without the `/api` suffix).
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// Timeout applied to every backend request, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Seconds a user must wait before re-sending an OTP.
    #[serde(default = "default_otp_resend_cooldown_secs")]
    pub otp_resend_cooldown_secs: u64,

    /// Milliseconds between editing a field and its error disappearing.
    #[serde(default = "default_field_error_clear_delay_ms")]
    pub field_error_clear_delay_ms: u64,

    /// Country dialling code preselected on new forms.
    #[serde(default = "default_country_code")]
    pub default_country_code: String,

    /// Address the HTTP API binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port the HTTP API listens on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            otp_resend_cooldown_secs: default_otp_resend_cooldown_secs(),
            field_error_clear_delay_ms: default_field_error_clear_delay_ms(),
            default_country_code: default_country_code(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `evalon.json` in the current directory. If not found,
    /// returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EvalonError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `evalon.json` inside `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `EvalonError::ConfigParseError` if the file cannot be read or
    /// parsed, and `EvalonError::ConfigValidationError` if a value is out of
    /// range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EvalonError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EvalonError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `EvalonError::ConfigValidationError` naming the first bad key.
    pub fn validate(&self) -> Result<()> {
        let url = self.backend_url.trim();
        if url.is_empty() {
            return Err(EvalonError::config_validation(
                "backendUrl must not be empty",
                "Set backendUrl to the registration backend, e.g. \"http://localhost:5001\"",
            ));
        }

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(EvalonError::config_validation(
                format!("backendUrl '{url}' is not an http(s) URL"),
                "Prefix backendUrl with http:// or https:// in your evalon.json",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(EvalonError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your evalon.json",
            ));
        }

        if self.otp_resend_cooldown_secs == 0 {
            return Err(EvalonError::config_validation(
                "otpResendCooldownSecs must be greater than 0",
                "Set otpResendCooldownSecs to at least 1 second in your evalon.json",
            ));
        }

        if !self.default_country_code.starts_with('+') {
            return Err(EvalonError::config_validation(
                format!(
                    "defaultCountryCode '{}' must start with '+'",
                    self.default_country_code
                ),
                "Use a dialling code such as \"+91\" in your evalon.json",
            ));
        }

        if self.bind_address.trim().is_empty() {
            return Err(EvalonError::config_validation(
                "bindAddress must not be empty",
                "Set bindAddress to \"127.0.0.1\" or \"0.0.0.0\" in your evalon.json",
            ));
        }

        Ok(())
    }

    /// Backend request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// OTP resend cooldown as a [`Duration`].
    #[must_use]
    pub const fn otp_resend_cooldown(&self) -> Duration {
        Duration::from_secs(self.otp_resend_cooldown_secs)
    }

    /// Field error clear delay as a [`Duration`].
    #[must_use]
    pub const fn field_error_clear_delay(&self) -> Duration {
        Duration::from_millis(self.field_error_clear_delay_ms)
    }
}
