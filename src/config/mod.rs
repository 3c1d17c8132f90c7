use log::{error, warn};
use rocket::fairing::AdHoc;
use rocket::figment::{Figment, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;

pub struct Config;

impl Config {
    const SECRETS: [&'static str; 3] = ["jwt_secret", "jwt_refresh_secret", "webhook_secret"];

    fn profile() -> String {
        env::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string())
    }

    pub fn figment() -> Figment {
        let profile = Self::profile();

        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(&profile)
            .merge(Env::prefixed("ROCKET_").ignore(&["PROFILE"]).global())
    }

    fn secret(key: &str) -> Option<String> {
        Self::figment()
            .extract_inner::<String>(key)
            .ok()
            .filter(|value| !value.trim().is_empty())
    }

    /// Signing secrets that are not configured. Launch refuses to continue
    /// with any of these outside development.
    pub fn missing_secrets() -> Vec<&'static str> {
        Self::SECRETS
            .into_iter()
            .filter(|key| Self::secret(key).is_none())
            .collect()
    }

    pub fn jwt_secret() -> String {
        Self::secret("jwt_secret").unwrap_or_default()
    }

    pub fn jwt_refresh_secret() -> String {
        Self::secret("jwt_refresh_secret").unwrap_or_default()
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(900)
    }

    pub fn jwt_refresh_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_refresh_expiry")
            .unwrap_or(604800)
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn database_name() -> String {
        Self::figment()
            .extract_inner("database_name")
            .unwrap_or_else(|_| "travel-booking".to_string())
    }

    /// `mongodb` (default) or `memory`.
    pub fn storage() -> String {
        Self::figment()
            .extract_inner("storage")
            .unwrap_or_else(|_| "mongodb".to_string())
    }

    pub fn is_development() -> bool {
        Self::profile() == "development"
    }

    /// `simulated` (default) or `http`.
    pub fn payment_gateway() -> String {
        Self::figment()
            .extract_inner("payment_gateway")
            .unwrap_or_else(|_| "simulated".to_string())
    }

    pub fn payment_gateway_url() -> Option<String> {
        Self::figment()
            .extract_inner("payment_gateway_url")
            .ok()
    }

    pub fn payment_gateway_key_id() -> Option<String> {
        Self::figment()
            .extract_inner("payment_gateway_key_id")
            .ok()
    }

    pub fn payment_gateway_key_secret() -> Option<String> {
        Self::figment()
            .extract_inner("payment_gateway_key_secret")
            .ok()
    }

    pub fn is_http_gateway_enabled() -> bool {
        Self::payment_gateway() == "http"
            && Self::payment_gateway_url().is_some()
            && Self::payment_gateway_key_id().is_some()
            && Self::payment_gateway_key_secret().is_some()
    }

    pub fn webhook_secret() -> String {
        Self::secret("webhook_secret").unwrap_or_default()
    }

    /// Demo only: completes pending M-Pesa payments without a real callback.
    pub fn simulate_mpesa_callback() -> bool {
        Self::figment()
            .extract_inner("simulate_mpesa_callback")
            .unwrap_or(false)
    }

    pub fn mpesa_callback_delay_secs() -> u64 {
        Self::figment()
            .extract_inner("mpesa_callback_delay_secs")
            .unwrap_or(5)
    }
}

/// Refuses to launch without signing secrets outside development.
pub fn check_secrets() -> AdHoc {
    AdHoc::try_on_ignite("Secrets", |rocket| async move {
        let missing = Config::missing_secrets();
        if missing.is_empty() {
            return Ok(rocket);
        }
        if Config::is_development() {
            warn!("Running without {}; do not expose this instance", missing.join(", "));
            Ok(rocket)
        } else {
            error!("Missing required secrets: {}", missing.join(", "));
            Err(rocket)
        }
    })
}
