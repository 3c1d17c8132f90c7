use hmac::{Hmac, Mac};
use log::{info, warn};
use reqwest::Client;
use rocket::fairing::AdHoc;
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;

use crate::config::Config;
use crate::models::PaymentMethod;

/// What the gateway needs to authorize one charge.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub transaction_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub phone_number: Option<String>,
    pub card_number: Option<String>,
    pub bank_reference: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayDecision {
    Approved { reference: Option<String> },
    Declined { reason: String },
    /// Settled later through the payment webhook.
    Pending,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment gateway unreachable: {0}")]
    Unavailable(String),
    #[error("payment gateway returned an invalid response: {0}")]
    InvalidResponse(String),
}

#[rocket::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayDecision, GatewayError>;
}

pub type GatewayConn = Arc<dyn PaymentGateway>;

pub fn init() -> AdHoc {
    AdHoc::on_ignite("Payment gateway", |rocket| async {
        let gateway: GatewayConn = match HttpPaymentGateway::from_config() {
            Some(gateway) => {
                info!("✓ Using HTTP payment gateway");
                Arc::new(gateway)
            }
            None => {
                if Config::payment_gateway() == "http" {
                    warn!("HTTP payment gateway selected but not configured, falling back to simulation");
                }
                info!("✓ Using simulated payment gateway");
                Arc::new(SimulatedGateway)
            }
        };
        rocket.manage(gateway)
    })
}

/// Deterministic stand-in for a real processor, for development and tests.
/// Cards ending in 0002 are declined, cards ending in 0119 make the gateway
/// unreachable; everything else is approved. M-Pesa and bank transfers wait
/// for a webhook.
pub struct SimulatedGateway;

pub const DECLINED_TEST_CARD_SUFFIX: &str = "0002";
pub const UNAVAILABLE_TEST_CARD_SUFFIX: &str = "0119";

#[rocket::async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayDecision, GatewayError> {
        match request.method {
            PaymentMethod::Card => {
                let digits: String = request
                    .card_number
                    .as_deref()
                    .unwrap_or_default()
                    .chars()
                    .filter(char::is_ascii_digit)
                    .collect();
                if digits.ends_with(UNAVAILABLE_TEST_CARD_SUFFIX) {
                    Err(GatewayError::Unavailable("simulated outage".to_string()))
                } else if digits.ends_with(DECLINED_TEST_CARD_SUFFIX) {
                    Ok(GatewayDecision::Declined {
                        reason: "Card declined by issuer".to_string(),
                    })
                } else {
                    Ok(GatewayDecision::Approved {
                        reference: Some(format!("SIM-{}", request.transaction_id)),
                    })
                }
            }
            PaymentMethod::Mpesa | PaymentMethod::Bank => Ok(GatewayDecision::Pending),
        }
    }
}

/// Remote processor speaking a small JSON charge API with basic auth.
pub struct HttpPaymentGateway {
    client: Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
    reference: Option<String>,
    reason: Option<String>,
}

impl ChargeResponse {
    fn decision(self) -> Result<GatewayDecision, GatewayError> {
        match self.status.as_str() {
            "approved" | "succeeded" => Ok(GatewayDecision::Approved { reference: self.reference }),
            "declined" | "failed" => Ok(GatewayDecision::Declined {
                reason: self.reason.unwrap_or_else(|| "Payment declined".to_string()),
            }),
            "pending" => Ok(GatewayDecision::Pending),
            other => Err(GatewayError::InvalidResponse(format!("unknown status '{}'", other))),
        }
    }
}

impl HttpPaymentGateway {
    pub fn from_config() -> Option<Self> {
        if !Config::is_http_gateway_enabled() {
            return None;
        }
        Some(HttpPaymentGateway {
            client: Client::new(),
            base_url: Config::payment_gateway_url()?,
            key_id: Config::payment_gateway_key_id()?,
            key_secret: Config::payment_gateway_key_secret()?,
        })
    }
}

#[rocket::async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn charge(&self, request: &ChargeRequest) -> Result<GatewayDecision, GatewayError> {
        let res = self
            .client
            .post(format!("{}/charges", self.base_url.trim_end_matches('/')))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&json!({
                "transaction_id": request.transaction_id,
                // minor units
                "amount": (request.amount * 100.0).round() as i64,
                "method": request.method.as_str(),
                "phone_number": request.phone_number,
                "card_number": request.card_number,
                "bank_reference": request.bank_reference,
            }))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if res.status().is_server_error() {
            return Err(GatewayError::Unavailable(format!("status {}", res.status())));
        }

        let body: ChargeResponse = res
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        body.decision()
    }
}

/// Hex HMAC-SHA256 of `payload`, as the gateway signs its callbacks.
#[cfg(test)]
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature over `payload`.
pub fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
