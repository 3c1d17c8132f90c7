use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;

use super::{hex_id, timestamp};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Mpesa,
    Card,
    Bank,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::Card => "card",
            PaymentMethod::Bank => "bank",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single payment record.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRecordStatus {
    Pending,
    Paid,
    Completed,
    Failed,
    Refunded,
}

impl PaymentRecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentRecordStatus::Pending => "pending",
            PaymentRecordStatus::Paid => "paid",
            PaymentRecordStatus::Completed => "completed",
            PaymentRecordStatus::Failed => "failed",
            PaymentRecordStatus::Refunded => "refunded",
        }
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, PaymentRecordStatus::Paid | PaymentRecordStatus::Completed)
    }
}

impl fmt::Display for PaymentRecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentRecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentRecordStatus::Pending),
            "paid" => Ok(PaymentRecordStatus::Paid),
            "completed" => Ok(PaymentRecordStatus::Completed),
            "failed" => Ok(PaymentRecordStatus::Failed),
            "refunded" => Ok(PaymentRecordStatus::Refunded),
            other => Err(format!("Unknown payment status '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Payment {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub booking_id: ObjectId,
    pub amount: f64,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub status: PaymentRecordStatus,
    pub phone_number: Option<String>,
    pub card_last4: Option<String>,
    pub gateway_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub refund_reason: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CardDetails {
    pub holder_name: String,
    pub number: String,
    pub expiry: String,
    pub cvv: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreatePaymentDto {
    pub booking_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub phone_number: Option<String>,
    pub card: Option<CardDetails>,
    pub bank_reference: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationOutcome {
    Success,
    Failed,
}

/// Inbound gateway callback settling a pending payment.
#[derive(Debug, Serialize, Deserialize, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentNotification {
    pub transaction_id: String,
    pub outcome: NotificationOutcome,
    pub reason: Option<String>,
    pub gateway_reference: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PaymentResponse {
    pub id: String,
    pub user_id: String,
    pub booking_id: String,
    pub amount: f64,
    pub method: PaymentMethod,
    pub transaction_id: String,
    pub status: PaymentRecordStatus,
    pub card_last4: Option<String>,
    pub failure_reason: Option<String>,
    pub refund_reason: Option<String>,
    pub created_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        PaymentResponse {
            id: hex_id(&payment.id),
            user_id: payment.user_id.to_hex(),
            booking_id: payment.booking_id.to_hex(),
            amount: payment.amount,
            method: payment.method,
            transaction_id: payment.transaction_id,
            status: payment.status,
            card_last4: payment.card_last4,
            failure_reason: payment.failure_reason,
            refund_reason: payment.refund_reason,
            created_at: timestamp(&payment.created_at),
        }
    }
}
