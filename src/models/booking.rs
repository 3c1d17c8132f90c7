use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::utils::not_blank;

use super::{hex_id, timestamp};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// pending -> {confirmed, cancelled}, confirmed -> {completed, cancelled}.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("Unknown booking status '{}'", other)),
        }
    }
}

/// Payment state as seen from the booking.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// A new charge may be attempted: first attempt, or retry after a decline.
    pub fn accepts_charge(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("Unknown payment status '{}'", other)),
        }
    }
}

/// The pair every conditional booking write is guarded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookingState {
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, JsonSchema, Validate)]
#[serde(default)]
pub struct CustomerInfo {
    #[validate(custom = "not_blank")]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(custom = "not_blank")]
    pub phone: String,
    #[validate(custom = "not_blank")]
    pub emergency_contact: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub package_id: ObjectId,
    pub customer_info: CustomerInfo,
    pub travel_date: String, // YYYY-MM-DD
    pub number_of_travelers: i32,
    pub total_amount: f64,
    pub payment_status: PaymentStatus,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    pub fn state(&self) -> BookingState {
        BookingState {
            status: self.status,
            payment_status: self.payment_status,
        }
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct CreateBookingDto {
    #[validate(custom = "not_blank")]
    pub package_id: String,
    #[validate(range(min = 1, message = "must be a positive number"))]
    pub number_of_travelers: i32,
    #[validate(custom = "not_blank")]
    pub travel_date: String,
    #[validate]
    pub customer_info: CustomerInfo,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct UpdateBookingDto {
    pub status: Option<BookingStatus>,
    pub customer_info: Option<CustomerInfo>,
    pub travel_date: Option<String>,
    pub cancellation_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct CancelBookingDto {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct BookingResponse {
    pub id: String,
    pub user_id: String,
    pub package_id: String,
    pub customer_info: CustomerInfo,
    pub travel_date: String,
    pub number_of_travelers: i32,
    pub total_amount: f64,
    pub payment_status: PaymentStatus,
    pub status: BookingStatus,
    pub cancellation_reason: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        BookingResponse {
            id: hex_id(&booking.id),
            user_id: booking.user_id.to_hex(),
            package_id: booking.package_id.to_hex(),
            customer_info: booking.customer_info,
            travel_date: booking.travel_date,
            number_of_travelers: booking.number_of_travelers,
            total_amount: booking.total_amount,
            payment_status: booking.payment_status,
            status: booking.status,
            cancellation_reason: booking.cancellation_reason,
            created_at: timestamp(&booking.created_at),
            updated_at: timestamp(&booking.updated_at),
        }
    }
}
