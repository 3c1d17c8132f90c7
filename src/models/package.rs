use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars;
use rocket_okapi::okapi::schemars::JsonSchema;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::utils::not_blank;

use super::{hex_id, timestamp};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    Active,
    Inactive,
    Soldout,
    Upcoming,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Active => "active",
            PackageStatus::Inactive => "inactive",
            PackageStatus::Soldout => "soldout",
            PackageStatus::Upcoming => "upcoming",
        }
    }

    /// Status once the package has `available_seats` left. Only the
    /// active/soldout pair is derived from seats; the others are manual.
    pub fn after_seat_change(self, available_seats: i32) -> Self {
        match self {
            PackageStatus::Active if available_seats <= 0 => PackageStatus::Soldout,
            PackageStatus::Soldout if available_seats > 0 => PackageStatus::Active,
            other => other,
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(PackageStatus::Active),
            "inactive" => Ok(PackageStatus::Inactive),
            "soldout" => Ok(PackageStatus::Soldout),
            "upcoming" => Ok(PackageStatus::Upcoming),
            other => Err(format!("Unknown package status '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Package {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub description: Option<String>,
    pub destination_id: ObjectId,
    pub price: f64,
    pub is_free: bool,
    pub duration_days: Option<i32>,
    pub start_date: Option<String>, // YYYY-MM-DD
    pub end_date: Option<String>,

    // Seat inventory: available_seats + booked_seats == total_seats
    pub total_seats: i32,
    pub available_seats: i32,
    pub booked_seats: i32,
    pub status: PackageStatus,

    // Review aggregate
    pub average_rating: f64,
    pub total_reviews: i32,
    #[serde(default)]
    pub rating_sum: i64,

    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Package {
    pub fn is_free_of_charge(&self) -> bool {
        self.is_free || self.price <= 0.0
    }

    pub fn price_for(&self, travelers: i32) -> f64 {
        if self.is_free_of_charge() {
            0.0
        } else {
            self.price * travelers as f64
        }
    }

    pub fn seats_consistent(&self) -> bool {
        self.available_seats >= 0
            && self.booked_seats >= 0
            && self.available_seats + self.booked_seats == self.total_seats
    }
}

/// Final field values written by an admin update, guarded on `booked_seats`.
#[derive(Debug, Clone)]
pub struct PackageFields {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub is_free: bool,
    pub duration_days: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub total_seats: i32,
    pub available_seats: i32,
    pub status: PackageStatus,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreatePackageDto {
    #[validate(custom = "not_blank")]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "not_blank")]
    pub destination_id: String,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub price: f64,
    pub is_free: Option<bool>,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub duration_days: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub total_seats: i32,
    pub status: Option<PackageStatus>,
}

#[derive(Debug, Default, Deserialize, JsonSchema, Validate)]
pub struct UpdatePackageDto {
    #[validate(custom = "not_blank")]
    pub name: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 0.0, message = "must not be negative"))]
    pub price: Option<f64>,
    pub is_free: Option<bool>,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub duration_days: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[validate(range(min = 1, message = "must be at least 1"))]
    pub total_seats: Option<i32>,
    pub status: Option<PackageStatus>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PackageResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub destination_id: String,
    pub price: f64,
    pub is_free: bool,
    pub duration_days: Option<i32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub total_seats: i32,
    pub available_seats: i32,
    pub booked_seats: i32,
    pub status: PackageStatus,
    pub average_rating: f64,
    pub total_reviews: i32,
    pub created_at: String,
}

impl From<Package> for PackageResponse {
    fn from(package: Package) -> Self {
        PackageResponse {
            id: hex_id(&package.id),
            name: package.name,
            description: package.description,
            destination_id: package.destination_id.to_hex(),
            price: package.price,
            is_free: package.is_free,
            duration_days: package.duration_days,
            start_date: package.start_date,
            end_date: package.end_date,
            total_seats: package.total_seats,
            available_seats: package.available_seats,
            booked_seats: package.booked_seats,
            status: package.status,
            average_rating: package.average_rating,
            total_reviews: package.total_reviews,
            created_at: timestamp(&package.created_at),
        }
    }
}
