use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::utils::not_blank;

use super::{hex_id, timestamp};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Destination {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub country: String,
    pub description: Option<String>,
    pub packages_count: i32,
    pub average_rating: f64,
    pub total_reviews: i32,
    #[serde(default)]
    pub rating_sum: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, JsonSchema, Validate)]
pub struct CreateDestinationDto {
    #[validate(custom = "not_blank")]
    pub name: String,
    #[validate(custom = "not_blank")]
    pub country: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DestinationResponse {
    pub id: String,
    pub name: String,
    pub country: String,
    pub description: Option<String>,
    pub packages_count: i32,
    pub average_rating: f64,
    pub total_reviews: i32,
    pub created_at: String,
}

impl From<Destination> for DestinationResponse {
    fn from(destination: Destination) -> Self {
        DestinationResponse {
            id: hex_id(&destination.id),
            name: destination.name,
            country: destination.country,
            description: destination.description,
            packages_count: destination.packages_count,
            average_rating: destination.average_rating,
            total_reviews: destination.total_reviews,
            created_at: timestamp(&destination.created_at),
        }
    }
}
