use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use std::fmt;
use validator::Validate;

use crate::utils::not_blank;

use super::{hex_id, timestamp};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReviewTargetKind {
    Package,
    Destination,
}

impl ReviewTargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewTargetKind::Package => "package",
            ReviewTargetKind::Destination => "destination",
        }
    }
}

impl fmt::Display for ReviewTargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReviewTarget {
    pub kind: ReviewTargetKind,
    pub id: ObjectId,
}

impl ReviewTarget {
    pub fn package(id: ObjectId) -> Self {
        ReviewTarget { kind: ReviewTargetKind::Package, id }
    }

    pub fn destination(id: ObjectId) -> Self {
        ReviewTarget { kind: ReviewTargetKind::Destination, id }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Review {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub target_type: ReviewTargetKind,
    pub target_id: ObjectId,
    pub user_id: ObjectId,
    pub booking_id: Option<ObjectId>, // package reviews only
    pub rating: i32, // 1-5
    pub title: String,
    pub comment: String,
    pub helpful: i32,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Review {
    pub fn target(&self) -> ReviewTarget {
        ReviewTarget { kind: self.target_type, id: self.target_id }
    }
}

/// Running counters kept on the target document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RatingSummary {
    pub rating_sum: i64,
    pub total_reviews: i32,
}

impl RatingSummary {
    /// Mean rating rounded to one decimal, 0 when there are no reviews.
    pub fn average(&self) -> f64 {
        if self.total_reviews <= 0 {
            return 0.0;
        }
        let mean = self.rating_sum as f64 / self.total_reviews as f64;
        (mean * 10.0).round() / 10.0
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct CreateReviewDto {
    #[validate(custom = "not_blank")]
    pub target_id: String,
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub rating: i32,
    #[validate(custom = "not_blank")]
    pub title: String,
    #[validate(custom = "not_blank")]
    pub comment: String,
    pub booking_id: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ReviewResponse {
    pub id: String,
    pub target_type: ReviewTargetKind,
    pub target_id: String,
    pub user_id: String,
    pub booking_id: Option<String>,
    pub rating: i32,
    pub title: String,
    pub comment: String,
    pub helpful: i32,
    pub created_at: String,
}

impl From<Review> for ReviewResponse {
    fn from(review: Review) -> Self {
        ReviewResponse {
            id: hex_id(&review.id),
            target_type: review.target_type,
            target_id: review.target_id.to_hex(),
            user_id: review.user_id.to_hex(),
            booking_id: review.booking_id.map(|id| id.to_hex()),
            rating: review.rating,
            title: review.title,
            comment: review.comment,
            helpful: review.helpful,
            created_at: timestamp(&review.created_at),
        }
    }
}
