use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{CreateReviewDto, ReviewResponse, ReviewTargetKind};
use crate::services::ReviewService;
use crate::utils::{ApiError, ApiResponse, Pagination};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct ReviewsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

async fn submit(
    db: &DbConn,
    auth: &AuthGuard,
    kind: ReviewTargetKind,
    dto: CreateReviewDto,
) -> Result<Json<ApiResponse<ReviewResponse>>, ApiError> {
    let review = ReviewService::submit(db.as_ref(), auth, kind, dto).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Review submitted successfully".to_string(),
        review.into(),
    )))
}

async fn list(
    db: &DbConn,
    kind: ReviewTargetKind,
    target_id: &str,
    query: ReviewsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Pagination::new(query.page, query.limit);
    let (reviews, total) = ReviewService::list(db.as_ref(), kind, target_id, page).await?;
    let reviews: Vec<ReviewResponse> = reviews.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "reviews": reviews,
        "pagination": page.to_json(total),
    }))))
}

#[openapi(tag = "Review")]
#[post("/reviews/package", data = "<dto>")]
pub async fn review_package(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateReviewDto>,
) -> Result<Json<ApiResponse<ReviewResponse>>, ApiError> {
    submit(db.inner(), &auth, ReviewTargetKind::Package, dto.into_inner()).await
}

#[openapi(tag = "Review")]
#[post("/reviews/destination", data = "<dto>")]
pub async fn review_destination(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateReviewDto>,
) -> Result<Json<ApiResponse<ReviewResponse>>, ApiError> {
    submit(db.inner(), &auth, ReviewTargetKind::Destination, dto.into_inner()).await
}

#[openapi(tag = "Review")]
#[get("/reviews/package/<package_id>?<query..>")]
pub async fn package_reviews(
    db: &State<DbConn>,
    package_id: String,
    query: ReviewsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    list(db.inner(), ReviewTargetKind::Package, &package_id, query).await
}

#[openapi(tag = "Review")]
#[get("/reviews/destination/<destination_id>?<query..>")]
pub async fn destination_reviews(
    db: &State<DbConn>,
    destination_id: String,
    query: ReviewsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    list(db.inner(), ReviewTargetKind::Destination, &destination_id, query).await
}

#[openapi(tag = "Review")]
#[post("/reviews/<review_id>/helpful")]
pub async fn mark_helpful(
    db: &State<DbConn>,
    _auth: AuthGuard,
    review_id: String,
) -> Result<Json<ApiResponse<ReviewResponse>>, ApiError> {
    let review = ReviewService::mark_helpful(db.inner().as_ref(), &review_id).await?;
    Ok(Json(ApiResponse::success(review.into())))
}

#[openapi(tag = "Review")]
#[delete("/reviews/<review_id>")]
pub async fn delete_review(
    db: &State<DbConn>,
    auth: AuthGuard,
    review_id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    ReviewService::delete(db.inner().as_ref(), &auth, &review_id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Review deleted successfully".to_string(),
        serde_json::json!({ "id": review_id }),
    )))
}
