use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{
    BookingResponse, BookingStatus, CancelBookingDto, CreateBookingDto, PackageResponse,
    PaymentResponse, UpdateBookingDto,
};
use crate::services::{BookingService, CancellationOutcome};
use crate::store::BookingFilter;
use crate::utils::{ApiError, ApiResponse, AppError, Pagination};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct MyBookingsQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub(crate) fn cancellation_json(outcome: CancellationOutcome) -> serde_json::Value {
    serde_json::json!({
        "booking": BookingResponse::from(outcome.booking),
        "refund": outcome.refund.map(PaymentResponse::from),
        "package": outcome.package.map(PackageResponse::from),
    })
}

#[openapi(tag = "Booking")]
#[post("/bookings", data = "<dto>")]
pub async fn create_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateBookingDto>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking = BookingService::create(db.inner().as_ref(), &auth, dto.into_inner()).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking created successfully".to_string(),
        booking.into(),
    )))
}

#[openapi(tag = "Booking")]
#[get("/bookings/my?<query..>")]
pub async fn my_bookings(
    db: &State<DbConn>,
    auth: AuthGuard,
    query: MyBookingsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Pagination::new(query.page, query.limit);
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(s) => Some(s.parse::<BookingStatus>().map_err(AppError::Validation)?),
        None => None,
    };
    let filter = BookingFilter {
        user_id: Some(auth.user_id),
        status,
        ..Default::default()
    };
    let (bookings, total) = BookingService::list(db.inner().as_ref(), &filter, page).await?;
    let bookings: Vec<BookingResponse> = bookings.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "bookings": bookings,
        "pagination": page.to_json(total),
    }))))
}

#[openapi(tag = "Booking")]
#[get("/bookings/<id>")]
pub async fn get_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking = BookingService::get(db.inner().as_ref(), &auth, &id).await?;
    Ok(Json(ApiResponse::success(booking.into())))
}

#[openapi(tag = "Booking")]
#[put("/bookings/<id>", data = "<dto>")]
pub async fn update_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
    dto: Json<UpdateBookingDto>,
) -> Result<Json<ApiResponse<BookingResponse>>, ApiError> {
    let booking = BookingService::update(db.inner().as_ref(), &auth, &id, dto.into_inner()).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking updated".to_string(),
        booking.into(),
    )))
}

#[openapi(tag = "Booking")]
#[put("/bookings/<id>/cancel", data = "<dto>")]
pub async fn cancel_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
    dto: Json<CancelBookingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let outcome =
        BookingService::cancel(db.inner().as_ref(), &auth, &id, dto.into_inner().reason).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking cancelled successfully".to_string(),
        cancellation_json(outcome),
    )))
}
