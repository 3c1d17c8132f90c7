use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{
    BookingResponse, BookingStatus, CancelBookingDto, PaymentRecordStatus, PaymentResponse,
    PaymentStatus,
};
use crate::routes::booking::cancellation_json;
use crate::services::{BookingService, PaymentService};
use crate::store::{BookingFilter, PaymentFilter};
use crate::utils::{parse_object_id, ApiError, ApiResponse, AppError, Pagination};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct AdminBookingsQuery {
    pub status: Option<String>,
    #[field(name = "paymentStatus")]
    #[serde(rename = "paymentStatus")]
    pub payment_status: Option<String>,
    pub package: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct AdminPaymentsQuery {
    pub status: Option<String>,
    pub booking: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[openapi(tag = "Admin")]
#[get("/admin/bookings?<query..>")]
pub async fn all_bookings(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: AdminBookingsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Pagination::new(query.page, query.limit);
    let filter = BookingFilter {
        user_id: None,
        package_id: non_empty(&query.package)
            .map(|id| parse_object_id(id, "package"))
            .transpose()?,
        status: non_empty(&query.status)
            .map(|s| s.parse::<BookingStatus>().map_err(AppError::Validation))
            .transpose()?,
        payment_status: non_empty(&query.payment_status)
            .map(|s| s.parse::<PaymentStatus>().map_err(AppError::Validation))
            .transpose()?,
    };
    let (bookings, total) = BookingService::list(db.inner().as_ref(), &filter, page).await?;
    let bookings: Vec<BookingResponse> = bookings.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "bookings": bookings,
        "pagination": page.to_json(total),
    }))))
}

#[openapi(tag = "Admin")]
#[post("/admin/bookings/<id>/refund", data = "<dto>")]
pub async fn refund_booking(
    db: &State<DbConn>,
    admin: AdminGuard,
    id: String,
    dto: Json<CancelBookingDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let outcome =
        BookingService::refund(db.inner().as_ref(), &admin.auth, &id, dto.into_inner().reason)
            .await?;

    Ok(Json(ApiResponse::success_with_message(
        "Booking cancelled and refunded".to_string(),
        cancellation_json(outcome),
    )))
}

#[openapi(tag = "Admin")]
#[get("/admin/payments?<query..>")]
pub async fn all_payments(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: AdminPaymentsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Pagination::new(query.page, query.limit);
    let filter = PaymentFilter {
        user_id: None,
        booking_id: non_empty(&query.booking)
            .map(|id| parse_object_id(id, "booking"))
            .transpose()?,
        status: non_empty(&query.status)
            .map(|s| s.parse::<PaymentRecordStatus>().map_err(AppError::Validation))
            .transpose()?,
    };
    let (payments, total) = PaymentService::list(db.inner().as_ref(), &filter, page).await?;
    let payments: Vec<PaymentResponse> = payments.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "payments": payments,
        "pagination": page.to_json(total),
    }))))
}
