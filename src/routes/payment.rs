use log::{error, info, warn};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use std::time::Duration;

use crate::config::Config;
use crate::db::DbConn;
use crate::guards::{AuthGuard, WebhookSignature};
use crate::models::{
    CreatePaymentDto, NotificationOutcome, PaymentMethod, PaymentNotification,
    PaymentRecordStatus, PaymentResponse,
};
use crate::services::gateway::verify_signature;
use crate::services::{GatewayConn, PaymentService};
use crate::store::PaymentFilter;
use crate::utils::{ApiError, ApiResponse, Pagination};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct PaymentPageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn page_json(payments: Vec<crate::models::Payment>, page: Pagination, total: u64) -> serde_json::Value {
    let payments: Vec<PaymentResponse> = payments.into_iter().map(Into::into).collect();
    serde_json::json!({
        "payments": payments,
        "pagination": page.to_json(total),
    })
}

/// Stands in for Safaricom's callback in demos: settles the payment through
/// the webhook path after a delay.
fn schedule_simulated_mpesa_callback(db: DbConn, transaction_id: String) {
    let delay = Config::mpesa_callback_delay_secs();
    info!("Simulated M-Pesa callback for {} in {}s", transaction_id, delay);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(delay)).await;
        let notification = PaymentNotification {
            gateway_reference: Some(format!("MPESA-SIM-{}", transaction_id)),
            transaction_id,
            outcome: NotificationOutcome::Success,
            reason: None,
        };
        if let Err(e) = PaymentService::handle_notification(db.as_ref(), notification).await {
            error!("Simulated M-Pesa callback failed: {}", e);
        }
    });
}

#[openapi(tag = "Payment")]
#[post("/payments", data = "<dto>")]
pub async fn create_payment(
    db: &State<DbConn>,
    gateway: &State<GatewayConn>,
    auth: AuthGuard,
    dto: Json<CreatePaymentDto>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ApiError> {
    let payment = PaymentService::record(
        db.inner().as_ref(),
        gateway.inner().as_ref(),
        &auth,
        dto.into_inner(),
    )
    .await?;

    if payment.status == PaymentRecordStatus::Pending
        && payment.method == PaymentMethod::Mpesa
        && Config::simulate_mpesa_callback()
    {
        schedule_simulated_mpesa_callback(db.inner().clone(), payment.transaction_id.clone());
    }

    let message = match payment.status {
        PaymentRecordStatus::Pending => "Payment initiated, awaiting confirmation",
        PaymentRecordStatus::Failed => "Payment was declined",
        _ => "Payment completed successfully",
    };
    Ok(Json(ApiResponse::success_with_message(
        message.to_string(),
        payment.into(),
    )))
}

#[openapi(tag = "Payment")]
#[get("/payments/my?<query..>")]
pub async fn my_payments(
    db: &State<DbConn>,
    auth: AuthGuard,
    query: PaymentPageQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Pagination::new(query.page, query.limit);
    let filter = PaymentFilter {
        user_id: Some(auth.user_id),
        ..Default::default()
    };
    let (payments, total) = PaymentService::list(db.inner().as_ref(), &filter, page).await?;
    Ok(Json(ApiResponse::success(page_json(payments, page, total))))
}

#[openapi(tag = "Payment")]
#[get("/payments/booking/<booking_id>?<query..>")]
pub async fn booking_payments(
    db: &State<DbConn>,
    auth: AuthGuard,
    booking_id: String,
    query: PaymentPageQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Pagination::new(query.page, query.limit);
    let (payments, total) =
        PaymentService::list_for_booking(db.inner().as_ref(), &auth, &booking_id, page).await?;
    Ok(Json(ApiResponse::success(page_json(payments, page, total))))
}

/// Gateway callback. The signature covers the raw body, so it is checked
/// before the JSON is parsed.
#[openapi(tag = "Payment")]
#[post("/payments/webhook", data = "<body>")]
pub async fn payment_webhook(
    db: &State<DbConn>,
    signature: WebhookSignature,
    body: String,
) -> Result<Json<ApiResponse<PaymentResponse>>, ApiError> {
    if !verify_signature(&Config::webhook_secret(), body.as_bytes(), &signature.0) {
        warn!("Rejected webhook with invalid signature");
        return Err(ApiError::unauthorized("Invalid webhook signature"));
    }
    let notification: PaymentNotification = serde_json::from_str(&body)
        .map_err(|e| ApiError::bad_request(format!("Invalid notification: {}", e)))?;

    let payment = PaymentService::handle_notification(db.inner().as_ref(), notification).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Notification processed".to_string(),
        payment.into(),
    )))
}
