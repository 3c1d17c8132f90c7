use log::{error, info, warn};
use mongodb::bson::DateTime;

use crate::guards::AuthGuard;
use crate::models::{
    Booking, BookingState, BookingStatus, CardDetails, CreatePaymentDto, NotificationOutcome,
    Payment, PaymentMethod, PaymentNotification, PaymentRecordStatus, PaymentStatus,
};
use crate::services::booking::{authorize, load, record_refund, MAX_TRANSITION_ATTEMPTS};
use crate::services::gateway::{ChargeRequest, GatewayDecision, PaymentGateway};
use crate::store::{PaymentFilter, Store, StoreError};
use crate::utils::{
    generate_transaction_id, parse_object_id, validate_mpesa_phone, AppError, AppResult,
    Pagination,
};

pub struct PaymentService;

impl PaymentService {
    /// Records one charge attempt and lets the gateway decide it. Card
    /// charges settle immediately; M-Pesa and bank transfers stay pending
    /// until [`PaymentService::handle_notification`] sees the outcome.
    pub async fn record(
        store: &dyn Store,
        gateway: &dyn PaymentGateway,
        actor: &AuthGuard,
        dto: CreatePaymentDto,
    ) -> AppResult<Payment> {
        let booking_id = parse_object_id(&dto.booking_id, "booking_id")?;
        let booking = load(store, booking_id).await?;
        authorize(actor, &booking)?;

        if booking.status.is_terminal() {
            return Err(AppError::conflict(format!(
                "Cannot pay for a {} booking",
                booking.status
            )));
        }
        if !booking.payment_status.accepts_charge() {
            return Err(AppError::conflict("Booking is already paid"));
        }
        if (dto.amount - booking.total_amount).abs() > 0.005 {
            return Err(AppError::validation(format!(
                "amount must equal the booking total of {:.2}",
                booking.total_amount
            )));
        }
        let details = MethodDetails::from_request(&dto)?;

        let now = DateTime::now();
        let mut payment = Payment {
            id: None,
            user_id: booking.user_id,
            booking_id,
            amount: booking.total_amount,
            method: dto.method,
            transaction_id: generate_transaction_id(dto.method),
            status: PaymentRecordStatus::Pending,
            phone_number: details.phone_number.clone(),
            card_last4: details.card_last4(),
            gateway_reference: None,
            failure_reason: None,
            refund_reason: None,
            created_at: now,
            updated_at: now,
        };
        payment.id = Some(match store.insert_payment(&payment).await {
            Ok(id) => id,
            Err(StoreError::Duplicate(_)) => {
                return Err(AppError::conflict(
                    "A payment for this booking is already in progress",
                ));
            }
            Err(e) => return Err(e.into()),
        });
        info!(
            "Payment {} ({}) of {:.2} started for booking {}",
            payment.transaction_id, payment.method, payment.amount, booking_id
        );

        let request = ChargeRequest {
            transaction_id: payment.transaction_id.clone(),
            amount: payment.amount,
            method: payment.method,
            phone_number: details.phone_number,
            card_number: details.card_number,
            bank_reference: details.bank_reference,
        };

        match gateway.charge(&request).await {
            Ok(GatewayDecision::Approved { reference }) => {
                settle_success(store, payment, reference).await
            }
            Ok(GatewayDecision::Declined { reason }) => settle_failure(store, payment, reason).await,
            Ok(GatewayDecision::Pending) => Ok(payment),
            Err(e) => {
                error!("Gateway error for payment {}: {}", payment.transaction_id, e);
                if let Some(id) = payment.id {
                    store
                        .transition_payment(
                            id,
                            PaymentRecordStatus::Pending,
                            PaymentRecordStatus::Failed,
                            Some(e.to_string()),
                            None,
                        )
                        .await?;
                }
                Err(AppError::Downstream(
                    "Payment gateway is unavailable, please try again".to_string(),
                ))
            }
        }
    }

    /// Applies a verified gateway notification. Notifications for payments
    /// that already left `pending` are acknowledged without side effects.
    pub async fn handle_notification(
        store: &dyn Store,
        notification: PaymentNotification,
    ) -> AppResult<Payment> {
        let payment = store
            .find_payment_by_transaction(&notification.transaction_id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment not found"))?;

        if payment.status != PaymentRecordStatus::Pending {
            info!(
                "Notification for {} ignored, payment already {}",
                payment.transaction_id, payment.status
            );
            return Ok(payment);
        }

        info!(
            "Webhook {:?} received for payment {}",
            notification.outcome, payment.transaction_id
        );
        match notification.outcome {
            NotificationOutcome::Success => {
                settle_success(store, payment, notification.gateway_reference).await
            }
            NotificationOutcome::Failed => {
                let reason = notification
                    .reason
                    .unwrap_or_else(|| "Payment failed".to_string());
                settle_failure(store, payment, reason).await
            }
        }
    }

    pub async fn list(
        store: &dyn Store,
        filter: &PaymentFilter,
        page: Pagination,
    ) -> AppResult<(Vec<Payment>, u64)> {
        Ok(store.list_payments(filter, page).await?)
    }

    pub async fn list_for_booking(
        store: &dyn Store,
        actor: &AuthGuard,
        booking_id: &str,
        page: Pagination,
    ) -> AppResult<(Vec<Payment>, u64)> {
        let id = parse_object_id(booking_id, "booking_id")?;
        let booking = load(store, id).await?;
        authorize(actor, &booking)?;
        let filter = PaymentFilter {
            booking_id: Some(id),
            ..Default::default()
        };
        Ok(store.list_payments(&filter, page).await?)
    }
}

struct MethodDetails {
    phone_number: Option<String>,
    card_number: Option<String>,
    bank_reference: Option<String>,
}

impl MethodDetails {
    fn from_request(dto: &CreatePaymentDto) -> AppResult<Self> {
        let mut details = MethodDetails {
            phone_number: None,
            card_number: None,
            bank_reference: None,
        };
        match dto.method {
            PaymentMethod::Mpesa => {
                let phone = non_empty(dto.phone_number.as_deref())
                    .ok_or_else(|| AppError::validation("phone_number is required for M-Pesa payments"))?;
                if !validate_mpesa_phone(phone) {
                    return Err(AppError::validation(
                        "phone_number must be a valid M-Pesa number",
                    ));
                }
                details.phone_number = Some(phone.to_string());
            }
            PaymentMethod::Card => {
                let card = dto
                    .card
                    .as_ref()
                    .ok_or_else(|| AppError::validation("card is required for card payments"))?;
                check_card(card)?;
                details.card_number = Some(card.number.trim().to_string());
            }
            PaymentMethod::Bank => {
                let reference = non_empty(dto.bank_reference.as_deref()).ok_or_else(|| {
                    AppError::validation("bank_reference is required for bank payments")
                })?;
                details.bank_reference = Some(reference.to_string());
            }
        }
        Ok(details)
    }

    fn card_last4(&self) -> Option<String> {
        let digits: Vec<char> = self
            .card_number
            .as_deref()?
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let start = digits.len().saturating_sub(4);
        Some(digits[start..].iter().collect())
    }
}

// Presence only; the processor validates the card itself.
fn check_card(card: &CardDetails) -> AppResult<()> {
    let fields = [
        ("holder_name", &card.holder_name),
        ("number", &card.number),
        ("expiry", &card.expiry),
        ("cvv", &card.cvv),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(AppError::validation(format!("card.{} is required", name)));
        }
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Marks the payment completed, then moves the booking to confirmed/paid. If
/// the booking can no longer take the money it is refunded instead.
async fn settle_success(
    store: &dyn Store,
    payment: Payment,
    reference: Option<String>,
) -> AppResult<Payment> {
    let Some(payment_id) = payment.id else {
        return Err(AppError::Internal("payment without id".into()));
    };
    let Some(completed) = store
        .transition_payment(
            payment_id,
            PaymentRecordStatus::Pending,
            PaymentRecordStatus::Completed,
            None,
            reference,
        )
        .await?
    else {
        return current(store, &payment).await;
    };
    info!("Payment {} completed", completed.transaction_id);

    for _ in 0..MAX_TRANSITION_ATTEMPTS {
        let booking = load(store, completed.booking_id).await?;
        let expected = booking.state();
        if booking.status == BookingStatus::Cancelled || !expected.payment_status.accepts_charge() {
            refund_late_payment(store, &booking, &completed).await?;
            return Ok(completed);
        }
        let next = BookingState {
            status: match booking.status {
                BookingStatus::Pending => BookingStatus::Confirmed,
                other => other,
            },
            payment_status: PaymentStatus::Paid,
        };
        if store
            .transition_booking(completed.booking_id, expected, next, None)
            .await?
            .is_some()
        {
            info!(
                "Booking {} confirmed by payment {}",
                completed.booking_id, completed.transaction_id
            );
            return Ok(completed);
        }
    }

    error!(
        "Payment {} completed but booking {} kept changing; needs manual reconciliation",
        completed.transaction_id, completed.booking_id
    );
    Err(AppError::conflict("Booking was modified concurrently, please retry"))
}

async fn settle_failure(store: &dyn Store, payment: Payment, reason: String) -> AppResult<Payment> {
    let Some(payment_id) = payment.id else {
        return Err(AppError::Internal("payment without id".into()));
    };
    let Some(failed) = store
        .transition_payment(
            payment_id,
            PaymentRecordStatus::Pending,
            PaymentRecordStatus::Failed,
            Some(reason),
            None,
        )
        .await?
    else {
        return current(store, &payment).await;
    };
    warn!(
        "Payment {} failed: {}",
        failed.transaction_id,
        failed.failure_reason.as_deref().unwrap_or_default()
    );

    for _ in 0..MAX_TRANSITION_ATTEMPTS {
        let booking = load(store, failed.booking_id).await?;
        let expected = booking.state();
        // A decline never downgrades a booking another payment already settled.
        if booking.status.is_terminal() || expected.payment_status != PaymentStatus::Pending {
            return Ok(failed);
        }
        let next = BookingState {
            payment_status: PaymentStatus::Failed,
            ..expected
        };
        if store
            .transition_booking(failed.booking_id, expected, next, None)
            .await?
            .is_some()
        {
            return Ok(failed);
        }
    }
    Ok(failed)
}

/// Refunds a success that can no longer be applied. If the refund cannot be
/// recorded the payment goes back to pending, so a redelivered notification
/// settles it again.
async fn refund_late_payment(store: &dyn Store, booking: &Booking, payment: &Payment) -> AppResult<()> {
    let reason = if booking.status == BookingStatus::Cancelled {
        "Booking was cancelled before the payment completed"
    } else {
        "Booking was already paid"
    };
    warn!(
        "Payment {} arrived for booking {} ({}); refunding",
        payment.transaction_id, payment.booking_id, reason
    );
    let refund_for = Booking {
        total_amount: payment.amount,
        ..booking.clone()
    };
    let Err(e) = record_refund(store, &refund_for, reason).await else {
        return Ok(());
    };
    error!(
        "Refund for late payment {} could not be recorded: {}",
        payment.transaction_id, e
    );
    if let Some(payment_id) = payment.id {
        let reopened = store
            .transition_payment(
                payment_id,
                PaymentRecordStatus::Completed,
                PaymentRecordStatus::Pending,
                None,
                None,
            )
            .await;
        if !matches!(reopened, Ok(Some(_))) {
            error!(
                "Payment {} is completed without its refund; needs manual reconciliation",
                payment.transaction_id
            );
        }
    }
    Err(e)
}

async fn current(store: &dyn Store, payment: &Payment) -> AppResult<Payment> {
    Ok(store
        .find_payment_by_transaction(&payment.transaction_id)
        .await?
        .unwrap_or_else(|| payment.clone()))
}
