use log::{error, info, warn};
use mongodb::bson::{oid::ObjectId, DateTime};
use validator::Validate;

use crate::guards::AuthGuard;
use crate::models::{
    Booking, BookingState, BookingStatus, CreateBookingDto, CustomerInfo, Package, PackageStatus,
    Payment, PaymentMethod, PaymentRecordStatus, PaymentStatus, UpdateBookingDto,
};
use crate::store::{BookingFilter, Store};
use crate::utils::{
    generate_transaction_id, parse_date, parse_object_id, AppError, AppResult, Pagination,
};

/// Compare-and-set attempts before a contended booking is reported as a conflict.
pub(crate) const MAX_TRANSITION_ATTEMPTS: usize = 5;

#[derive(Debug)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub refund: Option<Payment>,
    pub package: Option<Package>,
}

pub struct BookingService;

impl BookingService {
    /// Takes seats with one conditional write, then inserts the booking. A
    /// failed insert hands the seats back.
    pub async fn create(
        store: &dyn Store,
        actor: &AuthGuard,
        dto: CreateBookingDto,
    ) -> AppResult<Booking> {
        dto.validate()?;
        let travel_date = validate_travel_date(&dto.travel_date)?;
        let package_id = parse_object_id(&dto.package_id, "package_id")?;
        let travelers = dto.number_of_travelers;

        let package = store
            .find_package(package_id)
            .await?
            .ok_or_else(|| AppError::not_found("Package not found"))?;
        ensure_bookable(&package, travelers)?;
        ensure_within_package_dates(&package, travel_date)?;

        let total_amount = package.price_for(travelers);
        let free = package.is_free_of_charge();

        if store.reserve_seats(package_id, travelers).await?.is_none() {
            // Lost a race; re-read to report why.
            let current = store
                .find_package(package_id)
                .await?
                .ok_or_else(|| AppError::not_found("Package not found"))?;
            ensure_bookable(&current, travelers)?;
            return Err(AppError::conflict(
                "Package seats changed while booking, please try again",
            ));
        }
        info!("Reserved {} seats on package {}", travelers, package_id);

        let now = DateTime::now();
        let (status, payment_status) = if free {
            (BookingStatus::Confirmed, PaymentStatus::Paid)
        } else {
            (BookingStatus::Pending, PaymentStatus::Pending)
        };
        let mut booking = Booking {
            id: None,
            user_id: actor.user_id,
            package_id,
            customer_info: trimmed(&dto.customer_info),
            travel_date: travel_date.format("%Y-%m-%d").to_string(),
            number_of_travelers: travelers,
            total_amount,
            payment_status,
            status,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };

        match store.insert_booking(&booking).await {
            Ok(id) => {
                booking.id = Some(id);
                info!(
                    "Booking {} created for package {} ({} travelers, status {})",
                    id, package_id, travelers, booking.status
                );
                Ok(booking)
            }
            Err(e) => {
                error!("Booking insert failed, releasing {} seats on {}: {}", travelers, package_id, e);
                if let Err(release_err) = store.release_seats(package_id, travelers).await {
                    error!("Failed to release seats on {}: {}", package_id, release_err);
                }
                Err(e.into())
            }
        }
    }

    pub async fn get(store: &dyn Store, actor: &AuthGuard, booking_id: &str) -> AppResult<Booking> {
        let id = parse_object_id(booking_id, "booking_id")?;
        let booking = load(store, id).await?;
        authorize(actor, &booking)?;
        Ok(booking)
    }

    pub async fn list(
        store: &dyn Store,
        filter: &BookingFilter,
        page: Pagination,
    ) -> AppResult<(Vec<Booking>, u64)> {
        Ok(store.list_bookings(filter, page).await?)
    }

    /// Cancels a pending or confirmed booking, returns its seats exactly once
    /// and records a refund when it had been paid.
    pub async fn cancel(
        store: &dyn Store,
        actor: &AuthGuard,
        booking_id: &str,
        reason: Option<String>,
    ) -> AppResult<CancellationOutcome> {
        let id = parse_object_id(booking_id, "booking_id")?;
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| {
                if actor.is_admin() {
                    "Cancelled by admin".to_string()
                } else {
                    "Cancelled by customer".to_string()
                }
            });

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let booking = load(store, id).await?;
            authorize(actor, &booking)?;
            if !booking.status.can_transition_to(BookingStatus::Cancelled) {
                return Err(AppError::conflict(format!(
                    "Booking is already {} and cannot be cancelled",
                    booking.status
                )));
            }

            let expected = booking.state();
            let refundable = expected.payment_status == PaymentStatus::Paid && booking.total_amount > 0.0;
            let next = BookingState {
                status: BookingStatus::Cancelled,
                payment_status: if refundable {
                    PaymentStatus::Refunded
                } else {
                    expected.payment_status
                },
            };

            let Some(cancelled) = store
                .transition_booking(id, expected, next, Some(reason.clone()))
                .await?
            else {
                continue;
            };
            info!("Booking {} cancelled by {}", id, actor.user_id);

            // Only the winner of the compare-and-set gets here, so seats and
            // refund are applied once. A failed step undoes the earlier ones.
            let refund = if refundable {
                match record_refund(store, &cancelled, &reason).await {
                    Ok(refund) => Some(refund),
                    Err(e) => {
                        roll_back_cancellation(store, &cancelled, expected, None).await;
                        return Err(e);
                    }
                }
            } else {
                None
            };

            let package = match store
                .release_seats(cancelled.package_id, cancelled.number_of_travelers)
                .await
            {
                Ok(package) => package,
                Err(e) => {
                    roll_back_cancellation(store, &cancelled, expected, refund.as_ref()).await;
                    return Err(e.into());
                }
            };
            if package.is_none() {
                warn!(
                    "Could not return {} seats to package {} for booking {}",
                    cancelled.number_of_travelers, cancelled.package_id, id
                );
            }

            return Ok(CancellationOutcome {
                booking: cancelled,
                refund,
                package,
            });
        }

        Err(AppError::conflict("Booking was modified concurrently, please retry"))
    }

    /// Admin refund: cancels a paid booking, which records the refund.
    pub async fn refund(
        store: &dyn Store,
        actor: &AuthGuard,
        booking_id: &str,
        reason: Option<String>,
    ) -> AppResult<CancellationOutcome> {
        let id = parse_object_id(booking_id, "booking_id")?;
        let booking = load(store, id).await?;
        if booking.payment_status != PaymentStatus::Paid || booking.total_amount <= 0.0 {
            return Err(AppError::conflict("Booking has no captured payment to refund"));
        }
        let outcome = Self::cancel(store, actor, booking_id, reason).await?;
        if outcome.refund.is_none() {
            warn!("Refund requested for booking {} but none was recorded", id);
        }
        Ok(outcome)
    }

    /// Patch through the transition table. Cancellation is delegated to
    /// [`BookingService::cancel`] so seats and refunds stay consistent.
    pub async fn update(
        store: &dyn Store,
        actor: &AuthGuard,
        booking_id: &str,
        dto: UpdateBookingDto,
    ) -> AppResult<Booking> {
        let id = parse_object_id(booking_id, "booking_id")?;
        let booking = load(store, id).await?;
        authorize(actor, &booking)?;

        // Every check runs before the first write.
        let status_change = dto.status.filter(|next| *next != booking.status);
        if let Some(next) = status_change {
            check_status_change(actor, &booking, next)?;
        }
        let details = if dto.customer_info.is_some() || dto.travel_date.is_some() {
            Some(Self::prepare_details(store, &booking, &dto).await?)
        } else {
            None
        };

        let booking = match details {
            Some((customer_info, travel_date)) => store
                .update_booking_details(id, booking.state(), &customer_info, &travel_date)
                .await?
                .ok_or_else(|| AppError::conflict("Booking was modified concurrently, please retry"))?,
            None => booking,
        };

        match status_change {
            None => Ok(booking),
            Some(BookingStatus::Cancelled) => {
                Ok(Self::cancel(store, actor, booking_id, dto.cancellation_reason).await?.booking)
            }
            Some(next) => Self::change_status(store, actor, id, next).await,
        }
    }

    /// Validated customer info and travel date for a details edit.
    async fn prepare_details(
        store: &dyn Store,
        booking: &Booking,
        dto: &UpdateBookingDto,
    ) -> AppResult<(CustomerInfo, String)> {
        if booking.status != BookingStatus::Pending {
            return Err(AppError::conflict(format!(
                "Booking details can only be changed while pending (status: {})",
                booking.status
            )));
        }
        let customer_info = match &dto.customer_info {
            Some(info) => {
                info.validate().map_err(|e| {
                    AppError::validation(format!(
                        "customer_info.{}",
                        crate::utils::describe_validation_errors(&e)
                    ))
                })?;
                trimmed(info)
            }
            None => booking.customer_info.clone(),
        };
        let travel_date = match &dto.travel_date {
            Some(date) => {
                let date = validate_travel_date(date)?;
                if let Some(package) = store.find_package(booking.package_id).await? {
                    ensure_within_package_dates(&package, date)?;
                }
                date.format("%Y-%m-%d").to_string()
            }
            None => booking.travel_date.clone(),
        };
        Ok((customer_info, travel_date))
    }

    async fn change_status(
        store: &dyn Store,
        actor: &AuthGuard,
        id: ObjectId,
        next: BookingStatus,
    ) -> AppResult<Booking> {
        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let booking = load(store, id).await?;
            check_status_change(actor, &booking, next)?;
            let expected = booking.state();
            let target = BookingState { status: next, ..expected };
            if let Some(updated) = store.transition_booking(id, expected, target, None).await? {
                info!("Booking {} moved from {} to {}", id, expected.status, next);
                return Ok(updated);
            }
        }

        Err(AppError::conflict("Booking was modified concurrently, please retry"))
    }
}

pub(crate) async fn load(store: &dyn Store, id: ObjectId) -> AppResult<Booking> {
    store
        .find_booking(id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))
}

pub(crate) fn authorize(actor: &AuthGuard, booking: &Booking) -> AppResult<()> {
    if actor.can_act_for(booking.user_id) {
        Ok(())
    } else {
        Err(AppError::forbidden("Not authorized to access this booking"))
    }
}

/// Inserts the refund record for money already captured on `booking`.
pub(crate) async fn record_refund(
    store: &dyn Store,
    booking: &Booking,
    reason: &str,
) -> AppResult<Payment> {
    let booking_id = booking
        .id
        .ok_or_else(|| AppError::Internal("booking without id".into()))?;
    let now = DateTime::now();
    let mut refund = Payment {
        id: None,
        user_id: booking.user_id,
        booking_id,
        amount: booking.total_amount,
        method: PaymentMethod::Bank,
        transaction_id: format!("RF{}", generate_transaction_id(PaymentMethod::Bank)),
        status: PaymentRecordStatus::Refunded,
        phone_number: None,
        card_last4: None,
        gateway_reference: None,
        failure_reason: None,
        refund_reason: Some(reason.to_string()),
        created_at: now,
        updated_at: now,
    };

    // Refund goes back through the method the booking was paid with.
    let (paid, _) = store
        .list_payments(
            &crate::store::PaymentFilter {
                booking_id: Some(booking_id),
                ..Default::default()
            },
            Pagination::new(Some(1), Some(100)),
        )
        .await?;
    if let Some(original) = paid.iter().find(|p| p.status.is_successful()) {
        refund.method = original.method;
        refund.phone_number = original.phone_number.clone();
        refund.card_last4 = original.card_last4.clone();
    }

    match store.insert_payment(&refund).await {
        Ok(id) => {
            refund.id = Some(id);
            info!("Refund {} of {:.2} recorded for booking {}", refund.transaction_id, refund.amount, booking_id);
            Ok(refund)
        }
        Err(e) => {
            error!("Refund for booking {} could not be recorded: {}", booking_id, e);
            Err(e.into())
        }
    }
}

/// Owners may only cancel; confirmed and completed are set by an admin.
fn check_status_change(actor: &AuthGuard, booking: &Booking, next: BookingStatus) -> AppResult<()> {
    if next != BookingStatus::Cancelled && !actor.is_admin() {
        return Err(AppError::forbidden(format!(
            "Only an admin can mark a booking as {}",
            next
        )));
    }
    if booking.status.is_terminal() {
        return Err(AppError::conflict(format!(
            "Booking is {} and can no longer be changed",
            booking.status
        )));
    }
    if !booking.status.can_transition_to(next) {
        return Err(AppError::conflict(format!(
            "Cannot change booking status from {} to {}",
            booking.status, next
        )));
    }
    Ok(())
}

/// Puts a booking back to `previous` after a cancellation step failed, and
/// voids a refund recorded for it.
async fn roll_back_cancellation(
    store: &dyn Store,
    cancelled: &Booking,
    previous: BookingState,
    refund: Option<&Payment>,
) {
    let Some(id) = cancelled.id else {
        return;
    };
    if let Some(refund_id) = refund.and_then(|r| r.id) {
        let voided = store
            .transition_payment(
                refund_id,
                PaymentRecordStatus::Refunded,
                PaymentRecordStatus::Failed,
                Some("Cancellation rolled back".to_string()),
                None,
            )
            .await;
        if !matches!(voided, Ok(Some(_))) {
            error!("Refund {} for booking {} could not be voided", refund_id, id);
        }
    }
    match store.transition_booking(id, cancelled.state(), previous, None).await {
        Ok(Some(_)) => warn!("Cancellation of booking {} rolled back", id),
        Ok(None) => error!("Booking {} changed before its cancellation could be rolled back", id),
        Err(e) => error!("Cancellation of booking {} could not be rolled back: {}", id, e),
    }
}

fn ensure_bookable(package: &Package, travelers: i32) -> AppResult<()> {
    match package.status {
        PackageStatus::Active => {}
        PackageStatus::Soldout => {
            return Err(AppError::conflict("Package is sold out (0 seats available)"));
        }
        other => {
            return Err(AppError::conflict(format!(
                "Package is not available for booking (status: {})",
                other
            )));
        }
    }
    if travelers > package.available_seats {
        return Err(AppError::conflict(format!(
            "Only {} seats available for this package",
            package.available_seats
        )));
    }
    Ok(())
}

fn validate_travel_date(value: &str) -> AppResult<chrono::NaiveDate> {
    let date = parse_date(value)
        .ok_or_else(|| AppError::validation("travel_date must be a date in YYYY-MM-DD format"))?;
    if date < chrono::Utc::now().date_naive() {
        return Err(AppError::validation("travel_date cannot be in the past"));
    }
    Ok(date)
}

fn ensure_within_package_dates(package: &Package, date: chrono::NaiveDate) -> AppResult<()> {
    let starts = package.start_date.as_deref().and_then(parse_date);
    let ends = package.end_date.as_deref().and_then(parse_date);
    if starts.is_some_and(|s| date < s) || ends.is_some_and(|e| date > e) {
        return Err(AppError::validation(format!(
            "travel_date must fall between {} and {}",
            package.start_date.as_deref().unwrap_or("-"),
            package.end_date.as_deref().unwrap_or("-"),
        )));
    }
    Ok(())
}

fn trimmed(info: &CustomerInfo) -> CustomerInfo {
    CustomerInfo {
        name: info.name.trim().to_string(),
        email: info.email.trim().to_lowercase(),
        phone: info.phone.trim().to_string(),
        emergency_contact: info.emergency_contact.trim().to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Destination, Role};
    use crate::store::faulty::FaultyStore;
    use crate::store::MemoryStore;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    pub fn user() -> AuthGuard {
        AuthGuard {
            user_id: ObjectId::new(),
            email: "traveler@example.com".into(),
            name: "Traveler".into(),
            role: Role::User,
        }
    }

    pub fn admin() -> AuthGuard {
        AuthGuard {
            user_id: ObjectId::new(),
            email: "ops@example.com".into(),
            name: "Ops".into(),
            role: Role::Admin,
        }
    }

    pub async fn seed_package(store: &dyn Store, seats: i32, price: f64) -> ObjectId {
        let now = DateTime::now();
        let destination_id = store
            .insert_destination(&Destination {
                id: None,
                name: "Zanzibar".into(),
                country: "Tanzania".into(),
                description: None,
                packages_count: 1,
                average_rating: 0.0,
                total_reviews: 0,
                rating_sum: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();
        store
            .insert_package(&Package {
                id: None,
                name: "Stone Town & Beaches".into(),
                description: Some("Five days on the island".into()),
                destination_id,
                price,
                is_free: false,
                duration_days: Some(5),
                start_date: None,
                end_date: None,
                total_seats: seats,
                available_seats: seats,
                booked_seats: 0,
                status: PackageStatus::Active,
                average_rating: 0.0,
                total_reviews: 0,
                rating_sum: 0,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap()
    }

    pub fn booking_request(package_id: ObjectId, travelers: i32) -> CreateBookingDto {
        CreateBookingDto {
            package_id: package_id.to_hex(),
            number_of_travelers: travelers,
            travel_date: (chrono::Utc::now().date_naive() + chrono::Duration::days(30))
                .format("%Y-%m-%d")
                .to_string(),
            customer_info: CustomerInfo {
                name: "Achieng Otieno".into(),
                email: "achieng@example.com".into(),
                phone: "0712345678".into(),
                emergency_contact: "Otieno 0722000000".into(),
            },
        }
    }

    async fn seats(store: &dyn Store, id: ObjectId) -> (i32, i32, PackageStatus) {
        let p = store.find_package(id).await.unwrap().unwrap();
        assert!(p.seats_consistent());
        (p.available_seats, p.booked_seats, p.status)
    }

    #[tokio::test]
    async fn create_takes_seats_and_prices_booking() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 150.0).await;
        let actor = user();

        let booking = BookingService::create(&store, &actor, booking_request(package_id, 4))
            .await
            .unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(booking.total_amount, 600.0);
        assert_eq!(booking.user_id, actor.user_id);
        assert_eq!(seats(&store, package_id).await, (6, 4, PackageStatus::Active));
    }

    #[tokio::test]
    async fn overbooking_is_rejected_without_touching_seats() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 3, 100.0).await;

        let err = BookingService::create(&store, &user(), booking_request(package_id, 4))
            .await
            .unwrap_err();

        assert!(matches!(&err, AppError::Conflict(m) if m.contains("Only 3 seats")));
        assert_eq!(seats(&store, package_id).await, (3, 0, PackageStatus::Active));
    }

    #[tokio::test]
    async fn missing_fields_are_named() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 3, 100.0).await;
        let mut request = booking_request(package_id, 1);
        request.customer_info.phone.clear();

        let err = BookingService::create(&store, &user(), request).await.unwrap_err();
        assert!(matches!(&err, AppError::Validation(m) if m == "customer_info.phone is required"));

        let request = booking_request(package_id, 0);
        let err = BookingService::create(&store, &user(), request).await.unwrap_err();
        assert!(matches!(&err, AppError::Validation(m) if m.starts_with("number_of_travelers")));
    }

    #[tokio::test]
    async fn unknown_or_inactive_packages_cannot_be_booked() {
        let store = MemoryStore::new();
        let err = BookingService::create(&store, &user(), booking_request(ObjectId::new(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let package_id = seed_package(&store, 2, 100.0).await;
        BookingService::create(&store, &user(), booking_request(package_id, 2))
            .await
            .unwrap();
        assert_eq!(seats(&store, package_id).await, (0, 2, PackageStatus::Soldout));
        let err = BookingService::create(&store, &user(), booking_request(package_id, 1))
            .await
            .unwrap_err();
        assert!(matches!(&err, AppError::Conflict(m) if m.contains("sold out")));
    }

    #[tokio::test]
    async fn past_travel_dates_are_rejected() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 2, 100.0).await;
        let mut request = booking_request(package_id, 1);
        request.travel_date = "2001-01-01".into();
        let err = BookingService::create(&store, &user(), request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn free_packages_are_confirmed_on_creation() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 5, 0.0).await;

        let booking = BookingService::create(&store, &user(), booking_request(package_id, 2))
            .await
            .unwrap();
        assert_eq!(booking.total_amount, 0.0);
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);

        let outcome = BookingService::cancel(&store, &owner_of(&booking), &booking.id.unwrap().to_hex(), None)
            .await
            .unwrap();
        assert!(outcome.refund.is_none());
        assert_eq!(outcome.booking.payment_status, PaymentStatus::Paid);
    }

    fn owner_of(booking: &Booking) -> AuthGuard {
        AuthGuard { user_id: booking.user_id, ..user() }
    }

    #[tokio::test]
    async fn cancel_returns_seats_exactly_once() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;
        let actor = user();
        let booking = BookingService::create(&store, &actor, booking_request(package_id, 3))
            .await
            .unwrap();
        let id = booking.id.unwrap().to_hex();

        let outcome = BookingService::cancel(&store, &actor, &id, Some("Change of plans".into()))
            .await
            .unwrap();
        assert_eq!(outcome.booking.status, BookingStatus::Cancelled);
        assert_eq!(outcome.booking.cancellation_reason.as_deref(), Some("Change of plans"));
        assert!(outcome.refund.is_none());
        assert_eq!(seats(&store, package_id).await, (10, 0, PackageStatus::Active));

        let err = BookingService::cancel(&store, &actor, &id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(seats(&store, package_id).await, (10, 0, PackageStatus::Active));
    }

    #[tokio::test]
    async fn cancelling_reopens_a_sold_out_package() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 2, 100.0).await;
        let actor = user();
        let booking = BookingService::create(&store, &actor, booking_request(package_id, 2))
            .await
            .unwrap();
        assert_eq!(seats(&store, package_id).await.2, PackageStatus::Soldout);

        BookingService::cancel(&store, &actor, &booking.id.unwrap().to_hex(), None)
            .await
            .unwrap();
        assert_eq!(seats(&store, package_id).await, (2, 0, PackageStatus::Active));
    }

    #[tokio::test]
    async fn only_owner_or_admin_may_cancel() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;
        let booking = BookingService::create(&store, &user(), booking_request(package_id, 1))
            .await
            .unwrap();
        let id = booking.id.unwrap().to_hex();

        let err = BookingService::cancel(&store, &user(), &id, None).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let outcome = BookingService::cancel(&store, &admin(), &id, None).await.unwrap();
        assert_eq!(outcome.booking.cancellation_reason.as_deref(), Some("Cancelled by admin"));
    }

    #[tokio::test]
    async fn status_changes_follow_the_transition_table() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;
        let owner = user();
        let booking = BookingService::create(&store, &owner, booking_request(package_id, 2))
            .await
            .unwrap();
        let id = booking.id.unwrap().to_hex();
        let to = |status| UpdateBookingDto { status: Some(status), ..Default::default() };

        let err = BookingService::update(&store, &owner, &id, to(BookingStatus::Confirmed))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = BookingService::update(&store, &admin(), &id, to(BookingStatus::Completed))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let confirmed = BookingService::update(&store, &admin(), &id, to(BookingStatus::Confirmed))
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        let completed = BookingService::update(&store, &admin(), &id, to(BookingStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);

        let err = BookingService::update(&store, &admin(), &id, to(BookingStatus::Cancelled))
            .await
            .unwrap_err();
        assert!(matches!(&err, AppError::Conflict(m) if m.contains("completed")));
        // completed bookings keep their seats
        assert_eq!(seats(&store, package_id).await, (8, 2, PackageStatus::Active));
    }

    #[tokio::test]
    async fn cancelling_through_update_returns_seats() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 4, 100.0).await;
        let owner = user();
        let booking = BookingService::create(&store, &owner, booking_request(package_id, 4))
            .await
            .unwrap();

        let updated = BookingService::update(
            &store,
            &owner,
            &booking.id.unwrap().to_hex(),
            UpdateBookingDto {
                status: Some(BookingStatus::Cancelled),
                cancellation_reason: Some("Visa denied".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, BookingStatus::Cancelled);
        assert_eq!(seats(&store, package_id).await, (4, 0, PackageStatus::Active));
    }

    #[tokio::test]
    async fn details_editable_only_while_pending() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 4, 100.0).await;
        let owner = user();
        let booking = BookingService::create(&store, &owner, booking_request(package_id, 1))
            .await
            .unwrap();
        let id = booking.id.unwrap().to_hex();

        let mut info = booking.customer_info.clone();
        info.phone = "0799999999".into();
        let updated = BookingService::update(
            &store,
            &owner,
            &id,
            UpdateBookingDto { customer_info: Some(info.clone()), ..Default::default() },
        )
        .await
        .unwrap();
        assert_eq!(updated.customer_info.phone, "0799999999");

        BookingService::cancel(&store, &owner, &id, None).await.unwrap();
        let err = BookingService::update(
            &store,
            &owner,
            &id,
            UpdateBookingDto { customer_info: Some(info), ..Default::default() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn rejected_status_change_leaves_details_untouched() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 4, 100.0).await;
        let owner = user();
        let booking = BookingService::create(&store, &owner, booking_request(package_id, 1))
            .await
            .unwrap();
        let id = booking.id.unwrap();

        let mut info = booking.customer_info.clone();
        info.phone = "0799999999".into();
        let err = BookingService::update(
            &store,
            &owner,
            &id.to_hex(),
            UpdateBookingDto {
                status: Some(BookingStatus::Confirmed),
                customer_info: Some(info),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let stored = store.find_booking(id).await.unwrap().unwrap();
        assert_eq!(stored.customer_info.phone, "0712345678");
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[tokio::test]
    async fn blank_contact_fields_are_rejected() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 4, 100.0).await;

        let mut request = booking_request(package_id, 1);
        request.customer_info.name = "   ".into();
        let err = BookingService::create(&store, &user(), request).await.unwrap_err();
        assert!(matches!(&err, AppError::Validation(m) if m == "customer_info.name is required"));

        let mut request = booking_request(package_id, 1);
        request.customer_info.emergency_contact = "\t ".into();
        let err = BookingService::create(&store, &user(), request).await.unwrap_err();
        assert!(matches!(&err, AppError::Validation(m) if m == "customer_info.emergency_contact is required"));
        assert_eq!(seats(&store, package_id).await, (4, 0, PackageStatus::Active));

        let owner = user();
        let booking = BookingService::create(&store, &owner, booking_request(package_id, 1))
            .await
            .unwrap();
        let mut info = booking.customer_info.clone();
        info.name = " ".into();
        let err = BookingService::update(
            &store,
            &owner,
            &booking.id.unwrap().to_hex(),
            UpdateBookingDto { customer_info: Some(info), ..Default::default() },
        )
        .await
        .unwrap_err();
        assert!(matches!(&err, AppError::Validation(m) if m == "customer_info.name is required"));
    }

    async fn paid_booking(store: &dyn Store, package_id: ObjectId, owner: &AuthGuard) -> Booking {
        let booking = BookingService::create(store, owner, booking_request(package_id, 2))
            .await
            .unwrap();
        let pending = booking.state();
        store
            .transition_booking(
                booking.id.unwrap(),
                pending,
                BookingState {
                    status: BookingStatus::Confirmed,
                    payment_status: PaymentStatus::Paid,
                },
                None,
            )
            .await
            .unwrap()
            .unwrap()
    }

    async fn payments_of(store: &dyn Store, booking_id: ObjectId) -> Vec<Payment> {
        let filter = crate::store::PaymentFilter {
            booking_id: Some(booking_id),
            ..Default::default()
        };
        store.list_payments(&filter, Pagination::default()).await.unwrap().0
    }

    #[tokio::test]
    async fn failed_seat_release_rolls_back_the_cancellation() {
        let store = FaultyStore::new();
        let package_id = seed_package(&store, 5, 100.0).await;
        let owner = user();
        let booking = paid_booking(&store, package_id, &owner).await;
        let id = booking.id.unwrap();

        store.fail_release_seats.store(true, Ordering::SeqCst);
        let err = BookingService::cancel(&store, &owner, &id.to_hex(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));

        let stored = store.find_booking(id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.payment_status, PaymentStatus::Paid);
        assert_eq!(seats(&store, package_id).await, (3, 2, PackageStatus::Active));
        let voided = payments_of(&store, id).await;
        assert_eq!(voided.len(), 1);
        assert_eq!(voided[0].status, PaymentRecordStatus::Failed);

        // once storage recovers the same request completes
        store.fail_release_seats.store(false, Ordering::SeqCst);
        let outcome = BookingService::cancel(&store, &owner, &id.to_hex(), None)
            .await
            .unwrap();
        assert_eq!(outcome.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(outcome.refund.unwrap().amount, 200.0);
        assert_eq!(seats(&store, package_id).await, (5, 0, PackageStatus::Active));
    }

    #[tokio::test]
    async fn failed_refund_record_rolls_back_the_cancellation() {
        let store = FaultyStore::new();
        let package_id = seed_package(&store, 5, 100.0).await;
        let owner = user();
        let booking = paid_booking(&store, package_id, &owner).await;
        let id = booking.id.unwrap();

        store.fail_insert_payment.store(true, Ordering::SeqCst);
        let err = BookingService::cancel(&store, &owner, &id.to_hex(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Store(_)));

        let stored = store.find_booking(id).await.unwrap().unwrap();
        assert_eq!(stored.state(), booking.state());
        assert_eq!(seats(&store, package_id).await, (3, 2, PackageStatus::Active));
        assert!(payments_of(&store, id).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bookings_for_last_seats_admit_one() {
        let store = Arc::new(MemoryStore::new());
        let package_id = seed_package(store.as_ref(), 2, 100.0).await;

        let attempts: Vec<_> = (0..2)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    BookingService::create(store.as_ref(), &user(), booking_request(package_id, 2)).await
                })
            })
            .collect();

        let mut successes = 0;
        let mut conflicts = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(_) => successes += 1,
                Err(AppError::Conflict(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((successes, conflicts), (1, 1));
        assert_eq!(seats(store.as_ref(), package_id).await, (0, 2, PackageStatus::Soldout));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_cancels_credit_once() {
        let store = Arc::new(MemoryStore::new());
        let package_id = seed_package(store.as_ref(), 6, 100.0).await;
        let owner = user();
        let booking = BookingService::create(store.as_ref(), &owner, booking_request(package_id, 3))
            .await
            .unwrap();
        let id = booking.id.unwrap().to_hex();

        let attempts: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let owner = owner.clone();
                let id = id.clone();
                tokio::spawn(async move { BookingService::cancel(store.as_ref(), &owner, &id, None).await.is_ok() })
            })
            .collect();

        let mut succeeded = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 1);
        assert_eq!(seats(store.as_ref(), package_id).await, (6, 0, PackageStatus::Active));
    }
}
