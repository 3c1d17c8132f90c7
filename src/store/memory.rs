use std::collections::HashMap;

use mongodb::bson::{oid::ObjectId, DateTime};
use rocket::tokio::sync::Mutex;

use super::{
    BookingFilter, DestinationFilter, PackageFilter, PaymentFilter, Store, StoreError,
    StoreResult,
};
use crate::models::{
    Booking, BookingState, BookingStatus, CustomerInfo, Destination, Package, PackageFields,
    Payment, PaymentRecordStatus, RatingSummary, Review, ReviewTarget, ReviewTargetKind, User,
};
use crate::utils::Pagination;

/// Process-local store. One mutex over every collection, so each trait call
/// is atomic in the same way a single-document update is in MongoDB.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Collections>,
}

#[derive(Default)]
struct Collections {
    users: HashMap<ObjectId, User>,
    destinations: HashMap<ObjectId, Destination>,
    packages: HashMap<ObjectId, Package>,
    bookings: HashMap<ObjectId, Booking>,
    payments: HashMap<ObjectId, Payment>,
    reviews: HashMap<ObjectId, Review>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first, then a page out of the result.
fn paginate<T: Clone>(
    mut items: Vec<&T>,
    created_at: impl Fn(&T) -> (DateTime, Option<ObjectId>),
    page: Pagination,
) -> (Vec<T>, u64) {
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    let total = items.len() as u64;
    let page_items = items
        .into_iter()
        .skip(page.skip() as usize)
        .take(page.limit as usize)
        .cloned()
        .collect();
    (page_items, total)
}

fn with_id<T>(mut doc: T, id: ObjectId, set_id: impl FnOnce(&mut T, ObjectId)) -> T {
    set_id(&mut doc, id);
    doc
}

#[rocket::async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> StoreResult<ObjectId> {
        let mut db = self.inner.lock().await;
        if db.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate(format!("users.email {}", user.email)));
        }
        let id = ObjectId::new();
        db.users.insert(id, with_id(user.clone(), id, |u, id| u.id = Some(id)));
        Ok(id)
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        Ok(self.inner.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let db = self.inner.lock().await;
        Ok(db.users.values().find(|u| u.email == email).cloned())
    }

    async fn record_login(&self, id: ObjectId) -> StoreResult<()> {
        if let Some(user) = self.inner.lock().await.users.get_mut(&id) {
            user.last_login_at = DateTime::now();
        }
        Ok(())
    }

    async fn insert_destination(&self, destination: &Destination) -> StoreResult<ObjectId> {
        let id = ObjectId::new();
        self.inner
            .lock()
            .await
            .destinations
            .insert(id, with_id(destination.clone(), id, |d, id| d.id = Some(id)));
        Ok(id)
    }

    async fn find_destination(&self, id: ObjectId) -> StoreResult<Option<Destination>> {
        Ok(self.inner.lock().await.destinations.get(&id).cloned())
    }

    async fn list_destinations(
        &self,
        filter: &DestinationFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Destination>, u64)> {
        let db = self.inner.lock().await;
        let matching = db.destinations.values().filter(|d| filter.matches(d)).collect();
        Ok(paginate(matching, |d| (d.created_at, d.id), page))
    }

    async fn adjust_packages_count(&self, id: ObjectId, delta: i32) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        match db.destinations.get_mut(&id) {
            Some(destination) => {
                destination.packages_count = (destination.packages_count + delta).max(0);
                destination.updated_at = DateTime::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_package(&self, package: &Package) -> StoreResult<ObjectId> {
        let id = ObjectId::new();
        self.inner
            .lock()
            .await
            .packages
            .insert(id, with_id(package.clone(), id, |p, id| p.id = Some(id)));
        Ok(id)
    }

    async fn find_package(&self, id: ObjectId) -> StoreResult<Option<Package>> {
        Ok(self.inner.lock().await.packages.get(&id).cloned())
    }

    async fn list_packages(
        &self,
        filter: &PackageFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Package>, u64)> {
        let db = self.inner.lock().await;
        let matching = db.packages.values().filter(|p| filter.matches(p)).collect();
        Ok(paginate(matching, |p| (p.created_at, p.id), page))
    }

    async fn update_package_fields(
        &self,
        id: ObjectId,
        expected_booked: i32,
        fields: &PackageFields,
    ) -> StoreResult<Option<Package>> {
        let mut db = self.inner.lock().await;
        let Some(package) = db.packages.get_mut(&id) else {
            return Ok(None);
        };
        if package.booked_seats != expected_booked {
            return Ok(None);
        }
        package.name = fields.name.clone();
        package.description = fields.description.clone();
        package.price = fields.price;
        package.is_free = fields.is_free;
        package.duration_days = fields.duration_days;
        package.start_date = fields.start_date.clone();
        package.end_date = fields.end_date.clone();
        package.total_seats = fields.total_seats;
        package.available_seats = fields.available_seats;
        package.status = fields.status;
        package.updated_at = DateTime::now();
        Ok(Some(package.clone()))
    }

    async fn delete_package(&self, id: ObjectId) -> StoreResult<bool> {
        Ok(self.inner.lock().await.packages.remove(&id).is_some())
    }

    async fn reserve_seats(&self, id: ObjectId, seats: i32) -> StoreResult<Option<Package>> {
        let mut db = self.inner.lock().await;
        let Some(package) = db.packages.get_mut(&id) else {
            return Ok(None);
        };
        if package.status != crate::models::PackageStatus::Active || package.available_seats < seats {
            return Ok(None);
        }
        package.available_seats -= seats;
        package.booked_seats += seats;
        package.status = package.status.after_seat_change(package.available_seats);
        package.updated_at = DateTime::now();
        Ok(Some(package.clone()))
    }

    async fn release_seats(&self, id: ObjectId, seats: i32) -> StoreResult<Option<Package>> {
        let mut db = self.inner.lock().await;
        let Some(package) = db.packages.get_mut(&id) else {
            return Ok(None);
        };
        if package.booked_seats < seats {
            return Ok(None);
        }
        package.available_seats += seats;
        package.booked_seats -= seats;
        package.status = package.status.after_seat_change(package.available_seats);
        package.updated_at = DateTime::now();
        Ok(Some(package.clone()))
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<ObjectId> {
        let id = ObjectId::new();
        self.inner
            .lock()
            .await
            .bookings
            .insert(id, with_id(booking.clone(), id, |b, id| b.id = Some(id)));
        Ok(id)
    }

    async fn find_booking(&self, id: ObjectId) -> StoreResult<Option<Booking>> {
        Ok(self.inner.lock().await.bookings.get(&id).cloned())
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        let db = self.inner.lock().await;
        let matching = db.bookings.values().filter(|b| filter.matches(b)).collect();
        Ok(paginate(matching, |b| (b.created_at, b.id), page))
    }

    async fn count_open_bookings(&self, package_id: ObjectId) -> StoreResult<u64> {
        let db = self.inner.lock().await;
        Ok(db
            .bookings
            .values()
            .filter(|b| {
                b.package_id == package_id
                    && matches!(b.status, BookingStatus::Pending | BookingStatus::Confirmed)
            })
            .count() as u64)
    }

    async fn transition_booking(
        &self,
        id: ObjectId,
        expected: BookingState,
        next: BookingState,
        cancellation_reason: Option<String>,
    ) -> StoreResult<Option<Booking>> {
        let mut db = self.inner.lock().await;
        let Some(booking) = db.bookings.get_mut(&id) else {
            return Ok(None);
        };
        if booking.state() != expected {
            return Ok(None);
        }
        booking.status = next.status;
        booking.payment_status = next.payment_status;
        if cancellation_reason.is_some() {
            booking.cancellation_reason = cancellation_reason;
        }
        booking.updated_at = DateTime::now();
        Ok(Some(booking.clone()))
    }

    async fn update_booking_details(
        &self,
        id: ObjectId,
        expected: BookingState,
        customer_info: &CustomerInfo,
        travel_date: &str,
    ) -> StoreResult<Option<Booking>> {
        let mut db = self.inner.lock().await;
        let Some(booking) = db.bookings.get_mut(&id) else {
            return Ok(None);
        };
        if booking.state() != expected {
            return Ok(None);
        }
        booking.customer_info = customer_info.clone();
        booking.travel_date = travel_date.to_string();
        booking.updated_at = DateTime::now();
        Ok(Some(booking.clone()))
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<ObjectId> {
        let mut db = self.inner.lock().await;
        if payment.status == PaymentRecordStatus::Pending
            && db.payments.values().any(|p| {
                p.booking_id == payment.booking_id && p.status == PaymentRecordStatus::Pending
            })
        {
            return Err(StoreError::Duplicate(format!(
                "payments pending for booking {}",
                payment.booking_id
            )));
        }
        if db.payments.values().any(|p| p.transaction_id == payment.transaction_id) {
            return Err(StoreError::Duplicate(format!(
                "payments.transaction_id {}",
                payment.transaction_id
            )));
        }
        let id = ObjectId::new();
        db.payments.insert(id, with_id(payment.clone(), id, |p, id| p.id = Some(id)));
        Ok(id)
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        let db = self.inner.lock().await;
        Ok(db
            .payments
            .values()
            .find(|p| p.transaction_id == transaction_id)
            .cloned())
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Payment>, u64)> {
        let db = self.inner.lock().await;
        let matching = db.payments.values().filter(|p| filter.matches(p)).collect();
        Ok(paginate(matching, |p| (p.created_at, p.id), page))
    }

    async fn transition_payment(
        &self,
        id: ObjectId,
        expected: PaymentRecordStatus,
        next: PaymentRecordStatus,
        failure_reason: Option<String>,
        gateway_reference: Option<String>,
    ) -> StoreResult<Option<Payment>> {
        let mut db = self.inner.lock().await;
        let Some(payment) = db.payments.get_mut(&id) else {
            return Ok(None);
        };
        if payment.status != expected {
            return Ok(None);
        }
        payment.status = next;
        if failure_reason.is_some() {
            payment.failure_reason = failure_reason;
        }
        if gateway_reference.is_some() {
            payment.gateway_reference = gateway_reference;
        }
        payment.updated_at = DateTime::now();
        Ok(Some(payment.clone()))
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<ObjectId> {
        let mut db = self.inner.lock().await;
        if db
            .reviews
            .values()
            .any(|r| r.user_id == review.user_id && r.target() == review.target())
        {
            return Err(StoreError::Duplicate(format!(
                "reviews for {} {} by {}",
                review.target_type, review.target_id, review.user_id
            )));
        }
        let id = ObjectId::new();
        db.reviews.insert(id, with_id(review.clone(), id, |r, id| r.id = Some(id)));
        Ok(id)
    }

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        Ok(self.inner.lock().await.reviews.get(&id).cloned())
    }

    async fn find_user_review(
        &self,
        user_id: ObjectId,
        target: ReviewTarget,
    ) -> StoreResult<Option<Review>> {
        let db = self.inner.lock().await;
        Ok(db
            .reviews
            .values()
            .find(|r| r.user_id == user_id && r.target() == target)
            .cloned())
    }

    async fn delete_review(&self, id: ObjectId) -> StoreResult<bool> {
        Ok(self.inner.lock().await.reviews.remove(&id).is_some())
    }

    async fn list_reviews(
        &self,
        target: ReviewTarget,
        page: Pagination,
    ) -> StoreResult<(Vec<Review>, u64)> {
        let db = self.inner.lock().await;
        let matching = db.reviews.values().filter(|r| r.target() == target).collect();
        Ok(paginate(matching, |r| (r.created_at, r.id), page))
    }

    async fn increment_helpful(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        let mut db = self.inner.lock().await;
        Ok(db.reviews.get_mut(&id).map(|review| {
            review.helpful += 1;
            review.clone()
        }))
    }

    async fn adjust_rating(
        &self,
        target: ReviewTarget,
        rating_delta: i64,
        count_delta: i32,
    ) -> StoreResult<Option<RatingSummary>> {
        let mut db = self.inner.lock().await;
        let counters = match target.kind {
            ReviewTargetKind::Package => db
                .packages
                .get_mut(&target.id)
                .map(|p| (&mut p.rating_sum, &mut p.total_reviews)),
            ReviewTargetKind::Destination => db
                .destinations
                .get_mut(&target.id)
                .map(|d| (&mut d.rating_sum, &mut d.total_reviews)),
        };
        let Some((rating_sum, total_reviews)) = counters else {
            return Ok(None);
        };
        if *total_reviews + count_delta < 0 {
            return Ok(None);
        }
        *rating_sum += rating_delta;
        *total_reviews += count_delta;
        Ok(Some(RatingSummary {
            rating_sum: *rating_sum,
            total_reviews: *total_reviews,
        }))
    }

    async fn set_average_rating(
        &self,
        target: ReviewTarget,
        summary: RatingSummary,
        average: f64,
    ) -> StoreResult<bool> {
        let mut db = self.inner.lock().await;
        let fields = match target.kind {
            ReviewTargetKind::Package => db
                .packages
                .get_mut(&target.id)
                .map(|p| (p.rating_sum, p.total_reviews, &mut p.average_rating)),
            ReviewTargetKind::Destination => db
                .destinations
                .get_mut(&target.id)
                .map(|d| (d.rating_sum, d.total_reviews, &mut d.average_rating)),
        };
        match fields {
            Some((rating_sum, total_reviews, average_rating))
                if rating_sum == summary.rating_sum && total_reviews == summary.total_reviews =>
            {
                *average_rating = average;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
