//! Test wrapper over [`MemoryStore`] that fails chosen writes on demand.

use std::sync::atomic::{AtomicBool, Ordering};

use mongodb::bson::oid::ObjectId;

use super::{
    BookingFilter, DestinationFilter, MemoryStore, PackageFilter, PaymentFilter, Store,
    StoreError, StoreResult,
};
use crate::models::{
    Booking, BookingState, CustomerInfo, Destination, Package, PackageFields, Payment,
    PaymentRecordStatus, RatingSummary, Review, ReviewTarget, User,
};
use crate::utils::Pagination;

#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_release_seats: AtomicBool,
    pub fail_insert_payment: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn outage(flag: &AtomicBool, operation: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Database(format!("{} unavailable", operation)))
        } else {
            Ok(())
        }
    }
}

#[rocket::async_trait]
impl Store for FaultyStore {
    async fn insert_user(&self, user: &User) -> StoreResult<ObjectId> {
        self.inner.insert_user(user).await
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        self.inner.find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn record_login(&self, id: ObjectId) -> StoreResult<()> {
        self.inner.record_login(id).await
    }

    async fn insert_destination(&self, destination: &Destination) -> StoreResult<ObjectId> {
        self.inner.insert_destination(destination).await
    }

    async fn find_destination(&self, id: ObjectId) -> StoreResult<Option<Destination>> {
        self.inner.find_destination(id).await
    }

    async fn list_destinations(
        &self,
        filter: &DestinationFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Destination>, u64)> {
        self.inner.list_destinations(filter, page).await
    }

    async fn adjust_packages_count(&self, id: ObjectId, delta: i32) -> StoreResult<bool> {
        self.inner.adjust_packages_count(id, delta).await
    }

    async fn insert_package(&self, package: &Package) -> StoreResult<ObjectId> {
        self.inner.insert_package(package).await
    }

    async fn find_package(&self, id: ObjectId) -> StoreResult<Option<Package>> {
        self.inner.find_package(id).await
    }

    async fn list_packages(
        &self,
        filter: &PackageFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Package>, u64)> {
        self.inner.list_packages(filter, page).await
    }

    async fn update_package_fields(
        &self,
        id: ObjectId,
        expected_booked: i32,
        fields: &PackageFields,
    ) -> StoreResult<Option<Package>> {
        self.inner.update_package_fields(id, expected_booked, fields).await
    }

    async fn delete_package(&self, id: ObjectId) -> StoreResult<bool> {
        self.inner.delete_package(id).await
    }

    async fn reserve_seats(&self, id: ObjectId, seats: i32) -> StoreResult<Option<Package>> {
        self.inner.reserve_seats(id, seats).await
    }

    async fn release_seats(&self, id: ObjectId, seats: i32) -> StoreResult<Option<Package>> {
        Self::outage(&self.fail_release_seats, "release_seats")?;
        self.inner.release_seats(id, seats).await
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<ObjectId> {
        self.inner.insert_booking(booking).await
    }

    async fn find_booking(&self, id: ObjectId) -> StoreResult<Option<Booking>> {
        self.inner.find_booking(id).await
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        self.inner.list_bookings(filter, page).await
    }

    async fn count_open_bookings(&self, package_id: ObjectId) -> StoreResult<u64> {
        self.inner.count_open_bookings(package_id).await
    }

    async fn transition_booking(
        &self,
        id: ObjectId,
        expected: BookingState,
        next: BookingState,
        cancellation_reason: Option<String>,
    ) -> StoreResult<Option<Booking>> {
        self.inner
            .transition_booking(id, expected, next, cancellation_reason)
            .await
    }

    async fn update_booking_details(
        &self,
        id: ObjectId,
        expected: BookingState,
        customer_info: &CustomerInfo,
        travel_date: &str,
    ) -> StoreResult<Option<Booking>> {
        self.inner
            .update_booking_details(id, expected, customer_info, travel_date)
            .await
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<ObjectId> {
        Self::outage(&self.fail_insert_payment, "insert_payment")?;
        self.inner.insert_payment(payment).await
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        self.inner.find_payment_by_transaction(transaction_id).await
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Payment>, u64)> {
        self.inner.list_payments(filter, page).await
    }

    async fn transition_payment(
        &self,
        id: ObjectId,
        expected: PaymentRecordStatus,
        next: PaymentRecordStatus,
        failure_reason: Option<String>,
        gateway_reference: Option<String>,
    ) -> StoreResult<Option<Payment>> {
        self.inner
            .transition_payment(id, expected, next, failure_reason, gateway_reference)
            .await
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<ObjectId> {
        self.inner.insert_review(review).await
    }

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        self.inner.find_review(id).await
    }

    async fn find_user_review(
        &self,
        user_id: ObjectId,
        target: ReviewTarget,
    ) -> StoreResult<Option<Review>> {
        self.inner.find_user_review(user_id, target).await
    }

    async fn delete_review(&self, id: ObjectId) -> StoreResult<bool> {
        self.inner.delete_review(id).await
    }

    async fn list_reviews(
        &self,
        target: ReviewTarget,
        page: Pagination,
    ) -> StoreResult<(Vec<Review>, u64)> {
        self.inner.list_reviews(target, page).await
    }

    async fn increment_helpful(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        self.inner.increment_helpful(id).await
    }

    async fn adjust_rating(
        &self,
        target: ReviewTarget,
        rating_delta: i64,
        count_delta: i32,
    ) -> StoreResult<Option<RatingSummary>> {
        self.inner.adjust_rating(target, rating_delta, count_delta).await
    }

    async fn set_average_rating(
        &self,
        target: ReviewTarget,
        summary: RatingSummary,
        average: f64,
    ) -> StoreResult<bool> {
        self.inner.set_average_rating(target, summary, average).await
    }
}
