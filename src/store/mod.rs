//! Persistence seam. Every mutation that other requests can race on is a
//! single conditional write: it only applies when the stored document still
//! matches the guard, and reports `None`/`false` otherwise.

#[cfg(test)]
pub mod faulty;
pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use mongodb::bson::oid::ObjectId;

use crate::models::{
    Booking, BookingState, BookingStatus, CustomerInfo, Destination, Package, PackageFields,
    PackageStatus, Payment, PaymentRecordStatus, PaymentStatus, RatingSummary, Review,
    ReviewTarget, User,
};
use crate::utils::Pagination;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Default, Clone)]
pub struct DestinationFilter {
    pub country: Option<String>,
    pub search: Option<String>,
}

impl DestinationFilter {
    pub fn matches(&self, destination: &Destination) -> bool {
        self.country
            .as_ref()
            .is_none_or(|c| destination.country.eq_ignore_ascii_case(c))
            && self
                .search
                .as_ref()
                .is_none_or(|s| contains_ignore_case(&destination.name, s))
    }
}

#[derive(Debug, Default, Clone)]
pub struct PackageFilter {
    pub destination_id: Option<ObjectId>,
    pub status: Option<PackageStatus>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub search: Option<String>,
}

impl PackageFilter {
    pub fn matches(&self, package: &Package) -> bool {
        self.destination_id.is_none_or(|id| package.destination_id == id)
            && self.status.is_none_or(|s| package.status == s)
            && self.min_price.is_none_or(|p| package.price >= p)
            && self.max_price.is_none_or(|p| package.price <= p)
            && self.search.as_ref().is_none_or(|s| {
                contains_ignore_case(&package.name, s)
                    || package
                        .description
                        .as_ref()
                        .is_some_and(|d| contains_ignore_case(d, s))
            })
    }
}

#[derive(Debug, Default, Clone)]
pub struct BookingFilter {
    pub user_id: Option<ObjectId>,
    pub package_id: Option<ObjectId>,
    pub status: Option<BookingStatus>,
    pub payment_status: Option<PaymentStatus>,
}

impl BookingFilter {
    pub fn matches(&self, booking: &Booking) -> bool {
        self.user_id.is_none_or(|id| booking.user_id == id)
            && self.package_id.is_none_or(|id| booking.package_id == id)
            && self.status.is_none_or(|s| booking.status == s)
            && self.payment_status.is_none_or(|s| booking.payment_status == s)
    }
}

#[derive(Debug, Default, Clone)]
pub struct PaymentFilter {
    pub user_id: Option<ObjectId>,
    pub booking_id: Option<ObjectId>,
    pub status: Option<PaymentRecordStatus>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        self.user_id.is_none_or(|id| payment.user_id == id)
            && self.booking_id.is_none_or(|id| payment.booking_id == id)
            && self.status.is_none_or(|s| payment.status == s)
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[rocket::async_trait]
pub trait Store: Send + Sync {
    // ---------------------------------------------------------------- users

    /// Fails with `Duplicate` when the email is taken.
    async fn insert_user(&self, user: &User) -> StoreResult<ObjectId>;
    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn record_login(&self, id: ObjectId) -> StoreResult<()>;

    // --------------------------------------------------------- destinations

    async fn insert_destination(&self, destination: &Destination) -> StoreResult<ObjectId>;
    async fn find_destination(&self, id: ObjectId) -> StoreResult<Option<Destination>>;
    async fn list_destinations(
        &self,
        filter: &DestinationFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Destination>, u64)>;
    /// `$inc` on `packages_count`; false when the destination is gone.
    async fn adjust_packages_count(&self, id: ObjectId, delta: i32) -> StoreResult<bool>;

    // ------------------------------------------------------------- packages

    async fn insert_package(&self, package: &Package) -> StoreResult<ObjectId>;
    async fn find_package(&self, id: ObjectId) -> StoreResult<Option<Package>>;
    async fn list_packages(
        &self,
        filter: &PackageFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Package>, u64)>;
    /// Overwrites the editable fields if `booked_seats` still equals `expected_booked`.
    async fn update_package_fields(
        &self,
        id: ObjectId,
        expected_booked: i32,
        fields: &PackageFields,
    ) -> StoreResult<Option<Package>>;
    async fn delete_package(&self, id: ObjectId) -> StoreResult<bool>;

    /// Moves `seats` from available to booked only if the package is active
    /// and has at least that many left; recomputes status in the same write.
    async fn reserve_seats(&self, id: ObjectId, seats: i32) -> StoreResult<Option<Package>>;
    /// Moves `seats` from booked back to available; recomputes status.
    async fn release_seats(&self, id: ObjectId, seats: i32) -> StoreResult<Option<Package>>;

    // ------------------------------------------------------------- bookings

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<ObjectId>;
    async fn find_booking(&self, id: ObjectId) -> StoreResult<Option<Booking>>;
    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Booking>, u64)>;
    /// Bookings on the package that are still pending or confirmed.
    async fn count_open_bookings(&self, package_id: ObjectId) -> StoreResult<u64>;
    /// Compare-and-set on (status, payment_status).
    async fn transition_booking(
        &self,
        id: ObjectId,
        expected: BookingState,
        next: BookingState,
        cancellation_reason: Option<String>,
    ) -> StoreResult<Option<Booking>>;
    async fn update_booking_details(
        &self,
        id: ObjectId,
        expected: BookingState,
        customer_info: &CustomerInfo,
        travel_date: &str,
    ) -> StoreResult<Option<Booking>>;

    // ------------------------------------------------------------- payments

    /// Fails with `Duplicate` while another pending payment exists for the booking.
    async fn insert_payment(&self, payment: &Payment) -> StoreResult<ObjectId>;
    async fn find_payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>>;
    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Payment>, u64)>;
    async fn transition_payment(
        &self,
        id: ObjectId,
        expected: PaymentRecordStatus,
        next: PaymentRecordStatus,
        failure_reason: Option<String>,
        gateway_reference: Option<String>,
    ) -> StoreResult<Option<Payment>>;

    // -------------------------------------------------------------- reviews

    /// Fails with `Duplicate` when the user already reviewed the target.
    async fn insert_review(&self, review: &Review) -> StoreResult<ObjectId>;
    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>>;
    async fn find_user_review(
        &self,
        user_id: ObjectId,
        target: ReviewTarget,
    ) -> StoreResult<Option<Review>>;
    async fn delete_review(&self, id: ObjectId) -> StoreResult<bool>;
    async fn list_reviews(
        &self,
        target: ReviewTarget,
        page: Pagination,
    ) -> StoreResult<(Vec<Review>, u64)>;
    async fn increment_helpful(&self, id: ObjectId) -> StoreResult<Option<Review>>;

    /// Atomically adds to `rating_sum`/`total_reviews` on the target and
    /// returns the counters after the write. `None` when the target is gone
    /// or the count would drop below zero.
    async fn adjust_rating(
        &self,
        target: ReviewTarget,
        rating_delta: i64,
        count_delta: i32,
    ) -> StoreResult<Option<RatingSummary>>;
    /// Writes `average_rating` only if the counters still equal `summary`.
    async fn set_average_rating(
        &self,
        target: ReviewTarget,
        summary: RatingSummary,
        average: f64,
    ) -> StoreResult<bool>;
}
