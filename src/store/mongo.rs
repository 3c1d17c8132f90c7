use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Collection, Database, IndexModel};
use rocket::futures::TryStreamExt;
use serde::de::DeserializeOwned;

use super::{
    BookingFilter, DestinationFilter, PackageFilter, PaymentFilter, Store, StoreError,
    StoreResult,
};
use crate::models::{
    Booking, BookingState, CustomerInfo, Destination, Package, PackageFields, Payment,
    PaymentRecordStatus, RatingSummary, Review, ReviewTarget, ReviewTargetKind, User,
};
use crate::utils::Pagination;

const USERS: &str = "users";
const DESTINATIONS: &str = "destinations";
const PACKAGES: &str = "packages";
const BOOKINGS: &str = "bookings";
const PAYMENTS: &str = "payments";
const REVIEWS: &str = "reviews";

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        match *err.kind {
            ErrorKind::Write(WriteFailure::WriteError(ref write_error)) if write_error.code == 11000 => {
                StoreError::Duplicate(write_error.message.clone())
            }
            _ => StoreError::Database(err.to_string()),
        }
    }
}

pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        MongoStore { db }
    }

    fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }

    fn destinations(&self) -> Collection<Destination> {
        self.db.collection(DESTINATIONS)
    }

    fn packages(&self) -> Collection<Package> {
        self.db.collection(PACKAGES)
    }

    fn bookings(&self) -> Collection<Booking> {
        self.db.collection(BOOKINGS)
    }

    fn payments(&self) -> Collection<Payment> {
        self.db.collection(PAYMENTS)
    }

    fn reviews(&self) -> Collection<Review> {
        self.db.collection(REVIEWS)
    }

    /// Unique indexes back the duplicate checks the services rely on.
    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        self.users()
            .create_index(
                IndexModel::builder().keys(doc! { "email": 1 }).options(unique()).build(),
                None,
            )
            .await?;

        self.reviews()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "target_type": 1, "target_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        self.reviews()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "target_type": 1, "target_id": 1, "created_at": -1 })
                    .build(),
                None,
            )
            .await?;

        self.payments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "transaction_id": 1 })
                    .options(unique())
                    .build(),
                None,
            )
            .await?;
        // At most one in-flight charge per booking.
        self.payments()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "booking_id": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .partial_filter_expression(doc! { "status": "pending" })
                            .name("booking_id_pending_unique".to_string())
                            .build(),
                    )
                    .build(),
                None,
            )
            .await?;

        self.bookings()
            .create_index(
                IndexModel::builder().keys(doc! { "user_id": 1, "created_at": -1 }).build(),
                None,
            )
            .await?;
        self.bookings()
            .create_index(
                IndexModel::builder().keys(doc! { "package_id": 1, "status": 1 }).build(),
                None,
            )
            .await?;

        self.packages()
            .create_index(
                IndexModel::builder().keys(doc! { "destination_id": 1, "status": 1 }).build(),
                None,
            )
            .await?;

        Ok(())
    }
}

fn after_update() -> FindOneAndUpdateOptions {
    FindOneAndUpdateOptions::builder()
        .return_document(ReturnDocument::After)
        .build()
}

fn newest_first(page: Pagination) -> FindOptions {
    FindOptions::builder()
        .skip(page.skip())
        .limit(page.limit)
        .sort(doc! { "created_at": -1, "_id": -1 })
        .build()
}

async fn find_page<T>(
    collection: Collection<T>,
    filter: Document,
    page: Pagination,
) -> StoreResult<(Vec<T>, u64)>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    let items: Vec<T> = collection
        .find(filter.clone(), newest_first(page))
        .await?
        .try_collect()
        .await?;
    let total = collection.count_documents(filter, None).await?;
    Ok((items, total))
}

fn case_insensitive(pattern: String) -> Document {
    doc! { "$regex": pattern, "$options": "i" }
}

/// Pipeline stage deriving soldout/active from the updated seat count.
fn seat_status_stage() -> Document {
    doc! {
        "$set": {
            "status": {
                "$switch": {
                    "branches": [
                        {
                            "case": { "$and": [
                                { "$eq": ["$status", "active"] },
                                { "$lte": ["$available_seats", 0] }
                            ] },
                            "then": "soldout"
                        },
                        {
                            "case": { "$and": [
                                { "$eq": ["$status", "soldout"] },
                                { "$gt": ["$available_seats", 0] }
                            ] },
                            "then": "active"
                        }
                    ],
                    "default": "$status"
                }
            }
        }
    }
}

fn read_int(document: &Document, key: &str) -> i64 {
    match document.get(key) {
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) => *v as i64,
        _ => 0,
    }
}

fn destination_filter(filter: &DestinationFilter) -> Document {
    let mut query = doc! {};
    if let Some(country) = &filter.country {
        query.insert("country", case_insensitive(format!("^{}$", regex::escape(country))));
    }
    if let Some(search) = &filter.search {
        query.insert("name", case_insensitive(regex::escape(search)));
    }
    query
}

fn package_filter(filter: &PackageFilter) -> Document {
    let mut query = doc! {};
    if let Some(destination_id) = filter.destination_id {
        query.insert("destination_id", destination_id);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    let mut price = doc! {};
    if let Some(min) = filter.min_price {
        price.insert("$gte", min);
    }
    if let Some(max) = filter.max_price {
        price.insert("$lte", max);
    }
    if !price.is_empty() {
        query.insert("price", price);
    }
    if let Some(search) = &filter.search {
        let pattern = regex::escape(search);
        query.insert(
            "$or",
            vec![
                doc! { "name": case_insensitive(pattern.clone()) },
                doc! { "description": case_insensitive(pattern) },
            ],
        );
    }
    query
}

fn booking_filter(filter: &BookingFilter) -> Document {
    let mut query = doc! {};
    if let Some(user_id) = filter.user_id {
        query.insert("user_id", user_id);
    }
    if let Some(package_id) = filter.package_id {
        query.insert("package_id", package_id);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    if let Some(payment_status) = filter.payment_status {
        query.insert("payment_status", payment_status.as_str());
    }
    query
}

fn payment_filter(filter: &PaymentFilter) -> Document {
    let mut query = doc! {};
    if let Some(user_id) = filter.user_id {
        query.insert("user_id", user_id);
    }
    if let Some(booking_id) = filter.booking_id {
        query.insert("booking_id", booking_id);
    }
    if let Some(status) = filter.status {
        query.insert("status", status.as_str());
    }
    query
}

fn inserted_id(result: mongodb::results::InsertOneResult) -> StoreResult<ObjectId> {
    result
        .inserted_id
        .as_object_id()
        .ok_or_else(|| StoreError::Database("inserted id is not an ObjectId".to_string()))
}

impl MongoStore {
    fn rating_collection(&self, kind: ReviewTargetKind) -> Collection<Document> {
        match kind {
            ReviewTargetKind::Package => self.db.collection(PACKAGES),
            ReviewTargetKind::Destination => self.db.collection(DESTINATIONS),
        }
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn insert_user(&self, user: &User) -> StoreResult<ObjectId> {
        inserted_id(self.users().insert_one(user, None).await?)
    }

    async fn find_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.users().find_one(doc! { "email": email }, None).await?)
    }

    async fn record_login(&self, id: ObjectId) -> StoreResult<()> {
        self.users()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "last_login_at": DateTime::now() } },
                None,
            )
            .await?;
        Ok(())
    }

    async fn insert_destination(&self, destination: &Destination) -> StoreResult<ObjectId> {
        inserted_id(self.destinations().insert_one(destination, None).await?)
    }

    async fn find_destination(&self, id: ObjectId) -> StoreResult<Option<Destination>> {
        Ok(self.destinations().find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_destinations(
        &self,
        filter: &DestinationFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Destination>, u64)> {
        find_page(self.destinations(), destination_filter(filter), page).await
    }

    async fn adjust_packages_count(&self, id: ObjectId, delta: i32) -> StoreResult<bool> {
        let result = self
            .destinations()
            .update_one(
                doc! { "_id": id },
                doc! {
                    "$inc": { "packages_count": delta },
                    "$set": { "updated_at": DateTime::now() }
                },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn insert_package(&self, package: &Package) -> StoreResult<ObjectId> {
        inserted_id(self.packages().insert_one(package, None).await?)
    }

    async fn find_package(&self, id: ObjectId) -> StoreResult<Option<Package>> {
        Ok(self.packages().find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_packages(
        &self,
        filter: &PackageFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Package>, u64)> {
        find_page(self.packages(), package_filter(filter), page).await
    }

    async fn update_package_fields(
        &self,
        id: ObjectId,
        expected_booked: i32,
        fields: &PackageFields,
    ) -> StoreResult<Option<Package>> {
        Ok(self
            .packages()
            .find_one_and_update(
                doc! { "_id": id, "booked_seats": expected_booked },
                doc! {
                    "$set": {
                        "name": &fields.name,
                        "description": fields.description.clone(),
                        "price": fields.price,
                        "is_free": fields.is_free,
                        "duration_days": fields.duration_days,
                        "start_date": fields.start_date.clone(),
                        "end_date": fields.end_date.clone(),
                        "total_seats": fields.total_seats,
                        "available_seats": fields.available_seats,
                        "status": fields.status.as_str(),
                        "updated_at": DateTime::now(),
                    }
                },
                after_update(),
            )
            .await?)
    }

    async fn delete_package(&self, id: ObjectId) -> StoreResult<bool> {
        let result = self.packages().delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn reserve_seats(&self, id: ObjectId, seats: i32) -> StoreResult<Option<Package>> {
        Ok(self
            .packages()
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "status": "active",
                    "available_seats": { "$gte": seats }
                },
                vec![
                    doc! {
                        "$set": {
                            "available_seats": { "$subtract": ["$available_seats", seats] },
                            "booked_seats": { "$add": ["$booked_seats", seats] },
                            "updated_at": DateTime::now(),
                        }
                    },
                    seat_status_stage(),
                ],
                after_update(),
            )
            .await?)
    }

    async fn release_seats(&self, id: ObjectId, seats: i32) -> StoreResult<Option<Package>> {
        Ok(self
            .packages()
            .find_one_and_update(
                doc! { "_id": id, "booked_seats": { "$gte": seats } },
                vec![
                    doc! {
                        "$set": {
                            "available_seats": { "$add": ["$available_seats", seats] },
                            "booked_seats": { "$subtract": ["$booked_seats", seats] },
                            "updated_at": DateTime::now(),
                        }
                    },
                    seat_status_stage(),
                ],
                after_update(),
            )
            .await?)
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<ObjectId> {
        inserted_id(self.bookings().insert_one(booking, None).await?)
    }

    async fn find_booking(&self, id: ObjectId) -> StoreResult<Option<Booking>> {
        Ok(self.bookings().find_one(doc! { "_id": id }, None).await?)
    }

    async fn list_bookings(
        &self,
        filter: &BookingFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Booking>, u64)> {
        find_page(self.bookings(), booking_filter(filter), page).await
    }

    async fn count_open_bookings(&self, package_id: ObjectId) -> StoreResult<u64> {
        Ok(self
            .bookings()
            .count_documents(
                doc! {
                    "package_id": package_id,
                    "status": { "$in": ["pending", "confirmed"] }
                },
                None,
            )
            .await?)
    }

    async fn transition_booking(
        &self,
        id: ObjectId,
        expected: BookingState,
        next: BookingState,
        cancellation_reason: Option<String>,
    ) -> StoreResult<Option<Booking>> {
        let mut set = doc! {
            "status": next.status.as_str(),
            "payment_status": next.payment_status.as_str(),
            "updated_at": DateTime::now(),
        };
        if let Some(reason) = cancellation_reason {
            set.insert("cancellation_reason", reason);
        }
        Ok(self
            .bookings()
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "status": expected.status.as_str(),
                    "payment_status": expected.payment_status.as_str(),
                },
                doc! { "$set": set },
                after_update(),
            )
            .await?)
    }

    async fn update_booking_details(
        &self,
        id: ObjectId,
        expected: BookingState,
        customer_info: &CustomerInfo,
        travel_date: &str,
    ) -> StoreResult<Option<Booking>> {
        let customer_info = mongodb::bson::to_bson(customer_info)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(self
            .bookings()
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "status": expected.status.as_str(),
                    "payment_status": expected.payment_status.as_str(),
                },
                doc! {
                    "$set": {
                        "customer_info": customer_info,
                        "travel_date": travel_date,
                        "updated_at": DateTime::now(),
                    }
                },
                after_update(),
            )
            .await?)
    }

    async fn insert_payment(&self, payment: &Payment) -> StoreResult<ObjectId> {
        inserted_id(self.payments().insert_one(payment, None).await?)
    }

    async fn find_payment_by_transaction(&self, transaction_id: &str) -> StoreResult<Option<Payment>> {
        Ok(self
            .payments()
            .find_one(doc! { "transaction_id": transaction_id }, None)
            .await?)
    }

    async fn list_payments(
        &self,
        filter: &PaymentFilter,
        page: Pagination,
    ) -> StoreResult<(Vec<Payment>, u64)> {
        find_page(self.payments(), payment_filter(filter), page).await
    }

    async fn transition_payment(
        &self,
        id: ObjectId,
        expected: PaymentRecordStatus,
        next: PaymentRecordStatus,
        failure_reason: Option<String>,
        gateway_reference: Option<String>,
    ) -> StoreResult<Option<Payment>> {
        let mut set = doc! {
            "status": next.as_str(),
            "updated_at": DateTime::now(),
        };
        if let Some(reason) = failure_reason {
            set.insert("failure_reason", reason);
        }
        if let Some(reference) = gateway_reference {
            set.insert("gateway_reference", reference);
        }
        Ok(self
            .payments()
            .find_one_and_update(
                doc! { "_id": id, "status": expected.as_str() },
                doc! { "$set": set },
                after_update(),
            )
            .await?)
    }

    async fn insert_review(&self, review: &Review) -> StoreResult<ObjectId> {
        inserted_id(self.reviews().insert_one(review, None).await?)
    }

    async fn find_review(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        Ok(self.reviews().find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_user_review(
        &self,
        user_id: ObjectId,
        target: ReviewTarget,
    ) -> StoreResult<Option<Review>> {
        Ok(self
            .reviews()
            .find_one(
                doc! {
                    "user_id": user_id,
                    "target_type": target.kind.as_str(),
                    "target_id": target.id,
                },
                None,
            )
            .await?)
    }

    async fn delete_review(&self, id: ObjectId) -> StoreResult<bool> {
        let result = self.reviews().delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn list_reviews(
        &self,
        target: ReviewTarget,
        page: Pagination,
    ) -> StoreResult<(Vec<Review>, u64)> {
        let filter = doc! { "target_type": target.kind.as_str(), "target_id": target.id };
        find_page(self.reviews(), filter, page).await
    }

    async fn increment_helpful(&self, id: ObjectId) -> StoreResult<Option<Review>> {
        Ok(self
            .reviews()
            .find_one_and_update(
                doc! { "_id": id },
                doc! { "$inc": { "helpful": 1 }, "$set": { "updated_at": DateTime::now() } },
                after_update(),
            )
            .await?)
    }

    async fn adjust_rating(
        &self,
        target: ReviewTarget,
        rating_delta: i64,
        count_delta: i32,
    ) -> StoreResult<Option<RatingSummary>> {
        let mut filter = doc! { "_id": target.id };
        if count_delta < 0 {
            filter.insert("total_reviews", doc! { "$gte": -count_delta });
        }
        let updated = self
            .rating_collection(target.kind)
            .find_one_and_update(
                filter,
                doc! {
                    "$inc": { "rating_sum": rating_delta, "total_reviews": count_delta },
                    "$set": { "updated_at": DateTime::now() }
                },
                after_update(),
            )
            .await?;
        Ok(updated.map(|document| RatingSummary {
            rating_sum: read_int(&document, "rating_sum"),
            total_reviews: read_int(&document, "total_reviews") as i32,
        }))
    }

    async fn set_average_rating(
        &self,
        target: ReviewTarget,
        summary: RatingSummary,
        average: f64,
    ) -> StoreResult<bool> {
        let result = self
            .rating_collection(target.kind)
            .update_one(
                doc! {
                    "_id": target.id,
                    "rating_sum": summary.rating_sum,
                    "total_reviews": summary.total_reviews,
                },
                doc! { "$set": { "average_rating": average } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}
