use log::{error, info, warn};
use mongodb::bson::DateTime;
use validator::Validate;

use crate::guards::AuthGuard;
use crate::models::{
    BookingStatus, CreateReviewDto, RatingSummary, Review, ReviewTarget, ReviewTargetKind,
};
use crate::store::{Store, StoreError};
use crate::utils::{parse_object_id, AppError, AppResult, Pagination};

const MAX_AVERAGE_ATTEMPTS: usize = 5;

pub struct ReviewService;

impl ReviewService {
    pub async fn submit(
        store: &dyn Store,
        actor: &AuthGuard,
        kind: ReviewTargetKind,
        dto: CreateReviewDto,
    ) -> AppResult<Review> {
        dto.validate()?;
        let target_id = parse_object_id(&dto.target_id, "target_id")?;
        let target = ReviewTarget { kind, id: target_id };
        ensure_target_exists(store, target).await?;

        let booking_id = match (&dto.booking_id, kind) {
            (None, _) => None,
            (Some(_), ReviewTargetKind::Destination) => {
                return Err(AppError::validation(
                    "booking_id can only be given for package reviews",
                ));
            }
            (Some(raw), ReviewTargetKind::Package) => {
                let booking_id = parse_object_id(raw, "booking_id")?;
                let booking = store
                    .find_booking(booking_id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Booking not found"))?;
                if booking.user_id != actor.user_id {
                    return Err(AppError::forbidden("Booking does not belong to you"));
                }
                if booking.package_id != target_id {
                    return Err(AppError::validation("booking_id is not for this package"));
                }
                if booking.status == BookingStatus::Cancelled {
                    return Err(AppError::conflict("Cannot review a cancelled booking"));
                }
                Some(booking_id)
            }
        };

        if store.find_user_review(actor.user_id, target).await?.is_some() {
            return Err(AppError::conflict(format!("You have already reviewed this {}", kind)));
        }

        let now = DateTime::now();
        let mut review = Review {
            id: None,
            target_type: kind,
            target_id,
            user_id: actor.user_id,
            booking_id,
            rating: dto.rating,
            title: dto.title.trim().to_string(),
            comment: dto.comment.trim().to_string(),
            helpful: 0,
            created_at: now,
            updated_at: now,
        };
        let review_id = match store.insert_review(&review).await {
            Ok(id) => id,
            Err(StoreError::Duplicate(_)) => {
                return Err(AppError::conflict(format!("You have already reviewed this {}", kind)));
            }
            Err(e) => return Err(e.into()),
        };
        review.id = Some(review_id);

        let summary = match store.adjust_rating(target, i64::from(review.rating), 1).await {
            Ok(Some(summary)) => summary,
            outcome => {
                // Counters untouched; take the review back out.
                if let Err(e) = store.delete_review(review_id).await {
                    error!("Could not remove review {} after failed aggregate update: {}", review_id, e);
                }
                return match outcome {
                    Err(e) => Err(e.into()),
                    _ => Err(AppError::not_found(format!("{} not found", capitalized(kind)))),
                };
            }
        };
        refresh_average(store, target, summary).await?;
        info!(
            "Review {} ({} stars) added to {} {}",
            review_id, review.rating, kind, target_id
        );
        Ok(review)
    }

    /// Owner or admin only. The rating is subtracted from the counters in the
    /// same way it was added.
    pub async fn delete(store: &dyn Store, actor: &AuthGuard, review_id: &str) -> AppResult<()> {
        let id = parse_object_id(review_id, "review_id")?;
        let review = store
            .find_review(id)
            .await?
            .ok_or_else(|| AppError::not_found("Review not found"))?;
        if !actor.can_act_for(review.user_id) {
            return Err(AppError::forbidden("Not authorized to delete this review"));
        }
        if !store.delete_review(id).await? {
            return Err(AppError::not_found("Review not found"));
        }

        let target = review.target();
        match store.adjust_rating(target, -i64::from(review.rating), -1).await? {
            Some(summary) => refresh_average(store, target, summary).await?,
            None => warn!("Rating counters for {} {} not adjusted", target.kind, target.id),
        }
        info!("Review {} deleted by {}", id, actor.user_id);
        Ok(())
    }

    pub async fn mark_helpful(store: &dyn Store, review_id: &str) -> AppResult<Review> {
        let id = parse_object_id(review_id, "review_id")?;
        store
            .increment_helpful(id)
            .await?
            .ok_or_else(|| AppError::not_found("Review not found"))
    }

    pub async fn list(
        store: &dyn Store,
        kind: ReviewTargetKind,
        target_id: &str,
        page: Pagination,
    ) -> AppResult<(Vec<Review>, u64)> {
        let target = ReviewTarget {
            kind,
            id: parse_object_id(target_id, "target_id")?,
        };
        ensure_target_exists(store, target).await?;
        Ok(store.list_reviews(target, page).await?)
    }
}

async fn ensure_target_exists(store: &dyn Store, target: ReviewTarget) -> AppResult<()> {
    let exists = match target.kind {
        ReviewTargetKind::Package => store.find_package(target.id).await?.is_some(),
        ReviewTargetKind::Destination => store.find_destination(target.id).await?.is_some(),
    };
    if exists {
        Ok(())
    } else {
        Err(AppError::not_found(format!("{} not found", capitalized(target.kind))))
    }
}

/// Writes the average derived from `summary`. When another review changed
/// the counters in between, re-reads them and tries again.
async fn refresh_average(
    store: &dyn Store,
    target: ReviewTarget,
    mut summary: RatingSummary,
) -> AppResult<()> {
    for _ in 0..MAX_AVERAGE_ATTEMPTS {
        if store.set_average_rating(target, summary, summary.average()).await? {
            return Ok(());
        }
        match store.adjust_rating(target, 0, 0).await? {
            Some(latest) => summary = latest,
            None => return Ok(()),
        }
    }
    warn!("Average rating for {} {} left to a concurrent writer", target.kind, target.id);
    Ok(())
}

fn capitalized(kind: ReviewTargetKind) -> &'static str {
    match kind {
        ReviewTargetKind::Package => "Package",
        ReviewTargetKind::Destination => "Destination",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::booking::tests::{admin, booking_request, seed_package, user};
    use crate::services::BookingService;
    use crate::store::MemoryStore;
    use mongodb::bson::oid::ObjectId;
    use std::sync::Arc;

    fn review(target_id: ObjectId, rating: i32) -> CreateReviewDto {
        CreateReviewDto {
            target_id: target_id.to_hex(),
            rating,
            title: "Worth it".into(),
            comment: "Guides were great".into(),
            booking_id: None,
        }
    }

    async fn aggregates(store: &dyn Store, id: ObjectId) -> (f64, i32) {
        let p = store.find_package(id).await.unwrap().unwrap();
        (p.average_rating, p.total_reviews)
    }

    #[tokio::test]
    async fn averages_are_kept_incrementally() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;

        for rating in [4, 5, 5] {
            ReviewService::submit(&store, &user(), ReviewTargetKind::Package, review(package_id, rating))
                .await
                .unwrap();
        }
        assert_eq!(aggregates(&store, package_id).await, (4.7, 3));
    }

    #[tokio::test]
    async fn second_review_by_same_user_conflicts() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;
        let reviewer = user();

        ReviewService::submit(&store, &reviewer, ReviewTargetKind::Package, review(package_id, 5))
            .await
            .unwrap();
        let err = ReviewService::submit(&store, &reviewer, ReviewTargetKind::Package, review(package_id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(aggregates(&store, package_id).await, (5.0, 1));
    }

    #[tokio::test]
    async fn out_of_range_rating_is_rejected_before_insert() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;

        for rating in [0, 6] {
            let err = ReviewService::submit(&store, &user(), ReviewTargetKind::Package, review(package_id, rating))
                .await
                .unwrap_err();
            assert!(matches!(&err, AppError::Validation(m) if m.starts_with("rating")));
        }
        let (reviews, _) = ReviewService::list(&store, ReviewTargetKind::Package, &package_id.to_hex(), Pagination::default())
            .await
            .unwrap();
        assert!(reviews.is_empty());
    }

    #[tokio::test]
    async fn blank_title_or_comment_is_rejected() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;

        let mut blank_title = review(package_id, 4);
        blank_title.title = "   ".into();
        let err = ReviewService::submit(&store, &user(), ReviewTargetKind::Package, blank_title)
            .await
            .unwrap_err();
        assert!(matches!(&err, AppError::Validation(m) if m == "title is required"));

        let mut blank_comment = review(package_id, 4);
        blank_comment.comment = "\n ".into();
        let err = ReviewService::submit(&store, &user(), ReviewTargetKind::Package, blank_comment)
            .await
            .unwrap_err();
        assert!(matches!(&err, AppError::Validation(m) if m == "comment is required"));
        assert_eq!(aggregates(&store, package_id).await, (0.0, 0));
    }

    #[tokio::test]
    async fn unknown_target_is_not_found() {
        let store = MemoryStore::new();
        let err = ReviewService::submit(&store, &user(), ReviewTargetKind::Destination, review(ObjectId::new(), 4))
            .await
            .unwrap_err();
        assert!(matches!(&err, AppError::NotFound(m) if m == "Destination not found"));
    }

    #[tokio::test]
    async fn referenced_booking_must_be_the_callers_and_for_the_package() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;
        let other_package = seed_package(&store, 10, 100.0).await;
        let traveler = user();
        let booking = BookingService::create(&store, &traveler, booking_request(package_id, 1))
            .await
            .unwrap();
        let booking_id = booking.id.unwrap().to_hex();

        let mut dto = review(package_id, 4);
        dto.booking_id = Some(booking_id.clone());
        let err = ReviewService::submit(&store, &user(), ReviewTargetKind::Package, dto)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mut dto = review(other_package, 4);
        dto.booking_id = Some(booking_id.clone());
        let err = ReviewService::submit(&store, &traveler, ReviewTargetKind::Package, dto)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let mut dto = review(package_id, 4);
        dto.booking_id = Some(booking_id);
        let saved = ReviewService::submit(&store, &traveler, ReviewTargetKind::Package, dto)
            .await
            .unwrap();
        assert_eq!(saved.booking_id, booking.id);
    }

    #[tokio::test]
    async fn deleting_subtracts_from_aggregates() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;
        let author = user();

        let kept = ReviewService::submit(&store, &user(), ReviewTargetKind::Package, review(package_id, 3))
            .await
            .unwrap();
        let removed = ReviewService::submit(&store, &author, ReviewTargetKind::Package, review(package_id, 5))
            .await
            .unwrap();
        assert_eq!(aggregates(&store, package_id).await, (4.0, 2));

        let err = ReviewService::delete(&store, &user(), &removed.id.unwrap().to_hex())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        ReviewService::delete(&store, &author, &removed.id.unwrap().to_hex())
            .await
            .unwrap();
        assert_eq!(aggregates(&store, package_id).await, (3.0, 1));

        ReviewService::delete(&store, &admin(), &kept.id.unwrap().to_hex())
            .await
            .unwrap();
        assert_eq!(aggregates(&store, package_id).await, (0.0, 0));
    }

    #[tokio::test]
    async fn helpful_counter_increments() {
        let store = MemoryStore::new();
        let package_id = seed_package(&store, 10, 100.0).await;
        let saved = ReviewService::submit(&store, &user(), ReviewTargetKind::Package, review(package_id, 4))
            .await
            .unwrap();
        let id = saved.id.unwrap().to_hex();

        ReviewService::mark_helpful(&store, &id).await.unwrap();
        let updated = ReviewService::mark_helpful(&store, &id).await.unwrap();
        assert_eq!(updated.helpful, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reviews_lose_no_updates() {
        let store = Arc::new(MemoryStore::new());
        let package_id = seed_package(store.as_ref(), 10, 100.0).await;

        let ratings = [5, 4, 3, 5, 4, 2, 5, 5, 1, 4];
        let tasks: Vec<_> = ratings
            .iter()
            .map(|&rating| {
                let store = store.clone();
                tokio::spawn(async move {
                    ReviewService::submit(store.as_ref(), &user(), ReviewTargetKind::Package, review(package_id, rating))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let expected = RatingSummary { rating_sum: 38, total_reviews: 10 }.average();
        assert_eq!(aggregates(store.as_ref(), package_id).await, (expected, 10));
    }
}
