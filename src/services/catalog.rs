use log::{info, warn};
use mongodb::bson::DateTime;
use validator::Validate;

use crate::models::{
    CreateDestinationDto, CreatePackageDto, Destination, Package, PackageFields, PackageStatus,
    UpdatePackageDto,
};
use crate::services::booking::MAX_TRANSITION_ATTEMPTS;
use crate::store::{DestinationFilter, PackageFilter, Store};
use crate::utils::{parse_date, parse_object_id, AppError, AppResult, Pagination};

pub struct CatalogService;

impl CatalogService {
    pub async fn create_destination(
        store: &dyn Store,
        dto: CreateDestinationDto,
    ) -> AppResult<Destination> {
        dto.validate()?;
        let now = DateTime::now();
        let mut destination = Destination {
            id: None,
            name: dto.name.trim().to_string(),
            country: dto.country.trim().to_string(),
            description: dto.description,
            packages_count: 0,
            average_rating: 0.0,
            total_reviews: 0,
            rating_sum: 0,
            created_at: now,
            updated_at: now,
        };
        destination.id = Some(store.insert_destination(&destination).await?);
        info!("Destination {} created", destination.name);
        Ok(destination)
    }

    pub async fn get_destination(store: &dyn Store, id: &str) -> AppResult<Destination> {
        let id = parse_object_id(id, "destination_id")?;
        store
            .find_destination(id)
            .await?
            .ok_or_else(|| AppError::not_found("Destination not found"))
    }

    pub async fn list_destinations(
        store: &dyn Store,
        filter: &DestinationFilter,
        page: Pagination,
    ) -> AppResult<(Vec<Destination>, u64)> {
        Ok(store.list_destinations(filter, page).await?)
    }

    /// New packages start with every seat available and bump the
    /// destination's package count.
    pub async fn create_package(store: &dyn Store, dto: CreatePackageDto) -> AppResult<Package> {
        dto.validate()?;
        let destination_id = parse_object_id(&dto.destination_id, "destination_id")?;
        if store.find_destination(destination_id).await?.is_none() {
            return Err(AppError::not_found("Destination not found"));
        }
        check_date_range(dto.start_date.as_deref(), dto.end_date.as_deref())?;
        let status = manual_status(dto.status.unwrap_or(PackageStatus::Active))?;

        let now = DateTime::now();
        let mut package = Package {
            id: None,
            name: dto.name.trim().to_string(),
            description: dto.description,
            destination_id,
            price: dto.price,
            is_free: dto.is_free.unwrap_or(dto.price == 0.0),
            duration_days: dto.duration_days,
            start_date: dto.start_date,
            end_date: dto.end_date,
            total_seats: dto.total_seats,
            available_seats: dto.total_seats,
            booked_seats: 0,
            status,
            average_rating: 0.0,
            total_reviews: 0,
            rating_sum: 0,
            created_at: now,
            updated_at: now,
        };
        let id = store.insert_package(&package).await?;
        package.id = Some(id);

        if !store.adjust_packages_count(destination_id, 1).await? {
            warn!("Destination {} vanished while adding package {}", destination_id, id);
        }
        info!("Package {} created with {} seats", id, package.total_seats);
        Ok(package)
    }

    pub async fn get_package(store: &dyn Store, id: &str) -> AppResult<Package> {
        let id = parse_object_id(id, "package_id")?;
        store
            .find_package(id)
            .await?
            .ok_or_else(|| AppError::not_found("Package not found"))
    }

    pub async fn list_packages(
        store: &dyn Store,
        filter: &PackageFilter,
        page: Pagination,
    ) -> AppResult<(Vec<Package>, u64)> {
        Ok(store.list_packages(filter, page).await?)
    }

    /// Applies the edit on top of the current document, guarded on the
    /// booked seat count so resizing never races a booking.
    pub async fn update_package(
        store: &dyn Store,
        id: &str,
        dto: UpdatePackageDto,
    ) -> AppResult<Package> {
        dto.validate()?;
        let id = parse_object_id(id, "package_id")?;
        if let Some(status) = dto.status {
            manual_status(status)?;
        }

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let current = store
                .find_package(id)
                .await?
                .ok_or_else(|| AppError::not_found("Package not found"))?;

            let total_seats = dto.total_seats.unwrap_or(current.total_seats);
            if total_seats < current.booked_seats {
                return Err(AppError::conflict(format!(
                    "total_seats cannot be less than the {} seats already booked",
                    current.booked_seats
                )));
            }
            let available_seats = total_seats - current.booked_seats;
            let start_date = dto.start_date.clone().or_else(|| current.start_date.clone());
            let end_date = dto.end_date.clone().or_else(|| current.end_date.clone());
            check_date_range(start_date.as_deref(), end_date.as_deref())?;

            let requested = dto.status.unwrap_or(current.status);
            let price = dto.price.unwrap_or(current.price);
            let fields = PackageFields {
                name: dto
                    .name
                    .as_deref()
                    .map(|n| n.trim().to_string())
                    .unwrap_or_else(|| current.name.clone()),
                description: dto.description.clone().or_else(|| current.description.clone()),
                price,
                is_free: dto.is_free.unwrap_or(current.is_free),
                duration_days: dto.duration_days.or(current.duration_days),
                start_date,
                end_date,
                total_seats,
                available_seats,
                status: requested.after_seat_change(available_seats),
            };

            if let Some(updated) = store
                .update_package_fields(id, current.booked_seats, &fields)
                .await?
            {
                info!("Package {} updated", id);
                return Ok(updated);
            }
        }

        Err(AppError::conflict("Package was modified concurrently, please retry"))
    }

    /// Refused while any pending or confirmed booking holds seats on it.
    pub async fn delete_package(store: &dyn Store, id: &str) -> AppResult<()> {
        let id = parse_object_id(id, "package_id")?;
        let package = store
            .find_package(id)
            .await?
            .ok_or_else(|| AppError::not_found("Package not found"))?;

        let open = store.count_open_bookings(id).await?;
        if open > 0 {
            return Err(AppError::conflict(format!(
                "Package has {} active bookings and cannot be deleted",
                open
            )));
        }
        if !store.delete_package(id).await? {
            return Err(AppError::not_found("Package not found"));
        }
        if !store.adjust_packages_count(package.destination_id, -1).await? {
            warn!("Destination {} missing while removing package {}", package.destination_id, id);
        }
        info!("Package {} deleted", id);
        Ok(())
    }
}

fn manual_status(status: PackageStatus) -> AppResult<PackageStatus> {
    if status == PackageStatus::Soldout {
        return Err(AppError::validation(
            "status soldout is derived from seat availability and cannot be set",
        ));
    }
    Ok(status)
}

fn check_date_range(start: Option<&str>, end: Option<&str>) -> AppResult<()> {
    let parse = |value: Option<&str>, field: &str| -> AppResult<Option<chrono::NaiveDate>> {
        value
            .map(|v| {
                parse_date(v).ok_or_else(|| {
                    AppError::validation(format!("{} must be a date in YYYY-MM-DD format", field))
                })
            })
            .transpose()
    };
    let start = parse(start, "start_date")?;
    let end = parse(end, "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(AppError::validation("end_date must not be before start_date"));
        }
    }
    Ok(())
}
