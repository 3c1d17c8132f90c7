use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{CreatePackageDto, PackageResponse, PackageStatus, UpdatePackageDto};
use crate::services::CatalogService;
use crate::store::PackageFilter;
use crate::utils::{parse_object_id, ApiError, ApiResponse, AppError, Pagination};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct PackageQuery {
    pub destination: Option<String>,
    pub status: Option<String>,
    #[field(name = "minPrice")]
    #[serde(rename = "minPrice")]
    pub min_price: Option<f64>,
    #[field(name = "maxPrice")]
    #[serde(rename = "maxPrice")]
    pub max_price: Option<f64>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PackageQuery {
    fn filter(&self) -> Result<PackageFilter, AppError> {
        let destination_id = match self.destination.as_deref().filter(|d| !d.is_empty()) {
            Some(id) => Some(parse_object_id(id, "destination")?),
            None => None,
        };
        let status = match self.status.as_deref().filter(|s| !s.is_empty()) {
            Some(status) => Some(status.parse::<PackageStatus>().map_err(AppError::Validation)?),
            None => None,
        };
        Ok(PackageFilter {
            destination_id,
            status,
            min_price: self.min_price,
            max_price: self.max_price,
            search: self.search.clone().filter(|s| !s.trim().is_empty()),
        })
    }
}

#[openapi(tag = "Package")]
#[post("/packages", data = "<dto>")]
pub async fn create_package(
    db: &State<DbConn>,
    _admin: AdminGuard,
    dto: Json<CreatePackageDto>,
) -> Result<Json<ApiResponse<PackageResponse>>, ApiError> {
    let package = CatalogService::create_package(db.inner().as_ref(), dto.into_inner()).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Package created".to_string(),
        package.into(),
    )))
}

#[openapi(tag = "Package")]
#[get("/packages?<query..>")]
pub async fn list_packages(
    db: &State<DbConn>,
    query: PackageQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Pagination::new(query.page, query.limit);
    let filter = query.filter()?;
    let (packages, total) = CatalogService::list_packages(db.inner().as_ref(), &filter, page).await?;
    let packages: Vec<PackageResponse> = packages.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "packages": packages,
        "pagination": page.to_json(total),
    }))))
}

#[openapi(tag = "Package")]
#[get("/packages/<id>")]
pub async fn get_package(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<PackageResponse>>, ApiError> {
    let package = CatalogService::get_package(db.inner().as_ref(), &id).await?;
    Ok(Json(ApiResponse::success(package.into())))
}

#[openapi(tag = "Package")]
#[put("/packages/<id>", data = "<dto>")]
pub async fn update_package(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
    dto: Json<UpdatePackageDto>,
) -> Result<Json<ApiResponse<PackageResponse>>, ApiError> {
    let package = CatalogService::update_package(db.inner().as_ref(), &id, dto.into_inner()).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Package updated".to_string(),
        package.into(),
    )))
}

#[openapi(tag = "Package")]
#[delete("/packages/<id>")]
pub async fn delete_package(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    CatalogService::delete_package(db.inner().as_ref(), &id).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Package deleted".to_string(),
        serde_json::json!({ "id": id }),
    )))
}
