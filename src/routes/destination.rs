use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;

use crate::db::DbConn;
use crate::guards::AdminGuard;
use crate::models::{CreateDestinationDto, DestinationResponse};
use crate::services::CatalogService;
use crate::store::DestinationFilter;
use crate::utils::{ApiError, ApiResponse, Pagination};

#[derive(FromForm, serde::Deserialize, rocket_okapi::okapi::schemars::JsonSchema)]
pub struct DestinationQuery {
    pub search: Option<String>,
    pub country: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[openapi(tag = "Destination")]
#[post("/destinations", data = "<dto>")]
pub async fn create_destination(
    db: &State<DbConn>,
    _admin: AdminGuard,
    dto: Json<CreateDestinationDto>,
) -> Result<Json<ApiResponse<DestinationResponse>>, ApiError> {
    let destination = CatalogService::create_destination(db.inner().as_ref(), dto.into_inner()).await?;

    Ok(Json(ApiResponse::success_with_message(
        "Destination created".to_string(),
        destination.into(),
    )))
}

#[openapi(tag = "Destination")]
#[get("/destinations?<query..>")]
pub async fn list_destinations(
    db: &State<DbConn>,
    query: DestinationQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let page = Pagination::new(query.page, query.limit);
    let filter = DestinationFilter {
        country: query.country.filter(|c| !c.trim().is_empty()),
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let (destinations, total) =
        CatalogService::list_destinations(db.inner().as_ref(), &filter, page).await?;
    let destinations: Vec<DestinationResponse> = destinations.into_iter().map(Into::into).collect();

    Ok(Json(ApiResponse::success(serde_json::json!({
        "destinations": destinations,
        "pagination": page.to_json(total),
    }))))
}

#[openapi(tag = "Destination")]
#[get("/destinations/<id>")]
pub async fn get_destination(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<DestinationResponse>>, ApiError> {
    let destination = CatalogService::get_destination(db.inner().as_ref(), &id).await?;
    Ok(Json(ApiResponse::success(destination.into())))
}
