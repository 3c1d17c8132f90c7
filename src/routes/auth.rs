use log::{info, warn};
use mongodb::bson::{oid::ObjectId, DateTime};
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::db::DbConn;
use crate::guards::AuthGuard;
use crate::models::{LoginDto, RegisterDto, Role, User, UserResponse};
use crate::services::JwtService;
use crate::store::StoreError;
use crate::utils::{validate_email, ApiError, ApiResponse, AppError};

#[derive(Debug, Serialize, JsonSchema)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RefreshTokenDto {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AccessTokenResponse {
    pub access_token: String,
}

fn issue_tokens(user: User) -> Result<AuthResponse, ApiError> {
    let user_id = user
        .id
        .ok_or_else(|| ApiError::internal_error("Internal server error"))?;
    let access_token = JwtService::generate_access_token(&user_id, &user)
        .map_err(|_| ApiError::internal_error("Failed to generate token"))?;
    let refresh_token = JwtService::generate_refresh_token(&user_id, &user)
        .map_err(|_| ApiError::internal_error("Failed to generate token"))?;
    Ok(AuthResponse {
        user: user.into(),
        access_token,
        refresh_token,
    })
}

async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|_| ApiError::internal_error("Failed to hash password"))?
        .map_err(|_| ApiError::internal_error("Failed to hash password"))
}

async fn password_matches(password: String, hash: String) -> bool {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// --------------------
/// Register
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let dto = dto.into_inner();
    dto.validate().map_err(AppError::from)?;

    let email = dto.email.trim().to_lowercase();
    if db.find_user_by_email(&email).await.map_err(AppError::from)?.is_some() {
        return Err(ApiError::conflict("Email is already registered"));
    }

    let now = DateTime::now();
    let mut user = User {
        id: None,
        name: dto.name.trim().to_string(),
        email,
        password_hash: hash_password(dto.password).await?,
        role: Role::User,
        is_active: true,
        last_login_at: now,
        created_at: now,
        updated_at: now,
    };
    let id = match db.insert_user(&user).await {
        Ok(id) => id,
        Err(StoreError::Duplicate(_)) => {
            return Err(ApiError::conflict("Email is already registered"));
        }
        Err(e) => return Err(AppError::from(e).into()),
    };
    user.id = Some(id);
    info!("User {} registered", id);

    Ok(Json(ApiResponse::success_with_message(
        "Registration successful".to_string(),
        issue_tokens(user)?,
    )))
}

/// --------------------
/// Login
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<AuthResponse>>, ApiError> {
    let email = dto.email.trim().to_lowercase();
    if !validate_email(&email) {
        return Err(ApiError::bad_request("Invalid email"));
    }

    let user = db
        .find_user_by_email(&email)
        .await
        .map_err(AppError::from)?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    if !password_matches(dto.password.clone(), user.password_hash.clone()).await {
        warn!("Failed login for {}", email);
        return Err(ApiError::unauthorized("Invalid email or password"));
    }

    if let Some(id) = user.id {
        db.record_login(id).await.map_err(AppError::from)?;
    }

    Ok(Json(ApiResponse::success_with_message(
        "Login successful".to_string(),
        issue_tokens(user)?,
    )))
}

/// --------------------
/// Refresh access token
/// --------------------
#[openapi(tag = "Auth")]
#[post("/auth/refresh", data = "<dto>")]
pub async fn refresh_token(
    db: &State<DbConn>,
    dto: Json<RefreshTokenDto>,
) -> Result<Json<ApiResponse<AccessTokenResponse>>, ApiError> {
    let claims = JwtService::verify_token(&dto.refresh_token, true)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;
    let user_id = ObjectId::parse_str(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid refresh token"))?;

    // Role changes and deactivation take effect on the next refresh.
    let user = db
        .find_user(user_id)
        .await
        .map_err(AppError::from)?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let access_token = JwtService::generate_access_token(&user_id, &user)
        .map_err(|_| ApiError::internal_error("Failed to generate token"))?;

    Ok(Json(ApiResponse::success(AccessTokenResponse { access_token })))
}

/// --------------------
/// Current identity
/// --------------------
#[openapi(tag = "Auth")]
#[get("/auth/me")]
pub async fn me(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<UserResponse>>, ApiError> {
    let user = db
        .find_user(auth.user_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success(user.into())))
}
