use axum::{extract::State, Json};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::{password, AuthenticatedUser},
    error::{AppError, AppResult},
    extract::ApiJson,
    models::User,
    repo::AccessDirectory,
    schema::users::dsl,
    state::AppState,
};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: uuid::Uuid,
    pub username: String,
    pub is_super_admin: bool,
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    // Unknown users and wrong passwords answer the same way.
    let user: User = dsl::users
        .filter(dsl::username.eq(&payload.username))
        .first(&mut conn)
        .optional()?
        .ok_or_else(AppError::unauthorized)?;

    let valid = password::verify_password(&payload.password, &user.password_hash)
        .map_err(|_| AppError::unauthorized())?;

    if !valid {
        return Err(AppError::unauthorized());
    }

    let access_token = state
        .jwt
        .generate_token(user.id, &user.username)
        .map_err(AppError::from)?;
    info!(user_id = %user.id, "user logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt.expires_in_secs(),
    }))
}

pub async fn me(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<MeResponse>> {
    let mut conn = state.db()?;
    let is_super_admin = conn.is_super_admin(user.user_id)?;
    Ok(Json(MeResponse {
        user_id: user.user_id,
        username: user.username,
        is_super_admin,
    }))
}
