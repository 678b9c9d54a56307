use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use super::{blocking, created, ok, AppState};
use crate::error::ApiError;
use crate::users::{self, LoginRequest, SignUpRequest};
use crate::validation::parse_json;

pub async fn register(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: SignUpRequest = parse_json(&body)?;
    let response = blocking(move || users::sign_up(state.store(), &state.auth, request)).await?;
    Ok(created(response))
}

pub async fn login(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let request: LoginRequest = parse_json(&body)?;
    let response = blocking(move || users::log_in(state.store(), &state.auth, request)).await?;
    Ok(ok(response))
}

/// Tokens are not tracked server side; the client drops its copy.
pub async fn logout(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    match state.auth.resolve_identity(req.headers()) {
        Some(claims) => tracing::info!(user_id = claims.sub, "user logged out"),
        None => tracing::debug!("logout without a valid token"),
    }
    ok(json!({ "message": "Logged out" }))
}

pub async fn me(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let headers = req.headers().clone();
    let user =
        blocking(move || state.auth.require_authenticated(state.store(), &headers)).await?;
    Ok(ok(user))
}
