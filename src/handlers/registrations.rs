use actix_web::{web, HttpRequest, HttpResponse};

use super::{blocking, created, ok, page_only, paged, path_id, AppState};
use crate::error::ApiError;
use crate::registrations::{self, RegisterRequest, ResultRequest};
use crate::validation::parse_json;

pub async fn register(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let event_id = path_id(&req)?;
    let headers = req.headers().clone();
    let registration = blocking(move || {
        let runner = state.auth.require_authenticated(state.store(), &headers)?;
        let request: RegisterRequest = parse_json(&body)?;
        registrations::register(state.store(), &runner, event_id, request)
    })
    .await?;
    Ok(created(registration))
}

/// Start list and results of one event.
pub async fn for_event(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let event_id = path_id(&req)?;
    let headers = req.headers().clone();
    let list = blocking(move || {
        let viewer = state.auth.require_authenticated(state.store(), &headers)?;
        registrations::event_registrations(state.store(), &viewer, event_id)
    })
    .await?;
    Ok(ok(list))
}

pub async fn for_user(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let user_id = path_id(&req)?;
    let page = page_only(&req)?;
    let headers = req.headers().clone();
    let (list, meta) = blocking(move || {
        let viewer = state.auth.require_authenticated(state.store(), &headers)?;
        registrations::user_registrations(state.store(), &viewer, user_id, page)
    })
    .await?;
    Ok(paged(list, meta))
}

pub async fn record_result(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let registration_id = path_id(&req)?;
    let headers = req.headers().clone();
    let registration = blocking(move || {
        let user = state.auth.require_authenticated(state.store(), &headers)?;
        let request: ResultRequest = parse_json(&body)?;
        registrations::record_result(state.store(), &user, registration_id, request)
    })
    .await?;
    Ok(ok(registration))
}

/// The body is the raw GPX document.
pub async fn import_activity(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let registration_id = path_id(&req)?;
    let headers = req.headers().clone();
    let imported = blocking(move || {
        let user = state.auth.require_authenticated(state.store(), &headers)?;
        registrations::import_activity(state.store(), &user, registration_id, &body)
    })
    .await?;
    Ok(ok(imported))
}
