use actix_web::{web, HttpRequest, HttpResponse};

use super::{blocking, created, ok, paged, path_id, AppState};
use crate::error::ApiError;
use crate::events::{self, CreateEventRequest, UpdateEventRequest};
use crate::models::Role;
use crate::validation::{parse_json, QueryParams};

pub async fn list(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let mut query = QueryParams::parse(req.query_string())?;
    let filter = events::filter_from_query(&mut query);
    let page = query.pagination();
    query.finish()?;

    let (events, meta) =
        blocking(move || events::list_events(state.store(), &filter, page)).await?;
    Ok(paged(events, meta))
}

pub async fn show(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let id = path_id(&req)?;
    let event = blocking(move || events::get_event(state.store(), id)).await?;
    Ok(ok(event))
}

pub async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let headers = req.headers().clone();
    let event = blocking(move || {
        let organizer = state
            .auth
            .require_role(state.store(), &headers, Role::can_organize)?;
        let request: CreateEventRequest = parse_json(&body)?;
        events::create_event(state.store(), &organizer, request)
    })
    .await?;
    Ok(created(event))
}

pub async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let id = path_id(&req)?;
    let headers = req.headers().clone();
    let event = blocking(move || {
        let user = state.auth.require_authenticated(state.store(), &headers)?;
        let request: UpdateEventRequest = parse_json(&body)?;
        events::update_event(state.store(), &user, id, request)
    })
    .await?;
    Ok(ok(event))
}

pub async fn delete(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let id = path_id(&req)?;
    let headers = req.headers().clone();
    blocking(move || {
        let user = state.auth.require_authenticated(state.store(), &headers)?;
        events::delete_event(state.store(), &user, id)
    })
    .await?;
    Ok(HttpResponse::NoContent().finish())
}
