use actix_web::{web, HttpRequest, HttpResponse};

use super::{blocking, created, ok, page_only, paged, path_id, AppState};
use crate::comments::{self, CreateCommentRequest, UpdateCommentRequest};
use crate::error::ApiError;
use crate::validation::parse_json;

/// The event's discussion as a flattened, depth-annotated thread.
pub async fn list(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let event_id = path_id(&req)?;
    let page = page_only(&req)?;
    let (thread, meta) =
        blocking(move || comments::event_thread(state.store(), event_id, page)).await?;
    Ok(paged(thread, meta))
}

pub async fn create(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let event_id = path_id(&req)?;
    let headers = req.headers().clone();
    let record = blocking(move || {
        let author = state.auth.require_authenticated(state.store(), &headers)?;
        let request: CreateCommentRequest = parse_json(&body)?;
        comments::create_comment(state.store(), event_id, &author, request)
    })
    .await?;
    Ok(created(record))
}

pub async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let comment_id = path_id(&req)?;
    let headers = req.headers().clone();
    let record = blocking(move || {
        let user = state.auth.require_authenticated(state.store(), &headers)?;
        let request: UpdateCommentRequest = parse_json(&body)?;
        comments::update_comment(state.store(), &user, comment_id, request)
    })
    .await?;
    Ok(ok(record))
}

pub async fn delete(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let comment_id = path_id(&req)?;
    let headers = req.headers().clone();
    blocking(move || {
        let user = state.auth.require_authenticated(state.store(), &headers)?;
        comments::delete_comment(state.store(), &user, comment_id)
    })
    .await?;
    Ok(HttpResponse::NoContent().finish())
}
