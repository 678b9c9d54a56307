use actix_web::{web, HttpRequest, HttpResponse};

use super::{blocking, ok, path_id, AppState};
use crate::error::ApiError;
use crate::users::{self, ProfileRequest};
use crate::validation::parse_json;

pub async fn show(state: web::Data<AppState>, req: HttpRequest) -> Result<HttpResponse, ApiError> {
    let id = path_id(&req)?;
    let profile = blocking(move || users::profile(state.store(), id)).await?;
    Ok(ok(profile))
}

pub async fn update(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let id = path_id(&req)?;
    let headers = req.headers().clone();
    let user = blocking(move || {
        let user = state.auth.require_authenticated(state.store(), &headers)?;
        let request: ProfileRequest = parse_json(&body)?;
        users::update_profile(state.store(), &user, id, request)
    })
    .await?;
    Ok(ok(user))
}
