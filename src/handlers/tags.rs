use actix_web::{web, HttpResponse};

use super::{blocking, ok, AppState};
use crate::error::ApiError;
use crate::tags;

pub async fn list(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let groups = blocking(move || tags::grouped_tags(state.store())).await?;
    Ok(ok(groups))
}
