//! HTTP surface. Every handler authenticates, parses and then calls into the
//! domain modules on the blocking pool; responses use the `{data, meta?}`
//! envelope and failures the [`ApiError`] envelope.

use std::sync::Arc;

use actix_web::http::{header, Method};
use actix_web::{web, HttpRequest, HttpResponse, Resource};
use serde::Serialize;

use crate::auth::Authenticator;
use crate::error::ApiError;
use crate::models::{Page, PageMeta};
use crate::store::Store;
use crate::validation::{parse_id, QueryParams};

mod auth;
mod comments;
mod events;
mod registrations;
mod tags;
mod users;

/// Upper bound for request bodies; GPX recordings of long runs are large.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared by all workers.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth: Authenticator,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, auth: Authenticator) -> web::Data<AppState> {
        web::Data::new(AppState { store, auth })
    }

    fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

/// Runs store work on the blocking thread pool.
async fn blocking<F, T>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    web::block(work).await?
}

#[derive(Serialize)]
struct Envelope<T> {
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<PageMeta>,
}

fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(Envelope { data, meta: None })
}

fn created<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Created().json(Envelope { data, meta: None })
}

fn paged<T: Serialize>(data: T, meta: PageMeta) -> HttpResponse {
    HttpResponse::Ok().json(Envelope {
        data,
        meta: Some(meta),
    })
}

fn path_id(req: &HttpRequest) -> Result<i64, ApiError> {
    parse_id("id", req.match_info().query("id"))
}

/// Pagination from a query string that carries nothing else of interest.
fn page_only(req: &HttpRequest) -> Result<Page, ApiError> {
    let mut query = QueryParams::parse(req.query_string())?;
    let page = query.pagination();
    query.finish()?;
    Ok(page)
}

/// Preflight for known resources; anything else unrouted is 405.
async fn fallback(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    if req.method() != Method::OPTIONS {
        return Err(ApiError::MethodNotAllowed);
    }
    Ok(HttpResponse::NoContent()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((
            header::ACCESS_CONTROL_ALLOW_METHODS,
            "GET, POST, PUT, DELETE, OPTIONS",
        ))
        .insert_header((
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            "Authorization, Content-Type",
        ))
        .insert_header((header::ACCESS_CONTROL_MAX_AGE, "86400"))
        .finish())
}

/// Default service for the whole app.
pub async fn not_found() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound("Route not found".into()))
}

fn resource(path: &str) -> Resource {
    web::resource(path).default_service(web::to(fallback))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::PayloadConfig::new(MAX_BODY_BYTES)).service(
        web::scope("/api")
            .service(resource("/auth/register").route(web::post().to(auth::register)))
            .service(resource("/auth/login").route(web::post().to(auth::login)))
            .service(resource("/auth/logout").route(web::post().to(auth::logout)))
            .service(resource("/auth/me").route(web::get().to(auth::me)))
            .service(
                resource("/events")
                    .route(web::get().to(events::list))
                    .route(web::post().to(events::create)),
            )
            .service(
                resource("/events/{id}")
                    .route(web::get().to(events::show))
                    .route(web::put().to(events::update))
                    .route(web::delete().to(events::delete)),
            )
            .service(
                resource("/events/{id}/comments")
                    .route(web::get().to(comments::list))
                    .route(web::post().to(comments::create)),
            )
            .service(
                resource("/events/{id}/registrations")
                    .route(web::get().to(registrations::for_event))
                    .route(web::post().to(registrations::register)),
            )
            .service(
                resource("/comments/{id}")
                    .route(web::put().to(comments::update))
                    .route(web::delete().to(comments::delete)),
            )
            .service(
                resource("/registrations/{id}/result")
                    .route(web::put().to(registrations::record_result)),
            )
            .service(
                resource("/registrations/{id}/activity")
                    .route(web::post().to(registrations::import_activity)),
            )
            .service(
                resource("/users/{id}")
                    .route(web::get().to(users::show))
                    .route(web::put().to(users::update)),
            )
            .service(
                resource("/users/{id}/registrations").route(web::get().to(registrations::for_user)),
            )
            .service(resource("/tags").route(web::get().to(tags::list))),
    );
}
