use std::sync::Arc;

use actix_web::http::header::{self, ContentType};
use actix_web::http::{Method, StatusCode};
use actix_web::{test, web, App};
use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Value};

use drawntorun::auth::{Authenticator, Claims};
use drawntorun::config::AuthConfig;
use drawntorun::handlers::{self, AppState};
use drawntorun::models::{Event, NewEvent, NewUser, Role, Tag, User};
use drawntorun::store::{MemoryStore, Store};

const SECRET: &str = "integration-secret-integration-secret";

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data($state.clone())
                .configure(handlers::configure)
                .default_service(web::to(handlers::not_found)),
        )
        .await
    };
}

struct Harness {
    store: Arc<MemoryStore>,
    auth: Authenticator,
    state: web::Data<AppState>,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    fn with_store(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        let auth =
            Authenticator::new(&AuthConfig::new(SECRET, Duration::days(7)).unwrap());
        let state = AppState::new(store.clone(), auth.clone());
        Harness { store, auth, state }
    }

    fn user(&self, email: &str, role: Role) -> (User, String) {
        let user = self
            .store
            .create_user(NewUser {
                email: email.into(),
                name: email.split('@').next().unwrap().into(),
                role,
                password_hash: "not-a-phc-string".into(),
            })
            .unwrap();
        let token = self.auth.issue(&user).unwrap();
        (user, token)
    }

    fn event(&self, organizer: &User) -> Event {
        self.store
            .create_event(NewEvent {
                title: "Riverside Half".into(),
                description: None,
                starts_at: Utc.with_ymd_and_hms(2026, 10, 4, 9, 0, 0).unwrap(),
                location_name: Some("Riverside".into()),
                latitude: Some(51.5),
                longitude: Some(-0.12),
                distances: vec!["10K".into(), "21K".into()],
                capacity: None,
                entry_fee_cents: None,
                website_url: None,
                organizer_id: organizer.id,
            })
            .unwrap()
    }
}

fn bearer(token: &str) -> (header::HeaderName, String) {
    (header::AUTHORIZATION, format!("Bearer {}", token))
}

#[actix_web::test]
async fn short_password_is_a_validation_error() {
    let h = Harness::new();
    let app = app!(h.state);

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "email": "ana@example.com", "password": "short", "name": "Ana" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Validation failed");
    assert_eq!(body["details"][0]["field"], "password");
    assert!(body["details"][0]["message"].as_str().unwrap().contains('8'));
}

#[actix_web::test]
async fn register_then_me() {
    let h = Harness::new();
    let app = app!(h.state);

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "email": "ana@example.com",
            "password": "correct horse",
            "name": "Ana",
            "role": "organizer"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["data"]["user"]["role"], "organizer");
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(bearer(&token))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["email"], "ana@example.com");

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({ "email": "ana@example.com", "password": "wrong horse" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn expired_tokens_are_rejected() {
    let h = Harness::new();
    let (user, _) = h.user("ana@example.com", Role::Participant);
    let app = app!(h.state);

    let past = Utc::now() - Duration::days(2);
    let token = h
        .auth
        .sign(&Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: past.timestamp(),
            exp: (past + Duration::days(1)).timestamp(),
        })
        .unwrap();

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Authentication required");
}

#[actix_web::test]
async fn registrations_are_visible_to_owner_and_admin() {
    let h = Harness::new();
    let (organizer, _) = h.user("org@example.com", Role::Organizer);
    let (runner, runner_token) = h.user("run@example.com", Role::Participant);
    let (_, other_token) = h.user("other@example.com", Role::Participant);
    let (_, admin_token) = h.user("admin@example.com", Role::Admin);
    let event = h.event(&organizer);
    let app = app!(h.state);

    let req = test::TestRequest::post()
        .uri(&format!("/api/events/{}/registrations", event.id))
        .insert_header(bearer(&runner_token))
        .set_json(json!({ "distance": "21K" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let uri = format!("/api/users/{}/registrations", runner.id);
    let get = |token: &str| {
        test::TestRequest::get()
            .uri(&uri)
            .insert_header(bearer(token))
            .to_request()
    };

    let resp = test::call_service(&app, get(other_token.as_str())).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    for token in [runner_token.as_str(), admin_token.as_str()] {
        let resp = test::call_service(&app, get(token)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"][0]["distance"], "21K");
        assert_eq!(body["data"][0]["event"]["title"], "Riverside Half");
        assert_eq!(body["meta"]["total"], 1);
    }
}

#[actix_web::test]
async fn comment_threads_are_depth_first() {
    let h = Harness::new();
    let (organizer, token) = h.user("org@example.com", Role::Organizer);
    let event = h.event(&organizer);
    let app = app!(h.state);
    let uri = format!("/api/events/{}/comments", event.id);

    let mut ids = Vec::new();
    for (content, parent) in [("A", None), ("B", None), ("C", Some(1)), ("D", Some(2))] {
        let parent_id: Option<i64> = parent.map(|index: usize| ids[index]);
        let req = test::TestRequest::post()
            .uri(&uri)
            .insert_header(bearer(&token))
            .set_json(json!({ "content": content, "parentId": parent_id }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["data"]["author"]["id"], organizer.id);
        ids.push(body["data"]["id"].as_i64().unwrap());
    }

    let req = test::TestRequest::get().uri(&uri).to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let thread = body["data"].as_array().unwrap();
    let contents: Vec<_> = thread.iter().map(|c| c["content"].as_str().unwrap()).collect();
    let depths: Vec<_> = thread.iter().map(|c| c["depth"].as_u64().unwrap()).collect();
    assert_eq!(contents, ["A", "B", "C", "D"]);
    assert_eq!(depths, [0, 0, 1, 2]);
    assert_eq!(body["meta"]["total"], 4);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer(&token))
        .set_json(json!({ "content": "too deep", "parentId": ids[3] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Maximum reply depth reached");
}

#[actix_web::test]
async fn pagination_is_clamped_and_checked() {
    let h = Harness::new();
    let (organizer, _) = h.user("org@example.com", Role::Organizer);
    let event = h.event(&organizer);
    let app = app!(h.state);

    let req = test::TestRequest::get()
        .uri(&format!("/api/events/{}/comments?limit=500", event.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["meta"]["limit"], 100);
    assert_eq!(body["meta"]["total"], 0);

    let req = test::TestRequest::get()
        .uri("/api/events?page=0")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["details"][0]["field"], "page");
}

#[actix_web::test]
async fn only_organizers_create_events() {
    let h = Harness::new();
    let (_, runner_token) = h.user("run@example.com", Role::Participant);
    let (_, organizer_token) = h.user("org@example.com", Role::Organizer);
    let app = app!(h.state);

    let payload = json!({
        "title": "Forest 5K",
        "startsAt": "2026-11-01T10:00:00Z",
        "distances": ["5K"]
    });
    let create = |token: &str| {
        test::TestRequest::post()
            .uri("/api/events")
            .insert_header(bearer(token))
            .set_json(payload.clone())
            .to_request()
    };

    let resp = test::call_service(&app, create(runner_token.as_str())).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let resp = test::call_service(&app, create(organizer_token.as_str())).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri("/api/events?search=forest")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"][0]["title"], "Forest 5K");
    assert_eq!(body["meta"]["totalPages"], 1);
}

#[actix_web::test]
async fn malformed_json_is_a_bad_request() {
    let h = Harness::new();
    let app = app!(h.state);

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .insert_header(ContentType::json())
        .set_payload("{\"email\": ")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"].as_str().unwrap().starts_with("Invalid JSON"));
}

#[actix_web::test]
async fn preflight_unknown_methods_and_routes() {
    let h = Harness::new();
    let app = app!(h.state);

    let req = test::TestRequest::default()
        .method(Method::OPTIONS)
        .uri("/api/events")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        resp.headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );

    let req = test::TestRequest::default()
        .method(Method::PATCH)
        .uri("/api/events")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "Method not allowed");

    let req = test::TestRequest::get().uri("/api/nowhere").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn tags_are_grouped_by_category() {
    let tag = |id: i64, name: &str, category: &str| Tag {
        id,
        name: name.into(),
        category: category.into(),
        color: "#10b981".into(),
    };
    let h = Harness::with_store(MemoryStore::with_tags(vec![
        tag(1, "trail", "terrain"),
        tag(2, "beginner", "level"),
        tag(3, "road", "terrain"),
    ]));
    let app = app!(h.state);

    let req = test::TestRequest::get().uri("/api/tags").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["level"][0]["name"], "beginner");
    assert_eq!(body["data"]["terrain"][0]["name"], "road");
    assert_eq!(body["data"]["terrain"][1]["name"], "trail");
}

#[actix_web::test]
async fn huge_pages_are_rejected_not_overflowed() {
    let h = Harness::new();
    let (organizer, _) = h.user("org@example.com", Role::Organizer);
    let event = h.event(&organizer);
    let app = app!(h.state);

    for uri in [
        format!("/api/events/{}/comments?page=9223372036854775807", event.id),
        "/api/events?page=9223372036854775807".to_string(),
    ] {
        let req = test::TestRequest::get().uri(&uri).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["details"][0]["field"], "page");
    }
}

#[actix_web::test]
async fn freshly_expired_tokens_are_rejected() {
    let h = Harness::new();
    let (user, _) = h.user("ana@example.com", Role::Participant);
    let app = app!(h.state);

    let now = Utc::now();
    let token = h
        .auth
        .sign(&Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: (now - Duration::minutes(10)).timestamp(),
            exp: (now - Duration::seconds(30)).timestamp(),
        })
        .unwrap();

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(bearer(&token))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
