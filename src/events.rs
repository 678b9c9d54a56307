//! Event listing and organizer-owned mutation.

use garde::Validate;
use geo::{HaversineDistance, Point};
use serde::Deserialize;

use crate::auth;
use crate::error::{ApiError, FieldError};
use crate::models::{
    Event, EventChanges, EventFilter, EventStatus, GeoRadius, NewEvent, Page, PageMeta, User,
};
use crate::store::Store;
use crate::validation::{
    not_blank, optional_event_status, optional_not_blank, optional_rfc3339, parse_rfc3339,
    rfc3339, QueryParams,
};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    #[garde(length(min = 1, max = 200), custom(not_blank))]
    pub title: String,
    #[garde(length(max = 5000))]
    pub description: Option<String>,
    #[garde(custom(rfc3339))]
    pub starts_at: String,
    #[garde(length(max = 200))]
    pub location_name: Option<String>,
    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[garde(length(min = 1, max = 20), inner(length(min = 1, max = 50)))]
    pub distances: Vec<String>,
    #[garde(range(min = 1))]
    pub capacity: Option<i32>,
    #[garde(range(min = 0))]
    pub entry_fee_cents: Option<i32>,
    #[garde(url)]
    pub website_url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEventRequest {
    #[garde(length(min = 1, max = 200), custom(optional_not_blank))]
    pub title: Option<String>,
    #[garde(length(max = 5000))]
    pub description: Option<String>,
    #[garde(custom(optional_rfc3339))]
    pub starts_at: Option<String>,
    #[garde(length(max = 200))]
    pub location_name: Option<String>,
    #[garde(range(min = -90.0, max = 90.0))]
    pub latitude: Option<f64>,
    #[garde(range(min = -180.0, max = 180.0))]
    pub longitude: Option<f64>,
    #[garde(custom(optional_distances))]
    pub distances: Option<Vec<String>>,
    #[garde(range(min = 1))]
    pub capacity: Option<i32>,
    #[garde(range(min = 0))]
    pub entry_fee_cents: Option<i32>,
    #[garde(url)]
    pub website_url: Option<String>,
    #[garde(custom(optional_event_status))]
    pub status: Option<String>,
}

fn optional_distances(value: &Option<Vec<String>>, _ctx: &()) -> garde::Result {
    let Some(distances) = value else {
        return Ok(());
    };
    if distances.is_empty() || distances.len() > 20 {
        return Err(garde::Error::new("must list between 1 and 20 distances"));
    }
    if distances.iter().any(|d| d.trim().is_empty() || d.len() > 50) {
        return Err(garde::Error::new("distance names must be 1 to 50 characters"));
    }
    Ok(())
}

fn clean_distances(distances: Vec<String>) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(distances.len());
    for distance in distances {
        let distance = distance.trim().to_string();
        if !cleaned.contains(&distance) {
            cleaned.push(distance);
        }
    }
    cleaned
}

/// Coordinates come in pairs.
fn check_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), ApiError> {
    match (latitude, longitude) {
        (Some(_), None) => Err(ApiError::field("longitude", "required when latitude is set")),
        (None, Some(_)) => Err(ApiError::field("latitude", "required when longitude is set")),
        _ => Ok(()),
    }
}

/// Great-circle distance check. Events without coordinates never match.
pub fn within_radius(event: &Event, near: GeoRadius) -> bool {
    match (event.latitude, event.longitude) {
        (Some(latitude), Some(longitude)) => {
            let meters = Point::new(longitude, latitude)
                .haversine_distance(&Point::new(near.longitude, near.latitude));
            meters / 1000.0 <= near.radius_km
        }
        _ => false,
    }
}

/// Reads listing filters from the query string. `lat`, `lon` and
/// `radiusKm` only work together.
pub fn filter_from_query(query: &mut QueryParams) -> EventFilter {
    let status = query.member::<EventStatus>("status", "active, cancelled, completed");
    let search = query.text("search");
    let from = query.datetime("from");
    let to = query.datetime("to");
    let organizer_id = query.integer("organizerId");

    let latitude = query.float("lat");
    let longitude = query.float("lon");
    let radius_km = query.float("radiusKm");
    let near = match (latitude, longitude, radius_km) {
        (Some(latitude), Some(longitude), Some(radius_km)) => {
            if !(-90.0..=90.0).contains(&latitude) {
                query.reject("lat", "must be between -90 and 90");
            }
            if !(-180.0..=180.0).contains(&longitude) {
                query.reject("lon", "must be between -180 and 180");
            }
            if radius_km <= 0.0 {
                query.reject("radiusKm", "must be greater than 0");
            }
            Some(GeoRadius {
                latitude,
                longitude,
                radius_km,
            })
        }
        (None, None, None) => None,
        _ => {
            query.reject("radiusKm", "lat, lon and radiusKm must be given together");
            None
        }
    };

    EventFilter {
        status,
        search,
        from,
        to,
        organizer_id,
        near,
    }
}

pub fn list_events(
    store: &dyn Store,
    filter: &EventFilter,
    page: Page,
) -> Result<(Vec<Event>, PageMeta), ApiError> {
    let (events, total) = store.list_events(filter, page)?;
    Ok((events, PageMeta::new(page, total)))
}

pub fn get_event(store: &dyn Store, id: i64) -> Result<Event, ApiError> {
    store
        .find_event(id)?
        .ok_or_else(|| ApiError::not_found("Event"))
}

pub fn create_event(
    store: &dyn Store,
    organizer: &User,
    request: CreateEventRequest,
) -> Result<Event, ApiError> {
    check_coordinates(request.latitude, request.longitude)?;
    let starts_at = parse_rfc3339(&request.starts_at)
        .ok_or_else(|| ApiError::field("startsAt", "must be an RFC 3339 date-time"))?;

    let event = store.create_event(NewEvent {
        title: request.title.trim().to_string(),
        description: request.description,
        starts_at,
        location_name: request.location_name,
        latitude: request.latitude,
        longitude: request.longitude,
        distances: clean_distances(request.distances),
        capacity: request.capacity,
        entry_fee_cents: request.entry_fee_cents,
        website_url: request.website_url,
        organizer_id: organizer.id,
    })?;
    tracing::info!(event_id = event.id, organizer_id = organizer.id, "event created");
    Ok(event)
}

pub fn update_event(
    store: &dyn Store,
    user: &User,
    id: i64,
    request: UpdateEventRequest,
) -> Result<Event, ApiError> {
    let event = get_event(store, id)?;
    if !auth::can_manage_event(user, &event) {
        return Err(ApiError::Forbidden);
    }

    // A lone coordinate is fine when the event already has the other one.
    check_coordinates(
        request.latitude.or(event.latitude),
        request.longitude.or(event.longitude),
    )?;

    let mut errors = Vec::new();
    let starts_at = match request.starts_at.as_deref() {
        Some(raw) => match parse_rfc3339(raw) {
            Some(parsed) => Some(parsed),
            None => {
                errors.push(FieldError::new("startsAt", "must be an RFC 3339 date-time"));
                None
            }
        },
        None => None,
    };
    let status = match request.status.as_deref() {
        Some(raw) => match raw.parse::<EventStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.push(FieldError::new(
                    "status",
                    "must be one of: active, cancelled, completed",
                ));
                None
            }
        },
        None => None,
    };
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let changes = EventChanges {
        title: request.title.map(|title| title.trim().to_string()),
        description: request.description,
        starts_at,
        location_name: request.location_name,
        latitude: request.latitude,
        longitude: request.longitude,
        distances: request.distances.map(clean_distances),
        capacity: request.capacity,
        entry_fee_cents: request.entry_fee_cents,
        website_url: request.website_url,
        status,
    };
    let updated = store
        .update_event(id, &changes)?
        .ok_or_else(|| ApiError::not_found("Event"))?;
    tracing::info!(event_id = id, updated_by = user.id, "event updated");
    Ok(updated)
}

pub fn delete_event(store: &dyn Store, user: &User, id: i64) -> Result<(), ApiError> {
    let event = get_event(store, id)?;
    if !auth::can_manage_event(user, &event) {
        return Err(ApiError::Forbidden);
    }
    store.delete_event(id)?;
    tracing::info!(event_id = id, deleted_by = user.id, "event deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewUser, Role};
    use crate::store::MemoryStore;
    use crate::validation::validate;

    fn user(store: &MemoryStore, email: &str, role: Role) -> User {
        store
            .create_user(NewUser {
                email: email.into(),
                name: email.into(),
                role,
                password_hash: "unused".into(),
            })
            .unwrap()
    }

    fn request(title: &str) -> CreateEventRequest {
        CreateEventRequest {
            title: title.into(),
            description: None,
            starts_at: "2026-06-06T08:00:00+02:00".into(),
            location_name: Some("Stockholm".into()),
            latitude: Some(59.3293),
            longitude: Some(18.0686),
            distances: vec!["10K".into(), " 10K ".into(), "Half marathon".into()],
            capacity: Some(500),
            entry_fee_cents: Some(2500),
            website_url: Some("https://example.com/race".into()),
        }
    }

    #[test]
    fn blank_title_updates_are_rejected() {
        let blank = UpdateEventRequest {
            title: Some("   ".into()),
            ..UpdateEventRequest::default()
        };
        let ApiError::Validation(errors) = validate(blank).unwrap_err() else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "title");
        assert_eq!(errors[0].message, "must not be blank");

        let untouched = UpdateEventRequest::default();
        assert!(validate(untouched).is_ok());
    }

    #[test]
    fn create_normalizes_input() {
        let store = MemoryStore::new();
        let organizer = user(&store, "org@example.com", Role::Organizer);
        let event = create_event(&store, &organizer, request("  Midsummer Run ")).unwrap();
        assert_eq!(event.title, "Midsummer Run");
        assert_eq!(event.distances, ["10K", "Half marathon"]);
        assert_eq!(event.status, EventStatus::Active);
        assert_eq!(event.starts_at.to_rfc3339(), "2026-06-06T06:00:00+00:00");
    }

    #[test]
    fn create_rules() {
        let mut bad = request("Run");
        bad.distances.clear();
        bad.starts_at = "next tuesday".into();
        bad.website_url = Some("not a url".into());
        bad.latitude = Some(123.0);
        let err = validate(bad).unwrap_err();
        let ApiError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let mut fields: Vec<_> = errors.into_iter().map(|e| e.field).collect();
        fields.sort();
        assert_eq!(fields, ["distances", "latitude", "startsAt", "websiteUrl"]);
    }

    #[test]
    fn half_a_coordinate_is_rejected() {
        let store = MemoryStore::new();
        let organizer = user(&store, "org@example.com", Role::Organizer);
        let mut lonely = request("Run");
        lonely.longitude = None;
        assert!(matches!(
            create_event(&store, &organizer, lonely),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn only_owner_or_admin_may_update() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner@example.com", Role::Organizer);
        let rival = user(&store, "rival@example.com", Role::Organizer);
        let admin = user(&store, "admin@example.com", Role::Admin);
        let event = create_event(&store, &owner, request("Run")).unwrap();

        let cancel = || UpdateEventRequest {
            status: Some("cancelled".into()),
            ..UpdateEventRequest::default()
        };
        assert!(matches!(
            update_event(&store, &rival, event.id, cancel()),
            Err(ApiError::Forbidden)
        ));
        assert_eq!(
            update_event(&store, &owner, event.id, cancel()).unwrap().status,
            EventStatus::Cancelled
        );
        let reopened = update_event(
            &store,
            &admin,
            event.id,
            UpdateEventRequest {
                status: Some("active".into()),
                ..UpdateEventRequest::default()
            },
        )
        .unwrap();
        assert_eq!(reopened.status, EventStatus::Active);
    }

    #[test]
    fn delete_requires_ownership() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner@example.com", Role::Organizer);
        let runner = user(&store, "runner@example.com", Role::Participant);
        let event = create_event(&store, &owner, request("Run")).unwrap();
        assert!(matches!(
            delete_event(&store, &runner, event.id),
            Err(ApiError::Forbidden)
        ));
        delete_event(&store, &owner, event.id).unwrap();
        assert!(matches!(get_event(&store, event.id), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn radius_filter() {
        let store = MemoryStore::new();
        let owner = user(&store, "owner@example.com", Role::Organizer);
        let event = create_event(&store, &owner, request("Run")).unwrap();
        // Uppsala is roughly 64 km from Stockholm.
        let uppsala = |radius_km| GeoRadius {
            latitude: 59.8586,
            longitude: 17.6389,
            radius_km,
        };
        assert!(!within_radius(&event, uppsala(50.0)));
        assert!(within_radius(&event, uppsala(80.0)));
    }

    #[test]
    fn query_filters() {
        let mut query =
            QueryParams::parse("status=cancelled&search=trail&lat=59.3&lon=18.0&radiusKm=10")
                .unwrap();
        let filter = filter_from_query(&mut query);
        assert!(query.finish().is_ok());
        assert_eq!(filter.status, Some(EventStatus::Cancelled));
        assert_eq!(filter.search.as_deref(), Some("trail"));
        assert_eq!(filter.near.map(|n| n.radius_km), Some(10.0));

        let mut query = QueryParams::parse("lat=59.3&status=postponed").unwrap();
        filter_from_query(&mut query);
        let Err(ApiError::Validation(errors)) = query.finish() else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.into_iter().map(|e| e.field).collect();
        assert_eq!(fields, ["status", "radiusKm"]);
    }
}
