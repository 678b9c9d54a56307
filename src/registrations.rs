//! Signing up for events and recording how it went.

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::ApiError;
use crate::gpx;
use crate::models::{
    Event, EventRegistration, EventStatus, NewRegistration, Page, PageMeta, Registration,
    RegistrationResult, RegistrationStatus, User, UserRegistration,
};
use crate::store::Store;
use crate::validation::registration_status;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[garde(length(min = 1, max = 50))]
    pub distance: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResultRequest {
    #[garde(custom(registration_status))]
    pub status: String,
    #[garde(length(min = 1, max = 20))]
    pub bib_number: Option<String>,
    #[garde(range(min = 0))]
    pub finish_time_seconds: Option<i32>,
    #[garde(length(min = 1, max = 500))]
    pub activity_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedActivity {
    pub registration: Registration,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: i64,
    pub distance_meters: f64,
}

fn find_registration(store: &dyn Store, id: i64) -> Result<(Registration, Event), ApiError> {
    let registration = store
        .find_registration(id)?
        .ok_or_else(|| ApiError::not_found("Registration"))?;
    let event = store
        .find_event(registration.event_id)?
        .ok_or_else(|| ApiError::not_found("Event"))?;
    Ok((registration, event))
}

pub fn register(
    store: &dyn Store,
    runner: &User,
    event_id: i64,
    request: RegisterRequest,
) -> Result<Registration, ApiError> {
    let event = store
        .find_event(event_id)?
        .ok_or_else(|| ApiError::not_found("Event"))?;
    if event.status != EventStatus::Active {
        return Err(ApiError::bad_request("Event is not open for registration"));
    }

    let distance = request.distance.trim();
    if !event.distances.iter().any(|offered| offered == distance) {
        return Err(ApiError::field(
            "distance",
            &format!("must be one of: {}", event.distances.join(", ")),
        ));
    }
    if store.find_user_registration(runner.id, event_id)?.is_some() {
        return Err(ApiError::bad_request("Already registered for this event"));
    }
    if let Some(capacity) = event.capacity {
        if store.count_event_registrations(event_id)? >= i64::from(capacity) {
            return Err(ApiError::bad_request("Event is full"));
        }
    }

    let registration = store.create_registration(NewRegistration {
        user_id: runner.id,
        event_id,
        distance: distance.to_string(),
    })?;
    tracing::info!(
        registration_id = registration.id,
        event_id,
        user_id = runner.id,
        "runner registered"
    );
    Ok(registration)
}

pub fn user_registrations(
    store: &dyn Store,
    viewer: &User,
    user_id: i64,
    page: Page,
) -> Result<(Vec<UserRegistration>, PageMeta), ApiError> {
    if !auth::can_view_registrations_of(viewer, user_id) {
        return Err(ApiError::Forbidden);
    }
    if viewer.id != user_id && store.find_user(user_id)?.is_none() {
        return Err(ApiError::not_found("User"));
    }
    let (registrations, total) = store.list_user_registrations(user_id, page)?;
    Ok((registrations, PageMeta::new(page, total)))
}

pub fn event_registrations(
    store: &dyn Store,
    viewer: &User,
    event_id: i64,
) -> Result<Vec<EventRegistration>, ApiError> {
    let event = store
        .find_event(event_id)?
        .ok_or_else(|| ApiError::not_found("Event"))?;
    if !auth::can_manage_event(viewer, &event) {
        return Err(ApiError::Forbidden);
    }
    Ok(store.list_event_registrations(event_id)?)
}

pub fn record_result(
    store: &dyn Store,
    user: &User,
    registration_id: i64,
    request: ResultRequest,
) -> Result<Registration, ApiError> {
    let (_, event) = find_registration(store, registration_id)?;
    if !auth::can_manage_event(user, &event) {
        return Err(ApiError::Forbidden);
    }
    let status = request
        .status
        .parse::<RegistrationStatus>()
        .map_err(|_| ApiError::field("status", "must be one of: registered, completed, dns, dnf"))?;

    let result = RegistrationResult {
        status,
        bib_number: request.bib_number,
        finish_time_seconds: request.finish_time_seconds,
        activity_ref: request.activity_ref,
    };
    let updated = store
        .record_result(registration_id, &result)?
        .ok_or_else(|| ApiError::not_found("Registration"))?;
    tracing::info!(registration_id, status = %status, recorded_by = user.id, "result recorded");
    Ok(updated)
}

/// Completes a registration from a GPX recording. The runner, the event's
/// organizer and admins may upload.
pub fn import_activity(
    store: &dyn Store,
    user: &User,
    registration_id: i64,
    document: &[u8],
) -> Result<ImportedActivity, ApiError> {
    let (registration, event) = find_registration(store, registration_id)?;
    if registration.user_id != user.id && !auth::can_manage_event(user, &event) {
        return Err(ApiError::Forbidden);
    }

    let summary = gpx::summarize_gpx(document)
        .map_err(|err| ApiError::bad_request(format!("Unusable activity: {}", err)))?;
    let elapsed_seconds = summary.elapsed.num_seconds();
    let finish_time = i32::try_from(elapsed_seconds)
        .map_err(|_| ApiError::bad_request("Unusable activity: elapsed time too long"))?;

    let registration = store
        .record_result(
            registration_id,
            &RegistrationResult {
                status: RegistrationStatus::Completed,
                bib_number: None,
                finish_time_seconds: Some(finish_time),
                activity_ref: None,
            },
        )?
        .ok_or_else(|| ApiError::not_found("Registration"))?;
    tracing::info!(
        registration_id,
        elapsed_seconds,
        distance_m = summary.distance_m,
        "activity imported"
    );

    Ok(ImportedActivity {
        registration,
        started_at: summary.started_at,
        elapsed_seconds,
        distance_meters: summary.distance_m,
    })
}
