use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Participant,
    Organizer,
    Admin,
}

impl Role {
    /// Organizers and admins may create events.
    pub fn can_organize(self) -> bool {
        match self {
            Role::Participant => false,
            Role::Organizer | Role::Admin => true,
        }
    }

    pub fn is_admin(self) -> bool {
        match self {
            Role::Admin => true,
            Role::Participant | Role::Organizer => false,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventStatus {
    Active,
    Cancelled,
    Completed,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RegistrationStatus {
    Registered,
    Completed,
    /// Did not start.
    Dns,
    /// Did not finish.
    Dnf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub verified: bool,
    pub profile_image_url: Option<String>,
    pub bio: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            profile_image_url: self.profile_image_url.clone(),
        }
    }
}

/// A user together with the stored password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password_hash: String,
}

#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
}

/// The public face of a user attached to comments and result lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: i64,
    pub name: String,
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distances: Vec<String>,
    pub capacity: Option<i32>,
    pub entry_fee_cents: Option<i32>,
    pub website_url: Option<String>,
    pub status: EventStatus,
    pub organizer_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id,
            title: self.title.clone(),
            starts_at: self.starts_at,
            location_name: self.location_name.clone(),
            status: self.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub id: i64,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub location_name: Option<String>,
    pub status: EventStatus,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distances: Vec<String>,
    pub capacity: Option<i32>,
    pub entry_fee_cents: Option<i32>,
    pub website_url: Option<String>,
    pub organizer_id: i64,
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub location_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distances: Option<Vec<String>>,
    pub capacity: Option<i32>,
    pub entry_fee_cents: Option<i32>,
    pub website_url: Option<String>,
    pub status: Option<EventStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRadius {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub status: Option<EventStatus>,
    pub search: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub organizer_id: Option<i64>,
    pub near: Option<GeoRadius>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: i64,
    pub user_id: i64,
    pub event_id: i64,
    pub distance: String,
    pub status: RegistrationStatus,
    pub bib_number: Option<String>,
    pub finish_time_seconds: Option<i32>,
    pub activity_ref: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub user_id: i64,
    pub event_id: i64,
    pub distance: String,
}

/// Result fields written by organizers or by an activity import.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    pub status: RegistrationStatus,
    pub bib_number: Option<String>,
    pub finish_time_seconds: Option<i32>,
    pub activity_ref: Option<String>,
}

/// A registration as listed on a user's page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRegistration {
    #[serde(flatten)]
    pub registration: Registration,
    pub event: EventSummary,
}

/// A registration as listed on an event's start list / results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRegistration {
    #[serde(flatten)]
    pub registration: Registration,
    pub runner: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A comment joined with its author.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    #[serde(flatten)]
    pub comment: Comment,
    pub author: UserSummary,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub event_id: i64,
    pub user_id: i64,
    pub parent_id: Option<i64>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub color: String,
}

/// A requested page. `limit` is already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;

    /// Rows to skip. Saturates instead of overflowing on absurd pages.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page: 1,
            limit: Page::DEFAULT_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl PageMeta {
    pub fn new(page: Page, total: i64) -> Self {
        PageMeta {
            page: page.page,
            limit: page.limit,
            total,
            total_pages: (total + page.limit - 1) / page.limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_and_print_lowercase() {
        assert_eq!("organizer".parse::<Role>().unwrap(), Role::Organizer);
        assert_eq!(Role::Admin.to_string(), "admin");
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn role_predicates() {
        assert!(!Role::Participant.can_organize());
        assert!(Role::Organizer.can_organize());
        assert!(Role::Admin.can_organize());
        assert!(Role::Admin.is_admin());
        assert!(!Role::Organizer.is_admin());
    }

    #[test]
    fn page_meta_rounds_up() {
        let meta = PageMeta::new(Page { page: 2, limit: 20 }, 41);
        assert_eq!(meta.total_pages, 3);
        assert_eq!(PageMeta::new(Page::default(), 0).total_pages, 0);
        assert_eq!(Page { page: 3, limit: 10 }.offset(), 20);
        let huge = Page {
            page: i64::MAX,
            limit: 100,
        };
        assert_eq!(huge.offset(), i64::MAX);
    }
}
