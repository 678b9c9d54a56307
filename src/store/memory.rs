//! In-process store for tests and local experiments.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{Store, StoreError, StoreResult};
use crate::events::within_radius;
use crate::models::{
    Comment, CommentRecord, Event, EventChanges, EventFilter, EventRegistration, EventStatus,
    NewComment, NewEvent, NewRegistration, NewUser, Page, Registration, RegistrationResult,
    RegistrationStatus, Tag, User, UserChanges, UserCredentials, UserRegistration,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: BTreeMap<i64, UserCredentials>,
    events: BTreeMap<i64, Event>,
    registrations: BTreeMap<i64, Registration>,
    comments: BTreeMap<i64, Comment>,
    tags: Vec<Tag>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn record(&self, comment: &Comment) -> StoreResult<CommentRecord> {
        let author = self
            .users
            .get(&comment.user_id)
            .ok_or_else(|| StoreError::Corrupt(format!("comment author {}", comment.user_id)))?;
        Ok(CommentRecord {
            comment: comment.clone(),
            author: author.user.summary(),
        })
    }
}

/// Ids are shared across tables and start at 1.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tags(tags: Vec<Tag>) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.lock() {
            tables.tags = tags;
        }
        store
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn matches(filter: &EventFilter, event: &Event) -> bool {
    if filter.status.map_or(false, |status| status != event.status) {
        return false;
    }
    if let Some(search) = &filter.search {
        if !event.title.to_lowercase().contains(&search.to_lowercase()) {
            return false;
        }
    }
    if filter.from.map_or(false, |from| event.starts_at < from) {
        return false;
    }
    if filter.to.map_or(false, |to| event.starts_at > to) {
        return false;
    }
    if filter
        .organizer_id
        .map_or(false, |organizer| organizer != event.organizer_id)
    {
        return false;
    }
    match filter.near {
        Some(near) => within_radius(event, near),
        None => true,
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(0);
    items.into_iter().skip(offset).take(limit).collect()
}

impl Store for MemoryStore {
    fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.lock()?;
        let taken = tables
            .users
            .values()
            .any(|existing| existing.user.email.eq_ignore_ascii_case(&user.email));
        if taken {
            return Err(StoreError::Conflict("Email already registered".into()));
        }

        let now = Utc::now();
        let id = tables.next_id();
        let created = User {
            id,
            email: user.email,
            name: user.name,
            role: user.role,
            verified: false,
            profile_image_url: None,
            bio: None,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(
            id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash,
            },
        );
        Ok(created)
    }

    fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).map(|c| c.user.clone()))
    }

    fn find_credentials(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|c| c.user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    fn update_user(&self, id: i64, changes: &UserChanges) -> StoreResult<Option<User>> {
        let mut tables = self.lock()?;
        let Some(credentials) = tables.users.get_mut(&id) else {
            return Ok(None);
        };
        let user = &mut credentials.user;
        if let Some(name) = &changes.name {
            user.name = name.clone();
        }
        if let Some(bio) = &changes.bio {
            user.bio = Some(bio.clone());
        }
        if let Some(url) = &changes.profile_image_url {
            user.profile_image_url = Some(url.clone());
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut tables = self.lock()?;
        let now = Utc::now();
        let id = tables.next_id();
        let created = Event {
            id,
            title: event.title,
            description: event.description,
            starts_at: event.starts_at,
            location_name: event.location_name,
            latitude: event.latitude,
            longitude: event.longitude,
            distances: event.distances,
            capacity: event.capacity,
            entry_fee_cents: event.entry_fee_cents,
            website_url: event.website_url,
            status: EventStatus::Active,
            organizer_id: event.organizer_id,
            created_at: now,
            updated_at: now,
        };
        tables.events.insert(id, created.clone());
        Ok(created)
    }

    fn find_event(&self, id: i64) -> StoreResult<Option<Event>> {
        Ok(self.lock()?.events.get(&id).cloned())
    }

    fn list_events(&self, filter: &EventFilter, page: Page) -> StoreResult<(Vec<Event>, i64)> {
        let tables = self.lock()?;
        let mut found: Vec<Event> = tables
            .events
            .values()
            .filter(|event| matches(filter, event))
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.starts_at, a.id).cmp(&(b.starts_at, b.id)));
        let total = found.len() as i64;
        Ok((paginate(found, page), total))
    }

    fn update_event(&self, id: i64, changes: &EventChanges) -> StoreResult<Option<Event>> {
        let mut tables = self.lock()?;
        let Some(event) = tables.events.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(title) = &changes.title {
            event.title = title.clone();
        }
        if let Some(description) = &changes.description {
            event.description = Some(description.clone());
        }
        if let Some(starts_at) = changes.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(location_name) = &changes.location_name {
            event.location_name = Some(location_name.clone());
        }
        if let Some(latitude) = changes.latitude {
            event.latitude = Some(latitude);
        }
        if let Some(longitude) = changes.longitude {
            event.longitude = Some(longitude);
        }
        if let Some(distances) = &changes.distances {
            event.distances = distances.clone();
        }
        if let Some(capacity) = changes.capacity {
            event.capacity = Some(capacity);
        }
        if let Some(fee) = changes.entry_fee_cents {
            event.entry_fee_cents = Some(fee);
        }
        if let Some(url) = &changes.website_url {
            event.website_url = Some(url.clone());
        }
        if let Some(status) = changes.status {
            event.status = status;
        }
        event.updated_at = Utc::now();
        Ok(Some(event.clone()))
    }

    fn delete_event(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        if tables.events.remove(&id).is_none() {
            return Ok(false);
        }
        tables.registrations.retain(|_, r| r.event_id != id);
        tables.comments.retain(|_, c| c.event_id != id);
        Ok(true)
    }

    fn create_registration(&self, registration: NewRegistration) -> StoreResult<Registration> {
        let mut tables = self.lock()?;
        let duplicate = tables
            .registrations
            .values()
            .any(|r| r.user_id == registration.user_id && r.event_id == registration.event_id);
        if duplicate {
            return Err(StoreError::Conflict(
                "Already registered for this event".into(),
            ));
        }

        let id = tables.next_id();
        let created = Registration {
            id,
            user_id: registration.user_id,
            event_id: registration.event_id,
            distance: registration.distance,
            status: RegistrationStatus::Registered,
            bib_number: None,
            finish_time_seconds: None,
            activity_ref: None,
            registered_at: Utc::now(),
            completed_at: None,
        };
        tables.registrations.insert(id, created.clone());
        Ok(created)
    }

    fn find_registration(&self, id: i64) -> StoreResult<Option<Registration>> {
        Ok(self.lock()?.registrations.get(&id).cloned())
    }

    fn find_user_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> StoreResult<Option<Registration>> {
        Ok(self
            .lock()?
            .registrations
            .values()
            .find(|r| r.user_id == user_id && r.event_id == event_id)
            .cloned())
    }

    fn count_event_registrations(&self, event_id: i64) -> StoreResult<i64> {
        Ok(self
            .lock()?
            .registrations
            .values()
            .filter(|r| r.event_id == event_id)
            .count() as i64)
    }

    fn list_user_registrations(
        &self,
        user_id: i64,
        page: Page,
    ) -> StoreResult<(Vec<UserRegistration>, i64)> {
        let tables = self.lock()?;
        let mut found = Vec::new();
        for registration in tables.registrations.values().filter(|r| r.user_id == user_id) {
            let event = tables.events.get(&registration.event_id).ok_or_else(|| {
                StoreError::Corrupt(format!("registration event {}", registration.event_id))
            })?;
            found.push(UserRegistration {
                registration: registration.clone(),
                event: event.summary(),
            });
        }
        found.sort_by(|a, b| {
            (b.event.starts_at, b.registration.id).cmp(&(a.event.starts_at, a.registration.id))
        });
        let total = found.len() as i64;
        Ok((paginate(found, page), total))
    }

    fn list_event_registrations(&self, event_id: i64) -> StoreResult<Vec<EventRegistration>> {
        let tables = self.lock()?;
        let mut found = Vec::new();
        for registration in tables.registrations.values().filter(|r| r.event_id == event_id) {
            let runner = tables.users.get(&registration.user_id).ok_or_else(|| {
                StoreError::Corrupt(format!("registration user {}", registration.user_id))
            })?;
            found.push(EventRegistration {
                registration: registration.clone(),
                runner: runner.user.summary(),
            });
        }
        found.sort_by_key(|entry| {
            let r = &entry.registration;
            (
                r.finish_time_seconds.is_none(),
                r.finish_time_seconds,
                r.registered_at,
                r.id,
            )
        });
        Ok(found)
    }

    fn record_result(
        &self,
        id: i64,
        result: &RegistrationResult,
    ) -> StoreResult<Option<Registration>> {
        let mut tables = self.lock()?;
        let Some(registration) = tables.registrations.get_mut(&id) else {
            return Ok(None);
        };
        registration.status = result.status;
        if let Some(bib) = &result.bib_number {
            registration.bib_number = Some(bib.clone());
        }
        if let Some(seconds) = result.finish_time_seconds {
            registration.finish_time_seconds = Some(seconds);
        }
        if let Some(activity) = &result.activity_ref {
            registration.activity_ref = Some(activity.clone());
        }
        registration.completed_at = match result.status {
            RegistrationStatus::Completed => {
                Some(registration.completed_at.unwrap_or_else(Utc::now))
            }
            RegistrationStatus::Registered | RegistrationStatus::Dns | RegistrationStatus::Dnf => {
                None
            }
        };
        Ok(Some(registration.clone()))
    }

    fn event_comments(&self, event_id: i64) -> StoreResult<Vec<CommentRecord>> {
        let tables = self.lock()?;
        tables
            .comments
            .values()
            .filter(|c| c.event_id == event_id)
            .map(|c| tables.record(c))
            .collect()
    }

    fn count_event_comments(&self, event_id: i64) -> StoreResult<i64> {
        Ok(self
            .lock()?
            .comments
            .values()
            .filter(|c| c.event_id == event_id)
            .count() as i64)
    }

    fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        Ok(self.lock()?.comments.get(&id).cloned())
    }

    fn insert_comment(&self, comment: NewComment) -> StoreResult<CommentRecord> {
        let mut tables = self.lock()?;
        if let Some(parent_id) = comment.parent_id {
            if !tables.comments.contains_key(&parent_id) {
                return Err(StoreError::Corrupt(format!("parent comment {}", parent_id)));
            }
        }
        let now = Utc::now();
        let id = tables.next_id();
        let created = Comment {
            id,
            event_id: comment.event_id,
            user_id: comment.user_id,
            parent_id: comment.parent_id,
            content: comment.content,
            created_at: now,
            updated_at: now,
        };
        let record = tables.record(&created)?;
        tables.comments.insert(id, created);
        Ok(record)
    }

    fn update_comment(&self, id: i64, content: &str) -> StoreResult<Option<CommentRecord>> {
        let mut tables = self.lock()?;
        let Some(comment) = tables.comments.get_mut(&id) else {
            return Ok(None);
        };
        comment.content = content.to_string();
        comment.updated_at = Utc::now();
        let updated = comment.clone();
        tables.record(&updated).map(Some)
    }

    fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock()?;
        if !tables.comments.contains_key(&id) {
            return Ok(false);
        }
        let mut doomed = HashSet::from([id]);
        loop {
            let before = doomed.len();
            for comment in tables.comments.values() {
                if comment.parent_id.map_or(false, |p| doomed.contains(&p)) {
                    doomed.insert(comment.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }
        tables.comments.retain(|comment_id, _| !doomed.contains(comment_id));
        Ok(true)
    }

    fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        let mut tags = self.lock()?.tags.clone();
        tags.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
        Ok(tags)
    }
}
