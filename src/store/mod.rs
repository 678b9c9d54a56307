//! Persistence layer.
//!
//! Handlers only ever talk to the [`Store`] trait. [`PgStore`] is the
//! production implementation; [`MemoryStore`] keeps everything in process
//! and backs the test suite.

use thiserror::Error;

use crate::models::{
    Comment, CommentRecord, Event, EventChanges, EventFilter, EventRegistration, NewComment,
    NewEvent, NewRegistration, NewUser, Page, Registration, RegistrationResult, Tag, User,
    UserChanges, UserCredentials, UserRegistration,
};

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod pg;

#[cfg(any(test, feature = "test-utils"))]
pub use self::memory::MemoryStore;
pub use self::pg::{create_db_pool, PgStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),
    /// A unique constraint rejected the write. The message is client-safe.
    #[error("{0}")]
    Conflict(String),
    #[error("unexpected stored value {0:?}")]
    Corrupt(String),
    #[error("store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Synchronous access to the relational store. Callers run these on the
/// blocking pool.
pub trait Store: Send + Sync {
    fn create_user(&self, user: NewUser) -> StoreResult<User>;
    fn find_user(&self, id: i64) -> StoreResult<Option<User>>;
    fn find_credentials(&self, email: &str) -> StoreResult<Option<UserCredentials>>;
    fn update_user(&self, id: i64, changes: &UserChanges) -> StoreResult<Option<User>>;

    fn create_event(&self, event: NewEvent) -> StoreResult<Event>;
    fn find_event(&self, id: i64) -> StoreResult<Option<Event>>;
    /// One page of matching events ordered by start time, plus the total match count.
    fn list_events(&self, filter: &EventFilter, page: Page) -> StoreResult<(Vec<Event>, i64)>;
    fn update_event(&self, id: i64, changes: &EventChanges) -> StoreResult<Option<Event>>;
    fn delete_event(&self, id: i64) -> StoreResult<bool>;

    fn create_registration(&self, registration: NewRegistration) -> StoreResult<Registration>;
    fn find_registration(&self, id: i64) -> StoreResult<Option<Registration>>;
    fn find_user_registration(&self, user_id: i64, event_id: i64)
        -> StoreResult<Option<Registration>>;
    fn count_event_registrations(&self, event_id: i64) -> StoreResult<i64>;
    fn list_user_registrations(
        &self,
        user_id: i64,
        page: Page,
    ) -> StoreResult<(Vec<UserRegistration>, i64)>;
    /// Finishers first by time, then everyone else by registration time.
    fn list_event_registrations(&self, event_id: i64) -> StoreResult<Vec<EventRegistration>>;
    fn record_result(
        &self,
        id: i64,
        result: &RegistrationResult,
    ) -> StoreResult<Option<Registration>>;

    /// Every comment on the event with its author, in no particular order.
    fn event_comments(&self, event_id: i64) -> StoreResult<Vec<CommentRecord>>;
    fn count_event_comments(&self, event_id: i64) -> StoreResult<i64>;
    fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>>;
    fn insert_comment(&self, comment: NewComment) -> StoreResult<CommentRecord>;
    fn update_comment(&self, id: i64, content: &str) -> StoreResult<Option<CommentRecord>>;
    /// Removes the comment and all of its replies.
    fn delete_comment(&self, id: i64) -> StoreResult<bool>;

    fn list_tags(&self) -> StoreResult<Vec<Tag>>;
}
