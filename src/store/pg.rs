use std::str::FromStr;

use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

use super::{Store, StoreError, StoreResult};
use crate::models::{
    Comment, CommentRecord, Event, EventChanges, EventFilter, EventRegistration, EventSummary,
    NewComment, NewEvent, NewRegistration, NewUser, Page, Registration, RegistrationResult, Tag,
    User, UserChanges, UserCredentials, UserRegistration, UserSummary,
};

pub type DbPool = Pool<PostgresConnectionManager<NoTls>>;
type DbConnection = PooledConnection<PostgresConnectionManager<NoTls>>;

/// Tables, indexes and the reference tag set.
pub const SCHEMA: &str = include_str!("schema.sql");
pub const DROP_SCHEMA: &str =
    "DROP TABLE IF EXISTS comments, registrations, events, tags, users CASCADE";

const USER_COLUMNS: &str =
    "id, email, name, role, verified, profile_image_url, bio, created_at, updated_at";
const EVENT_COLUMNS: &str = "id, title, description, starts_at, location_name, latitude, \
     longitude, distances, capacity, entry_fee_cents, website_url, status, organizer_id, \
     created_at, updated_at";
const REGISTRATION_COLUMNS: &str = "r.id, r.user_id, r.event_id, r.distance, r.status, \
     r.bib_number, r.finish_time_seconds, r.activity_ref, r.registered_at, r.completed_at";
const COMMENT_COLUMNS: &str = "id, event_id, user_id, parent_id, content, created_at, updated_at";
const COMMENT_RECORD_COLUMNS: &str = "c.id, c.event_id, c.user_id, c.parent_id, c.content, \
     c.created_at, c.updated_at, u.name AS author_name, u.profile_image_url AS author_image";

/// Great-circle distance in kilometres between the event and ($lat, $lon).
const HAVERSINE_KM: &str = "6371.0 * 2 * asin(sqrt(\
     power(sin(radians(latitude - {lat}) / 2), 2) + \
     cos(radians({lat})) * cos(radians(latitude)) * \
     power(sin(radians(longitude - {lon}) / 2), 2)))";

pub fn create_db_pool(database_url: &str, max_size: u32) -> StoreResult<DbPool> {
    let config = database_url.parse::<postgres::Config>()?;
    let manager = PostgresConnectionManager::new(config, NoTls);
    Ok(Pool::builder().max_size(max_size).build(manager)?)
}

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        PgStore { pool }
    }

    fn conn(&self) -> StoreResult<DbConnection> {
        Ok(self.pool.get()?)
    }
}

fn unique_violation(err: postgres::Error, message: &str) -> StoreError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        StoreError::Conflict(message.to_string())
    } else {
        StoreError::Database(err)
    }
}

fn parse_enum<T: FromStr>(value: String) -> StoreResult<T> {
    value.parse().map_err(|_| StoreError::Corrupt(value))
}

fn user_from_row(row: &Row) -> StoreResult<User> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role: parse_enum(row.try_get("role")?)?,
        verified: row.try_get("verified")?,
        profile_image_url: row.try_get("profile_image_url")?,
        bio: row.try_get("bio")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &Row) -> StoreResult<Event> {
    Ok(Event {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        starts_at: row.try_get("starts_at")?,
        location_name: row.try_get("location_name")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        distances: row.try_get("distances")?,
        capacity: row.try_get("capacity")?,
        entry_fee_cents: row.try_get("entry_fee_cents")?,
        website_url: row.try_get("website_url")?,
        status: parse_enum(row.try_get("status")?)?,
        organizer_id: row.try_get("organizer_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn registration_from_row(row: &Row) -> StoreResult<Registration> {
    Ok(Registration {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        event_id: row.try_get("event_id")?,
        distance: row.try_get("distance")?,
        status: parse_enum(row.try_get("status")?)?,
        bib_number: row.try_get("bib_number")?,
        finish_time_seconds: row.try_get("finish_time_seconds")?,
        activity_ref: row.try_get("activity_ref")?,
        registered_at: row.try_get("registered_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn comment_from_row(row: &Row) -> StoreResult<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        parent_id: row.try_get("parent_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn comment_record_from_row(row: &Row) -> StoreResult<CommentRecord> {
    let comment = comment_from_row(row)?;
    Ok(CommentRecord {
        author: UserSummary {
            id: comment.user_id,
            name: row.try_get("author_name")?,
            profile_image_url: row.try_get("author_image")?,
        },
        comment,
    })
}

/// WHERE clause and parameters for an event filter. Placeholders are
/// numbered from `$1`.
fn event_filter_sql(filter: &EventFilter) -> (String, Vec<Box<dyn ToSql + Sync>>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql + Sync>> = Vec::new();

    if let Some(status) = filter.status {
        params.push(Box::new(status.to_string()));
        clauses.push(format!("status = ${}", params.len()));
    }
    if let Some(search) = &filter.search {
        let escaped = search
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        params.push(Box::new(format!("%{}%", escaped)));
        clauses.push(format!("title ILIKE ${}", params.len()));
    }
    if let Some(from) = filter.from {
        params.push(Box::new(from));
        clauses.push(format!("starts_at >= ${}", params.len()));
    }
    if let Some(to) = filter.to {
        params.push(Box::new(to));
        clauses.push(format!("starts_at <= ${}", params.len()));
    }
    if let Some(organizer_id) = filter.organizer_id {
        params.push(Box::new(organizer_id));
        clauses.push(format!("organizer_id = ${}", params.len()));
    }
    if let Some(near) = filter.near {
        params.push(Box::new(near.latitude));
        let lat = format!("${}", params.len());
        params.push(Box::new(near.longitude));
        let lon = format!("${}", params.len());
        params.push(Box::new(near.radius_km));
        let distance = HAVERSINE_KM.replace("{lat}", &lat).replace("{lon}", &lon);
        clauses.push(format!(
            "latitude IS NOT NULL AND longitude IS NOT NULL AND {} <= ${}",
            distance,
            params.len()
        ));
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    (sql, params)
}

impl Store for PgStore {
    fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut db = self.conn()?;
        let role = user.role.to_string();
        let row = db
            .query_one(
                format!(
                    "INSERT INTO users (email, name, role, password_hash) \
                     VALUES ($1, $2, $3, $4) RETURNING {}",
                    USER_COLUMNS
                )
                .as_str(),
                &[&user.email, &user.name, &role, &user.password_hash],
            )
            .map_err(|err| unique_violation(err, "Email already registered"))?;
        user_from_row(&row)
    }

    fn find_user(&self, id: i64) -> StoreResult<Option<User>> {
        let mut db = self.conn()?;
        db.query_opt(
            format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS).as_str(),
            &[&id],
        )?
        .map(|row| user_from_row(&row))
        .transpose()
    }

    fn find_credentials(&self, email: &str) -> StoreResult<Option<UserCredentials>> {
        let mut db = self.conn()?;
        let row = db.query_opt(
            format!(
                "SELECT {}, password_hash FROM users WHERE lower(email) = lower($1)",
                USER_COLUMNS
            )
            .as_str(),
            &[&email],
        )?;
        match row {
            Some(row) => Ok(Some(UserCredentials {
                user: user_from_row(&row)?,
                password_hash: row.try_get("password_hash")?,
            })),
            None => Ok(None),
        }
    }

    fn update_user(&self, id: i64, changes: &UserChanges) -> StoreResult<Option<User>> {
        let mut db = self.conn()?;
        db.query_opt(
            format!(
                "UPDATE users SET name = COALESCE($2, name), bio = COALESCE($3, bio), \
                 profile_image_url = COALESCE($4, profile_image_url), updated_at = now() \
                 WHERE id = $1 RETURNING {}",
                USER_COLUMNS
            )
            .as_str(),
            &[&id, &changes.name, &changes.bio, &changes.profile_image_url],
        )?
        .map(|row| user_from_row(&row))
        .transpose()
    }

    fn create_event(&self, event: NewEvent) -> StoreResult<Event> {
        let mut db = self.conn()?;
        let row = db.query_one(
            format!(
                "INSERT INTO events (title, description, starts_at, location_name, latitude, \
                 longitude, distances, capacity, entry_fee_cents, website_url, organizer_id) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
                EVENT_COLUMNS
            )
            .as_str(),
            &[
                &event.title,
                &event.description,
                &event.starts_at,
                &event.location_name,
                &event.latitude,
                &event.longitude,
                &event.distances,
                &event.capacity,
                &event.entry_fee_cents,
                &event.website_url,
                &event.organizer_id,
            ],
        )?;
        event_from_row(&row)
    }

    fn find_event(&self, id: i64) -> StoreResult<Option<Event>> {
        let mut db = self.conn()?;
        db.query_opt(
            format!("SELECT {} FROM events WHERE id = $1", EVENT_COLUMNS).as_str(),
            &[&id],
        )?
        .map(|row| event_from_row(&row))
        .transpose()
    }

    fn list_events(&self, filter: &EventFilter, page: Page) -> StoreResult<(Vec<Event>, i64)> {
        let mut db = self.conn()?;
        let (where_sql, mut params) = event_filter_sql(filter);

        let total: i64 = {
            let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| &**p).collect();
            db.query_one(
                format!("SELECT COUNT(*) FROM events {}", where_sql).as_str(),
                &refs,
            )?
            .try_get(0)?
        };

        params.push(Box::new(page.limit));
        let limit = params.len();
        params.push(Box::new(page.offset()));
        let offset = params.len();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| &**p).collect();
        let rows = db.query(
            format!(
                "SELECT {} FROM events {} ORDER BY starts_at ASC, id ASC LIMIT ${} OFFSET ${}",
                EVENT_COLUMNS, where_sql, limit, offset
            )
            .as_str(),
            &refs,
        )?;

        let events = rows
            .iter()
            .map(event_from_row)
            .collect::<StoreResult<Vec<_>>>()?;
        Ok((events, total))
    }

    fn update_event(&self, id: i64, changes: &EventChanges) -> StoreResult<Option<Event>> {
        let mut db = self.conn()?;
        let status = changes.status.map(|status| status.to_string());
        db.query_opt(
            format!(
                "UPDATE events SET \
                 title = COALESCE($2, title), \
                 description = COALESCE($3, description), \
                 starts_at = COALESCE($4, starts_at), \
                 location_name = COALESCE($5, location_name), \
                 latitude = COALESCE($6, latitude), \
                 longitude = COALESCE($7, longitude), \
                 distances = COALESCE($8, distances), \
                 capacity = COALESCE($9, capacity), \
                 entry_fee_cents = COALESCE($10, entry_fee_cents), \
                 website_url = COALESCE($11, website_url), \
                 status = COALESCE($12, status), \
                 updated_at = now() \
                 WHERE id = $1 RETURNING {}",
                EVENT_COLUMNS
            )
            .as_str(),
            &[
                &id,
                &changes.title,
                &changes.description,
                &changes.starts_at,
                &changes.location_name,
                &changes.latitude,
                &changes.longitude,
                &changes.distances,
                &changes.capacity,
                &changes.entry_fee_cents,
                &changes.website_url,
                &status,
            ],
        )?
        .map(|row| event_from_row(&row))
        .transpose()
    }

    fn delete_event(&self, id: i64) -> StoreResult<bool> {
        let mut db = self.conn()?;
        Ok(db.execute("DELETE FROM events WHERE id = $1", &[&id])? > 0)
    }

    fn create_registration(&self, registration: NewRegistration) -> StoreResult<Registration> {
        let mut db = self.conn()?;
        let row = db
            .query_one(
                format!(
                    "INSERT INTO registrations AS r (user_id, event_id, distance) \
                     VALUES ($1, $2, $3) RETURNING {}",
                    REGISTRATION_COLUMNS
                )
                .as_str(),
                &[
                    &registration.user_id,
                    &registration.event_id,
                    &registration.distance,
                ],
            )
            .map_err(|err| unique_violation(err, "Already registered for this event"))?;
        registration_from_row(&row)
    }

    fn find_registration(&self, id: i64) -> StoreResult<Option<Registration>> {
        let mut db = self.conn()?;
        db.query_opt(
            format!(
                "SELECT {} FROM registrations r WHERE r.id = $1",
                REGISTRATION_COLUMNS
            )
            .as_str(),
            &[&id],
        )?
        .map(|row| registration_from_row(&row))
        .transpose()
    }

    fn find_user_registration(
        &self,
        user_id: i64,
        event_id: i64,
    ) -> StoreResult<Option<Registration>> {
        let mut db = self.conn()?;
        db.query_opt(
            format!(
                "SELECT {} FROM registrations r WHERE r.user_id = $1 AND r.event_id = $2",
                REGISTRATION_COLUMNS
            )
            .as_str(),
            &[&user_id, &event_id],
        )?
        .map(|row| registration_from_row(&row))
        .transpose()
    }

    fn count_event_registrations(&self, event_id: i64) -> StoreResult<i64> {
        let mut db = self.conn()?;
        Ok(db
            .query_one(
                "SELECT COUNT(*) FROM registrations WHERE event_id = $1",
                &[&event_id],
            )?
            .try_get(0)?)
    }

    fn list_user_registrations(
        &self,
        user_id: i64,
        page: Page,
    ) -> StoreResult<(Vec<UserRegistration>, i64)> {
        let mut db = self.conn()?;
        let total: i64 = db
            .query_one(
                "SELECT COUNT(*) FROM registrations WHERE user_id = $1",
                &[&user_id],
            )?
            .try_get(0)?;

        let rows = db.query(
            format!(
                "SELECT {}, e.title AS event_title, e.starts_at AS event_starts_at, \
                 e.location_name AS event_location_name, e.status AS event_status \
                 FROM registrations r JOIN events e ON e.id = r.event_id \
                 WHERE r.user_id = $1 \
                 ORDER BY e.starts_at DESC, r.id DESC LIMIT $2 OFFSET $3",
                REGISTRATION_COLUMNS
            )
            .as_str(),
            &[&user_id, &page.limit, &page.offset()],
        )?;

        let mut registrations = Vec::with_capacity(rows.len());
        for row in &rows {
            let registration = registration_from_row(row)?;
            registrations.push(UserRegistration {
                event: EventSummary {
                    id: registration.event_id,
                    title: row.try_get("event_title")?,
                    starts_at: row.try_get("event_starts_at")?,
                    location_name: row.try_get("event_location_name")?,
                    status: parse_enum(row.try_get("event_status")?)?,
                },
                registration,
            });
        }
        Ok((registrations, total))
    }

    fn list_event_registrations(&self, event_id: i64) -> StoreResult<Vec<EventRegistration>> {
        let mut db = self.conn()?;
        let rows = db.query(
            format!(
                "SELECT {}, u.name AS runner_name, u.profile_image_url AS runner_image \
                 FROM registrations r JOIN users u ON u.id = r.user_id \
                 WHERE r.event_id = $1 \
                 ORDER BY r.finish_time_seconds ASC NULLS LAST, r.registered_at ASC, r.id ASC",
                REGISTRATION_COLUMNS
            )
            .as_str(),
            &[&event_id],
        )?;

        let mut registrations = Vec::with_capacity(rows.len());
        for row in &rows {
            let registration = registration_from_row(row)?;
            registrations.push(EventRegistration {
                runner: UserSummary {
                    id: registration.user_id,
                    name: row.try_get("runner_name")?,
                    profile_image_url: row.try_get("runner_image")?,
                },
                registration,
            });
        }
        Ok(registrations)
    }

    fn record_result(
        &self,
        id: i64,
        result: &RegistrationResult,
    ) -> StoreResult<Option<Registration>> {
        let mut db = self.conn()?;
        let status = result.status.to_string();
        db.query_opt(
            format!(
                "UPDATE registrations AS r SET \
                 status = $2, \
                 bib_number = COALESCE($3, bib_number), \
                 finish_time_seconds = COALESCE($4, finish_time_seconds), \
                 activity_ref = COALESCE($5, activity_ref), \
                 completed_at = CASE WHEN $2 = 'completed' \
                     THEN COALESCE(completed_at, now()) ELSE NULL END \
                 WHERE r.id = $1 RETURNING {}",
                REGISTRATION_COLUMNS
            )
            .as_str(),
            &[
                &id,
                &status,
                &result.bib_number,
                &result.finish_time_seconds,
                &result.activity_ref,
            ],
        )?
        .map(|row| registration_from_row(&row))
        .transpose()
    }

    fn event_comments(&self, event_id: i64) -> StoreResult<Vec<CommentRecord>> {
        let mut db = self.conn()?;
        let rows = db.query(
            format!(
                "SELECT {} FROM comments c JOIN users u ON u.id = c.user_id \
                 WHERE c.event_id = $1",
                COMMENT_RECORD_COLUMNS
            )
            .as_str(),
            &[&event_id],
        )?;
        rows.iter().map(comment_record_from_row).collect()
    }

    fn count_event_comments(&self, event_id: i64) -> StoreResult<i64> {
        let mut db = self.conn()?;
        Ok(db
            .query_one(
                "SELECT COUNT(*) FROM comments WHERE event_id = $1",
                &[&event_id],
            )?
            .try_get(0)?)
    }

    fn find_comment(&self, id: i64) -> StoreResult<Option<Comment>> {
        let mut db = self.conn()?;
        db.query_opt(
            format!("SELECT {} FROM comments WHERE id = $1", COMMENT_COLUMNS).as_str(),
            &[&id],
        )?
        .map(|row| comment_from_row(&row))
        .transpose()
    }

    fn insert_comment(&self, comment: NewComment) -> StoreResult<CommentRecord> {
        let mut db = self.conn()?;
        let row = db.query_one(
            format!(
                "WITH c AS (\
                     INSERT INTO comments (event_id, user_id, parent_id, content) \
                     VALUES ($1, $2, $3, $4) RETURNING *\
                 ) SELECT {} FROM c JOIN users u ON u.id = c.user_id",
                COMMENT_RECORD_COLUMNS
            )
            .as_str(),
            &[
                &comment.event_id,
                &comment.user_id,
                &comment.parent_id,
                &comment.content,
            ],
        )?;
        comment_record_from_row(&row)
    }

    fn update_comment(&self, id: i64, content: &str) -> StoreResult<Option<CommentRecord>> {
        let mut db = self.conn()?;
        db.query_opt(
            format!(
                "WITH c AS (\
                     UPDATE comments SET content = $2, updated_at = now() \
                     WHERE id = $1 RETURNING *\
                 ) SELECT {} FROM c JOIN users u ON u.id = c.user_id",
                COMMENT_RECORD_COLUMNS
            )
            .as_str(),
            &[&id, &content],
        )?
        .map(|row| comment_record_from_row(&row))
        .transpose()
    }

    fn delete_comment(&self, id: i64) -> StoreResult<bool> {
        let mut db = self.conn()?;
        Ok(db.execute("DELETE FROM comments WHERE id = $1", &[&id])? > 0)
    }

    fn list_tags(&self) -> StoreResult<Vec<Tag>> {
        let mut db = self.conn()?;
        let rows = db.query(
            "SELECT id, name, category, color FROM tags ORDER BY category ASC, name ASC",
            &[],
        )?;
        rows.iter()
            .map(|row| {
                Ok(Tag {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    category: row.try_get("category")?,
                    color: row.try_get("color")?,
                })
            })
            .collect()
    }
}
