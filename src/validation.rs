//! Request schema checking.
//!
//! Bodies are deserialized with `serde_json` and checked with their `garde`
//! rules; query strings go through [`QueryParams`], which coerces text into
//! typed values. Either way every failing field is reported at once.

use std::collections::HashMap;
use std::str::FromStr;

use actix_web::web;
use chrono::{DateTime, Utc};
use garde::{Report, Validate};
use serde::de::DeserializeOwned;

use crate::error::{ApiError, FieldError};
use crate::models::{EventStatus, Page, RegistrationStatus, Role};

/// Parses a JSON body and validates it. Malformed JSON is a bad request,
/// rule violations are a validation error.
pub fn parse_json<T>(body: &[u8]) -> Result<T, ApiError>
where
    T: DeserializeOwned + Validate,
    T::Context: Default,
{
    let value: T = serde_json::from_slice(body)
        .map_err(|err| ApiError::bad_request(format!("Invalid JSON: {}", err)))?;
    validate(value)
}

pub fn validate<T>(value: T) -> Result<T, ApiError>
where
    T: Validate,
    T::Context: Default,
{
    match value.validate() {
        Ok(()) => Ok(value),
        Err(report) => Err(ApiError::Validation(field_errors(&report))),
    }
}

fn field_errors(report: &Report) -> Vec<FieldError> {
    report
        .iter()
        .map(|(path, error)| FieldError::new(camel_case(&path.to_string()), error.to_string()))
        .collect()
}

/// `parent_id` -> `parentId`, matching the JSON field names.
fn camel_case(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut upper = false;
    for ch in path.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Path ids are positive integers.
pub fn parse_id(field: &str, raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::field(field, "must be a positive integer")),
    }
}

pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

// Custom garde rules.

pub fn rfc3339(value: &str, _ctx: &()) -> garde::Result {
    match parse_rfc3339(value) {
        Some(_) => Ok(()),
        None => Err(garde::Error::new("must be an RFC 3339 date-time")),
    }
}

pub fn optional_rfc3339(value: &Option<String>, ctx: &()) -> garde::Result {
    match value {
        Some(value) => rfc3339(value, ctx),
        None => Ok(()),
    }
}

pub fn not_blank(value: &str, _ctx: &()) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be blank"));
    }
    Ok(())
}

pub fn optional_not_blank(value: &Option<String>, ctx: &()) -> garde::Result {
    match value {
        Some(value) => not_blank(value, ctx),
        None => Ok(()),
    }
}

fn member_of<T: FromStr>(value: &str, allowed: &str) -> garde::Result {
    match value.parse::<T>() {
        Ok(_) => Ok(()),
        Err(_) => Err(garde::Error::new(format!("must be one of: {}", allowed))),
    }
}

pub fn optional_event_status(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value {
        Some(value) => member_of::<EventStatus>(value, "active, cancelled, completed"),
        None => Ok(()),
    }
}

pub fn registration_status(value: &str, _ctx: &()) -> garde::Result {
    member_of::<RegistrationStatus>(value, "registered, completed, dns, dnf")
}

/// Roles a user may pick for themselves at sign-up.
pub fn signup_role(value: &Option<String>, _ctx: &()) -> garde::Result {
    match value.as_deref().map(Role::from_str) {
        None | Some(Ok(Role::Participant)) | Some(Ok(Role::Organizer)) => Ok(()),
        Some(Ok(Role::Admin)) | Some(Err(_)) => {
            Err(garde::Error::new("must be one of: participant, organizer"))
        }
    }
}

/// Flat view of a query string with typed accessors. Coercion failures
/// accumulate and surface together from [`QueryParams::finish`].
#[derive(Debug, Default)]
pub struct QueryParams {
    values: HashMap<String, String>,
    errors: Vec<FieldError>,
}

impl QueryParams {
    pub fn parse(query: &str) -> Result<Self, ApiError> {
        let values = web::Query::<HashMap<String, String>>::from_query(query)
            .map_err(|err| ApiError::bad_request(format!("Invalid query string: {}", err)))?
            .into_inner();
        Ok(QueryParams {
            values,
            errors: Vec::new(),
        })
    }

    /// Trimmed value; empty strings count as absent.
    pub fn text(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    pub fn reject(&mut self, key: &str, message: &str) {
        self.errors.push(FieldError::new(key, message));
    }

    fn coerce<T: FromStr>(&mut self, key: &str, message: &str) -> Option<T> {
        let raw = self.text(key)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                self.reject(key, message);
                None
            }
        }
    }

    pub fn integer(&mut self, key: &str) -> Option<i64> {
        self.coerce(key, "must be an integer")
    }

    pub fn float(&mut self, key: &str) -> Option<f64> {
        let value: f64 = self.coerce(key, "must be a number")?;
        if value.is_finite() {
            Some(value)
        } else {
            self.reject(key, "must be a number");
            None
        }
    }

    pub fn datetime(&mut self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.text(key)?;
        let parsed = parse_rfc3339(&raw);
        if parsed.is_none() {
            self.reject(key, "must be an RFC 3339 date-time");
        }
        parsed
    }

    pub fn member<T: FromStr>(&mut self, key: &str, allowed: &str) -> Option<T> {
        self.coerce(key, &format!("must be one of: {}", allowed))
    }

    /// `page` must be at least 1 and address a representable offset;
    /// `limit` must be at least 1 and is capped at [`Page::MAX_LIMIT`].
    pub fn pagination(&mut self) -> Page {
        let page = self.integer("page").unwrap_or(1);
        let limit = self.integer("limit").unwrap_or(Page::DEFAULT_LIMIT);
        let clamped = limit.clamp(1, Page::MAX_LIMIT);
        if page < 1 {
            self.reject("page", "must be greater than or equal to 1");
        } else if (page - 1).checked_mul(clamped).is_none() {
            self.reject("page", "is too large");
        }
        if limit < 1 {
            self.reject("limit", "must be greater than or equal to 1");
        }
        Page {
            page: page.max(1),
            limit: clamped,
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}
