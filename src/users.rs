//! Accounts: sign-up, log-in and profiles.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::auth::{self, Authenticator};
use crate::error::ApiError;
use crate::models::{NewUser, Role, User, UserChanges};
use crate::store::Store;
use crate::validation::{not_blank, signup_role};

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[garde(email, length(max = 255))]
    pub email: String,
    #[garde(length(min = 8, max = 128))]
    pub password: String,
    #[garde(length(min = 1, max = 100), custom(not_blank))]
    pub name: String,
    #[garde(custom(signup_role))]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[garde(length(min = 1, max = 255))]
    pub email: String,
    #[garde(length(min = 1, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    #[garde(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[garde(length(max = 1000))]
    pub bio: Option<String>,
    #[garde(url, length(max = 500))]
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// What anyone may see of a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: i64,
    pub name: String,
    pub role: Role,
    pub bio: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for PublicProfile {
    fn from(user: User) -> Self {
        PublicProfile {
            id: user.id,
            name: user.name,
            role: user.role,
            bio: user.bio,
            profile_image_url: user.profile_image_url,
            created_at: user.created_at,
        }
    }
}

pub fn sign_up(
    store: &dyn Store,
    authenticator: &Authenticator,
    request: SignUpRequest,
) -> Result<AuthResponse, ApiError> {
    let role = match request.role.as_deref() {
        Some(raw) => Role::from_str(raw)
            .map_err(|_| ApiError::field("role", "must be one of: participant, organizer"))?,
        None => Role::Participant,
    };
    let user = store.create_user(NewUser {
        email: request.email.trim().to_lowercase(),
        name: request.name.trim().to_string(),
        role,
        password_hash: auth::hash_password(&request.password)?,
    })?;
    tracing::info!(user_id = user.id, role = %user.role, "user signed up");

    let token = authenticator.issue(&user)?;
    Ok(AuthResponse { user, token })
}

pub fn log_in(
    store: &dyn Store,
    authenticator: &Authenticator,
    request: LoginRequest,
) -> Result<AuthResponse, ApiError> {
    let credentials = store
        .find_credentials(request.email.trim())?
        .ok_or(ApiError::InvalidCredentials)?;
    if !auth::verify_password(&request.password, &credentials.password_hash) {
        tracing::info!(user_id = credentials.user.id, "failed login");
        return Err(ApiError::InvalidCredentials);
    }

    let user = credentials.user;
    let token = authenticator.issue(&user)?;
    tracing::info!(user_id = user.id, "user logged in");
    Ok(AuthResponse { user, token })
}

pub fn profile(store: &dyn Store, id: i64) -> Result<PublicProfile, ApiError> {
    store
        .find_user(id)?
        .map(PublicProfile::from)
        .ok_or_else(|| ApiError::not_found("User"))
}

pub fn update_profile(
    store: &dyn Store,
    user: &User,
    id: i64,
    request: ProfileRequest,
) -> Result<User, ApiError> {
    if user.id != id {
        return Err(ApiError::Forbidden);
    }
    let changes = UserChanges {
        name: request.name.map(|name| name.trim().to_string()),
        bio: request.bio,
        profile_image_url: request.profile_image_url,
    };
    store
        .update_user(id, &changes)?
        .ok_or_else(|| ApiError::not_found("User"))
}
