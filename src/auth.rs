//! Bearer tokens, password hashing and authorization predicates.

use actix_web::http::header::{self, HeaderMap};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::error::ApiError;
use crate::models::{Comment, Event, Role, User};
use crate::store::Store;

/// Argon2id memory cost in KiB.
pub const PASSWORD_MEMORY_KIB: u32 = 19_456;
pub const PASSWORD_ITERATIONS: u32 = 2;
pub const PASSWORD_LANES: u32 = 1;

/// Token payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        // Expiry is exact: no grace period after `exp`.
        let mut validation = Validation::default();
        validation.leeway = 0;
        Authenticator {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl: config.token_ttl,
        }
    }

    pub fn issue(&self, user: &User) -> Result<String, ApiError> {
        let now = Utc::now();
        self.sign(&Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        })
    }

    pub fn sign(&self, claims: &Claims) -> Result<String, ApiError> {
        encode(&Header::default(), claims, &self.encoding).map_err(ApiError::internal)
    }

    /// Claims of a valid, unexpired bearer token, or `None`.
    pub fn resolve_identity(&self, headers: &HeaderMap) -> Option<Claims> {
        let token = bearer_token(headers)?;
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(err) => {
                tracing::debug!(error = %err, "rejected bearer token");
                None
            }
        }
    }

    /// Loads the user behind the bearer token. The stored user is
    /// authoritative, so a role change takes effect before the token expires.
    pub fn require_authenticated(
        &self,
        store: &dyn Store,
        headers: &HeaderMap,
    ) -> Result<User, ApiError> {
        let claims = self
            .resolve_identity(headers)
            .ok_or(ApiError::Unauthenticated)?;
        store
            .find_user(claims.sub)?
            .ok_or(ApiError::Unauthenticated)
    }

    /// `allowed` is a role predicate such as [`Role::can_organize`].
    pub fn require_role<F>(
        &self,
        store: &dyn Store,
        headers: &HeaderMap,
        allowed: F,
    ) -> Result<User, ApiError>
    where
        F: Fn(Role) -> bool,
    {
        let user = self.require_authenticated(store, headers)?;
        if allowed(user.role) {
            Ok(user)
        } else {
            tracing::info!(user_id = user.id, role = %user.role, "role not permitted");
            Err(ApiError::Forbidden)
        }
    }
}

/// Token from `Authorization: Bearer <token>`, scheme matched case-insensitively.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

fn hasher() -> Result<Argon2<'static>, ApiError> {
    let params = Params::new(
        PASSWORD_MEMORY_KIB,
        PASSWORD_ITERATIONS,
        PASSWORD_LANES,
        None,
    )
    .map_err(ApiError::internal)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// PHC-formatted Argon2id hash with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(ApiError::internal)?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        tracing::warn!("stored password hash is not a valid PHC string");
        return false;
    };
    match hasher() {
        Ok(argon2) => argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
        Err(_) => false,
    }
}

// Ownership rules.

pub fn can_manage_event(user: &User, event: &Event) -> bool {
    user.role.is_admin() || (user.role.can_organize() && event.organizer_id == user.id)
}

/// A user's registrations are visible to that user and to admins.
pub fn can_view_registrations_of(user: &User, owner_id: i64) -> bool {
    user.role.is_admin() || user.id == owner_id
}

pub fn can_edit_comment(user: &User, comment: &Comment) -> bool {
    comment.user_id == user.id
}

pub fn can_delete_comment(user: &User, comment: &Comment) -> bool {
    user.role.is_admin() || comment.user_id == user.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::store::MemoryStore;
    use actix_web::http::header::HeaderValue;

    const SECRET: &str = "test-secret-test-secret-test-secret!";

    fn authenticator() -> Authenticator {
        Authenticator::new(&AuthConfig::new(SECRET, Duration::days(7)).unwrap())
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn seeded(role: Role) -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let user = store
            .create_user(NewUser {
                email: "kim@example.com".into(),
                name: "Kim".into(),
                role,
                password_hash: "unused".into(),
            })
            .unwrap();
        (store, user)
    }

    #[test]
    fn issued_tokens_resolve() {
        let auth = authenticator();
        let (_, user) = seeded(Role::Organizer);
        let token = auth.issue(&user).unwrap();

        let claims = auth.resolve_identity(&headers(&format!("Bearer {}", token))).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.role, Role::Organizer);
        assert_eq!(claims.exp - claims.iat, Duration::days(7).num_seconds());
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let auth = authenticator();
        let (_, user) = seeded(Role::Participant);
        let token = auth.issue(&user).unwrap();
        assert!(auth.resolve_identity(&headers(&format!("bEaReR {}", token))).is_some());
        assert!(auth.resolve_identity(&headers(&format!("Token {}", token))).is_none());
        assert!(auth.resolve_identity(&headers("Bearer ")).is_none());
        assert!(auth.resolve_identity(&HeaderMap::new()).is_none());
    }

    #[test]
    fn expired_tokens_are_unauthenticated() {
        let auth = authenticator();
        let (store, user) = seeded(Role::Participant);
        let issued = Utc::now() - Duration::days(8);
        let token = auth
            .sign(&Claims {
                sub: user.id,
                email: user.email.clone(),
                role: user.role,
                iat: issued.timestamp(),
                exp: (issued + Duration::days(7)).timestamp(),
            })
            .unwrap();

        let headers = headers(&format!("Bearer {}", token));
        assert!(auth.resolve_identity(&headers).is_none());
        assert!(matches!(
            auth.require_authenticated(&store, &headers),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn tokens_expire_without_grace_period() {
        let auth = authenticator();
        let (store, user) = seeded(Role::Participant);
        let now = Utc::now();
        let token = auth
            .sign(&Claims {
                sub: user.id,
                email: user.email.clone(),
                role: user.role,
                iat: (now - Duration::hours(1)).timestamp(),
                exp: (now - Duration::seconds(30)).timestamp(),
            })
            .unwrap();

        let headers = headers(&format!("Bearer {}", token));
        assert!(auth.resolve_identity(&headers).is_none());
        assert!(matches!(
            auth.require_authenticated(&store, &headers),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let (_, user) = seeded(Role::Participant);
        let other = Authenticator::new(
            &AuthConfig::new("another-secret-another-secret-12345", Duration::days(7)).unwrap(),
        );
        let token = other.issue(&user).unwrap();
        assert!(authenticator()
            .resolve_identity(&headers(&format!("Bearer {}", token)))
            .is_none());
    }

    #[test]
    fn deleted_users_are_unauthenticated() {
        let auth = authenticator();
        let (_, user) = seeded(Role::Participant);
        let token = auth.issue(&user).unwrap();
        let empty = MemoryStore::new();
        assert!(matches!(
            auth.require_authenticated(&empty, &headers(&format!("Bearer {}", token))),
            Err(ApiError::Unauthenticated)
        ));
    }

    #[test]
    fn require_role_checks_membership() {
        let auth = authenticator();
        let (store, user) = seeded(Role::Participant);
        let admin = store
            .create_user(NewUser {
                email: "admin@example.com".into(),
                name: "Admin".into(),
                role: Role::Admin,
                password_hash: "unused".into(),
            })
            .unwrap();
        let participant = headers(&format!("Bearer {}", auth.issue(&user).unwrap()));
        let administrator = headers(&format!("Bearer {}", auth.issue(&admin).unwrap()));

        assert!(matches!(
            auth.require_role(&store, &participant, Role::can_organize),
            Err(ApiError::Forbidden)
        ));
        assert!(auth
            .require_role(&store, &participant, |role| role == Role::Participant)
            .is_ok());
        assert!(auth.require_role(&store, &administrator, Role::can_organize).is_ok());
        assert!(auth.require_role(&store, &administrator, Role::is_admin).is_ok());
    }

    #[test]
    fn password_hashes_verify() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong horse battery", &hash));
        assert!(!verify_password("anything", "not-a-hash"));
    }

    #[test]
    fn registrations_visibility() {
        let (_, mut user) = seeded(Role::Participant);
        assert!(can_view_registrations_of(&user, user.id));
        assert!(!can_view_registrations_of(&user, user.id + 1));
        user.role = Role::Admin;
        assert!(can_view_registrations_of(&user, user.id + 1));
    }
}
