/*!
 * # Authentication
 *
 * Thin adapter over `jsonwebtoken` and `argon2`. Tokens are HS256 JWTs accepted
 * from `Authorization: Bearer` or the `auth_token` cookie. Every handler receives a
 * [`RequestContext`] carrying the session cart id and, when signed in, the
 * [`SessionUser`]; services take that context explicitly instead of reading
 * ambient request state.
 */

use crate::{
    entities::{UserModel, UserRole},
    errors::ServiceError,
    middleware_helpers::session::{read_cookie, SessionId, SESSION_COOKIE},
};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

pub const AUTH_COOKIE: &str = "auth_token";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // Subject (user ID)
    pub name: String, // User's name
    pub email: String,
    pub role: UserRole,
    pub jti: String, // JWT ID
    pub iat: i64,    // Issued at time
    pub exp: i64,    // Expiration time
    pub iss: String, // Issuer
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, jwt_issuer: String, token_expiration: Duration) -> Self {
        Self {
            jwt_secret,
            jwt_issuer,
            token_expiration,
        }
    }
}

impl From<&crate::config::AppConfig> for AuthConfig {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_issuer.clone(),
            Duration::from_secs(cfg.jwt_expiration as u64),
        )
    }
}

/// Issues and validates session tokens and password hashes.
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Issues a signed token for `user`.
    pub fn issue_token(&self, user: &UserModel) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.token_expiration)
                .map_err(|_| ServiceError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.jwt_issuer.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("Token creation failed: {}", e)))
    }

    /// Validates a token and returns its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ServiceError::Unauthorized("Session expired".to_string())
            }
            _ => ServiceError::Unauthorized("Invalid token".to_string()),
        })
    }

    /// `Set-Cookie` value carrying a freshly issued token.
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            AUTH_COOKIE,
            token,
            self.config.token_expiration.as_secs()
        )
    }

    /// `Set-Cookie` value that clears the auth token.
    pub fn clear_cookie(&self) -> String {
        format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", AUTH_COOKIE)
    }

    /// Resolves the signed-in user from request headers, if any.
    ///
    /// A missing or invalid token yields an anonymous session.
    pub fn session_user(&self, headers: &HeaderMap) -> Option<SessionUser> {
        let token = bearer_token(headers).or_else(|| read_cookie(headers, AUTH_COOKIE))?;

        match self.validate_token(&token) {
            Ok(claims) => match Uuid::parse_str(&claims.sub) {
                Ok(user_id) => Some(SessionUser {
                    user_id,
                    name: claims.name,
                    email: claims.email,
                    role: claims.role,
                }),
                Err(_) => None,
            },
            Err(e) => {
                debug!(error = %e, "ignoring unusable auth token");
                None
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Hashes a plain-text password with Argon2 and a random salt.
pub fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "password hashing failed");
            ServiceError::InternalError("Password hashing failed".to_string())
        })
}

/// Checks `password` against a stored Argon2 hash.
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!(error = %e, "stored password hash is malformed");
            false
        }
    }
}

/// The signed-in user as seen by services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

impl SessionUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Request-scoped identity passed into every service call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub session_id: Option<String>,
    pub user: Option<SessionUser>,
}

impl RequestContext {
    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            user: None,
        }
    }

    pub fn signed_in(session_id: impl Into<String>, user: SessionUser) -> Self {
        Self {
            session_id: Some(session_id.into()),
            user: Some(user),
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.user_id)
    }

    /// The signed-in user, or `Unauthorized`.
    pub fn require_user(&self) -> Result<&SessionUser, ServiceError> {
        self.user
            .as_ref()
            .ok_or_else(|| ServiceError::Unauthorized("User is not authenticated".to_string()))
    }

    /// The signed-in admin, or `Unauthorized` / `Forbidden`.
    pub fn require_admin(&self) -> Result<&SessionUser, ServiceError> {
        let user = self.require_user()?;
        if user.is_admin() {
            Ok(user)
        } else {
            Err(ServiceError::Forbidden("Admin access required".to_string()))
        }
    }

    /// The session cart id, required for any cart access.
    pub fn require_session(&self) -> Result<&str, ServiceError> {
        self.session_id
            .as_deref()
            .ok_or_else(|| ServiceError::InvalidOperation("Cart session not found".to_string()))
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
    Arc<AuthService>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthService>::from_ref(state);

        let session_id = parts
            .extensions
            .get::<SessionId>()
            .map(|s| s.0.clone())
            .or_else(|| read_cookie(&parts.headers, SESSION_COOKIE));

        Ok(RequestContext {
            session_id,
            user: auth.session_user(&parts.headers),
        })
    }
}
