use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::Role,
    policy::Actor,
    repository::RepositoryState,
};

const DEV_USER_HEADER: &str = "x-user-id";

/// TokenType
///
/// Access tokens authenticate requests; refresh tokens only mint new access
/// tokens. Each is rejected where the other is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims
///
/// Payload of every token this server signs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    /// Token id. Logout blacklists the refresh token's `jti`.
    pub jti: Uuid,
    pub token_type: TokenType,
}

impl Claims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp as i64, 0).unwrap_or_else(Utc::now)
    }
}

// --- Tokens ---

/// issue_token
///
/// Signs a token of the given type for `user_id` with HS256.
pub fn issue_token(
    config: &AppConfig,
    user_id: Uuid,
    token_type: TokenType,
) -> Result<String, AppError> {
    let now = Utc::now();
    let ttl = match token_type {
        TokenType::Access => config.access_token_ttl_minutes,
        TokenType::Refresh => config.refresh_token_ttl_minutes,
    };
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp() as usize,
        exp: (now + Duration::minutes(ttl)).timestamp() as usize,
        jti: Uuid::new_v4(),
        token_type,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
}

/// Fresh access/refresh pair for a user.
pub fn issue_pair(config: &AppConfig, user_id: Uuid) -> Result<(String, String), AppError> {
    Ok((
        issue_token(config, user_id, TokenType::Access)?,
        issue_token(config, user_id, TokenType::Refresh)?,
    ))
}

/// decode_token
///
/// Verifies signature and expiry, then checks the token is of the `expected`
/// type. Every failure is an `Auth` error; callers that need `Unauthenticated`
/// remap it.
pub fn decode_token(
    config: &AppConfig,
    token: &str,
    expected: TokenType,
) -> Result<Claims, AppError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AppError::Auth("Token has expired.".to_string()),
        _ => AppError::Auth("Token is invalid.".to_string()),
    })?;

    if data.claims.token_type != expected {
        return Err(AppError::Auth("Token has the wrong type.".to_string()));
    }
    Ok(data.claims)
}

// --- Passwords ---

/// Argon2id hash in PHC string format with a random salt.
pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// --- Extractors ---

/// AuthUser
///
/// The resolved identity of an authenticated request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// The capability-carrying actor for this identity.
    pub fn actor(&self) -> Actor {
        Actor::from_identity(self.id, self.role)
    }
}

fn has_credentials(headers: &HeaderMap, env: &Env) -> bool {
    headers.contains_key(header::AUTHORIZATION)
        || (*env == Env::Local && headers.contains_key(DEV_USER_HEADER))
}

fn invalid_token() -> AppError {
    AppError::Unauthenticated("Given token not valid for any token type.".to_string())
}

/// AuthUser Extractor Implementation
///
/// 1. Local bypass: in `Env::Local` an `x-user-id` header naming an existing
///    user authenticates the request.
/// 2. Bearer extraction and access-token validation.
/// 3. User lookup, so tokens of deleted users stop working and the role is
///    always the stored one.
///
/// Rejection: `AppError::Unauthenticated` (401).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let bypass = parts
                .headers
                .get(DEV_USER_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok());
            if let Some(user_id) = bypass {
                if let Some(user) = repo.get_user(user_id).await? {
                    return Ok(AuthUser {
                        id: user.id,
                        role: user.role,
                    });
                }
            }
        }

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(AppError::unauthenticated)?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(invalid_token)?;

        let claims = decode_token(&config, token, TokenType::Access).map_err(|e| {
            tracing::debug!("rejected access token: {}", e);
            invalid_token()
        })?;

        let user = repo
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthenticated("User not found.".to_string()))?;

        Ok(AuthUser {
            id: user.id,
            role: user.role,
        })
    }
}

/// CurrentActor
///
/// Actor for routes that also serve anonymous callers. No credentials means
/// `Actor::Anonymous`; credentials that are present but invalid are still
/// rejected with 401.
#[derive(Debug, Clone, Copy)]
pub struct CurrentActor(pub Actor);

impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AppConfig::from_ref(state);
        if !has_credentials(&parts.headers, &config.env) {
            return Ok(CurrentActor(Actor::Anonymous));
        }
        let user = AuthUser::from_request_parts(parts, state).await?;
        Ok(CurrentActor(user.actor()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "wrong horse"));
        assert!(!verify_password("not-a-phc-string", "correct horse"));
    }

    #[test]
    fn token_types_are_not_interchangeable() {
        let config = AppConfig::default();
        let user = Uuid::new_v4();
        let (access, refresh) = issue_pair(&config, user).unwrap();

        let claims = decode_token(&config, &access, TokenType::Access).unwrap();
        assert_eq!(claims.sub, user);
        assert!(decode_token(&config, &access, TokenType::Refresh).is_err());
        assert!(decode_token(&config, &refresh, TokenType::Refresh).is_ok());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let config = AppConfig::default();
        let other = AppConfig {
            jwt_secret: "another-secret".to_string(),
            ..AppConfig::default()
        };
        let token = issue_token(&other, Uuid::new_v4(), TokenType::Access).unwrap();
        assert!(matches!(
            decode_token(&config, &token, TokenType::Access),
            Err(AppError::Auth(_))
        ));
    }
}
