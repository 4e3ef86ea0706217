//! Accounts: registration, sessions and profiles.

use uuid::Uuid;

use crate::auth::{self, TokenType};
use crate::config::AppConfig;
use crate::error::{AppError, FieldError};
use crate::models::{
    LoginRequest, NewUser, PublicUser, RegisterUserRequest, Role, SessionTokens,
    UpdateProfileRequest, UserResponse,
};
use crate::policy::Actor;
use crate::repository::{EMAIL_UNIQUE, Repository, StoreError, USERNAME_UNIQUE};

const MAX_USERNAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;

fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if !email.contains('@') {
        errors.push(FieldError::new("email", "Enter a valid email address."));
    }
}

/// validate_registration
///
/// Checks every field and returns the parsed role. All failures are reported
/// together.
pub fn validate_registration(req: &RegisterUserRequest) -> Result<Role, AppError> {
    let mut errors = Vec::new();

    let username = req.username.trim();
    if username.is_empty() {
        errors.push(FieldError::new("username", "This field may not be blank."));
    } else if username.chars().count() > MAX_USERNAME_LEN {
        errors.push(FieldError::new(
            "username",
            format!("Ensure this field has no more than {MAX_USERNAME_LEN} characters."),
        ));
    }
    check_email(&req.email, &mut errors);
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            "password",
            format!(
                "This password is too short. \
                 It must contain at least {MIN_PASSWORD_LEN} characters."
            ),
        ));
    }
    let role = match req.role.parse::<Role>() {
        Ok(role) => Some(role),
        Err(msg) => {
            errors.push(FieldError::new("role", msg));
            None
        }
    };

    match role {
        Some(role) if errors.is_empty() => Ok(role),
        _ => Err(AppError::Validation(errors)),
    }
}

/// Unique user columns are reported as field errors, not conflicts.
fn user_field_conflict(err: StoreError) -> AppError {
    if let StoreError::UniqueViolation { constraint } = &err {
        match constraint.as_str() {
            USERNAME_UNIQUE => {
                return AppError::validation(
                    "username",
                    "A user with that username already exists.",
                );
            }
            EMAIL_UNIQUE => {
                return AppError::validation("email", "A user with that email already exists.");
            }
            _ => {}
        }
    }
    AppError::from(err)
}

/// register
///
/// Creates the user with a hashed password and signs a first token pair.
pub async fn register(
    repo: &dyn Repository,
    config: &AppConfig,
    req: RegisterUserRequest,
) -> Result<SessionTokens, AppError> {
    let role = validate_registration(&req)?;
    let password_hash = auth::hash_password(&req.password)?;

    let user = repo
        .create_user(NewUser {
            username: req.username.trim().to_string(),
            email: req.email.trim().to_string(),
            password_hash,
            first_name: req.first_name,
            last_name: req.last_name,
            role,
        })
        .await
        .map_err(user_field_conflict)?;
    tracing::info!(user = %user.id, role = role.as_str(), "user registered");

    let (access, refresh) = auth::issue_pair(config, user.id)?;
    Ok(SessionTokens {
        access,
        refresh,
        user: Some(UserResponse::from(user)),
    })
}

/// authenticate
///
/// Username/password login. Unknown users and wrong passwords get the same
/// answer.
pub async fn authenticate(
    repo: &dyn Repository,
    config: &AppConfig,
    req: LoginRequest,
) -> Result<SessionTokens, AppError> {
    let rejected =
        || AppError::Auth("No active account found with the given credentials.".to_string());

    let user = repo
        .find_user_by_username(req.username.trim())
        .await?
        .ok_or_else(rejected)?;
    if !auth::verify_password(&user.password_hash, &req.password) {
        tracing::debug!(user = %user.id, "login rejected");
        return Err(rejected());
    }

    let (access, refresh) = auth::issue_pair(config, user.id)?;
    Ok(SessionTokens {
        access,
        refresh,
        user: Some(UserResponse::from(user)),
    })
}

/// refresh
///
/// Mints a new access token. The refresh token is handed back unchanged.
pub async fn refresh(
    repo: &dyn Repository,
    config: &AppConfig,
    refresh_token: &str,
) -> Result<SessionTokens, AppError> {
    let claims = auth::decode_token(config, refresh_token, TokenType::Refresh)?;
    if repo.is_token_revoked(claims.jti).await? {
        return Err(AppError::Auth("Token is blacklisted.".to_string()));
    }
    if repo.get_user(claims.sub).await?.is_none() {
        return Err(AppError::Auth("User not found.".to_string()));
    }

    Ok(SessionTokens {
        access: auth::issue_token(config, claims.sub, TokenType::Access)?,
        refresh: refresh_token.to_string(),
        user: None,
    })
}

/// revoke
///
/// Logout: blacklists the refresh token until it would have expired anyway.
pub async fn revoke(
    repo: &dyn Repository,
    config: &AppConfig,
    actor: &Actor,
    refresh_token: &str,
) -> Result<(), AppError> {
    let user_id = actor.authenticated()?;
    let claims = auth::decode_token(config, refresh_token, TokenType::Refresh)?;
    if claims.sub != user_id {
        return Err(AppError::Auth("Token does not belong to the current user.".to_string()));
    }

    repo.revoke_token(claims.jti, claims.expires_at()).await?;
    tracing::info!(user = %user_id, jti = %claims.jti, "refresh token revoked");
    Ok(())
}

pub async fn get_profile(repo: &dyn Repository, actor: &Actor) -> Result<UserResponse, AppError> {
    let id = actor.authenticated()?;
    let user = repo
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found."))?;
    Ok(UserResponse::from(user))
}

/// update_profile
///
/// Email, names and bio only; username and role are immutable.
pub async fn update_profile(
    repo: &dyn Repository,
    actor: &Actor,
    mut req: UpdateProfileRequest,
) -> Result<UserResponse, AppError> {
    let id = actor.authenticated()?;
    req.email = req.email.map(|email| email.trim().to_string());

    let mut errors = Vec::new();
    if let Some(email) = &req.email {
        check_email(email, &mut errors);
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let user = repo
        .update_user(id, req)
        .await
        .map_err(user_field_conflict)?
        .ok_or_else(|| AppError::not_found("User not found."))?;
    tracing::info!(user = %user.id, "profile updated");
    Ok(UserResponse::from(user))
}

pub async fn get_public_user(repo: &dyn Repository, id: Uuid) -> Result<PublicUser, AppError> {
    repo.get_user(id)
        .await?
        .map(PublicUser::from)
        .ok_or_else(|| AppError::not_found("User not found."))
}
