//! Registration and password verification.
//!
//! Registration validates everything it can before rejecting a request, so a
//! client sees every problem with its input in a single response.

use actix_web::web;
use tracing::{info, warn};
use uuid::Uuid;
use validator::ValidateEmail;

use crate::auth::{Identity, TokenService};
use crate::error::ApiError;
use crate::models::{NewUser, UserRecord};
use crate::repo::{Repo, RepoError};

pub const BCRYPT_COST: u32 = 10;
pub const MIN_PASSWORD_LEN: usize = 5;
/// bcrypt only looks at this many bytes; anything after them is ignored.
pub const MAX_PASSWORD_BYTES: usize = 72;

pub const REGISTERED: &str = "User registered successfully";

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.trim().is_empty())
}

/// Violations in reporting order. Uniqueness flags come from the caller
/// because they need a storage round trip.
pub fn collect_violations(new: &NewUser, email_taken: bool, username_taken: bool) -> Vec<&'static str> {
    let mut out = Vec::new();
    if email_taken { out.push("Email already registered."); }
    if username_taken { out.push("Username already taken."); }
    if present(&new.username).is_none() { out.push("Username is required."); }
    if present(&new.email).is_none() { out.push("Email is required."); }
    match present(&new.password) {
        None => out.push("Password is required."),
        Some(p) if p.chars().count() < MIN_PASSWORD_LEN => out.push("Password must be at least 5 characters."),
        Some(p) if p.len() > MAX_PASSWORD_BYTES => out.push("Password must be at most 72 bytes."),
        Some(_) => {}
    }
    if let Some(email) = present(&new.email) {
        if !email.to_string().validate_email() { out.push("Invalid email format."); }
    }
    out
}

pub async fn hash_password(password: String) -> Result<String, ApiError> {
    web::block(move || bcrypt::hash(password, BCRYPT_COST))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            tracing::error!(error = %e, "password hashing failed");
            ApiError::Internal
        })
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, ApiError> {
    web::block(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|_| ApiError::Internal)?
        .map_err(|e| {
            tracing::error!(error = %e, "stored password hash unreadable");
            ApiError::Internal
        })
}

/// Usernames and emails are stored trimmed, emails lowercased, so
/// uniqueness holds across whitespace and case variants.
pub fn normalize(new: NewUser) -> NewUser {
    NewUser {
        username: new.username.map(|u| u.trim().to_string()),
        email: new.email.map(|e| e.trim().to_lowercase()),
        ..new
    }
}

/// `createUser`. Returns the success message on persistence.
pub async fn register(repo: &dyn Repo, new: NewUser) -> Result<String, ApiError> {
    let new = normalize(new);
    let email_taken = match present(&new.email) {
        Some(e) => repo.email_exists(e).await?,
        None => false,
    };
    let username_taken = match present(&new.username) {
        Some(u) => repo.username_exists(u).await?,
        None => false,
    };
    let violations = collect_violations(&new, email_taken, username_taken);
    if !violations.is_empty() {
        return Err(ApiError::Validation(violations.join(" ")));
    }

    let NewUser { name, username, email, password } = new;
    let (Some(username), Some(email), Some(password)) = (username, email, password) else {
        return Err(ApiError::Internal); // unreachable after validation
    };
    let record = UserRecord {
        id: Uuid::new_v4(),
        name,
        username,
        email,
        password_hash: hash_password(password).await?,
    };
    match repo.insert_user(record).await {
        Ok(user) => {
            info!(user_id = %user.id, username = %user.username, "user registered");
            Ok(REGISTERED.to_string())
        }
        // lost a race with a concurrent registration of the same name/email
        Err(RepoError::Conflict(m)) => Err(ApiError::Validation(format!("{m}."))),
        Err(e) => Err(e.into()),
    }
}

/// Checks a username/password pair. Unknown usernames are `NotFound`, bad
/// passwords `Unauthorized`.
pub async fn verify(repo: &dyn Repo, username: &str, password: &str) -> Result<Identity, ApiError> {
    let record = repo.find_by_username(username.trim()).await?;
    // registration never accepts these, and bcrypt would compare only a prefix
    if password.len() > MAX_PASSWORD_BYTES {
        warn!(username = %username, "login rejected: password too long");
        return Err(ApiError::Unauthorized);
    }
    if !verify_password(password.to_string(), record.password_hash.clone()).await? {
        warn!(username = %username, "login rejected: bad password");
        return Err(ApiError::Unauthorized);
    }
    Ok(Identity { id: record.id, username: record.username })
}

/// `login`: verify credentials and issue a token.
pub async fn login(repo: &dyn Repo, tokens: &TokenService, username: &str, password: &str) -> Result<String, ApiError> {
    let identity = verify(repo, username, password).await?;
    let token = tokens.issue(&identity).map_err(|e| {
        tracing::error!(error = %e, "token issuance failed");
        ApiError::Internal
    })?;
    info!(user_id = %identity.id, username = %identity.username, "login succeeded");
    Ok(token)
}
