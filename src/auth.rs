use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::error::ApiError;
use crate::models::Id;
use crate::routes::AppState;

/// Who the caller is, as proven by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Id,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 session tokens. Stateless: nothing about a
/// token is remembered server side.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: chrono::Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: identity.id.to_string(),
            username: identity.username.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Every failure mode collapses into `ApiError::Unauthorized`.
    pub fn verify(&self, token: &str) -> Result<Identity, ApiError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            ApiError::Unauthorized
        })?;
        let id = data.claims.sub.parse::<Id>().map_err(|_| ApiError::Unauthorized)?;
        Ok(Identity { id, username: data.claims.username })
    }
}

/// Per-request authorization gate. Taking `Auth` as a handler argument makes
/// the route protected; the bearer token is verified once, here.
#[derive(Debug, Clone)]
pub struct Auth(pub Identity);

impl Auth {
    pub fn identity(&self) -> &Identity {
        &self.0
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(state) = req.app_data::<web::Data<AppState>>() else {
            tracing::error!("AppState missing; cannot verify bearer tokens");
            return ready(Err(ApiError::Internal));
        };
        // Delegate to BearerAuth to parse the header.
        let result = match BearerAuth::from_request(req, pl).into_inner() {
            Ok(bearer) => state.tokens.verify(bearer.token()).map(Auth),
            Err(_) => Err(ApiError::Unauthorized),
        };
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

    fn alice() -> Identity {
        Identity { id: uuid::Uuid::new_v4(), username: "alice".into() }
    }

    #[test]
    fn issue_then_verify() {
        let svc = TokenService::new(SECRET, chrono::Duration::hours(1));
        let who = alice();
        let token = svc.issue(&who).unwrap();
        assert_eq!(svc.verify(&token).unwrap(), who);
    }

    #[test]
    fn foreign_secret_is_rejected() {
        let ours = TokenService::new(SECRET, chrono::Duration::hours(1));
        let theirs = TokenService::new("another-secret-that-is-32-bytes-long", chrono::Duration::hours(1));
        let token = theirs.issue(&alice()).unwrap();
        assert!(matches!(ours.verify(&token), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn expired_token_is_rejected() {
        // well past the default 60s leeway
        let svc = TokenService::new(SECRET, chrono::Duration::hours(-1));
        let token = svc.issue(&alice()).unwrap();
        assert!(matches!(svc.verify(&token), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn garbage_is_rejected() {
        let svc = TokenService::new(SECRET, chrono::Duration::hours(1));
        assert!(svc.verify("notatoken").is_err());
        assert!(svc.verify("").is_err());
    }
}
