use crate::{errors::ServiceError, AppState};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims carried by bearer tokens. Tokens are issued by the identity
/// system that fronts this service; we only verify them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    #[serde(default)]
    pub admin: bool,
    pub exp: usize,
    pub iat: usize,
}

/// The authenticated caller, resolved per request. This is the only session
/// state the service holds; dropping the request drops the identity.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("expected bearer token".into()))?
            .trim();

        let claims = verify_token(token, &state.config.jwt_secret)?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
            is_admin: claims.admin,
        })
    }
}

/// Extractor for admin-gated routes.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(ServiceError::Forbidden("admin access required".into()));
        }
        Ok(AdminUser(user))
    }
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| ServiceError::Unauthorized(format!("invalid token: {}", e)))
}

/// Issues a signed token. Used by tests and local tooling; production
/// tokens come from the identity provider.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    admin: bool,
    ttl_secs: usize,
) -> Result<String, ServiceError> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        admin,
        exp: now + ttl_secs,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("token creation failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit_test_secret_that_is_long_enough_123";

    #[test]
    fn token_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, "dana@example.com", false, 3600).unwrap();

        let claims = verify_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "dana@example.com");
        assert!(!claims.admin);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(SECRET, Uuid::new_v4(), "a@b.c", true, 3600).unwrap();
        assert!(verify_token(&token, "another_secret_that_is_also_long_enough").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "a@b.c".into(),
            admin: false,
            exp: now.saturating_sub(7200),
            iat: now.saturating_sub(9000),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(verify_token(&token, SECRET).is_err());
    }
}
