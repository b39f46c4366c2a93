//! Authentication middleware
//!
//! Bearer JWT validation for the action endpoints

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    /// Numeric user id; zero when the subject is not numeric
    pub user_id: i64,
    /// Token subject, which CSRF tokens are bound to
    pub subject: String,
    pub display_name: Option<String>,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: i64,
    pub iat: i64,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        AuthUser {
            user_id: claims.sub.trim().parse().unwrap_or(0),
            subject: claims.sub,
            display_name: claims.name,
        }
    }
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
    {
        Some(token) => token.trim().to_string(),
        None => {
            return AppError::Unauthorized("Missing or invalid Authorization header".to_string())
                .into_response()
        }
    };

    let claims = match decode_jwt(&token, &state.config.security.jwt_secret) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    let user = AuthUser::from(claims);
    tracing::debug!(user_id = user.user_id, subject = %user.subject, "Request authenticated");
    request.extensions_mut().insert(user);

    next.run(request).await
}

/// Decode and validate JWT token
pub fn decode_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
}

/// Extractor for authenticated user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sub: &str, secret: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            name: Some("Pat".to_string()),
            exp: now + exp_offset,
            iat: now,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token_yields_numeric_user() {
        let claims = decode_jwt(&token("42", "secret", 600), "secret").unwrap();
        let user = AuthUser::from(claims);
        assert_eq!(user.user_id, 42);
        assert_eq!(user.subject, "42");
        assert_eq!(user.display_name.as_deref(), Some("Pat"));
    }

    #[test]
    fn test_non_numeric_subject_maps_to_zero() {
        let claims = decode_jwt(&token("ops@example.com", "secret", 600), "secret").unwrap();
        assert_eq!(AuthUser::from(claims).user_id, 0);
    }

    #[test]
    fn test_wrong_secret_and_expiry_are_rejected() {
        assert!(decode_jwt(&token("42", "secret", 600), "other").is_err());
        let err = decode_jwt(&token("42", "secret", -3600), "secret").unwrap_err();
        assert_eq!(err.code(), "AUTH_REQUIRED");
    }
}
