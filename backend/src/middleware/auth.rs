//! Authentication middleware
//!
//! Bearer-token authentication and capability checks

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{Capability, Role, RolePermissions};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::AppState;

/// Authenticated user information extracted from the token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Reject the request unless the user's role grants `capability`
    pub fn require(&self, permissions: &RolePermissions, capability: Capability) -> AppResult<()> {
        if permissions.allows(self.role, capability) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                role = self.role.as_str(),
                capability = capability.as_str(),
                "Capability check failed"
            );
            Err(AppError::Forbidden(capability.as_str()))
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn new(user_id: Uuid, role: Role, ttl_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user_id.to_string(),
            role,
            exp: now + ttl_secs,
            iat: now,
        }
    }

    /// Sign with HS256. Tokens are issued by the identity service; this is
    /// used by tooling and tests.
    pub fn encode(&self, secret: &str) -> AppResult<String> {
        use jsonwebtoken::{encode, EncodingKey, Header};

        encode(&Header::default(), self, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| AppError::Internal(format!("Token encoding error: {}", e)))
    }
}

/// Decode and validate JWT token
fn decode_jwt(token: &str, secret: &str) -> AppResult<Claims> {
    use jsonwebtoken::{decode, DecodingKey, Validation};

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| AppError::InvalidToken(e.to_string()))
}

fn authenticate(request: &Request, secret: &str) -> AppResult<AuthUser> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthenticated)?;

    let claims = decode_jwt(token, secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::InvalidToken("Invalid user ID in token".to_string()))?;

    Ok(AuthUser {
        user_id,
        role: claims.role,
    })
}

/// Authentication middleware that validates bearer tokens and stores the
/// [`AuthUser`] in the request extensions
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&request, &state.config.jwt.secret) {
        Ok(auth_user) => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
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
            .ok_or(AppError::Unauthenticated)
    }
}
