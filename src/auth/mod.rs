/*!
 * # Authentication
 *
 * Bearer-token authentication for the `/secure` surface. Tokens are HS256 JWTs
 * minted by the identity service; this module only verifies them and turns the
 * claims into an explicit [`RequestContext`] that handlers receive by value.
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,                 // Subject (actor user id)
    pub merchant_id: Option<String>, // Merchant the actor operates on behalf of
    #[serde(default)]
    pub roles: Vec<String>,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Who is calling, resolved once per request by [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub actor_id: Uuid,
    pub merchant_id: Uuid,
    pub roles: Vec<String>,
    pub request_id: Option<String>,
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.jwt_audience.clone(),
            jwt_issuer: cfg.jwt_issuer.clone(),
            access_token_expiration: Duration::from_secs(cfg.jwt_expiration),
        }
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token is not bound to a merchant")]
    MissingMerchant,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("Authentication service not available")]
    ServiceUnavailable,
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken | AuthError::TokenExpired => {
                ServiceError::Unauthorized(err.to_string())
            }
            AuthError::MissingMerchant => ServiceError::Forbidden(err.to_string()),
            AuthError::TokenCreation(_) | AuthError::ServiceUnavailable => {
                ServiceError::InternalError(err.to_string())
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Verifies and mints access tokens
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Mints an access token; used by tooling and tests, not exposed over HTTP.
    pub fn issue_token(
        &self,
        actor_id: Uuid,
        merchant_id: Option<Uuid>,
        roles: Vec<String>,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::TokenCreation("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: actor_id.to_string(),
            merchant_id: merchant_id.map(|id| id.to_string()),
            roles,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Turns a validated token into the per-request context.
    pub fn context_from_token(
        &self,
        token: &str,
        request_id: Option<String>,
    ) -> Result<RequestContext, AuthError> {
        let claims = self.validate_token(token)?;
        let actor_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        let merchant_id = claims
            .merchant_id
            .as_deref()
            .ok_or(AuthError::MissingMerchant)
            .and_then(|raw| Uuid::parse_str(raw).map_err(|_| AuthError::InvalidToken))?;

        Ok(RequestContext {
            actor_id,
            merchant_id,
            roles: claims.roles,
            request_id,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware that validates the bearer token and attaches a [`RequestContext`]
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let Some(auth_service) = request.extensions().get::<Arc<AuthService>>().cloned() else {
        return AuthError::ServiceUnavailable.into_response();
    };

    let Some(token) = bearer_token(request.headers()) else {
        return AuthError::MissingToken.into_response();
    };

    let request_id = crate::tracing::current_request_id().map(|rid| rid.0);
    match auth_service.context_from_token(token, request_id) {
        Ok(ctx) => {
            debug!(actor_id = %ctx.actor_id, merchant_id = %ctx.merchant_id, "authenticated request");
            request.extensions_mut().insert(ctx);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))
    }
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }
}
