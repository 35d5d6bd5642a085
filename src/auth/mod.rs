/*!
 * # Authentication and Authorization
 *
 * Identity is owned by an external provider. This module only verifies the
 * bearer tokens it issues and gates routes on the roles they carry.
 */

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::errors::ServiceError;

/// Claims carried by tokens from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Authenticated caller, inserted into request extensions by [`auth_middleware`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: String,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            roles: claims.roles,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Identity provider unavailable")]
    ProviderUnavailable,
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InsufficientPermissions => ServiceError::Forbidden(err.to_string()),
            AuthError::ProviderUnavailable => ServiceError::InternalError(err.to_string()),
            AuthError::MissingAuth | AuthError::InvalidToken | AuthError::TokenExpired => {
                ServiceError::Unauthorized(err.to_string())
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Resolves the caller of a request.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError>;
}

pub type SharedIdentityProvider = Arc<dyn IdentityProvider>;

/// Token verification settings
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
}

/// Verifies HS256 bearer tokens, checking signature, expiry, issuer and audience.
#[derive(Clone)]
pub struct JwtIdentityProvider {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    debug!(error = %e, "Rejected bearer token");
                    AuthError::InvalidToken
                }
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

#[async_trait]
impl IdentityProvider for JwtIdentityProvider {
    async fn current_user(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingAuth)?;
        self.validate_token(token).map(AuthUser::from)
    }
}

/// Authenticates the request with the [`SharedIdentityProvider`] found in the
/// request extensions and stores the resulting [`AuthUser`].
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let provider = match request.extensions().get::<SharedIdentityProvider>() {
        Some(provider) => provider.clone(),
        None => return AuthError::ProviderUnavailable.into_response(),
    };

    match provider.current_user(request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

pub async fn role_middleware(
    State(required_role): State<String>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(AuthError::MissingAuth)?;

    if !user.has_role(&required_role) {
        debug!(user_id = %user.user_id, role = %required_role, "Missing required role");
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_role(self, role: &str) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    fn with_role(self, role: &str) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            role.to_string(),
            role_middleware,
        ))
        .with_auth()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Extension, Router};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use tower::ServiceExt;

    const SECRET: &str = "unit-test-secret-that-is-long-enough-0123";

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: SECRET.into(),
            issuer: "identity-provider".into(),
            audience: "returns-api".into(),
        }
    }

    fn token(roles: &[&str], iss: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: "user-1".into(),
            email: Some("ops@example.com".into()),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            iss: iss.into(),
            aud: "returns-api".into(),
            exp: now + exp_offset,
            iat: Some(now),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        headers
    }

    #[tokio::test]
    async fn valid_token_yields_user_with_roles() {
        let provider = JwtIdentityProvider::new(&config());
        let user = provider
            .current_user(&headers_with(&token(&["admin"], "identity-provider", 600)))
            .await
            .unwrap();
        assert_eq!(user.user_id, "user-1");
        assert!(user.has_role("admin"));
    }

    #[tokio::test]
    async fn rejects_missing_expired_and_foreign_tokens() {
        let provider = JwtIdentityProvider::new(&config());
        assert_eq!(
            provider.current_user(&HeaderMap::new()).await,
            Err(AuthError::MissingAuth)
        );
        assert_eq!(
            provider
                .current_user(&headers_with(&token(&["admin"], "identity-provider", -3600)))
                .await,
            Err(AuthError::TokenExpired)
        );
        assert_eq!(
            provider
                .current_user(&headers_with(&token(&["admin"], "someone-else", 600)))
                .await,
            Err(AuthError::InvalidToken)
        );
        assert_eq!(
            provider.current_user(&headers_with("not.a.jwt")).await,
            Err(AuthError::InvalidToken)
        );
    }

    fn guarded_router() -> Router {
        let provider: SharedIdentityProvider = Arc::new(JwtIdentityProvider::new(&config()));
        Router::new()
            .route("/guarded", get(|| async { "ok" }))
            .with_role("admin")
            .layer(Extension(provider))
    }

    async fn status_for(auth: Option<String>) -> StatusCode {
        let mut builder = Request::builder().uri("/guarded");
        if let Some(token) = auth {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        guarded_router()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn role_gate_maps_to_401_and_403() {
        assert_eq!(status_for(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(Some(token(&["customer"], "identity-provider", 600))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(Some(token(&["admin"], "identity-provider", 600))).await,
            StatusCode::OK
        );
    }
}
