#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use returns_api::{
    auth::{Claims, JwtIdentityProvider, SharedIdentityProvider},
    config::AppConfig,
    db, events,
    repositories::SharedReturnStore,
    AppState,
};
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// Configuration for a throwaway in-memory SQLite database.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        TEST_JWT_SECRET.to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.auto_migrate = true;
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.cors_allow_any_origin = true;
    cfg
}

/// Helper harness driving the full router against a fresh store.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: SharedReturnStore,
    config: AppConfig,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Database-backed application on in-memory SQLite.
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Application backed by the in-process store.
    pub async fn in_memory() -> Self {
        let mut cfg = test_config();
        cfg.store_backend = "in-memory".to_string();
        Self::with_config(cfg).await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let store = db::open_return_store(&cfg)
            .await
            .expect("failed to open test store");

        let (event_sender, event_rx) = events::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let identity: SharedIdentityProvider =
            Arc::new(JwtIdentityProvider::new(&cfg.auth_config()));

        let state = AppState::new(cfg.clone(), store.clone(), event_sender, identity);
        let router = returns_api::app_router(state.clone());

        Self {
            router,
            state,
            store,
            config: cfg,
            _event_task: event_task,
        }
    }

    /// Signs a token the configured identity provider accepts.
    pub fn token_with_roles(&self, roles: &[&str]) -> String {
        sign_token(&self.config, "admin-user", roles, 3600)
    }

    /// Token for the default admin user.
    pub fn admin_token(&self) -> String {
        self.token_with_roles(&[self.config.admin_role.as_str()])
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Convenience helper for admin JSON requests.
    pub async fn request_authenticated(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let token = self.admin_token();
        self.request(method, uri, body, Some(&token)).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn sign_token(cfg: &AppConfig, sub: &str, roles: &[&str], expires_in_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: sub.to_string(),
        email: Some(format!("{sub}@example.com")),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        iss: cfg.auth_issuer.clone(),
        aud: cfg.auth_audience.clone(),
        exp: now + expires_in_secs,
        iat: Some(now),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(cfg.jwt_secret.as_bytes()),
    )
    .expect("encode access token")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
