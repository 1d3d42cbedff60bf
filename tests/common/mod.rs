#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use exam_coach_backend::auth::sign_jwt_for_user;
use exam_coach_backend::config::Config;
use exam_coach_backend::db::config::DbConfig;
use exam_coach_backend::db::DatabaseProxy;
use exam_coach_backend::state::AppState;

pub const TEST_SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    _dir: TempDir,
}

/// Fresh database file in a temp dir, migrations applied.
pub async fn create_test_db() -> (TempDir, DatabaseProxy) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let config = DbConfig::for_path(&dir.path().join("test.db"));
    let proxy = DatabaseProxy::connect(config)
        .await
        .expect("failed to open test database");
    (dir, proxy)
}

pub async fn create_test_app() -> TestApp {
    let (dir, proxy) = create_test_db().await;
    let config = Config {
        jwt_secret: Some(TEST_SECRET.to_string()),
        ..Config::default()
    };
    let state = AppState::new(Arc::new(proxy), Arc::new(config));

    TestApp {
        router: exam_coach_backend::build_router(state.clone()),
        state,
        _dir: dir,
    }
}

pub fn token_for(user_id: i64) -> String {
    sign_jwt_for_user(user_id, TEST_SECRET, "1h")
        .expect("failed to sign token")
        .0
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("request failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str, user_id: i64) -> (StatusCode, Value) {
        let token = token_for(user_id);
        self.request(Method::GET, uri, Some(&token), None).await
    }

    pub async fn post(&self, uri: &str, user_id: i64, body: Value) -> (StatusCode, Value) {
        let token = token_for(user_id);
        self.request(Method::POST, uri, Some(&token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, user_id: i64) -> (StatusCode, Value) {
        let token = token_for(user_id);
        self.request(Method::DELETE, uri, Some(&token), None).await
    }
}
