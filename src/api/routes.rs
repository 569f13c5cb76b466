use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::handlers::command::{self, AppState};
use crate::api::handlers::entries;

/// Create router with application state
pub fn create_router_with_state(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/commands", post(command::execute_command))
        .route("/api/entries", get(entries::list_entries))
        .route("/api/entries/{owner_id}/{key}", get(entries::get_entry))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    use crate::config::{
        CommandConfig, Config, CrossTenantConfig, DatabaseConfig, LoggingConfig, ServerConfig,
    };
    use crate::services::database::{Driver, SqliteDriver};
    use crate::services::kv_store::{init_schema, KvApi, SharedTableKvStore};

    fn test_config(url: String, cross_tenant: bool) -> Config {
        Config {
            database: DatabaseConfig {
                url,
                driver_name: None,
                replica_url: None,
                max_pool_size: None,
            },
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            command: CommandConfig {
                trigger: "kv".into(),
                list_page_size: 100,
            },
            cross_tenant: CrossTenantConfig {
                enabled: cross_tenant,
            },
            logging: LoggingConfig {
                level: "info".into(),
            },
        }
    }

    async fn app(cross_tenant: bool) -> (TempDir, Router) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("kv.db").display());
        let driver: Arc<dyn Driver> = Arc::new(SqliteDriver::new(&url).unwrap());
        init_schema(driver.as_ref()).await.unwrap();

        for (owner, key, value) in [("pluginB", "k1", "v3"), ("pluginA", "k2", "v2"), ("pluginA", "k1", "v1")] {
            SharedTableKvStore::for_owner(driver.clone(), owner)
                .unwrap()
                .set(key, value.as_bytes())
                .await
                .unwrap();
        }

        let state = AppState::new(test_config(url, cross_tenant), driver);
        (dir, create_router_with_state(state))
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn command(owner: &str, line: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/commands")
            .header("content-type", "application/json")
            .body(Body::from(
                serde_json::json!({ "owner_id": owner, "command": line }).to_string(),
            ))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let (_dir, app) = app(false).await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_entries_grouped() {
        let (_dir, app) = app(true).await;
        let response = app
            .oneshot(Request::get("/api/entries").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["total_keys"], 3);
        assert_eq!(body["owners"][0]["owner_id"], "pluginA");
        assert_eq!(body["owners"][0]["keys"], serde_json::json!(["k1", "k2"]));
        assert_eq!(body["owners"][1]["owner_id"], "pluginB");
    }

    #[tokio::test]
    async fn test_get_entry_and_missing_entry() {
        let (_dir, app) = app(true).await;

        let response = app
            .clone()
            .oneshot(Request::get("/api/entries/pluginB/k1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["value"], "v3");

        let response = app
            .oneshot(Request::get("/api/entries/pluginC/k1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_entries_forbidden_when_disabled() {
        let (_dir, app) = app(false).await;
        let response = app
            .oneshot(Request::get("/api/entries").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_execute_command() {
        let (_dir, app) = app(true).await;

        let response = app.clone().oneshot(command("pluginA", "/kv get k2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["response_type"], "ephemeral");
        assert_eq!(body["text"], "**Key:** `k2`\n**Value:** v2");

        let response = app.oneshot(command("kv-plugin", "/kv get pluginB:k1")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["text"], "**Plugin:** `pluginB`\n**Key:** `k1`\n**Value:** v3");
    }

    #[tokio::test]
    async fn test_execute_command_validation() {
        let (_dir, app) = app(false).await;

        let response = app.clone().oneshot(command("", "/kv list")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.oneshot(command("pluginA", "/other list")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
