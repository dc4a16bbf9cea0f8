//! Common routes: health, version, info.

use crate::config::Configuration;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

/// Path segments owned by the common routes; resource modules cannot use them.
pub const RESERVED_NAMES: &[&str] = &["health", "version", "info"];

/// Transport crate reported by `/info`.
const AXUM_VERSION: &str = "0.7";

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoBody {
    version: &'static str,
    rust_version: &'static str,
    axum: &'static str,
    mode: String,
    debug: bool,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn info(State(config): State<Arc<Configuration>>) -> Json<InfoBody> {
    Json(InfoBody {
        version: env!("CARGO_PKG_VERSION"),
        rust_version: env!("CARGO_PKG_RUST_VERSION"),
        axum: AXUM_VERSION,
        mode: config.mode().to_string(),
        debug: config.debug(),
    })
}

/// GET /health, GET /version, GET /info. `/info` reports the snapshot the router was built from.
pub fn common_routes(config: Arc<Configuration>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/version", get(version))
        .route("/info", get(info))
        .route("/info/", get(info))
        .with_state(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, http::StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[tokio::test]
    async fn info_reports_mode_and_debug() {
        let config = Arc::new(Configuration::resolve(json!({"mode": "uat", "debug": true})));
        let response = common_routes(config)
            .oneshot(Request::builder().uri("/info").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["mode"], "uat");
        assert_eq!(body["debug"], true);
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert!(body["rustVersion"].is_string());
        assert_eq!(body["axum"], "0.7");
    }
}
