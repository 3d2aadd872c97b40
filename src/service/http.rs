//! HTTP surface of the flow engine.

use crate::core::error::EngineError;
use crate::core::filter::FlowRequest;
use crate::service::engine::FlowEngine;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Map an engine error onto a response status.
pub fn status_for(error: &EngineError) -> StatusCode {
    if error.is_client_error() {
        StatusCode::BAD_REQUEST
    } else if matches!(error, EngineError::BackendExhausted { .. }) {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// `GET /api/get-sankey-data`
pub async fn sankey_handler(
    State(engine): State<Arc<FlowEngine>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let request = match FlowRequest::from_query_pairs(&params) {
        Ok(request) => request,
        Err(e) => {
            log::info!("rejected graph request: {}", e);
            return error_response(status_for(&e), e.to_string());
        }
    };

    // detached so a client disconnect does not abandon in-flight queries
    let task = tokio::spawn(async move { engine.sankey(&request).await });

    match task.await {
        Ok(Ok(graph)) => Json(json!({ "data": graph })).into_response(),
        Ok(Err(e)) => {
            log::error!("graph request failed: {}", e);
            error_response(status_for(&e), e.to_string())
        }
        Err(e) => {
            log::error!("graph task aborted: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "graph task aborted".into())
        }
    }
}

/// `GET /api/get-data-range`. Aggregated tables carry no block time.
pub async fn data_range_handler() -> Json<serde_json::Value> {
    Json(json!({ "data": { "range": null } }))
}

/// `GET /api/get-pairs`. Aggregated tables carry no trading pairs.
pub async fn pairs_handler() -> Json<serde_json::Value> {
    Json(json!({
        "pairs": {
            "ethbtcPairs": [],
            "stableswapPairs": [],
            "longtailPairs": []
        }
    }))
}

/// `GET /api/get-hashes`. Aggregated tables carry no transaction hashes.
pub async fn hashes_handler() -> Json<serde_json::Value> {
    Json(json!({ "hashes": [] }))
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub fn router(engine: Arc<FlowEngine>) -> Router {
    Router::new()
        .route("/api/get-sankey-data", get(sankey_handler))
        .route("/api/get-data-range", get(data_range_handler))
        .route("/api/get-pairs", get(pairs_handler))
        .route("/api/get-hashes", get(hashes_handler))
        .route("/health", get(health_handler))
        .with_state(engine)
}

/// Serves the flow engine over HTTP.
pub struct HttpServer {
    engine: Arc<FlowEngine>,
    bind: String,
}

impl HttpServer {
    pub fn new(engine: Arc<FlowEngine>, bind: impl Into<String>) -> Self {
        Self {
            engine,
            bind: bind.into(),
        }
    }

    pub async fn start(&self) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.bind).await?;
        log::info!("serving flow graphs on http://{}", listener.local_addr()?);
        axum::serve(listener, router(Arc::clone(&self.engine))).await
    }
}
