//! Read-only HTTP view of the polled nodes
//!
//! Routes:
//! - `GET /health`: liveness, always `ok`
//! - `GET /system/health`: poller counters and node statuses
//! - `GET /nodes`: one summary per node
//! - `GET /nodes/{id}`: full entity graph of a node
//! - `GET /nodes/{id}/history/{stream}?window=N`: samples of one stream, oldest first

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::health::{HealthTracker, PollerHealth};
use crate::history::{HistorySample, StreamKey};
use crate::model::NodeSummary;
use crate::state::NodeRegistry;

#[derive(Clone)]
pub struct AppState {
    pub nodes: NodeRegistry,
    pub health_tracker: HealthTracker,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    window: Option<usize>,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/nodes", get(list_nodes))
        .route("/nodes/{id}", get(get_node))
        .route("/nodes/{id}/history/{stream}", get(get_history))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<PollerHealth> {
    Json(app.health_tracker.get_health(&app.nodes).await)
}

// GET /nodes
async fn list_nodes(State(app): State<AppState>) -> Json<Vec<NodeSummary>> {
    Json(app.nodes.summaries().await)
}

// GET /nodes/{id}
// Serialized under the read lock; the history buffers are never copied.
async fn get_node(State(app): State<AppState>, Path(id): Path<String>) -> Result<Response, StatusCode> {
    let node = app.nodes.get(&id).ok_or(StatusCode::NOT_FOUND)?;
    let guard = node.read().await;
    Ok(Json(&*guard).into_response())
}

// GET /nodes/{id}/history/{stream}
async fn get_history(
    State(app): State<AppState>,
    Path((id, stream)): Path<(String, String)>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistorySample>>, (StatusCode, String)> {
    let key: StreamKey = stream
        .parse()
        .map_err(|e: crate::history::StreamKeyError| (StatusCode::BAD_REQUEST, e.to_string()))?;
    let node = app
        .nodes
        .get(&id)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("unknown node {}", id)))?;

    let samples = node
        .read()
        .await
        .history(&key, params.window)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no stream {} on {}", key, id)))?;
    Ok(Json(samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{CpuSample, InterfaceSample};
    use crate::model::Node;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Router, NodeRegistry) {
        let mut node = Node::new("web01", vec![], 8);
        for epoch in 1..=3 {
            node.cpu_history.push(CpuSample { epoch, avg_load: 10 * epoch as u64 });
        }
        node.net_history.append("Intel(R) NIC #1", InterfaceSample { epoch: 3, in_avg_bps: 5, out_avg_bps: 6 });
        let nodes = NodeRegistry::from_nodes([node]);
        let router = build_router(AppState {
            nodes: nodes.clone(),
            health_tracker: HealthTracker::new(),
        });
        (router, nodes)
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_routes() {
        let (router, _) = app();
        let (status, _) = get_json(router.clone(), "/health").await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = get_json(router, "/system/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["nodes_tracked"], 1);
    }

    #[tokio::test]
    async fn test_nodes_routes() {
        let (router, _) = app();
        let (status, json) = get_json(router.clone(), "/nodes").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["id"], "web01");
        assert_eq!(json[0]["status"], "unknown");

        let (status, json) = get_json(router.clone(), "/nodes/web01").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["id"], "web01");
        assert!(json["interfaces"].is_array());
        assert!(json.get("cpu_history").is_none());

        let (status, _) = get_json(router, "/nodes/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_route() {
        let (router, _) = app();
        let (status, json) = get_json(router.clone(), "/nodes/web01/history/cpu?window=2").await;
        assert_eq!(status, StatusCode::OK);
        let epochs: Vec<_> = json.as_array().unwrap().iter().map(|s| s["epoch"].as_i64().unwrap()).collect();
        assert_eq!(epochs, vec![2, 3]);
        assert_eq!(json[0]["kind"], "cpu");

        let (status, json) = get_json(router.clone(), "/nodes/web01/history/net:Intel(R)%20NIC%20%231").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["in_avg_bps"], 5);

        let (status, _) = get_json(router.clone(), "/nodes/web01/history/disk").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get_json(router.clone(), "/nodes/web01/history/volume:combined").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get_json(router, "/nodes/nope/history/cpu").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
