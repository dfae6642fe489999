//! REST handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{Value, json};

use super::server::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "notefabric",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "engine": state.engine.status(),
    }))
}

pub async fn list_notes(State(state): State<Arc<AppState>>) -> Json<Value> {
    let notes = state.engine.snapshot();
    Json(json!({ "count": notes.len(), "notes": notes }))
}

pub async fn get_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    match state.engine.get_note(&id) {
        Some(note) => Ok(Json(json!(note))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "ok": false, "error": format!("note not found: {id}") })),
        )),
    }
}

pub async fn list_tools(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "tools": state.engine.tools() }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::build_router;
    use axum::body::Body;
    use axum::http::Request;
    use notefabric_core::config::FabricConfig;
    use notefabric_graph::MemoryStorage;
    use notefabric_providers::OfflineGenerator;
    use notefabric_scheduler::FabricEngine;
    use notefabric_tools::ToolRegistry;
    use tower::ServiceExt;

    fn engine() -> Arc<FabricEngine> {
        Arc::new(FabricEngine::new(
            FabricConfig::default(),
            Arc::new(MemoryStorage::new()),
            Arc::new(ToolRegistry::with_defaults()),
            Arc::new(OfflineGenerator::new()),
        ))
    }

    async fn get_json(engine: Arc<FabricEngine>, uri: &str) -> (StatusCode, Value) {
        let app = build_router(AppState::new(engine));
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(engine(), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["engine"]["storage"], "memory");
    }

    #[tokio::test]
    async fn test_notes_and_single_note() {
        let engine = engine();
        let note = engine.create_note("listed");
        let (_, body) = get_json(engine.clone(), "/api/v1/notes").await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["notes"][0]["title"], "listed");

        let (status, body) = get_json(engine.clone(), &format!("/api/v1/notes/{}", note.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], note.id);

        let (status, _) = get_json(engine, "/api/v1/notes/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tools_catalog() {
        let (_, body) = get_json(engine(), "/api/v1/tools").await;
        let names: Vec<&str> = body["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert!(names.contains(&"echo"));
        assert!(names.contains(&"unit_test"));
    }
}
