use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::cli::config::PilotConfig;
use crate::registry::{TaskRecord, TaskRegistry};
use crate::session::{execute_session_task, SessionJob};
use crate::storage::{CredentialStore, PgCredentialStore, StoredCookie};

/// Shared state handed to every handler
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub config: Arc<PilotConfig>,
}

/// Bind the control API and serve until the process exits
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.api.bind_addr.clone();
    let app = router(Arc::new(state));

    info!("control api listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind control API to {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/audiences", get(list_audiences))
        .route("/sessions", post(start_session))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/stop", post(stop_task))
        .route("/credentials", post(save_credentials))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StartSessionRequest {
    user_id: i64,
    audience: String,
    /// Falls back to the configured session duration when omitted
    duration_secs: Option<f64>,
    #[serde(default)]
    infinite: bool,
    #[serde(default)]
    explore_targets: Vec<String>,
    targets_csv: Option<String>,
    acting_identity: Option<String>,
    explore_chance: Option<f64>,
    scrape_chance: Option<f64>,
    visit_chance: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    task_id: String,
    status: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct AudienceSummary {
    key: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SaveCredentialsRequest {
    user_id: i64,
    cookies: Vec<StoredCookie>,
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_audiences(State(state): State<Arc<AppState>>) -> Json<Vec<AudienceSummary>> {
    let audiences = state
        .config
        .audiences
        .iter()
        .map(|profile| AudienceSummary {
            key: profile.key.clone(),
            name: profile.name.clone(),
        })
        .collect();
    Json(audiences)
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), (StatusCode, String)> {
    if !state
        .config
        .audiences
        .iter()
        .any(|profile| profile.key == request.audience)
    {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("unknown audience '{}'", request.audience),
        ));
    }
    let duration_secs = request
        .duration_secs
        .unwrap_or(state.config.session.duration_secs);
    if !request.infinite && duration_secs <= 0.0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "duration_secs must be positive".to_string(),
        ));
    }

    // Per-task phase overrides leave the shared config untouched
    let mut config = state.config.as_ref().clone();
    if let Some(chance) = request.explore_chance {
        config.phases.explore.chance = chance;
    }
    if let Some(chance) = request.scrape_chance {
        config.phases.scrape_trigger.chance = chance;
    }
    if let Some(chance) = request.visit_chance {
        config.phases.visit.chance = chance;
    }

    let (record, stop) = state
        .registry
        .create(&format!("engagement session for '{}'", request.audience))
        .await;
    let job = SessionJob {
        user_id: request.user_id,
        audience_key: request.audience,
        duration_secs,
        infinite: request.infinite,
        explore_targets: request.explore_targets,
        targets_csv: request.targets_csv,
        acting_identity: request.acting_identity,
        seed: request.seed,
    };

    let task_id = record.id.clone();
    info!("task {} accepted for audience '{}'", task_id, job.audience_key);
    tokio::spawn(execute_session_task(
        Arc::clone(&state.registry),
        Arc::new(config),
        task_id.clone(),
        stop,
        job,
    ));

    Ok((
        StatusCode::ACCEPTED,
        Json(TaskResponse {
            task_id,
            status: "accepted",
            message: "session task queued".to_string(),
        }),
    ))
}

async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskRecord>> {
    Json(state.registry.list_all().await)
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskRecord>, (StatusCode, String)> {
    match state.registry.get(&id).await {
        Some(record) => Ok(Json(record)),
        None => Err((StatusCode::NOT_FOUND, format!("no task {}", id))),
    }
}

async fn stop_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if state.registry.request_stop(&id).await {
        Ok(Json(serde_json::json!({
            "task_id": id,
            "status": "stopping",
        })))
    } else {
        Err((StatusCode::NOT_FOUND, format!("no task {}", id)))
    }
}

async fn save_credentials(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SaveCredentialsRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let store = PgCredentialStore::connect(&state.config.credentials)
        .await
        .map_err(|e| (StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e)))?;
    let id = store
        .persist(request.user_id, &request.cookies)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;

    Ok(Json(serde_json::json!({
        "id": id,
        "user_id": request.user_id,
        "cookies": request.cookies.len(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            registry: Arc::new(TaskRegistry::new()),
            config: Arc::new(PilotConfig::default()),
        })
    }

    fn request(audience: &str) -> StartSessionRequest {
        StartSessionRequest {
            user_id: 1,
            audience: audience.to_string(),
            duration_secs: Some(0.5),
            infinite: false,
            explore_targets: Vec::new(),
            targets_csv: None,
            acting_identity: None,
            explore_chance: None,
            scrape_chance: None,
            visit_chance: None,
            seed: None,
        }
    }

    #[tokio::test]
    async fn test_get_task_unknown_is_not_found() {
        let state = test_state();
        let err = get_task(State(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_stop_task_unknown_is_not_found() {
        let state = test_state();
        let err = stop_task(State(state), Path("missing".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_start_session_rejects_unknown_audience() {
        let state = test_state();
        let err = start_session(State(state), Json(request("no-such-audience")))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert!(err.1.contains("unknown audience"));
    }

    #[tokio::test]
    async fn test_start_session_rejects_non_positive_duration() {
        let state = test_state();
        let key = state.config.audiences[0].key.clone();
        let mut bad = request(&key);
        bad.duration_secs = Some(0.0);
        let err = start_session(State(state), Json(bad)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_start_session_registers_task() {
        let state = test_state();
        let key = state.config.audiences[0].key.clone();
        let (status, Json(response)) =
            start_session(State(Arc::clone(&state)), Json(request(&key)))
                .await
                .unwrap();

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response.status, "accepted");
        let record = state.registry.get(&response.task_id).await;
        assert!(record.is_some());
    }

    #[tokio::test]
    async fn test_stop_requested_on_live_task() {
        let state = test_state();
        let (record, flag) = state.registry.create("stoppable").await;
        let Json(body) = stop_task(State(Arc::clone(&state)), Path(record.id.clone()))
            .await
            .unwrap();
        assert_eq!(body["status"], "stopping");
        assert!(flag.is_stopped());
    }
}
