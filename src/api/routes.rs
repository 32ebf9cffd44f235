//! HTTP routes.
//!
//! `POST /api/tasks` streams a task's progress as Server-Sent Events, one SSE
//! event per progress event, named after its kind. The task is cancelled when
//! the client disconnects. `POST /api/tasks/run` waits and returns the result
//! as JSON.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::types::{CreateTaskRequest, HealthResponse, TaskResultResponse};
use crate::agent::{Agent, TaskHandle};
use crate::config::Config;

/// Shared application state.
pub struct AppState {
    pub agent: Arc<Agent>,
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let agent = Arc::new(Agent::from_config(&config)?);
    let app = router(Arc::new(AppState { agent }));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks", post(stream_task))
        .route("/api/tasks/run", post(run_task))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

fn validate_query(req: &CreateTaskRequest) -> Result<(), (StatusCode, String)> {
    if req.query.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "query must not be empty".to_string()));
    }
    Ok(())
}

/// Run a task and stream its progress.
async fn stream_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, (StatusCode, String)> {
    validate_query(&req)?;

    let TaskHandle {
        task_id,
        mut events,
        cancel,
        join,
    } = state.agent.start(req.query);
    tracing::info!(%task_id, "Task SSE stream opened");

    tokio::spawn(async move {
        if let Err(e) = join.await {
            tracing::error!(%task_id, error = %e, "Task panicked");
        }
    });

    struct StreamDropGuard {
        task_id: Uuid,
        cancel: CancellationToken,
    }

    impl Drop for StreamDropGuard {
        fn drop(&mut self) {
            // No-op if the task already finished.
            self.cancel.cancel();
            tracing::info!(task_id = %self.task_id, "Task SSE stream closed");
        }
    }

    let drop_guard = StreamDropGuard { task_id, cancel };

    let stream = async_stream::stream! {
        let _guard = drop_guard;
        while let Some(ev) = events.recv().await {
            match Event::default()
                .event(ev.kind.name())
                .id(ev.seq.to_string())
                .json_data(&ev)
            {
                Ok(sse) => yield Ok(sse),
                Err(e) => {
                    tracing::error!(
                        %task_id,
                        event = ev.kind.name(),
                        error = %e,
                        "Failed to serialize SSE event; dropping"
                    );
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive"),
    ))
}

/// Run a task to completion and return its result.
async fn run_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Json<TaskResultResponse>, (StatusCode, String)> {
    validate_query(&req)?;

    let handle = state.agent.start(req.query);
    let _guard = handle.cancel.clone().drop_guard();
    let report = handle.join.await.map_err(|e| {
        tracing::error!(task_id = %handle.task_id, error = %e, "Task panicked");
        (StatusCode::INTERNAL_SERVER_ERROR, "task failed unexpectedly".to_string())
    })?;

    Ok(Json(TaskResultResponse::from(report)))
}
