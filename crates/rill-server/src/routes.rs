//! HTTP routes for the Rill server.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::Json;
use axum::routing::{get, patch, post};
use axum::Router;
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use rill_core::events::BusEvent;
use rill_core::repo::CellPatch;
use rill_core::{Cell, CellId, Notebook, NotebookEvent, NotebookSettings, Scheduler};

use crate::error::ServerResult;
use crate::protocol::{
    CellCreateRequest, CellUpdateRequest, ConnectionStatus, RunRequest, RunResponse,
    SettingsUpdate,
};

/// Application state shared across handlers.
pub struct AppState {
    /// The scheduler, which owns the repository, bus, and pools.
    pub scheduler: Arc<Scheduler>,
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/notebook", get(get_notebook))
        .route("/notebook/settings", patch(patch_settings))
        .route("/notebook/cells", post(create_cell))
        .route(
            "/notebook/cells/{id}",
            patch(update_cell).delete(delete_cell),
        )
        .route("/notebook/run", post(run_cell))
        .route("/notebook/test-connection", post(test_connection))
        .route("/notebook/events", get(stream_events))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn get_notebook(State(state): State<Arc<AppState>>) -> Json<Notebook> {
    Json(state.scheduler.repo().notebook())
}

async fn patch_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> Json<Notebook> {
    let notebook = state
        .scheduler
        .save_settings(NotebookSettings { dsn: update.dsn })
        .await;
    Json(notebook)
}

async fn create_cell(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CellCreateRequest>,
) -> Json<Cell> {
    let cell = state.scheduler.create_cell(request.cell_type, request.code);
    Json(cell)
}

async fn update_cell(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<CellUpdateRequest>,
) -> ServerResult<Json<Cell>> {
    let patch = CellPatch {
        code: request.code,
        cell_type: request.cell_type,
        order: request.order,
        ..Default::default()
    };
    let cell = state.scheduler.update_cell(CellId::from(id), patch)?;
    Ok(Json(cell))
}

async fn delete_cell(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ServerResult<StatusCode> {
    state.scheduler.delete_cell(CellId::from(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn run_cell(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> ServerResult<Json<RunResponse>> {
    let run_id = state.scheduler.run(request.cell_id).await?;
    Ok(Json(RunResponse { run_id }))
}

async fn test_connection(State(state): State<Arc<AppState>>) -> Json<ConnectionStatus> {
    let check = state.scheduler.test_connection().await;
    Json(ConnectionStatus::from_check(check))
}

/// SSE stream of notebook events.
///
/// Pushes a `notebook_state` snapshot first, then forwards bus events. A
/// lagged subscriber gets an SSE comment noting the dropped count before
/// delivery resumes. Dropping the connection drops the receiver, which
/// unsubscribes it from the bus.
async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.scheduler.bus().subscribe();
    let snapshot = NotebookEvent::NotebookState(state.scheduler.repo().notebook());

    let first = stream::once(async move {
        Ok(frame(&BusEvent {
            run_id: None,
            event: snapshot,
        }))
    });
    let rest = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(event) => Some((Ok(frame(&event)), rx)),
            Err(RecvError::Lagged(count)) => {
                tracing::warn!(count, "SSE subscriber lagged, events dropped");
                Some((Ok(Event::default().comment(format!("dropped {count} events"))), rx))
            }
            Err(RecvError::Closed) => None,
        }
    });

    Sse::new(first.chain(rest)).keep_alive(KeepAlive::default())
}

/// Frame a bus event: event-name = type, data = payload JSON, id = run id.
fn frame(event: &BusEvent) -> Event {
    let mut frame = Event::default()
        .event(event.event.name())
        .data(event.event.payload().to_string());
    if let Some(run_id) = event.run_id {
        frame = frame.id(run_id.to_string());
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_json() {
        let health = serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        });
        assert_eq!(health["status"], "ok");
    }
}
