use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use common::{
    AddFileRequest, AddFileResponse, CreateTaskResponse, HealthResponse, TaskStatus,
    TaskStatusResponse,
};
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::ArchiveError;
use crate::state::{AddOutcome, AppState};
use crate::task::TaskSnapshot;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/tasks", post(create_task))
        .route("/api/v1/tasks/:id", get(get_task))
        .route("/api/v1/tasks/:id/files", post(add_file))
        .route("/api/v1/downloads/:name", get(download_archive))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub fn download_url(task_id: &str) -> String {
    format!("/api/v1/downloads/{}.zip", task_id)
}

fn status_response(snap: TaskSnapshot) -> TaskStatusResponse {
    let download_url = match (snap.status, &snap.archive_path) {
        (TaskStatus::Completed, Some(_)) => Some(download_url(&snap.id)),
        _ => None,
    };

    TaskStatusResponse {
        task_id: snap.id,
        status: snap.status,
        files_count: snap.file_count,
        errors: snap.errors,
        download_url,
        created_at: snap.created_at,
        finished_at: snap.finished_at,
    }
}

/* ---------------- handlers HTTP ---------------- */

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_tasks: state.gate.in_flight(),
        capacity: state.gate.capacity(),
    })
}

// Crea una tarea vacía si hay un slot de admisión libre
async fn create_task(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateTaskResponse>), ArchiveError> {
    let task = state.create_task()?;

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            task_id: task.id().to_string(),
            status: TaskStatus::Created,
        }),
    ))
}

// Agrega una URL a la tarea; la descarga ocurre dentro de este request
async fn add_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<AddFileRequest>,
) -> Result<(StatusCode, Json<AddFileResponse>), ArchiveError> {
    let outcome = state.add_file(&id, &req.url).await?;

    let body = match outcome {
        AddOutcome::Added {
            snapshot,
            build_dispatched,
        } => {
            debug!("tarea {} build_dispatched={}", id, build_dispatched);
            AddFileResponse {
                task_id: snapshot.id,
                status: snapshot.status,
                files_count: snapshot.file_count,
                error: None,
            }
        }
        AddOutcome::FetchFailed { snapshot, error } => AddFileResponse {
            task_id: snapshot.id,
            status: snapshot.status,
            files_count: snapshot.file_count,
            error: Some(format!(
                "Failed to download file ({}), please try another source",
                error
            )),
        },
    };

    Ok((StatusCode::ACCEPTED, Json(body)))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ArchiveError> {
    let snap = state.task_snapshot(&id)?;
    Ok(Json(status_response(snap)))
}

// Sólo sirve "<task_id>.zip" de tareas completadas: nada de rutas arbitrarias
async fn download_archive(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ArchiveError> {
    let task_id = name
        .strip_suffix(".zip")
        .ok_or_else(|| ArchiveError::ArchiveNotReady(name.clone()))?;

    let snap = state.task_snapshot(task_id)?;
    let path = match (snap.status, snap.archive_path) {
        (TaskStatus::Completed, Some(path)) => path,
        _ => return Err(ArchiveError::ArchiveNotReady(name)),
    };

    // se manda por chunks, no se carga el ZIP entero en memoria
    let file = tokio::fs::File::open(&path).await?;
    let len = file.metadata().await?.len();
    let body = Body::from_stream(ReaderStream::new(file));

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", name),
            ),
        ],
        body,
    ))
}
