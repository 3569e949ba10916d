//! Utilidades compartidas por los tests de integración del servidor.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use common::extract_filename;
use serde_json::Value;
use server::{
    fetch::{FetchedFile, Fetcher},
    Config, FetchError,
};
use tower::ServiceExt;
use url::Url;

pub fn test_config(storage_dir: &Path, max_files: usize, max_tasks: usize) -> Config {
    Config {
        storage_dir: storage_dir.to_path_buf(),
        max_files_per_task: max_files,
        max_concurrent_tasks: max_tasks,
        fetch_timeout: Duration::from_secs(5),
        build_timeout: Duration::from_secs(10),
        ..Config::default()
    }
}

/// Fetcher en memoria: el cuerpo es la propia URL.
#[derive(Default)]
pub struct StubFetcher {
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn slow(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedFile, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(url.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(url.as_str()) {
            return Err(FetchError::Transport("connection refused".to_string()));
        }

        let filename = extract_filename(url).map_err(|_| FetchError::NoFilename)?;
        Ok(FetchedFile {
            bytes: url.as_str().as_bytes().to_vec(),
            filename,
        })
    }
}

pub async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send_raw(app, method, uri, body).await;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

pub async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

/// GET que además devuelve los headers de la respuesta.
pub async fn get_with_headers(app: &Router, uri: &str) -> (StatusCode, HeaderMap, Vec<u8>) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, bytes.to_vec())
}

pub async fn create_task(app: &Router) -> String {
    let (status, body) = send(app, Method::POST, "/api/v1/tasks", None).await;
    assert_eq!(status, StatusCode::CREATED, "body: {body}");
    body["task_id"].as_str().unwrap().to_string()
}

pub async fn add_url(app: &Router, task_id: &str, url: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::POST,
        &format!("/api/v1/tasks/{task_id}/files"),
        Some(serde_json::json!({ "url": url })),
    )
    .await
}

pub async fn task_status(app: &Router, task_id: &str) -> Value {
    let (status, body) = send(app, Method::GET, &format!("/api/v1/tasks/{task_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    body
}

/// Pollea hasta que la tarea sea terminal (o se acabe la paciencia).
pub async fn wait_terminal(app: &Router, task_id: &str) -> Value {
    for _ in 0..300 {
        let body = task_status(app, task_id).await;
        if matches!(body["status"].as_str(), Some("completed") | Some("failed")) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never reached a terminal status");
}

/// Pollea /health hasta ver `expected` tareas activas.
pub async fn wait_active(app: &Router, expected: u64) {
    for _ in 0..300 {
        let (_, body) = send(app, Method::GET, "/health", None).await;
        if body["active_tasks"].as_u64() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("active_tasks never reached {expected}");
}

/// Nombres de las entradas del ZIP, en el orden en que se escribieron.
pub fn zip_entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
