//! Pool de builders de archivos.
//!
//! Las tareas que llegan a la cuota se encolan en un canal acotado. Un número
//! fijo de workers consume la cola; cada build corre en `spawn_blocking` con
//! timeout y el permiso de admisión se suelta al terminar, pase lo que pase.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        Mutex,
    },
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, warn};

use crate::archive::{archive_path, write_archive, ArchiveReport};
use crate::error::BuildError;
use crate::task::{BuildJob, FileEntry};

/// Paso bloqueante que escribe el contenedor. En producción es [`write_archive`].
pub type ArchiveWriter = fn(&Path, &[FileEntry]) -> Result<ArchiveReport, BuildError>;

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub storage_dir: PathBuf,
    pub build_timeout: Duration,
    /// Workers y tamaño de la cola; con un permiso por job nunca se llena
    pub workers: usize,
    pub writer: ArchiveWriter,
}

impl BuildSettings {
    pub fn new(storage_dir: PathBuf, build_timeout: Duration, workers: usize) -> Self {
        Self {
            storage_dir,
            build_timeout,
            workers,
            writer: write_archive,
        }
    }
}

/// Extremo productor de la cola. Nunca bloquea.
#[derive(Debug, Clone)]
pub struct BuildDispatcher {
    tx: mpsc::Sender<BuildJob>,
}

impl BuildDispatcher {
    pub fn dispatch(&self, job: BuildJob) {
        let task_id = job.task.id().to_string();
        match self.tx.try_send(job) {
            Ok(()) => debug!("build de la tarea {} encolado", task_id),
            Err(TrySendError::Full(job)) | Err(TrySendError::Closed(job)) => {
                warn!("no se pudo encolar el build de la tarea {}", task_id);
                job.task
                    .fail(BuildError::Aborted("build queue unavailable".to_string()).to_string());
            }
        }
    }
}

/// Arranca `settings.workers` consumidores y devuelve el dispatcher.
pub fn spawn_build_pool(settings: BuildSettings) -> (BuildDispatcher, Vec<JoinHandle<()>>) {
    let workers = settings.workers.max(1);
    let (tx, rx) = mpsc::channel::<BuildJob>(workers);
    let rx = Arc::new(Mutex::new(rx));
    let settings = Arc::new(settings);

    let handles = (0..workers)
        .map(|n| {
            let rx = Arc::clone(&rx);
            let settings = Arc::clone(&settings);
            tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    let Some(job) = next else {
                        debug!("builder {} sin cola, saliendo", n);
                        break;
                    };
                    run_build(job, &settings).await;
                }
            })
        })
        .collect();

    (BuildDispatcher { tx }, handles)
}

/// Ejecuta un build y aplica el resultado a la tarea.
pub async fn run_build(job: BuildJob, settings: &BuildSettings) {
    let BuildJob {
        task,
        files,
        permit,
    } = job;
    let path = archive_path(&settings.storage_dir, task.id());
    info!(
        "armando archivo de la tarea {} ({} archivos) en {}",
        task.id(),
        files.len(),
        path.display()
    );

    let writer = settings.writer;
    let handle = tokio::task::spawn_blocking(move || writer(&path, &files));

    let outcome: Result<ArchiveReport, BuildError> =
        match timeout(settings.build_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(BuildError::Aborted(join_err.to_string())),
            Err(_) => Err(BuildError::Timeout(settings.build_timeout)),
        };

    match outcome {
        Ok(report) => {
            if !report.diagnostics.is_empty() {
                warn!(
                    "tarea {}: {} entradas con error",
                    task.id(),
                    report.diagnostics.len()
                );
            }
            info!(
                "tarea {} completada: {} entradas en {}",
                task.id(),
                report.entries_written,
                report.path.display()
            );
            task.complete(report.path, report.diagnostics);
        }
        Err(e) => {
            warn!("build de la tarea {} falló: {}", task.id(), e);
            task.fail(e.to_string());
        }
    }

    // liberar el slot recién cuando la tarea ya es terminal
    drop(permit);
}
