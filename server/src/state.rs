// server/src/state.rs

use std::sync::Arc;

use common::{extract_filename, is_allowed_extension, parse_reference};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::admission::AdmissionGate;
use crate::config::Config;
use crate::error::{ArchiveError, FetchError};
use crate::fetch::Fetcher;
use crate::registry::TaskRegistry;
use crate::task::{FileEntry, Task, TaskSnapshot};
use crate::worker::{spawn_build_pool, BuildDispatcher, BuildSettings};

/// Todo lo compartido entre handlers. Se construye una vez en `main`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gate: AdmissionGate,
    pub registry: Arc<TaskRegistry>,
    pub dispatcher: BuildDispatcher,
    pub fetcher: Arc<dyn Fetcher>,
}

/// Resultado de una submission que no fue rechazada por validación.
#[derive(Debug)]
pub enum AddOutcome {
    Added {
        snapshot: TaskSnapshot,
        build_dispatched: bool,
    },
    /// La descarga falló: quedó anotado en la tarea, el cliente puede reintentar
    FetchFailed {
        snapshot: TaskSnapshot,
        error: FetchError,
    },
}

impl AppState {
    /// Crea el directorio de salida y arranca el pool de builders.
    /// Tiene que llamarse dentro del runtime de tokio.
    pub fn start(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self, ArchiveError> {
        std::fs::create_dir_all(&config.storage_dir)?;

        let (dispatcher, _builders) = spawn_build_pool(BuildSettings::new(
            config.storage_dir.clone(),
            config.build_timeout,
            config.max_concurrent_tasks,
        ));

        Ok(Self {
            gate: AdmissionGate::new(config.max_concurrent_tasks),
            config: Arc::new(config),
            registry: Arc::new(TaskRegistry::new()),
            dispatcher,
            fetcher,
        })
    }

    /// Alta de tarea: necesita un slot libre, si no ServerBusy.
    pub fn create_task(&self) -> Result<Arc<Task>, ArchiveError> {
        let permit = self.gate.try_acquire().ok_or(ArchiveError::ServerBusy)?;

        let task_id = uuid::Uuid::new_v4().to_string();
        let task = self
            .registry
            .create(Task::new(task_id, self.config.max_files_per_task, permit));

        info!(
            "tarea {} creada ({}/{} slots ocupados)",
            task.id(),
            self.gate.in_flight(),
            self.gate.capacity()
        );
        Ok(task)
    }

    /// Valida, descarga (sin lock) y agrega un archivo a la tarea.
    pub async fn add_file(&self, task_id: &str, raw_url: &str) -> Result<AddOutcome, ArchiveError> {
        let task = self.registry.get(task_id)?;
        task.ensure_accepting()?;

        let url =
            parse_reference(raw_url).map_err(|_| ArchiveError::InvalidReference(raw_url.to_string()))?;
        let filename =
            extract_filename(&url).map_err(|_| ArchiveError::InvalidReference(raw_url.to_string()))?;
        if !is_allowed_extension(&filename, &self.config.allowed_extensions) {
            return Err(ArchiveError::UnsupportedType(filename));
        }

        let fetched = match timeout(self.config.fetch_timeout, self.fetcher.fetch(&url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.config.fetch_timeout)),
        };

        let fetched = match fetched {
            Ok(f) => f,
            Err(error) => {
                warn!("tarea {}: falló la descarga de {}: {}", task.id(), url, error);
                let snapshot = task.record_fetch_failure(url.as_str(), &error);
                return Ok(AddOutcome::FetchFailed { snapshot, error });
            }
        };

        let file = FileEntry::new(url.as_str(), fetched.filename, fetched.bytes);
        let (snapshot, job) = task.push_file(file)?;

        info!(
            "tarea {}: archivo agregado ({}/{})",
            task.id(),
            snapshot.file_count,
            task.max_files()
        );

        let build_dispatched = job.is_some();
        if let Some(job) = job {
            info!("tarea {} llegó a la cuota, despachando build", task.id());
            self.dispatcher.dispatch(job);
        }

        Ok(AddOutcome::Added {
            snapshot,
            build_dispatched,
        })
    }

    pub fn task_snapshot(&self, task_id: &str) -> Result<TaskSnapshot, ArchiveError> {
        Ok(self.registry.get(task_id)?.snapshot())
    }
}
