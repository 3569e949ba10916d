//! Estado por tarea y sus transiciones.
//!
//! Cada [`Task`] tiene su propio lock. Toda lectura o escritura de los campos
//! mutables pasa por ese lock y nunca se mantiene durante un `.await`.
//!
//! Transiciones válidas:
//! ```text
//! created ──(cuota alcanzada)──► processing ──► completed
//!    │                                 └──────► failed
//!    └──(expirada por el reaper)──────────────► failed
//! ```

use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use chrono::{DateTime, Utc};
use common::{TaskId, TaskStatus};

use crate::admission::AdmissionPermit;
use crate::error::ArchiveError;

/// Archivo ya descargado. Inmutable; el payload se comparte con el build.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub source_url: String,
    pub filename: String,
    pub payload: Arc<[u8]>,
}

impl FileEntry {
    pub fn new(source_url: impl Into<String>, filename: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            source_url: source_url.into(),
            filename: filename.into(),
            payload: payload.into(),
        }
    }
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    /// Archivos juntados mientras la tarea está en `created`; se mueven al job
    files: Vec<FileEntry>,
    file_count: usize,
    errors: Vec<String>,
    archive_path: Option<PathBuf>,
    finished_at: Option<DateTime<Utc>>,
    /// Slot de admisión; viaja al `BuildJob` al pasar a processing
    permit: Option<AdmissionPermit>,
}

#[derive(Debug)]
pub struct Task {
    id: TaskId,
    created_at: DateTime<Utc>,
    max_files: usize,
    state: Mutex<TaskState>,
}

/// Vista inmutable para reportar estado.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub status: TaskStatus,
    pub file_count: usize,
    pub errors: Vec<String>,
    pub archive_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Trabajo de build: lo obtiene sólo la submission que llega a la cuota.
#[derive(Debug)]
pub struct BuildJob {
    pub task: Arc<Task>,
    pub files: Vec<FileEntry>,
    pub permit: Option<AdmissionPermit>,
}

impl Task {
    pub fn new(id: TaskId, max_files: usize, permit: AdmissionPermit) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            max_files,
            state: Mutex::new(TaskState {
                status: TaskStatus::Created,
                files: Vec::with_capacity(max_files),
                file_count: 0,
                errors: Vec::new(),
                archive_path: None,
                finished_at: None,
                permit: Some(permit),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    // un panic con el lock tomado no debe dejar la tarea inaccesible
    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Chequeo previo al fetch: ¿queda lugar en esta tarea?
    pub fn ensure_accepting(&self) -> Result<(), ArchiveError> {
        let state = self.lock();
        if state.status != TaskStatus::Created || state.file_count >= self.max_files {
            return Err(ArchiveError::QuotaExceeded {
                max: self.max_files,
            });
        }
        Ok(())
    }

    /// Agrega un archivo descargado. Si este archivo completa la cuota, la
    /// tarea pasa a `processing` en la misma toma del lock y se devuelve el
    /// `BuildJob`; ninguna otra llamada puede volver a obtenerlo.
    pub fn push_file(
        self: &Arc<Self>,
        file: FileEntry,
    ) -> Result<(TaskSnapshot, Option<BuildJob>), ArchiveError> {
        let mut state = self.lock();

        // otra submission pudo llenar la cuota mientras descargábamos
        if state.status != TaskStatus::Created || state.file_count >= self.max_files {
            return Err(ArchiveError::QuotaExceeded {
                max: self.max_files,
            });
        }

        state.files.push(file);
        state.file_count += 1;

        // los payloads pasan al job: la tarea no los retiene después del build
        let job = if state.file_count == self.max_files {
            state.status = TaskStatus::Processing;
            Some(BuildJob {
                task: Arc::clone(self),
                files: std::mem::take(&mut state.files),
                permit: state.permit.take(),
            })
        } else {
            None
        };

        Ok((self.snapshot_locked(&state), job))
    }

    /// Registra un fallo de descarga. No consume slot ni cambia el estado.
    pub fn record_fetch_failure(&self, url: &str, error: &dyn std::fmt::Display) -> TaskSnapshot {
        let mut state = self.lock();
        state
            .errors
            .push(format!("failed to download {}: {}", url, error));
        self.snapshot_locked(&state)
    }

    /// processing -> completed. Los diagnósticos del build se agregan antes.
    pub fn complete(&self, archive_path: PathBuf, diagnostics: Vec<String>) -> bool {
        let mut state = self.lock();
        if state.status != TaskStatus::Processing {
            return false;
        }
        state.errors.extend(diagnostics);
        state.status = TaskStatus::Completed;
        state.archive_path = Some(archive_path);
        state.finished_at = Some(Utc::now());
        true
    }

    /// processing -> failed
    pub fn fail(&self, diagnostic: String) -> bool {
        let mut state = self.lock();
        if state.status != TaskStatus::Processing {
            return false;
        }
        state.errors.push(diagnostic);
        state.status = TaskStatus::Failed;
        state.finished_at = Some(Utc::now());
        true
    }

    /// created -> failed cuando la tarea nunca llegó a la cuota a tiempo.
    /// Suelta el permiso de admisión.
    pub fn expire_if_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        let mut state = self.lock();
        if state.status != TaskStatus::Created {
            return false;
        }
        let age = now.signed_duration_since(self.created_at);
        if age.to_std().map_or(true, |age| age < ttl) {
            return false;
        }

        state.errors.push(format!(
            "task expired before reaching {} files",
            self.max_files
        ));
        state.status = TaskStatus::Failed;
        state.finished_at = Some(now);
        state.files.clear();
        state.permit = None;
        true
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.lock();
        self.snapshot_locked(&state)
    }

    fn snapshot_locked(&self, state: &TaskState) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id.clone(),
            status: state.status,
            file_count: state.file_count,
            errors: state.errors.clone(),
            archive_path: state.archive_path.clone(),
            created_at: self.created_at,
            finished_at: state.finished_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionGate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn new_task(gate: &AdmissionGate, max_files: usize) -> Arc<Task> {
        let permit = gate.try_acquire().unwrap();
        Arc::new(Task::new("t-1".to_string(), max_files, permit))
    }

    fn pdf(n: usize) -> FileEntry {
        FileEntry::new(
            format!("https://example.com/{n}.pdf"),
            format!("{n}.pdf"),
            vec![n as u8; 8],
        )
    }

    #[test]
    fn transitions_to_processing_only_on_the_quota_file() {
        let gate = AdmissionGate::new(1);
        let task = new_task(&gate, 3);

        for n in 0..2 {
            let (snap, job) = task.push_file(pdf(n)).unwrap();
            assert!(job.is_none());
            assert_eq!(snap.status, TaskStatus::Created);
            assert_eq!(snap.file_count, n + 1);
        }

        let (snap, job) = task.push_file(pdf(2)).unwrap();
        let job = job.expect("third file reaches the quota");
        assert_eq!(snap.status, TaskStatus::Processing);
        assert_eq!(job.files.len(), 3);
        assert!(job.permit.is_some());

        // cuota llena: rechazado y sin cambios
        assert!(matches!(
            task.push_file(pdf(3)),
            Err(ArchiveError::QuotaExceeded { max: 3 })
        ));
        assert!(task.ensure_accepting().is_err());
        assert_eq!(task.snapshot().file_count, 3);

        // el permiso viaja con el job
        assert_eq!(gate.available(), 0);
        drop(job);
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn fetch_failure_keeps_status_and_count() {
        let gate = AdmissionGate::new(1);
        let task = new_task(&gate, 3);
        task.push_file(pdf(0)).unwrap();

        let snap = task.record_fetch_failure("https://down.example.com/a.pdf", &"HTTP status 502");
        assert_eq!(snap.status, TaskStatus::Created);
        assert_eq!(snap.file_count, 1);
        assert_eq!(
            snap.errors,
            vec!["failed to download https://down.example.com/a.pdf: HTTP status 502"]
        );
        assert!(task.ensure_accepting().is_ok());
    }

    #[test]
    fn archive_path_set_only_when_completed() {
        let gate = AdmissionGate::new(1);
        let task = new_task(&gate, 1);
        assert!(task.snapshot().archive_path.is_none());

        // no se puede completar algo que no está en processing
        assert!(!task.complete(PathBuf::from("x.zip"), vec![]));
        assert!(task.snapshot().archive_path.is_none());

        let (_, job) = task.push_file(pdf(0)).unwrap();
        assert!(job.is_some());
        assert!(task.snapshot().archive_path.is_none());

        assert!(task.complete(PathBuf::from("t-1.zip"), vec!["skipped one".into()]));
        let snap = task.snapshot();
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.archive_path, Some(PathBuf::from("t-1.zip")));
        assert_eq!(snap.errors, vec!["skipped one"]);
        assert!(snap.finished_at.is_some());

        // terminal: nada lo mueve
        assert!(!task.fail("late failure".into()));
        assert_eq!(task.snapshot().status, TaskStatus::Completed);
    }

    #[test]
    fn failed_task_has_no_archive() {
        let gate = AdmissionGate::new(1);
        let task = new_task(&gate, 1);
        task.push_file(pdf(0)).unwrap();

        assert!(task.fail("failed to create zip file: denied".into()));
        let snap = task.snapshot();
        assert_eq!(snap.status, TaskStatus::Failed);
        assert!(snap.archive_path.is_none());
        assert!(!task.complete(PathBuf::from("late.zip"), vec![]));
    }

    #[test]
    fn expiry_releases_the_permit() {
        let gate = AdmissionGate::new(1);
        let task = new_task(&gate, 3);
        task.push_file(pdf(0)).unwrap();

        let ttl = Duration::from_secs(60);
        assert!(!task.expire_if_stale(task.created_at(), ttl));
        assert_eq!(gate.available(), 0);

        let later = task.created_at() + chrono::Duration::seconds(61);
        assert!(task.expire_if_stale(later, ttl));
        assert_eq!(gate.available(), 1);

        let snap = task.snapshot();
        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.errors, vec!["task expired before reaching 3 files"]);
        assert!(task.push_file(pdf(1)).is_err());
    }

    #[test]
    fn payloads_move_to_the_build_job() {
        let gate = AdmissionGate::new(1);
        let task = new_task(&gate, 2);
        let first = pdf(0);
        let payload = Arc::clone(&first.payload);

        task.push_file(first).unwrap();
        assert_eq!(Arc::strong_count(&payload), 2);

        let (snap, job) = task.push_file(pdf(1)).unwrap();
        let job = job.unwrap();
        assert_eq!(snap.file_count, 2);
        assert_eq!(job.files.len(), 2);
        // sólo el job (y este test) referencian el payload
        assert_eq!(Arc::strong_count(&payload), 2);

        drop(job);
        assert_eq!(Arc::strong_count(&payload), 1);
        assert_eq!(task.snapshot().file_count, 2);
    }

    #[test]
    fn processing_tasks_never_expire() {
        let gate = AdmissionGate::new(1);
        let task = new_task(&gate, 1);
        let (_, job) = task.push_file(pdf(0)).unwrap();

        let later = task.created_at() + chrono::Duration::days(1);
        assert!(!task.expire_if_stale(later, Duration::from_secs(1)));
        assert_eq!(task.snapshot().status, TaskStatus::Processing);
        drop(job);
    }

    #[test]
    fn concurrent_pushes_dispatch_exactly_once() {
        let gate = AdmissionGate::new(1);
        let task = new_task(&gate, 5);
        let dispatched = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..32)
            .map(|n| {
                let task = Arc::clone(&task);
                let dispatched = Arc::clone(&dispatched);
                let accepted = Arc::clone(&accepted);
                std::thread::spawn(move || {
                    if let Ok((_, job)) = task.push_file(pdf(n)) {
                        accepted.fetch_add(1, Ordering::SeqCst);
                        if job.is_some() {
                            dispatched.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 5);
        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(task.snapshot().file_count, 5);
    }
}
