// server/src/registry.rs

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use crate::error::ArchiveError;
use crate::task::Task;

/// Mapa id -> tarea. El lock cubre sólo altas y búsquedas; el estado
/// interno de cada tarea se protege con el lock propio de la tarea.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Arc<Task>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, task: Task) -> Arc<Task> {
        let task = Arc::new(task);
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.insert(task.id().to_string(), Arc::clone(&task));
        task
    }

    pub fn get(&self, id: &str) -> Result<Arc<Task>, ArchiveError> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks
            .get(id)
            .cloned()
            .ok_or_else(|| ArchiveError::TaskNotFound(id.to_string()))
    }

    /// Copia de los handles para recorrerlos sin mantener el lock.
    pub fn list(&self) -> Vec<Arc<Task>> {
        let tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
