//! Control de admisión: cuántas tareas pueden tener un build en vuelo a la vez.
//!
//! `try_acquire` nunca espera. El slot se devuelve al soltar el
//! [`AdmissionPermit`], así que cada adquisición se libera exactamente una vez
//! sin importar por qué camino termine la tarea.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone)]
pub struct AdmissionGate {
    sem: Arc<Semaphore>,
    capacity: usize,
}

/// Un slot ocupado. Se libera en `Drop`.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            sem: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// `None` si no hay capacidad (el llamador responde ServerBusy).
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        self.sem
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity - self.available()
    }
}
