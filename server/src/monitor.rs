use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::registry::TaskRegistry;
use crate::state::AppState;

/// Loop en segundo plano: vence tareas que nunca llegaron a la cuota y
/// devuelve sus slots de admisión.
pub async fn run_reaper(state: AppState) {
    loop {
        tokio::time::sleep(state.config.sweep_interval).await;

        let expired = sweep_once(&state.registry, Utc::now(), state.config.task_ttl);
        if expired > 0 {
            info!(
                "{} tareas vencidas, slots libres: {}/{}",
                expired,
                state.gate.available(),
                state.gate.capacity()
            );
        } else {
            debug!("sweep sin tareas vencidas");
        }
    }
}

/// Una pasada. Cada tarea se bloquea por separado, nunca dos a la vez.
pub fn sweep_once(registry: &TaskRegistry, now: DateTime<Utc>, ttl: Duration) -> usize {
    let mut expired = 0;
    for task in registry.list() {
        if task.expire_if_stale(now, ttl) {
            info!(
                "tarea {} vencida sin completar la cuota (creada {})",
                task.id(),
                task.created_at()
            );
            expired += 1;
        }
    }
    expired
}
