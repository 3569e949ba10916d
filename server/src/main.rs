use std::sync::Arc;

use anyhow::Context;
use server::{fetch::HttpFetcher, handlers, monitor, AppState, Config};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("server=debug,tower_http=info,axum=info")),
        )
        .init();

    let config = Config::from_env().context("configuración inválida")?;
    info!(
        "config: max_files_per_task={} max_concurrent_tasks={} storage_dir={} extensiones={:?}",
        config.max_files_per_task,
        config.max_concurrent_tasks,
        config.storage_dir.display(),
        config.allowed_extensions
    );
    let bind_addr = config.bind_addr.clone();

    let fetcher = Arc::new(HttpFetcher::new()?.with_max_bytes(config.max_file_bytes));
    let state = AppState::start(config, fetcher).context("no se pudo inicializar el estado")?;

    // reaper de tareas que nunca llegan a la cuota
    let reaper_state = state.clone();
    tokio::spawn(async move {
        monitor::run_reaper(reaper_state).await;
    });

    let app = handlers::build_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", bind_addr))?;
    info!("servidor escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
