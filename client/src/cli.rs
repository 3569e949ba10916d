use std::{env, path::PathBuf, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use common::{
    extract_filename, is_allowed_extension, parse_reference, AddFileRequest, AddFileResponse,
    CreateTaskResponse, ErrorResponse, TaskStatusResponse,
};
use reqwest::{Client, Response};

/// Extensiones que acepta el servidor por defecto; sólo para avisar antes de enviar.
const KNOWN_EXTENSIONS: [&str; 3] = ["pdf", "jpeg", "jpg"];

/// - En Docker: ARCHIVER_URL=http://server:8080
/// - Local: default http://localhost:8080
fn server_base_url() -> String {
    env::var("ARCHIVER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "CLI para armar archivos ZIP a partir de URLs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crea una tarea nueva
    Create,

    /// Agrega una URL a una tarea
    Add {
        #[arg(value_name = "TASK_ID")]
        id: String,
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Consulta el estado de una tarea
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,

        /// Imprime la respuesta cruda en JSON
        #[arg(long)]
        json: bool,
    },

    /// Espera hasta que la tarea termine (completed / failed)
    Wait {
        #[arg(value_name = "TASK_ID")]
        id: String,

        /// Intervalo de polling en milisegundos
        #[arg(long, default_value_t = 500)]
        interval_ms: u64,
    },

    /// Descarga el ZIP de una tarea completada
    Download {
        #[arg(value_name = "TASK_ID")]
        id: String,

        /// Ruta de salida (default: <TASK_ID>.zip)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

// El servidor siempre responde {"error": "..."} en los fallos
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) => format!("{} ({})", body.error, status),
        Err(_) => format!("status {}", status),
    }
}

async fn fetch_status(client: &Client, base_url: &str, id: &str) -> Result<TaskStatusResponse> {
    let url = format!("{}/api/v1/tasks/{}", base_url, id);
    let resp = client.get(&url).send().await?;
    if !resp.status().is_success() {
        bail!("no se pudo consultar la tarea {}: {}", id, error_message(resp).await);
    }
    Ok(resp.json().await?)
}

fn print_status(task: &TaskStatusResponse) {
    println!("Tarea:");
    println!("  id: {}", task.task_id);
    println!("  estado: {}", task.status);
    println!("  archivos: {}", task.files_count);
    println!("  creada: {}", task.created_at);
    if let Some(ref done) = task.finished_at {
        println!("  finalizada: {}", done);
    }
    if let Some(ref url) = task.download_url {
        println!("  descarga: {}", url);
    }
    if task.errors.is_empty() {
        println!("  errores: (ninguno)");
    } else {
        println!("  errores:");
        for e in &task.errors {
            println!("    - {}", e);
        }
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = server_base_url();

    match cli.command {
        Commands::Create => {
            let url = format!("{}/api/v1/tasks", base_url);
            let resp = client.post(&url).send().await?;
            if !resp.status().is_success() {
                bail!("no se pudo crear la tarea: {}", error_message(resp).await);
            }
            let created: CreateTaskResponse = resp.json().await?;

            println!("Tarea creada:");
            println!("  id: {}", created.task_id);
            println!("  estado: {}", created.status);
        }

        Commands::Add { id, url } => {
            // chequeo local para no gastar un request en algo que se va a rechazar
            let parsed = parse_reference(&url).with_context(|| format!("URL inválida: {}", url))?;
            if let Ok(name) = extract_filename(&parsed) {
                if !is_allowed_extension(&name, &KNOWN_EXTENSIONS) {
                    eprintln!("aviso: {} no tiene una extensión conocida, el servidor puede rechazarla", name);
                }
            }

            let endpoint = format!("{}/api/v1/tasks/{}/files", base_url, id);
            let resp = client
                .post(&endpoint)
                .json(&AddFileRequest { url })
                .send()
                .await?;
            if !resp.status().is_success() {
                bail!("archivo rechazado: {}", error_message(resp).await);
            }
            let added: AddFileResponse = resp.json().await?;

            println!("Tarea {}:", added.task_id);
            println!("  estado: {}", added.status);
            println!("  archivos: {}", added.files_count);
            if let Some(err) = added.error {
                println!("  error: {}", err);
            }
        }

        Commands::Status { id, json } => {
            let task = fetch_status(&client, &base_url, &id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                print_status(&task);
            }
        }

        Commands::Wait { id, interval_ms } => {
            let interval = Duration::from_millis(interval_ms.max(50));
            let task = loop {
                let task = fetch_status(&client, &base_url, &id).await?;
                if task.status.is_terminal() {
                    break task;
                }
                tokio::time::sleep(interval).await;
            };
            print_status(&task);
        }

        Commands::Download { id, output } => {
            let task = fetch_status(&client, &base_url, &id).await?;
            let Some(download_url) = task.download_url else {
                bail!("la tarea {} todavía no tiene archivo (estado {})", id, task.status);
            };

            let resp = client
                .get(format!("{}{}", base_url, download_url))
                .send()
                .await?;
            if !resp.status().is_success() {
                bail!("falló la descarga: {}", error_message(resp).await);
            }
            let bytes = resp.bytes().await?;

            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.zip", id)));
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("no se pudo escribir {}", output.display()))?;
            println!("Archivo guardado en {} ({} bytes)", output.display(), bytes.len());
        }
    }

    Ok(())
}
