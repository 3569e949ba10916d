//! Escritura del ZIP. Todo es I/O bloqueante: se llama desde `spawn_blocking`.

use std::{
    collections::HashSet,
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::error::BuildError;
use crate::task::FileEntry;

/// Resultado de un build que llegó a cerrar el contenedor.
#[derive(Debug)]
pub struct ArchiveReport {
    pub path: PathBuf,
    pub entries_written: usize,
    /// Entradas salteadas (nombre repetido, error de escritura)
    pub diagnostics: Vec<String>,
}

pub fn archive_path(storage_dir: &Path, task_id: &str) -> PathBuf {
    storage_dir.join(format!("{}.zip", task_id))
}

/// Escribe cada archivo como una entrada, en el orden en que se juntaron.
///
/// Sólo falla entero si no se puede crear o cerrar el contenedor; un error en
/// una entrada se anota y se sigue con la siguiente.
pub fn write_archive(path: &Path, files: &[FileEntry]) -> Result<ArchiveReport, BuildError> {
    let file = File::create(path).map_err(BuildError::Create)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut seen: HashSet<&str> = HashSet::with_capacity(files.len());
    let mut diagnostics = Vec::new();
    let mut entries_written = 0;

    for entry in files {
        if !seen.insert(entry.filename.as_str()) {
            warn!("{}: nombre repetido {}, se saltea", path.display(), entry.filename);
            diagnostics.push(format!(
                "failed to add {} to archive: duplicate filename",
                entry.filename
            ));
            continue;
        }

        if let Err(e) = zip.start_file(entry.filename.as_str(), options) {
            diagnostics.push(format!(
                "failed to add {} to archive: {}",
                entry.filename, e
            ));
            continue;
        }

        match zip.write_all(&entry.payload) {
            Ok(()) => {
                entries_written += 1;
                debug!(
                    "{}: agregado {} ({} bytes)",
                    path.display(),
                    entry.filename,
                    entry.payload.len()
                );
            }
            Err(e) => diagnostics.push(format!(
                "failed to write {} to archive: {}",
                entry.filename, e
            )),
        }
    }

    let mut file = zip.finish().map_err(BuildError::Finalize)?;
    file.flush()
        .map_err(|e| BuildError::Finalize(zip::result::ZipError::Io(e)))?;

    Ok(ArchiveReport {
        path: path.to_path_buf(),
        entries_written,
        diagnostics,
    })
}
