//! Validación de referencias remotas y derivación del nombre de archivo.
//!
//! El nombre derivado es el que se usa como entrada dentro del ZIP, así que
//! nunca contiene separadores de ruta.

use std::path::Path;

use percent_encoding::percent_decode_str;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("no filename in URL")]
    NoFilename,
}

/// Acepta sólo URLs absolutas http/https con host.
pub fn parse_reference(raw: &str) -> Result<Url, NamingError> {
    let url = Url::parse(raw.trim()).map_err(|e| NamingError::InvalidUrl(e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(NamingError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(NamingError::InvalidUrl("missing host".to_string()));
    }

    Ok(url)
}

/// Prefiere el parámetro `?filename=` y si no, el último segmento del path.
pub fn extract_filename(url: &Url) -> Result<String, NamingError> {
    let from_query = url
        .query_pairs()
        .find(|(key, _)| key == "filename")
        .map(|(_, value)| last_component(&value).to_string())
        .filter(|name| !name.is_empty());

    if let Some(name) = from_query {
        return Ok(name);
    }

    // el segmento viene codificado; un %2F decodificado se trata como separador
    url.path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|segment| percent_decode_str(segment).decode_utf8_lossy())
        .map(|decoded| last_component(&decoded).to_string())
        .filter(|name| !name.is_empty())
        .ok_or(NamingError::NoFilename)
}

/// Compara la extensión (sin el punto) contra la allow-list, sin importar mayúsculas.
pub fn is_allowed_extension<S: AsRef<str>>(filename: &str, allowed: &[S]) -> bool {
    let Some(ext) = Path::new(filename).extension().and_then(|e| e.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|a| a.as_ref().trim_start_matches('.').eq_ignore_ascii_case(ext))
}

// "../../etc/x.pdf" -> "x.pdf"
fn last_component(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or("").trim()
}
