use async_trait::async_trait;
use common::extract_filename;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::DEFAULT_MAX_FILE_BYTES;
use crate::error::FetchError;

#[derive(Debug)]
pub struct FetchedFile {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Descarga de un recurso remoto. El timeout lo pone quien llama.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<FetchedFile, FetchError>;
}

/// Implementación real sobre reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(concat!("archiver/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            max_bytes: DEFAULT_MAX_FILE_BYTES,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedFile, FetchError> {
        let filename = extract_filename(url).map_err(|_| FetchError::NoFilename)?;

        let mut resp = self.client.get(url.clone()).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        // Content-Length puede faltar o mentir: se corta también leyendo
        if resp.content_length().is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge(self.max_bytes));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge(self.max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }
        debug!("descargado {} ({} bytes)", url, bytes.len());

        Ok(FetchedFile { bytes, filename })
    }
}
