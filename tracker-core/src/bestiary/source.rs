//! Where bestiary files come from.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reading a bestiary file.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status} fetching {file}")]
    Status { file: String, status: u16 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid bestiary data in {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Invalid source configuration: {0}")]
    Config(String),
}

/// A set of individually addressable bestiary files.
///
/// There is no listing operation; callers probe names they expect.
#[async_trait]
pub trait BestiarySource: Send + Sync {
    /// Whether `file` exists. `Ok(false)` means absent; `Err` means the
    /// source itself could not be reached.
    async fn exists(&self, file: &str) -> Result<bool, SourceError>;

    /// Full contents of `file`.
    async fn fetch(&self, file: &str) -> Result<String, SourceError>;

    /// Human readable location, for logs.
    fn describe(&self) -> String;
}

/// Files served over HTTP under a base URL.
#[derive(Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| SourceError::Config(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, file: &str) -> String {
        format!("{}/{}", self.base_url, file)
    }
}

#[async_trait]
impl BestiarySource for HttpSource {
    async fn exists(&self, file: &str) -> Result<bool, SourceError> {
        let response = self
            .client
            .head(self.url(file))
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;
        probe_status(file, response.status().as_u16())
    }

    async fn fetch(&self, file: &str) -> Result<String, SourceError> {
        let response = self
            .client
            .get(self.url(file))
            .send()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SourceError::Status {
                file: file.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| SourceError::Network(e.to_string()))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Interpret a `HEAD` status. Only "not found" and "gone" mean absent; any
/// other failure says nothing about the file and is reported as an error.
fn probe_status(file: &str, status: u16) -> Result<bool, SourceError> {
    match status {
        200..=299 => Ok(true),
        404 | 410 => Ok(false),
        status => Err(SourceError::Status {
            file: file.to_string(),
            status,
        }),
    }
}

/// Files in a local directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BestiarySource for DirSource {
    async fn exists(&self, file: &str) -> Result<bool, SourceError> {
        let root = tokio::fs::metadata(&self.root).await?;
        if !root.is_dir() {
            return Err(SourceError::Config(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(tokio::fs::try_exists(self.root.join(file)).await?)
    }

    async fn fetch(&self, file: &str) -> Result<String, SourceError> {
        Ok(tokio::fs::read_to_string(self.root.join(file)).await?)
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}
