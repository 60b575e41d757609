//! Storage backend interface: two methods, scheme-dispatched, unknown
//! schemes fail fast.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("unknown storage scheme: {0:?}")]
    UnknownScheme(String),

    #[error("malformed uri: {0}")]
    MalformedUri(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Two methods suffice: fetch an object into a writable sink, push a
/// writable source up to its destination.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn download(&self, uri: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()>;
    async fn upload(&self, uri: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()>;
}

/// Splits `scheme://rest` into its two halves. Fails fast on malformed uris.
pub fn parse_scheme(uri: &str) -> Result<(&str, &str)> {
    uri.split_once("://")
        .ok_or_else(|| StorageError::MalformedUri(uri.to_string()))
}

/// Static scheme -> backend lookup table.
#[derive(Clone, Default)]
pub struct StorageRegistry {
    backends: HashMap<String, Arc<dyn StorageBackend>>,
}

impl StorageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scheme: impl Into<String>, backend: Arc<dyn StorageBackend>) {
        self.backends.insert(scheme.into(), backend);
    }

    pub fn resolve(&self, uri: &str) -> Result<Arc<dyn StorageBackend>> {
        let (scheme, _) = parse_scheme(uri)?;
        self.backends
            .get(scheme)
            .cloned()
            .ok_or_else(|| StorageError::UnknownScheme(scheme.to_string()))
    }

    pub async fn download(&self, uri: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        self.resolve(uri)?.download(uri, writer).await
    }

    pub async fn upload(&self, uri: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        self.resolve(uri)?.upload(uri, reader).await
    }
}

/// In-process backend for `mem://` uris, used by tests and local development.
#[derive(Clone, Default)]
pub struct MemStorage {
    objects: Arc<tokio::sync::Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, uri: &str, bytes: Vec<u8>) {
        let (_, path) = parse_scheme(uri).expect("mem:// uri");
        self.objects.lock().await.insert(path.to_string(), bytes);
    }

    pub async fn get(&self, uri: &str) -> Option<Vec<u8>> {
        let (_, path) = parse_scheme(uri).ok()?;
        self.objects.lock().await.get(path).cloned()
    }
}

#[async_trait]
impl StorageBackend for MemStorage {
    async fn download(&self, uri: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let (_, path) = parse_scheme(uri)?;
        let bytes = self
            .objects
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::SourceNotFound(uri.to_string()))?;
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn upload(&self, uri: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        use tokio::io::AsyncReadExt;
        let (_, path) = parse_scheme(uri)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await?;
        self.objects.lock().await.insert(path.to_string(), buf);
        Ok(())
    }
}

/// Local-filesystem backend for `file://` uris, rooted at a configured directory.
#[derive(Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve_path(&self, uri: &str) -> Result<PathBuf> {
        let (_, rel) = parse_scheme(uri)?;
        Ok(self.root.join(rel.trim_start_matches('/')))
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn download(&self, uri: &str, writer: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let path = self.resolve_path(uri)?;
        let mut file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::SourceNotFound(uri.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        tokio::io::copy(&mut file, writer).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn upload(&self, uri: &str, reader: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        let path = self.resolve_path(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&path).await?;
        tokio::io::copy(reader, &mut file).await?;
        Ok(())
    }
}
