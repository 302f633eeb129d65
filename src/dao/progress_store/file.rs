//! JSON documents on the local filesystem, written atomically.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::BoxFuture;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::fs;

use crate::dao::{
    models::{PROFILE_ID, ParentSettingsEntity, ProgressEntity},
    progress_store::ProgressBackend,
    storage::{StorageError, StorageResult},
};

/// Failures raised by the file backend.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// Reading, writing or renaming a document failed.
    #[error("i/o failure on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A document on disk is not valid JSON for its model.
    #[error("failed to decode `{path}`")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// A model could not be encoded.
    #[error("failed to encode document for `{path}`")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl From<FileStoreError> for StorageError {
    fn from(err: FileStoreError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}

/// Stores each document as `<dir>/<profile>.<name>.json`.
#[derive(Clone)]
pub struct JsonFileBackend {
    dir: Arc<PathBuf>,
}

impl JsonFileBackend {
    /// Open (and create if needed) the directory holding the documents.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, FileStoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| FileStoreError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(Self { dir: Arc::new(dir) })
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{PROFILE_ID}.{name}.json"))
    }

    async fn read_document<T>(&self, name: &str) -> Result<Option<T>, FileStoreError>
    where
        T: DeserializeOwned,
    {
        let path = self.document_path(name);
        let contents = match fs::read(&path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(FileStoreError::Io { path, source }),
        };
        serde_json::from_slice(&contents)
            .map(Some)
            .map_err(|source| FileStoreError::Decode { path, source })
    }

    async fn write_document<T>(&self, name: &str, document: &T) -> Result<(), FileStoreError>
    where
        T: Serialize,
    {
        let path = self.document_path(name);
        let bytes = serde_json::to_vec_pretty(document).map_err(|source| {
            FileStoreError::Encode {
                path: path.clone(),
                source,
            }
        })?;
        write_atomic(&path, &bytes)
            .await
            .map_err(|source| FileStoreError::Io { path, source })
    }
}

/// Write through a sibling temp file and rename it over the target, so a
/// crash never leaves a half-written document behind.
async fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("document.json");
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    fs::write(&tmp_path, bytes).await?;
    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err);
    }
    Ok(())
}

impl ProgressBackend for JsonFileBackend {
    fn load_progress(&self) -> BoxFuture<'static, StorageResult<Option<ProgressEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.read_document("progress").await?) })
    }

    fn save_progress(&self, progress: ProgressEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.write_document("progress", &progress).await?) })
    }

    fn load_settings(&self) -> BoxFuture<'static, StorageResult<Option<ParentSettingsEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.read_document("settings").await?) })
    }

    fn save_settings(
        &self,
        settings: ParentSettingsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.write_document("settings", &settings).await?) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let path = store.dir.as_ref().clone();
            match fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => Ok(()),
                Ok(_) => Err(FileStoreError::Io {
                    path,
                    source: io::Error::new(ErrorKind::NotADirectory, "not a directory"),
                }
                .into()),
                Err(source) => Err(FileStoreError::Io { path, source }.into()),
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let path = store.dir.as_ref().clone();
            fs::create_dir_all(&path)
                .await
                .map_err(|source| FileStoreError::Io { path, source }.into())
        })
    }
}
