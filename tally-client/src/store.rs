use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Name of the directory below the user's configuration directory.
const STORE_DIR_NAME: &str = "tally";

/// An error returned when loading or storing a file in the [`LocalStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the file failed.
    #[error("failed to access {}", path.display())]
    Io {
        /// The file that could not be accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The file exists but does not contain the expected JSON document.
    #[error("failed to parse {}", path.display())]
    Json {
        /// The file that could not be parsed.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },
}

/// Persists small JSON documents in a per-application directory.
///
/// Each document is a single file within the directory. Writes replace the file atomically, so a
/// concurrent reader sees either the old or the new document. There is no locking between writers.
#[derive(Clone, Debug)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Creates a store rooted at the given directory.
    ///
    /// The directory is created lazily on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the default directory for an application, `<config dir>/tally/<app_id>`.
    ///
    /// Returns `None` if the platform has no user configuration directory, for instance when no
    /// home directory can be resolved.
    pub fn default_dir(app_id: &str) -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join(STORE_DIR_NAME).join(app_id))
    }

    /// The directory holding the documents.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Loads a document, returning `None` if the file does not exist.
    pub fn load<T>(&self, name: &str) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let path = self.dir.join(name);

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|source| StoreError::Json { path, source })
    }

    /// Stores a document, replacing a previous version.
    pub fn store<T>(&self, name: &str, value: &T) -> Result<(), StoreError>
    where
        T: Serialize,
    {
        let path = self.dir.join(name);
        let io_error = |source| StoreError::Io {
            path: path.clone(),
            source,
        };

        let data = serde_json::to_vec(value).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        fs::create_dir_all(&self.dir).map_err(io_error)?;

        let mut file = tempfile::NamedTempFile::new_in(&self.dir).map_err(io_error)?;
        file.write_all(&data).map_err(io_error)?;
        file.persist(&path).map_err(|e| io_error(e.error))?;

        Ok(())
    }
}
