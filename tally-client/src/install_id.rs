use std::error::Error;

use chrono::Utc;
use data_encoding::BASE64;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::store::LocalStore;

/// Name of the file holding the install identifier.
pub const INSTALL_ID_FILE_NAME: &str = "id.json";

/// The persisted install identifier of an application.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallId {
    /// Time the identifier was created, in UTC epoch seconds.
    #[serde(default)]
    pub id_created_timestamp: i64,
    /// The opaque identifier.
    #[serde(default)]
    pub install_id: String,
}

impl InstallId {
    /// Generates a new random identifier of 64 bits, base64 encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 8];
        rand::rng().fill_bytes(&mut bytes);

        Self {
            id_created_timestamp: Utc::now().timestamp(),
            install_id: BASE64.encode(&bytes),
        }
    }

    /// Returns `true` if the identifier can be attached to reports.
    ///
    /// Only emptiness is checked, so identifiers of other formats remain valid.
    pub fn is_valid(&self) -> bool {
        !self.install_id.is_empty()
    }

    /// Loads the identifier from the store or creates and stores a new one.
    ///
    /// Failing to persist a new identifier is not an error. The generated identifier is used for
    /// the lifetime of the process and another one is generated by the next process.
    pub fn load_or_create(store: &LocalStore) -> Self {
        match store.load::<Self>(INSTALL_ID_FILE_NAME) {
            Ok(Some(id)) if id.is_valid() => return id,
            Ok(Some(_)) => tally_log::debug!("stored install id is empty, regenerating"),
            Ok(None) => tally_log::debug!("no install id stored, generating"),
            Err(error) => tally_log::debug!(
                error = &error as &dyn Error,
                "could not load install id, regenerating"
            ),
        }

        let id = Self::generate();
        if let Err(error) = store.store(INSTALL_ID_FILE_NAME, &id) {
            tally_log::debug!(
                error = &error as &dyn Error,
                "could not store install id"
            );
        }

        id
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn test_generate() {
        let id = InstallId::generate();

        assert!(id.is_valid());
        assert_eq!(BASE64.decode(id.install_id.as_bytes()).unwrap().len(), 8);
        assert!(id.id_created_timestamp > 0);
    }

    #[test]
    fn test_load_or_create_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let first = InstallId::load_or_create(&store);
        let second = InstallId::load_or_create(&store);
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_id_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(INSTALL_ID_FILE_NAME),
            r#"{"idCreatedTimestamp": 1700000000, "installId": "not-base64-but-fine"}"#,
        )
        .unwrap();

        let id = InstallId::load_or_create(&LocalStore::new(dir.path()));
        assert_eq!(id.install_id, "not-base64-but-fine");
        assert_eq!(id.id_created_timestamp, 1700000000);
    }

    #[test]
    fn test_empty_id_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        fs::write(dir.path().join(INSTALL_ID_FILE_NAME), r#"{"installId": ""}"#).unwrap();

        let id = InstallId::load_or_create(&store);
        assert!(id.is_valid());

        let stored: InstallId = store.load(INSTALL_ID_FILE_NAME).unwrap().unwrap();
        assert_eq!(stored, id);
    }

    #[test]
    fn test_corrupt_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INSTALL_ID_FILE_NAME), "garbage").unwrap();

        let id = InstallId::load_or_create(&LocalStore::new(dir.path()));
        assert!(id.is_valid());
    }

    #[test]
    fn test_unwritable_store_still_yields_id() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a directory").unwrap();

        // The store directory cannot be created below a regular file.
        let store = LocalStore::new(blocker.join("app"));
        let first = InstallId::load_or_create(&store);
        let second = InstallId::load_or_create(&store);

        assert!(first.is_valid());
        assert_ne!(first, second);
    }
}
