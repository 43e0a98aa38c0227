//! Persisted key/value stores used alongside the registry.
//!
//! Each store is a JSON blob under a data directory, keyed the way the
//! storefront keys its browser storage. None of them interact with the
//! registry's ttl machinery.
//!
//! Malformed blobs are never fatal: they are logged and read as empty.

mod collections;
mod models;

pub use collections::{Favorites, OrderLog, RECENTLY_VIEWED_LIMIT, RecentlyViewed};
pub use models::{OrderLine, OrderRecord, OrderStatus, ProductSnapshot};

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Storage key for favorite product ids.
pub const FAVORITES_KEY: &str = "favorites";
/// Storage key for recently viewed products.
pub const RECENTLY_VIEWED_KEY: &str = "recentlyViewedProducts";
/// Storage key for the order log.
pub const ORDERS_KEY: &str = "nimocare-orders";

/// Directory of `<key>.json` blobs.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Creates a store rooted at `dir`. The directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The data directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the blob for `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Loads the value under `key`.
    ///
    /// A missing blob yields the default silently. An unreadable or
    /// malformed blob is logged and also yields the default.
    #[must_use]
    pub fn load<T>(&self, key: &str) -> T
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path_for(key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return T::default(),
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "Failed to read store; treating as empty");
                return T::default();
            },
        };

        match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "Malformed store data; resetting to empty");
                T::default()
            },
        }
    }

    /// Writes `value` under `key`, replacing the blob atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any filesystem step fails.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::OperationFailed {
            operation: "create_store_dir".to_string(),
            cause: format!("{}: {e}", self.dir.display()),
        })?;

        let json = serde_json::to_string_pretty(value).map_err(|e| Error::OperationFailed {
            operation: "serialize_store".to_string(),
            cause: e.to_string(),
        })?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        std::fs::write(&tmp, json).map_err(|e| Error::OperationFailed {
            operation: "write_store".to_string(),
            cause: format!("{}: {e}", tmp.display()),
        })?;
        if let Err(e) = std::fs::rename(&tmp, &path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(Error::OperationFailed {
                operation: "write_store".to_string(),
                cause: format!("{}: {e}", path.display()),
            });
        }

        debug!(key, path = %path.display(), "Store saved");
        Ok(())
    }

    /// Deletes the blob under `key`. Missing blobs are fine.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::OperationFailed {
                operation: "remove_store".to_string(),
                cause: e.to_string(),
            }),
        }
    }
}
