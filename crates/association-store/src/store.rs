//! JSON-file backed association store

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::{STORE_FILE_NAME, StoreError, StoreResult};

/// Identity registered with one database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationRecord {
    /// Name the password manager assigned to this client
    pub id: String,
    /// Base64 public identity key bound to `id`
    pub id_key: String,
}

/// Mapping from database hash to the identity registered with it
///
/// Changes stay in memory until [`AssociationStore::save`] is called.
#[derive(Debug)]
pub struct AssociationStore {
    path: PathBuf,
    records: BTreeMap<String, AssociationRecord>,
    dirty: bool,
}

impl AssociationStore {
    /// An empty store that will be written to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Read the store; a missing file yields an empty store
    pub fn load(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();

        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No association store at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(StoreError::Load { path, source }),
        };

        let records = if data.iter().all(u8::is_ascii_whitespace) {
            BTreeMap::new()
        } else {
            match serde_json::from_slice(&data) {
                Ok(records) => records,
                Err(source) => return Err(StoreError::Corrupt { path, source }),
            }
        };

        let store = Self {
            path,
            records,
            dirty: false,
        };
        debug!(
            "Loaded {} association(s) from {}",
            store.len(),
            store.path.display()
        );
        Ok(store)
    }

    pub fn has_key(&self, database: &str) -> bool {
        self.records.contains_key(database)
    }

    pub fn get_key(&self, database: &str) -> Option<&AssociationRecord> {
        self.records.get(database)
    }

    /// Insert or replace the record for `database`, returning the old one
    pub fn save_key(
        &mut self,
        database: impl Into<String>,
        record: AssociationRecord,
    ) -> Option<AssociationRecord> {
        let database = database.into();
        info!("Recording association '{}' for database {}", record.id, database);
        self.dirty = true;
        self.records.insert(database, record)
    }

    pub fn records(&self) -> impl Iterator<Item = (&str, &AssociationRecord)> {
        self.records.iter().map(|(db, record)| (db.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether there are changes not yet written by `save`
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole mapping, replacing the file atomically
    pub fn save(&mut self) -> StoreResult<()> {
        let mut data = serde_json::to_vec_pretty(&self.records)?;
        data.push(b'\n');

        self.write_atomically(&data)
            .map_err(|source| StoreError::Save {
                path: self.path.clone(),
                source,
            })?;

        self.dirty = false;
        debug!(
            "Saved {} association(s) to {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }

    fn write_atomically(&self, data: &[u8]) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // NamedTempFile is created owner-only (0600 on Unix)
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(data)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}

/// Default location: `<config dir>/kpxc-cli/associations.json`
pub fn default_store_path() -> StoreResult<PathBuf> {
    ProjectDirs::from("org", "kpxc", "kpxc-cli")
        .map(|dirs| dirs.config_dir().join(STORE_FILE_NAME))
        .ok_or(StoreError::NoConfigDir)
}
