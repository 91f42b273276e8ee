use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::{error::Result, ingestion::IndexSummary};

/// Registered folder path -> engine index uid.
const FOLDERS: TableDefinition<&str, &str> = TableDefinition::new("folders");
/// Index uid -> JSON encoded [`FolderStats`].
const FOLDER_STATS: TableDefinition<&str, &str> =
    TableDefinition::new("folder_stats");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Outcome of the last indexing run over a folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderStats {
    pub files_found: usize,
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_indexed: usize,
    pub chunks_failed: usize,
    /// Seconds since the Unix epoch.
    pub indexed_at: u64,
}

impl FolderStats {
    pub fn from_summary(summary: &IndexSummary, indexed_at: u64) -> Self {
        Self {
            files_found: summary.files_found,
            files_indexed: summary.files_indexed,
            files_failed: summary.files_failed,
            chunks_indexed: summary.chunks_indexed,
            chunks_failed: summary.chunks_failed,
            indexed_at,
        }
    }
}

pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(FOLDERS)?;
        txn.open_table(FOLDER_STATS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Folders --

    pub fn set_folder(&self, folder: &str, index_uid: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FOLDERS)?;
            table.insert(folder, index_uid)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_folder(&self, folder: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FOLDERS)?;
        Ok(table.get(folder)?.map(|v| v.value().to_string()))
    }

    /// Forget a folder together with its stats.
    pub fn remove_folder(&self, folder: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut folders = txn.open_table(FOLDERS)?;
            let uid = folders.remove(folder)?.map(|v| v.value().to_string());
            if let Some(uid) = &uid {
                let mut stats = txn.open_table(FOLDER_STATS)?;
                stats.remove(uid.as_str())?;
            }
            uid.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// All registered folders as `(path, index uid)`, sorted by path.
    pub fn list_folders(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FOLDERS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    // -- Folder stats --

    pub fn set_folder_stats(
        &self,
        index_uid: &str,
        stats: &FolderStats,
    ) -> Result<()> {
        let json = serde_json::to_string(stats)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(FOLDER_STATS)?;
            table.insert(index_uid, json.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_folder_stats(
        &self,
        index_uid: &str,
    ) -> Result<Option<FolderStats>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(FOLDER_STATS)?;
        match table.get(index_uid)? {
            Some(v) => Ok(Some(serde_json::from_str(v.value())?)),
            None => Ok(None),
        }
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}
