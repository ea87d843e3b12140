use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    config::IndexerConfig,
    error::{Error, Result},
};

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

const INDEX_NAME: &str = "index_name";
const INDEXER_CONFIG: &str = "indexer_config";

/// Per-index settings kept next to the chunk index.
pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

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

    /// Forget every stored setting.
    pub fn clear(&self) -> Result<()> {
        let txn = self.db.begin_write()?;
        txn.delete_table(SETTINGS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;
        Ok(())
    }

    pub fn index_name(&self) -> Result<Option<String>> {
        self.get_setting(INDEX_NAME)
    }

    pub fn set_index_name(&self, name: &str) -> Result<()> {
        self.set_setting(INDEX_NAME, name)
    }

    /// The configuration the index was built with, if any.
    pub fn indexer_config(&self) -> Result<Option<IndexerConfig>> {
        self.get_setting(INDEXER_CONFIG)?
            .map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    /// Record `config` for a fresh index, or check it against the stored
    /// one. Chunking and stop words can't change without a clean rebuild,
    /// since existing chunks would no longer line up with new ones.
    pub fn ensure_indexer_config(&self, config: &IndexerConfig) -> Result<()> {
        let Some(stored) = self.indexer_config()? else {
            let json = serde_json::to_string(config)?;
            return self.set_setting(INDEXER_CONFIG, &json);
        };

        let mismatch = if stored.chunk_size != config.chunk_size {
            Some(("chunk size", stored.chunk_size, config.chunk_size))
        } else if stored.chunk_overlap != config.chunk_overlap {
            Some(("chunk overlap", stored.chunk_overlap, config.chunk_overlap))
        } else {
            None
        };
        if let Some((what, was, now)) = mismatch {
            return Err(Error::Config(format!(
                "index was built with {what} {was}, not {now}; \
                 rebuild with --clean to change it"
            )));
        }
        if stored.stop_set() != config.stop_set() {
            return Err(Error::Config(
                "index was built with a different stop word list; \
                 rebuild with --clean to change it"
                    .into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}
