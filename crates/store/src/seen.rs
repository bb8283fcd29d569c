use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};

/// Seen table: `fingerprint (16-char hex) → first_seen (RFC3339 UTC)`.
const SEEN_TABLE: TableDefinition<&str, &str> = TableDefinition::new("seen");

/// Durable set of profile fingerprints already processed.
///
/// Rows are immutable once inserted and persist across runs.  Concurrent
/// readers are fine; mutations go through one redb write transaction at a
/// time.
pub struct SeenStore {
    db: Database,
    path: PathBuf,
}

impl SeenStore {
    /// Open or create the store file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(&path)
            .with_context(|| format!("opening seen store at {}", path.display()))?;

        // Ensure the table exists so reads on a fresh file don't error.
        {
            let tx = db.begin_write()?;
            tx.open_table(SEEN_TABLE)?;
            tx.commit()?;
        }

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_seen(&self, fingerprint: &str) -> Result<bool> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(SEEN_TABLE)?;
        Ok(table.get(fingerprint)?.is_some())
    }

    /// Record a fingerprint with the current timestamp.  Re-marking an
    /// existing fingerprint keeps the original first-seen timestamp.
    pub fn mark_seen(&self, fingerprint: &str) -> Result<()> {
        let tx = self.db.begin_write()?;
        {
            let mut table = tx.open_table(SEEN_TABLE)?;
            if table.get(fingerprint)?.is_none() {
                let now = Utc::now().to_rfc3339();
                table.insert(fingerprint, now.as_str())?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn first_seen(&self, fingerprint: &str) -> Result<Option<String>> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(SEEN_TABLE)?;
        Ok(table.get(fingerprint)?.map(|v| v.value().to_string()))
    }

    pub fn len(&self) -> Result<u64> {
        let tx = self.db.begin_read()?;
        let table = tx.open_table(SEEN_TABLE)?;
        Ok(table.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
