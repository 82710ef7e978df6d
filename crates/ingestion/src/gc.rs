//! Grid tables left behind by failed or superseded registrations.

use std::collections::BTreeSet;

use storage::{StorageBackend, CATALOG_TABLES};
use tracing::info;

use crate::error::{IngestionError, Result};

/// Tables matching `prefix` that no catalog entry references.
///
/// The prefix must not be blank and catalog tables are never candidates.
pub async fn find_orphan_tables<B: StorageBackend>(backend: &B, prefix: &str) -> Result<Vec<String>> {
    if prefix.trim().is_empty() {
        return Err(IngestionError::InvalidConfig(
            "orphan table prefix must not be empty".into(),
        ));
    }
    let registered: BTreeSet<String> = backend.registered_tables().await?.into_iter().collect();
    let orphans = backend
        .list_tables(prefix)
        .await?
        .into_iter()
        .filter(|t| !registered.contains(t) && !CATALOG_TABLES.contains(&t.as_str()))
        .collect();
    Ok(orphans)
}

/// Drop every orphan table matching `prefix`, returning the dropped names.
pub async fn drop_orphan_tables<B: StorageBackend>(backend: &B, prefix: &str) -> Result<Vec<String>> {
    let orphans = find_orphan_tables(backend, prefix).await?;
    for table in &orphans {
        backend.drop_table(table).await?;
        info!(table = %table, "Dropped orphan grid table");
    }
    Ok(orphans)
}
