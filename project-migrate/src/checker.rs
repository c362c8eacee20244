use std::sync::Arc;

use crate::storage::StorageApi;
use crate::MigrateError;

/// Compares the destination project with the source once the migration finished.
pub struct AfterMigrationChecker {
    source: Arc<dyn StorageApi>,
    destination: Arc<dyn StorageApi>,
}

#[crate::log_context("Checker")]
impl AfterMigrationChecker {
    /// Creates a checker of the two projects.
    #[must_use]
    pub fn new(source: Arc<dyn StorageApi>, destination: Arc<dyn StorageApi>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Checks that every destination table exists in the source with the same number of rows.
    ///
    /// Every table is inspected before failing, so the log lists all mismatches.
    ///
    /// # Errors
    /// A user error when a table is missing or differs; Storage API failures
    /// other than a missing source table.
    pub async fn check(&self) -> Result<(), MigrateError> {
        let mut is_valid = true;
        let mut checked = 0_usize;

        for bucket in self.destination.list_buckets().await? {
            for table in self.destination.list_tables(&bucket.id).await? {
                checked += 1;
                let source_table = match self.source.get_table(&table.id).await {
                    Ok(source_table) => source_table,
                    Err(e) if e.is_client_error() => {
                        crate::warn!("{e}");
                        is_valid = false;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                if source_table.rows_count != table.rows_count {
                    crate::warn!(
                        "Bad row count: Bucket \"{}\", Table \"{}\".",
                        bucket.name,
                        table.name
                    );
                    is_valid = false;
                }
            }
        }

        crate::debug!("post_migration_check.completed tables={checked} valid={is_valid}");
        if is_valid {
            Ok(())
        } else {
            Err(MigrateError::user("Failed post migration check."))
        }
    }
}
