use std::time::Instant;

use chrono::Utc;
use sqlx::MySqlConnection;

use super::store::RecordStore;
use crate::{
    config::ENGINE_IDENTITY,
    error::Result,
    migration::{MigrationType, RecordCandidate},
};

/// Columns the record table has grown since the baseline DDL. Freshly
/// created tables pick these up right after the CREATE; tables written
/// by older releases get only the ones they are missing. Columns are
/// never dropped, renamed or retyped.
const EVOLVED_COLUMNS: &[(&str, &str)] = &[("dirty", "BOOLEAN NOT NULL DEFAULT FALSE")];

/// Brings the record table to the current schema, creating it when it
/// does not exist yet. Only a fresh creation inserts the base record,
/// stamped with the engine identity and the span of the DDL work.
pub async fn ensure_record_table(
    store: &RecordStore,
    conn: &mut MySqlConnection,
    base_version: &str,
) -> Result<()> {
    let existing = store.column_names(conn).await?;
    let fresh = existing.is_empty();

    let started = Instant::now();

    if fresh {
        store.create_table(conn).await?;
    }

    for (name, definition) in missing_columns(&existing) {
        store.add_column(conn, name, definition).await?;
    }

    let execution_time = started.elapsed().as_secs_f64() * 1000.0;

    if fresh {
        store
            .insert_record(
                conn,
                &RecordCandidate {
                    version: base_version.to_owned(),
                    kind: MigrationType::Do,
                    title: "Base Migration".to_owned(),
                    hash: String::new(),
                    applied_at: Utc::now(),
                    applied_by: ENGINE_IDENTITY.to_owned(),
                    execution_time,
                    dirty: false,
                },
            )
            .await?;
    }

    Ok(())
}

fn missing_columns(existing: &[String]) -> Vec<(&'static str, &'static str)> {
    EVOLVED_COLUMNS
        .iter()
        .copied()
        .filter(|(name, _)| !existing.iter().any(|column| column == name))
        .collect()
}
