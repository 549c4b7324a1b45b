use sqlx::{Executor, MySqlConnection};

use crate::{
    error::Result,
    migration::{MigrationRecord, RecordCandidate},
};

/// Owns every bookkeeping statement the engine sends. Identifiers are
/// fixed at construction and interpolated; values always travel as bind
/// parameters.
#[derive(Debug, Clone)]
pub struct RecordStore {
    database: String,
    table: String,
    lock_id: String,
}

impl RecordStore {
    pub fn new(database: &str, table: &str, lock_id: &str) -> Self {
        Self {
            database: database.to_owned(),
            table: table.to_owned(),
            lock_id: lock_id.to_owned(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn lock_id(&self) -> &str {
        &self.lock_id
    }

    pub async fn column_names(&self, conn: &mut MySqlConnection) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT column_name FROM information_schema.columns WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
        )
        .bind(&self.database)
        .bind(&self.table)
        .fetch_all(&mut *conn)
        .await?;

        Ok(names)
    }

    pub async fn create_table(&self, conn: &mut MySqlConnection) -> Result<()> {
        let table = &self.table;
        let sql = format!(
            r#"
            CREATE TABLE `{table}` (
                `id` BIGINT NOT NULL AUTO_INCREMENT,
                `version` VARCHAR(128) NOT NULL,
                `type` VARCHAR(16) NOT NULL,
                `title` TEXT NOT NULL,
                `hash` TEXT NOT NULL,
                `applied_at` DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                `applied_by` VARCHAR(255) NOT NULL DEFAULT '',
                `execution_time` DOUBLE NOT NULL DEFAULT 0,
                PRIMARY KEY (`id`)
            )
            "#
        );

        conn.execute(sqlx::raw_sql(&sql)).await?;

        Ok(())
    }

    pub async fn add_column(
        &self,
        conn: &mut MySqlConnection,
        name: &str,
        definition: &str,
    ) -> Result<()> {
        let table = &self.table;
        let sql = format!("ALTER TABLE `{table}` ADD COLUMN `{name}` {definition}");

        conn.execute(sqlx::raw_sql(&sql)).await?;

        Ok(())
    }

    /// `SELECT GET_LOCK(id, -1)` blocks in the server until the lock is
    /// granted; 0 and NULL both mean the session did not get it.
    pub async fn acquire_lock(&self, conn: &mut MySqlConnection) -> Result<bool> {
        let granted = sqlx::query_scalar::<_, Option<i64>>("SELECT GET_LOCK(?, -1)")
            .bind(&self.lock_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(granted.unwrap_or(0) == 1)
    }

    pub async fn release_lock(&self, conn: &mut MySqlConnection) -> Result<bool> {
        let released = sqlx::query_scalar::<_, Option<i64>>("SELECT RELEASE_LOCK(?)")
            .bind(&self.lock_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(released.unwrap_or(0) == 1)
    }

    pub async fn table_names(&self, conn: &mut MySqlConnection) -> Result<Vec<String>> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT table_name FROM information_schema.tables WHERE table_schema = ? AND table_type = 'BASE TABLE'",
        )
        .bind(&self.database)
        .fetch_all(&mut *conn)
        .await?;

        Ok(names)
    }

    /// Single batch: foreign key checks off, drop everything, checks
    /// back on. FOREIGN_KEY_CHECKS is session scoped.
    pub async fn drop_tables(&self, conn: &mut MySqlConnection, tables: &[String]) -> Result<()> {
        let list = tables
            .iter()
            .map(|name| format!("`{name}`"))
            .collect::<Vec<String>>()
            .join(", ");

        let sql = format!(
            "SET FOREIGN_KEY_CHECKS = 0; DROP TABLE IF EXISTS {list}; SET FOREIGN_KEY_CHECKS = 1;"
        );

        conn.execute(sqlx::raw_sql(&sql)).await?;

        Ok(())
    }

    pub async fn insert_record(
        &self,
        conn: &mut MySqlConnection,
        record: &RecordCandidate,
    ) -> Result<()> {
        let table = &self.table;

        sqlx::query(
            format!(
                "INSERT INTO `{table}` (`version`, `type`, `title`, `hash`, `applied_at`, `applied_by`, `execution_time`, `dirty`) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            )
            .as_str(),
        )
        .bind(&record.version)
        .bind(record.kind.as_str())
        .bind(&record.title)
        .bind(&record.hash)
        .bind(record.applied_at)
        .bind(&record.applied_by)
        .bind(record.execution_time)
        .bind(record.dirty)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn delete_dirty_records(&self, conn: &mut MySqlConnection) -> Result<()> {
        let table = &self.table;

        sqlx::query(format!("DELETE FROM `{table}` WHERE `dirty` = TRUE").as_str())
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    /// Misses are silent: updating an id that is gone affects zero rows.
    pub async fn update_record_hash(
        &self,
        conn: &mut MySqlConnection,
        id: i64,
        hash: &str,
    ) -> Result<()> {
        let table = &self.table;

        sqlx::query(format!("UPDATE `{table}` SET `hash` = ? WHERE `id` = ?").as_str())
            .bind(hash)
            .bind(id)
            .execute(&mut *conn)
            .await?;

        Ok(())
    }

    pub async fn records(
        &self,
        conn: &mut MySqlConnection,
        start_id: i64,
    ) -> Result<Vec<MigrationRecord>> {
        let table = &self.table;

        let records = sqlx::query_as::<_, MigrationRecord>(
            format!(
                "SELECT `id`, `version`, `type`, `title`, `hash`, `applied_at`, `applied_by`, `execution_time`, `dirty` FROM `{table}` WHERE `id` >= ? ORDER BY `id` ASC"
            )
            .as_str(),
        )
        .bind(start_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(records)
    }
}
