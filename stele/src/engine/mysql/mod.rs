use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{ConnectOptions, Connection, Executor, MySqlConnection};

mod schema;
mod store;

use store::RecordStore;

use crate::{
    config::{EngineOptions, MySqlConfig},
    engine::DatabaseEngine,
    error::{Error, Result},
    migration::{MigrationRecord, MigrationSource, RecordCandidate, RecordRepair},
};

/// [`DatabaseEngine`] over one MySQL database. Owns a single session;
/// everything the engine does goes through that one connection, so the
/// advisory lock, the record table and the migration bodies all see the
/// same session state.
#[derive(Debug)]
pub struct MySqlEngine {
    config: MySqlConfig,
    options: EngineOptions,
    store: RecordStore,
    conn: Option<MySqlConnection>,
    applied_by: String,
}

impl MySqlEngine {
    pub fn new(config: MySqlConfig) -> Self {
        Self::with_options(config, EngineOptions::default())
    }

    pub fn with_options(config: MySqlConfig, options: EngineOptions) -> Self {
        let table = config
            .record_table
            .clone()
            .unwrap_or_else(|| options.record_table.to_owned());
        let lock_id = (options.lock_id)(&config.database, &[table.as_str()]);
        let store = RecordStore::new(&config.database, &table, &lock_id);

        Self {
            config,
            options,
            store,
            conn: None,
            applied_by: String::new(),
        }
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        Ok(Self::new(MySqlConfig::parse(uri)?))
    }

    pub fn database(&self) -> &str {
        self.store.database()
    }

    pub fn record_table(&self) -> &str {
        self.store.table()
    }
}

#[async_trait]
impl DatabaseEngine for MySqlEngine {
    async fn open(&mut self) -> Result<()> {
        let applied_by = (self.options.operator)().await?;

        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(Error::Connection)?;
        }

        let mut conn = self
            .config
            .connect_options
            .connect()
            .await
            .map_err(Error::Connection)?;

        schema::ensure_record_table(&self.store, &mut conn, &self.options.base_version).await?;

        self.conn = Some(conn);
        self.applied_by = applied_by;

        tracing::debug!("opened mysql engine on `{}`", self.store.database());

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.applied_by.clear();

        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(Error::Connection)?;
        }

        Ok(())
    }

    async fn lock(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::Closed)?;

        if self.store.acquire_lock(conn).await? {
            tracing::debug!("acquired advisory lock `{}`", self.store.lock_id());

            Ok(())
        } else {
            Err(Error::LockNotAcquired(self.store.lock_id().to_owned()))
        }
    }

    async fn unlock(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::Closed)?;

        if self.store.release_lock(conn).await? {
            Ok(())
        } else {
            Err(Error::LockNotReleased(self.store.lock_id().to_owned()))
        }
    }

    async fn drop(&mut self) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::Closed)?;

        let tables = self.store.table_names(conn).await?;

        if tables.is_empty() {
            return Ok(());
        }

        self.store.drop_tables(conn, &tables).await?;

        tracing::debug!(
            "dropped {} tables from `{}`",
            tables.len(),
            self.store.database()
        );

        Ok(())
    }

    async fn run(&mut self, source: &MigrationSource) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::Closed)?;

        let started = Instant::now();
        let outcome = conn.execute(sqlx::raw_sql(&source.body)).await;
        let execution_time = started.elapsed().as_secs_f64() * 1000.0;

        let candidate = RecordCandidate {
            version: source.version.to_owned(),
            kind: source.kind,
            title: source.title.to_owned(),
            hash: source.hash.to_owned(),
            applied_at: Utc::now(),
            applied_by: self.applied_by.to_owned(),
            execution_time,
            dirty: outcome.is_err(),
        };

        self.store.insert_record(conn, &candidate).await?;

        match outcome {
            Ok(_) => {
                tracing::debug!(
                    version = %source.version,
                    "migration applied in {execution_time:.3}ms"
                );

                Ok(())
            }
            Err(e) => Err(Error::Execution {
                version: source.version.to_owned(),
                source: e.into(),
            }),
        }
    }

    async fn repair(&mut self, repairs: &[RecordRepair]) -> Result<()> {
        let conn = self.conn.as_mut().ok_or(Error::Closed)?;

        self.store.delete_dirty_records(conn).await?;

        for repair in repairs {
            self.store
                .update_record_hash(conn, repair.id, &repair.hash)
                .await?;
        }

        Ok(())
    }

    async fn records(&mut self, start_id: i64) -> Result<Vec<MigrationRecord>> {
        let conn = self.conn.as_mut().ok_or(Error::Closed)?;

        self.store.records(conn, start_id).await
    }
}
