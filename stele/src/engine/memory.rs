use std::{collections::HashMap, sync::Arc, time::Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::{
    config::{EngineOptions, ENGINE_IDENTITY},
    engine::DatabaseEngine,
    error::{Error, Result},
    migration::{MigrationRecord, MigrationSource, MigrationType, RecordCandidate, RecordRepair},
};

/// Decides whether a migration body "executes" in memory. The default
/// accepts everything; tests and dry runs inject failures here.
pub type BodyExecutor = Arc<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;

/// Shared in-process database. Cloning is cheap and every clone sees
/// the same records and advisory locks, so several [`MemoryEngine`]
/// sessions can contend over one database the way real migrators do.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase(Arc<Shared>);

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<State>,
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

#[derive(Debug, Default)]
struct State {
    initialized: bool,
    next_id: i64,
    records: Vec<MigrationRecord>,
}

impl State {
    fn bump_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// One session onto a [`MemoryDatabase`]. Bodies are recorded, not
/// parsed; whether they "succeed" is up to the configured executor.
pub struct MemoryEngine {
    db: MemoryDatabase,
    name: String,
    options: EngineOptions,
    executor: BodyExecutor,
    lock_id: String,
    open: bool,
    applied_by: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl MemoryEngine {
    pub fn new(db: &MemoryDatabase) -> Self {
        Self::with_options(db, "memory", EngineOptions::default())
    }

    pub fn with_options(
        db: &MemoryDatabase,
        name: impl Into<String>,
        options: EngineOptions,
    ) -> Self {
        let name = name.into();
        let lock_id = (options.lock_id)(&name, &[options.record_table.as_str()]);

        Self {
            db: db.clone(),
            name,
            options,
            executor: Arc::new(|_| Ok(())),
            lock_id,
            open: false,
            applied_by: String::new(),
            held: None,
        }
    }

    pub fn executor<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.executor = Arc::new(f);

        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::Closed)
        }
    }
}

#[async_trait]
impl DatabaseEngine for MemoryEngine {
    async fn open(&mut self) -> Result<()> {
        let applied_by = (self.options.operator)().await?;

        let started = Instant::now();

        {
            let mut state = self.db.0.state.write();

            if !state.initialized {
                state.initialized = true;

                let candidate = RecordCandidate {
                    version: self.options.base_version.to_owned(),
                    kind: MigrationType::Do,
                    title: "Base Migration".to_owned(),
                    hash: String::new(),
                    applied_at: Utc::now(),
                    applied_by: ENGINE_IDENTITY.to_owned(),
                    execution_time: started.elapsed().as_secs_f64() * 1000.0,
                    dirty: false,
                };

                let id = state.bump_id();
                state.records.push(candidate.into_record(id));
            }
        }

        self.applied_by = applied_by;
        self.open = true;

        tracing::debug!("opened memory engine on `{}`", self.name);

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        self.applied_by.clear();
        self.held = None;

        Ok(())
    }

    async fn lock(&mut self) -> Result<()> {
        self.ensure_open()?;

        if self.held.is_some() {
            return Ok(());
        }

        let mutex = {
            let mut locks = self.db.0.locks.lock();
            locks.entry(self.lock_id.to_owned()).or_default().clone()
        };

        self.held = Some(mutex.lock_owned().await);

        tracing::debug!("acquired advisory lock `{}`", self.lock_id);

        Ok(())
    }

    async fn unlock(&mut self) -> Result<()> {
        self.ensure_open()?;

        match self.held.take() {
            Some(guard) => {
                drop(guard);

                Ok(())
            }
            None => Err(Error::LockNotReleased(self.lock_id.to_owned())),
        }
    }

    async fn drop(&mut self) -> Result<()> {
        self.ensure_open()?;

        let mut state = self.db.0.state.write();
        *state = State::default();

        Ok(())
    }

    async fn run(&mut self, source: &MigrationSource) -> Result<()> {
        self.ensure_open()?;

        let started = Instant::now();
        let outcome = (self.executor)(&source.body);
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

        {
            let mut state = self.db.0.state.write();
            let id = state.bump_id();
            state.records.push(candidate.into_record(id));
        }

        match outcome {
            Ok(()) => Ok(()),
            Err(source_err) => Err(Error::Execution {
                version: source.version.to_owned(),
                source: source_err,
            }),
        }
    }

    async fn repair(&mut self, repairs: &[RecordRepair]) -> Result<()> {
        self.ensure_open()?;

        let mut state = self.db.0.state.write();

        state.records.retain(|record| !record.dirty);

        for repair in repairs {
            if let Some(record) = state.records.iter_mut().find(|r| r.id == repair.id) {
                record.hash = repair.hash.to_owned();
            }
        }

        Ok(())
    }

    async fn records(&mut self, start_id: i64) -> Result<Vec<MigrationRecord>> {
        self.ensure_open()?;

        let state = self.db.0.state.read();

        Ok(state
            .records
            .iter()
            .filter(|record| record.id >= start_id)
            .cloned()
            .collect())
    }
}
