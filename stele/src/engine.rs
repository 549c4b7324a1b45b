use async_trait::async_trait;

use crate::{
    error::Result,
    migration::{MigrationRecord, MigrationSource, RecordRepair},
};

#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "mysql")]
mod mysql;

#[cfg(feature = "memory")]
pub use memory::*;
#[cfg(feature = "mysql")]
pub use mysql::*;

/// The fixed lifecycle surface a migration framework drives. One engine
/// instance owns one database session; callers sequence the calls
/// themselves, and concurrent migrators are serialized only by the
/// advisory lock.
///
/// Every operation except `open` and `close` requires an open session
/// and fails with [`Error::Closed`](crate::Error::Closed) otherwise.
/// Nothing here retries or queues; every failure propagates once.
#[async_trait]
pub trait DatabaseEngine: Send {
    /// Opens the session, resolves the operator identity once, and
    /// ensures the migration-record table exists with the current
    /// column set. Reopening an already-initialized database changes
    /// nothing.
    async fn open(&mut self) -> Result<()>;

    /// Ends the session. Safe to call when `open` never completed;
    /// any advisory lock still held dies with the session.
    async fn close(&mut self) -> Result<()>;

    /// Takes the session-scoped advisory lock, blocking until granted.
    /// A falsy grant from the database is
    /// [`Error::LockNotAcquired`](crate::Error::LockNotAcquired).
    async fn lock(&mut self) -> Result<()>;

    /// Releases the advisory lock. Releasing a lock this session does
    /// not hold is [`Error::LockNotReleased`](crate::Error::LockNotReleased);
    /// the session stays usable afterwards.
    async fn unlock(&mut self) -> Result<()>;

    /// Drops every table in the target database, the record table
    /// included. An empty database is a trivial success.
    async fn drop(&mut self) -> Result<()>;

    /// Executes one migration and always inserts exactly one record:
    /// clean on success, `dirty` on failure, with the original failure
    /// re-raised once the record write has settled.
    async fn run(&mut self, source: &MigrationSource) -> Result<()>;

    /// Deletes every dirty record, then rewrites hashes by record id.
    /// A repair pointing at a record that was just deleted (or never
    /// existed) is silently skipped.
    async fn repair(&mut self, repairs: &[RecordRepair]) -> Result<()>;

    /// All records with `id >= start_id`, ascending by id, dirty ones
    /// included.
    async fn records(&mut self, start_id: i64) -> Result<Vec<MigrationRecord>>;
}
