#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid database uri: {0}")]
    Configuration(String),

    #[cfg(feature = "mysql")]
    #[error("connection `{0}`")]
    Connection(#[source] sqlx::Error),

    #[error("failed to get advisory lock `{0}`")]
    LockNotAcquired(String),

    #[error("failed to release advisory lock `{0}`")]
    LockNotReleased(String),

    #[error("migration `{version}` failed: {source}")]
    Execution {
        version: String,
        source: anyhow::Error,
    },

    #[error("engine is not open")]
    Closed,

    #[cfg(feature = "mysql")]
    #[error("sqlx `{0}`")]
    Sqlx(#[from] sqlx::Error),

    #[error("{0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[error("unknown migration type `{0}`")]
pub struct UnknownMigrationType(pub String);
