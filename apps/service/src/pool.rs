use std::path::Path;

use deadpool::managed::{self, Pool, RecycleError, RecycleResult};
use libsql::{Builder, Connection, Database, Error as LibsqlError};

pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        self.database.connect()
    }

    async fn recycle(&self, conn: &mut Self::Type, _: &managed::Metrics) -> RecycleResult<Self::Error> {
        let mut rows = conn.query("SELECT 1", ()).await?;
        match rows.next().await? {
            Some(row) if row.get::<i64>(0)? == 1 => Ok(()),
            _ => Err(RecycleError::Message("health check returned an unexpected row".into())),
        }
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) a local database file and wrap it in a pool
pub async fn open_pool(path: &Path, max_size: usize) -> anyhow::Result<LibsqlPool> {
    let database = Builder::new_local(path).build().await?;
    let pool = Pool::builder(LibsqlManager::new(database)).max_size(max_size).build()?;
    Ok(pool)
}
