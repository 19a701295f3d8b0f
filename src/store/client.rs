use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::store::StoreError;

const MAX_CONNECTIONS: u32 = 5;

#[derive(Clone, Debug)]
pub(crate) struct Client {
    pool: SqlitePool,
}

impl Client {
    /// Opens a pool on `database_url`, creating the database file when missing.
    ///
    /// An in-memory database lives only as long as its connection, so such pools are pinned to a
    /// single connection that is never recycled.
    pub(crate) async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new().max_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };
        let pool = pool_options.connect_with(options).await?;

        sqlx::query(include_str!("../../resources/create_tables.sql")).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_in_memory_urls() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite:file:sync?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://events.db"));
    }

    #[tokio::test]
    async fn in_memory_database_survives_between_queries() -> anyhow::Result<()> {
        let client = Client::connect("sqlite::memory:").await?;

        sqlx::query("CREATE TABLE probe (id INTEGER)").execute(client.pool()).await?;
        sqlx::query("INSERT INTO probe (id) VALUES (1)").execute(client.pool()).await?;
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM probe").fetch_one(client.pool()).await?;

        assert_eq!(count, 1);
        Ok(())
    }
}
