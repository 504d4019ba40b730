pub mod schema;

use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use tracing::info;

#[derive(Clone)]
pub struct Db {
    pub pool: AnyPool,
}

impl Db {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        sqlx::any::install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        info!(max_connections, "database pool established");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        schema::migrate(&self.pool).await
    }

    /// Drops every table and recreates the schema from scratch.
    pub async fn reset(&self) -> anyhow::Result<()> {
        schema::drop_all(&self.pool).await?;
        schema::migrate(&self.pool).await
    }
}
