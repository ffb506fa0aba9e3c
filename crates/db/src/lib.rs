pub mod graph;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use strata_common::error::{StrataError, StrataResult};

/// Create a Postgres connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> StrataResult<PgPool> {
    tracing::info!("connecting to database");
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| StrataError::Database(e.to_string()))
}
