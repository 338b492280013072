pub mod models;

use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::db::models::SensorReading;

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Latest stored reading per (site, kind), for seeding the in-memory cache
/// after a restart.
pub async fn latest_readings(pool: &PgPool) -> Result<Vec<SensorReading>> {
    let rows = sqlx::query_as::<_, SensorReading>(
        "SELECT DISTINCT ON (site_id, sensor_kind) \
             id, site_id, sensor_kind, recorded_at, value, unit \
         FROM sensor_readings \
         ORDER BY site_id, sensor_kind, recorded_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
