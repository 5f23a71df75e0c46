use sqlx::migrate::{MigrateError, Migrator};

use crate::QueuePool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &QueuePool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await
}
