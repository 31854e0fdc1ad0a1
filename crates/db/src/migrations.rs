//! Applies module migrations exactly once per database.

use shelf_kernel::Migration;
use sqlx_core::query::query;
use sqlx_core::raw_sql::raw_sql;
use sqlx_postgres::PgPool;

use crate::error::{DbError, Result};

const LEDGER_DDL: &str = r#"
    CREATE TABLE IF NOT EXISTS _shelf_migrations (
        module     TEXT        NOT NULL,
        id         TEXT        NOT NULL,
        applied_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (module, id)
    )
"#;

/// Apply every migration not yet recorded in `_shelf_migrations`.
///
/// Each migration runs in its own transaction together with its ledger row, so a
/// failure leaves neither the schema change nor the ledger entry behind.
/// Returns the number of migrations applied by this call.
pub async fn run(pool: &PgPool, migrations: &[(String, Migration)]) -> Result<usize> {
    raw_sql(LEDGER_DDL).execute(pool).await?;

    let mut applied = 0;
    for (module, migration) in migrations {
        let mut tx = pool.begin().await?;

        let claimed = query(
            "INSERT INTO _shelf_migrations (module, id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(module.as_str())
        .bind(migration.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            tracing::debug!(module = %module, id = migration.id, "migration already applied");
            continue;
        }

        raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .map_err(|source| DbError::Migration {
                module: module.clone(),
                id: migration.id.to_string(),
                source,
            })?;

        tx.commit().await?;
        tracing::info!(module = %module, id = migration.id, "migration applied");
        applied += 1;
    }

    Ok(applied)
}
