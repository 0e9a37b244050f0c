use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Ordered schema steps; `user_version` records the last applied one.
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (1, "catalogue", include_str!("schemas/schema_v1.sql")),
    (2, "presence sessions", include_str!("schemas/schema_v2.sql")),
    (3, "federation registry", include_str!("schemas/schema_v3.sql")),
];

pub(crate) const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let applied: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")?;

    if applied > CURRENT_SCHEMA_VERSION {
        bail!(
            "database schema v{applied} is newer than this build understands (v{CURRENT_SCHEMA_VERSION})"
        );
    }

    let pending: Vec<_> = MIGRATIONS
        .iter()
        .filter(|(version, _, _)| *version > applied)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to begin schema upgrade")?;
    for (version, name, sql) in pending {
        tx.execute_batch(sql)
            .with_context(|| format!("schema v{version} ({name}) failed"))?;
        tx.pragma_update(None, "user_version", version)
            .with_context(|| format!("failed to record schema v{version}"))?;
    }
    tx.commit().context("failed to commit schema upgrade")
}
