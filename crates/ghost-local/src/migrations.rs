use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
            r.get(0)
        })?;

    if version < 1 {
        info!("Local state: running migration v1 (profile + vote markers)");
        conn.execute_batch(
            "
            CREATE TABLE profile (
                slot        INTEGER PRIMARY KEY CHECK (slot = 1),
                identity_id TEXT NOT NULL,
                name        TEXT NOT NULL,
                color       TEXT NOT NULL,
                saved_at    TEXT NOT NULL
            );

            CREATE TABLE poll_votes (
                poll_id     TEXT PRIMARY KEY,
                option      TEXT NOT NULL,
                voted_at    TEXT NOT NULL
            );

            CREATE TABLE handled_kicks (
                poll_id     TEXT PRIMARY KEY,
                handled_at  TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
