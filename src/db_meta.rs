use rusqlite::{Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::schema;

/// Creates `schema` on a fresh database and records its version. An existing
/// database with a different version is refused.
pub fn ensure_schema(conn: &mut Connection, schema: &str) -> Result<()> {
    trace!("trying to get schema version");

    conn.execute_batch(schema::META_SCHEMA)?;

    let schema_version: Option<u32> = conn
        .query_row(
            "SELECT value FROM library_meta WHERE key = 'schema'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(schema_version) = schema_version {
        if schema_version != schema::SCHEMA_VERSION {
            error!(
                "unsupported schema version: got {}, expected {}",
                schema_version,
                schema::SCHEMA_VERSION
            );
            return Err(Error::SchemaVersion {
                found: schema_version,
                expected: schema::SCHEMA_VERSION,
            });
        }

        debug!("schema version up-to-date, doing nothing");
    } else {
        debug!("schema meta not present, creating schema");

        let tran = conn.transaction()?;

        tran.execute(
            "INSERT INTO library_meta (key, value) VALUES ('schema', ?1)",
            [schema::SCHEMA_VERSION],
        )?;
        tran.execute_batch(schema)?;

        tran.commit()?;
    }

    Ok(())
}
