//! Aggregate statistics over a [`super::ContentStore`].

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::error::Result;

/// Summary counts returned by [`super::ContentStore::stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total_objects: u64,
    pub total_bytes: u64,
    pub by_kind: BTreeMap<String, u64>,
}

pub(super) fn collect(conn: &Connection) -> Result<StoreStats> {
    let mut stats = StoreStats::default();
    let (total_objects, total_bytes): (i64, i64) =
        conn.query_row("SELECT COUNT(*), COALESCE(SUM(size), 0) FROM objects", [], |r| Ok((r.get(0)?, r.get(1)?)))?;
    #[allow(clippy::cast_sign_loss)]
    {
        stats.total_objects = total_objects as u64;
        stats.total_bytes = total_bytes as u64;
    }

    let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM objects GROUP BY kind")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    for row in rows {
        let (kind, count) = row?;
        #[allow(clippy::cast_sign_loss)]
        stats.by_kind.insert(kind, count as u64);
    }
    Ok(stats)
}
