//! Fixed-size float vectors attached to intents, queried by cosine
//! similarity.

use rusqlite::{OptionalExtension, params};

use crate::error::Result;
use crate::ids::IntentId;

/// Packs a vector of `f32`s into little-endian IEEE-754 bytes, the on-disk
/// wire form for an embedding's `vector_bytes`.
#[must_use]
pub fn pack(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Unpacks little-endian IEEE-754 bytes back into a vector of `f32`s.
#[must_use]
pub fn unpack(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// Cosine similarity between two equal-length vectors. Returns `0.0` if
/// either vector has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

pub(crate) fn init_table(conn: &rusqlite::Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS embeddings (
            intent_id TEXT PRIMARY KEY,
            vector BLOB NOT NULL,
            model TEXT NOT NULL,
            dimensions INTEGER NOT NULL,
            created_at REAL NOT NULL
        );",
    )?;
    Ok(())
}

/// Stores (or replaces) the embedding for an intent.
pub(crate) fn put(
    conn: &rusqlite::Connection,
    intent_id: &IntentId,
    vector: &[f32],
    model: &str,
    created_at: f64,
) -> Result<()> {
    let bytes = pack(vector);
    conn.execute(
        "INSERT INTO embeddings (intent_id, vector, model, dimensions, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(intent_id) DO UPDATE SET vector = excluded.vector, model = excluded.model,
            dimensions = excluded.dimensions, created_at = excluded.created_at",
        params![intent_id.as_str(), bytes, model, vector.len() as i64, created_at],
    )?;
    Ok(())
}

/// Finds the `limit` intents whose stored embedding is most cosine-similar
/// to `query`, highest similarity first.
pub(crate) fn query(conn: &rusqlite::Connection, query: &[f32], limit: usize) -> Result<Vec<(IntentId, f32)>> {
    let mut stmt = conn.prepare("SELECT intent_id, vector FROM embeddings")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, Vec<u8>>(1)?)))?;
    let mut scored = Vec::new();
    for row in rows {
        let (intent_id, bytes) = row?;
        let vector = unpack(&bytes);
        let score = cosine_similarity(query, &vector);
        let Ok(id) = intent_id.parse::<IntentId>() else {
            continue;
        };
        scored.push((id, score));
    }
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    Ok(scored)
}

pub(crate) fn lookup_intent_id(conn: &rusqlite::Connection, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM embeddings WHERE intent_id = ?1", params![id], |r| r.get(0))
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips() {
        let v = vec![1.0_f32, -2.5, 3.25];
        assert_eq!(unpack(&pack(&v)), v);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_zero_vector_is_zero() {
        let a = vec![0.0_f32, 0.0];
        let b = vec![1.0_f32, 2.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

}
