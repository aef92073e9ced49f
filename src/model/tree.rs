//! Tree entries and their canonical on-disk form.
//!
//! A tree's payload is a UTF-8 JSON array of `[name, [entry_kind, hash,
//! mode]]` triples sorted by name — an array, not an object, so that key
//! order in the encoded bytes is exactly the sort order rather than an
//! implementation detail of whichever JSON library wrote it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::Hash;

/// Default Unix mode for a directory entry when none was supplied.
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Default Unix mode for a file entry when none was supplied.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// What a tree entry points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Blob,
    Tree,
}

impl EntryKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
        }
    }

    fn default_mode(self) -> u32 {
        match self {
            Self::Blob => DEFAULT_FILE_MODE,
            Self::Tree => DEFAULT_DIR_MODE,
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = crate::ids::ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            other => Err(crate::ids::ValidationError {
                value: other.to_owned(),
                reason: "expected one of blob, tree".to_owned(),
            }),
        }
    }
}

/// One entry of a directory tree: a name plus what it points at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub hash: Hash,
    pub mode: u32,
}

impl TreeEntry {
    /// Builds an entry, applying the kind's default mode when none is given.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EntryKind, hash: Hash, mode: Option<u32>) -> Self {
        Self {
            name: name.into(),
            kind,
            hash,
            mode: mode.unwrap_or_else(|| kind.default_mode()) & 0o777,
        }
    }
}

/// Encodes a sorted slice of entries into the canonical tree payload bytes.
///
/// The caller is responsible for sorting by name; this function does not
/// re-sort so that callers building from an already-sorted `BTreeMap` pay no
/// extra cost.
#[must_use]
pub fn encode_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let array: Vec<Value> = entries
        .iter()
        .map(|e| {
            Value::Array(vec![
                Value::String(e.name.clone()),
                Value::Array(vec![
                    Value::String(e.kind.as_str().to_owned()),
                    Value::String(e.hash.as_str().to_owned()),
                    Value::Number(e.mode.into()),
                ]),
            ])
        })
        .collect();
    // serde_json's Vec<Value> serialization preserves insertion order, which
    // is the sorted order the caller already established.
    serde_json::to_vec(&Value::Array(array)).expect("tree payload is always valid JSON")
}

/// Decodes canonical tree payload bytes back into entries.
///
/// Accepts both the current 3-element form `[kind, hash, mode]` and the
/// legacy 2-element form `[kind, hash]`, filling in the kind's default mode
/// for the latter.
pub fn decode_tree(payload: &[u8]) -> Result<Vec<TreeEntry>, crate::error::StrataError> {
    let value: Value = serde_json::from_slice(payload).map_err(|e| invalid_tree(&e))?;
    let array = value.as_array().ok_or_else(|| invalid_tree("not an array"))?;
    let mut entries = Vec::with_capacity(array.len());
    for item in array {
        let pair = item.as_array().ok_or_else(|| invalid_tree("entry is not a pair"))?;
        let [name, rest] = pair.as_slice() else {
            return Err(invalid_tree("entry is not a 2-tuple"));
        };
        let name = name.as_str().ok_or_else(|| invalid_tree("name is not a string"))?;
        let rest = rest.as_array().ok_or_else(|| invalid_tree("entry body is not an array"))?;
        let kind_str = rest
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_tree("missing entry_kind"))?;
        let hash_str = rest
            .get(1)
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_tree("missing child hash"))?;
        let kind: EntryKind = kind_str.parse().map_err(|_| invalid_tree("bad entry_kind"))?;
        let hash = Hash::new(hash_str).map_err(|_| invalid_tree("bad child hash"))?;
        let mode = rest
            .get(2)
            .and_then(Value::as_u64)
            .map_or_else(|| kind.default_mode(), |m| (m as u32) & 0o777);
        entries.push(TreeEntry {
            name: name.to_owned(),
            kind,
            hash,
            mode,
        });
    }
    Ok(entries)
}

fn invalid_tree(detail: impl std::fmt::Display) -> crate::error::StrataError {
    crate::error::StrataError::ConfigInvalid {
        path: std::path::PathBuf::from("<tree payload>"),
        detail: format!("malformed tree entry: {detail}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash(byte: u8) -> Hash {
        Hash::digest("blob", &[byte])
    }

    #[test]
    fn encode_is_array_of_pairs() {
        let entries = vec![TreeEntry::new("a.txt", EntryKind::Blob, sample_hash(1), None)];
        let bytes = encode_tree(&entries);
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(value.is_array());
    }

    #[test]
    fn round_trip_preserves_entries() {
        let entries = vec![
            TreeEntry::new("a.txt", EntryKind::Blob, sample_hash(1), Some(0o600)),
            TreeEntry::new("sub", EntryKind::Tree, sample_hash(2), None),
        ];
        let bytes = encode_tree(&entries);
        let decoded = decode_tree(&bytes).unwrap();
        assert_eq!(decoded, entries);
    }

    #[test]
    fn decode_accepts_legacy_two_element_entries() {
        let hash = sample_hash(3);
        let legacy = serde_json::json!([["f", ["blob", hash.as_str()]]]);
        let bytes = serde_json::to_vec(&legacy).unwrap();
        let decoded = decode_tree(&bytes).unwrap();
        assert_eq!(decoded[0].mode, DEFAULT_FILE_MODE);
    }

    #[test]
    fn default_modes_differ_by_kind() {
        let blob = TreeEntry::new("f", EntryKind::Blob, sample_hash(4), None);
        let tree = TreeEntry::new("d", EntryKind::Tree, sample_hash(5), None);
        assert_eq!(blob.mode, DEFAULT_FILE_MODE);
        assert_eq!(tree.mode, DEFAULT_DIR_MODE);
    }

    #[test]
    fn mode_is_masked_to_permission_bits() {
        let e = TreeEntry::new("f", EntryKind::Blob, sample_hash(6), Some(0o100_644));
        assert_eq!(e.mode, 0o644);
    }
}
