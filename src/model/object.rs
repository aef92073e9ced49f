//! CAS object kinds and the shape of a stored object.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The three kinds of content-addressed object. The kind is folded into the
/// hash prefix so a blob and a tree that happen to share bytes never
/// collide.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Blob,
    Tree,
    State,
}

impl ObjectKind {
    /// The lowercase string used as the hash type prefix and the `kind`
    /// column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::State => "state",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectKind {
    type Err = crate::ids::ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "state" => Ok(Self::State),
            other => Err(crate::ids::ValidationError {
                value: other.to_owned(),
                reason: "expected one of blob, tree, state".to_owned(),
            }),
        }
    }
}

/// Where an object's payload physically lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// Payload is stored inline in the database row.
    Inline,
    /// Payload is stored on the filesystem under `<blobs_dir>`.
    Fs,
}

/// An object fetched out of the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub kind: ObjectKind,
    pub size: u64,
    pub payload: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in [ObjectKind::Blob, ObjectKind::Tree, ObjectKind::State] {
            let s = kind.as_str();
            assert_eq!(ObjectKind::from_str(s).unwrap(), kind);
        }
    }

    #[test]
    fn kind_rejects_unknown() {
        assert!(ObjectKind::from_str("nope").is_err());
    }
}
