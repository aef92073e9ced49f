//! Validated newtype identifiers.
//!
//! Every identifier that crosses an API boundary is a distinct type rather
//! than a bare `String`, so a lane name can never be passed where a state id
//! is expected. Validation happens once, at construction: parse, don't
//! validate downstream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Why a name or identifier failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// The offending value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

fn reject(value: &str, reason: &str) -> ValidationError {
    ValidationError {
        value: value.to_owned(),
        reason: reason.to_owned(),
    }
}

/// A content hash: 64 lowercase hex characters (SHA-256 digest).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hash(String);

impl Hash {
    /// Validates and wraps a hex digest string.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.len() != 64 {
            return Err(reject(&s, "hash must be exactly 64 hex characters"));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(reject(&s, "hash must be lowercase hex"));
        }
        Ok(Self(s))
    }

    /// Computes the hash of `payload`, type-prefixed as `"<kind>:<len>:"` to
    /// prevent cross-kind collisions, per the on-disk hash derivation rule.
    pub fn digest(kind: &str, payload: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(b":");
        hasher.update(payload.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(payload);
        let digest = hasher.finalize();
        Self(data_encoding_hex(&digest))
    }

    /// Borrows the underlying hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn data_encoding_hex(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Hash {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Hash {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Hash> for String {
    fn from(h: Hash) -> Self {
        h.0
    }
}

impl Serialize for Hash {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

/// A state id. Identical shape to [`Hash`] (states are hashed the same way
/// as blobs and trees, just under the `"state"` type prefix) but kept as a
/// distinct type so a state id can't be passed where a blob/tree hash is
/// expected.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(Hash);

impl StateId {
    /// Wraps an already-validated hash as a state id.
    #[must_use]
    pub const fn from_hash(hash: Hash) -> Self {
        Self(hash)
    }

    /// Borrows the underlying hash.
    #[must_use]
    pub const fn hash(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for StateId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Hash::new(s).map(Self)
    }
}

impl TryFrom<String> for StateId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Hash::new(s).map(Self)
    }
}

impl From<StateId> for String {
    fn from(id: StateId) -> Self {
        id.0.into()
    }
}

impl Serialize for StateId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for StateId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Hash::deserialize(d).map(Self)
    }
}

/// Generates a random 128-bit id rendered as 32 lowercase hex characters.
/// Used for intent and transition ids, which (unlike states) are not
/// content-derived — two identical intents proposed moments apart must not
/// collide.
fn random_id() -> String {
    let bits: u128 = rand::random();
    format!("{bits:032x}")
}

macro_rules! random_id_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(random_id())
            }

            /// Borrows the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::try_from(s.to_owned())
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                if s.is_empty() {
                    return Err(reject(&s, "must not be empty"));
                }
                if s.contains('\0') {
                    return Err(reject(&s, "must not contain a NUL byte"));
                }
                Ok(Self(s))
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.0
            }
        }
    };
}

random_id_type!(IntentId, "Identifies a recorded intent.");
random_id_type!(TransitionId, "Identifies a proposed/evaluated transition.");

/// Validates a path-separator-free, traversal-free name shared by lanes and
/// workspaces: non-empty, no NUL byte, no `..`, no `/` or `\`.
fn validate_segment_name(s: &str) -> Result<(), ValidationError> {
    if s.is_empty() {
        return Err(reject(s, "must not be empty"));
    }
    if s.contains('\0') {
        return Err(reject(s, "must not contain a NUL byte"));
    }
    if s.contains("..") {
        return Err(reject(s, "must not contain '..'"));
    }
    if s.contains('/') || s.contains('\\') {
        return Err(reject(
            s,
            "must not contain a path separator; use '-' instead",
        ));
    }
    Ok(())
}

macro_rules! segment_name_type {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps a name.
            pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
                let s = s.into();
                validate_segment_name(&s)?;
                Ok(Self(s))
            }

            /// Borrows the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;
            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.0
            }
        }
    };
}

segment_name_type!(LaneName, "A lane name: no path separators, no `..`, no NUL.");
segment_name_type!(
    WorkspaceName,
    "A workspace name: no path separators, no `..`, no NUL. `\"main\"` is reserved for the repository root."
);

/// An opaque agent identity string, free-form beyond basic sanity checks.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AgentId(String);

impl AgentId {
    /// Validates and wraps an agent identity.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if s.is_empty() {
            return Err(reject(&s, "must not be empty"));
        }
        if s.contains('\0') {
            return Err(reject(&s, "must not contain a NUL byte"));
        }
        Ok(Self(s))
    }

    /// Borrows the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AgentId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for AgentId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AgentId> for String {
    fn from(v: AgentId) -> Self {
        v.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_rejects_wrong_length() {
        assert!(Hash::new("abc").is_err());
    }

    #[test]
    fn hash_rejects_uppercase() {
        let s = "A".repeat(64);
        assert!(Hash::new(s).is_err());
    }

    #[test]
    fn hash_digest_is_type_prefixed() {
        let a = Hash::digest("blob", b"hello");
        let b = Hash::digest("tree", b"hello");
        assert_ne!(a, b, "same payload under different kinds must not collide");
    }

    #[test]
    fn hash_digest_is_deterministic() {
        let a = Hash::digest("blob", b"hello");
        let b = Hash::digest("blob", b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn hash_round_trips_through_string() {
        let h = Hash::digest("blob", b"data");
        let s: String = h.clone().into();
        let back = Hash::try_from(s).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn state_id_wraps_hash() {
        let h = Hash::digest("state", b"{}");
        let id = StateId::from_hash(h.clone());
        assert_eq!(id.hash(), &h);
    }

    #[test]
    fn intent_id_generate_is_unique() {
        let a = IntentId::generate();
        let b = IntentId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn intent_id_rejects_empty() {
        assert!(IntentId::try_from(String::new()).is_err());
    }

    #[test]
    fn lane_name_rejects_path_separator() {
        assert!(LaneName::new("feat/x").is_err());
        assert!(LaneName::new("feat\\x").is_err());
    }

    #[test]
    fn lane_name_rejects_dotdot() {
        assert!(LaneName::new("..").is_err());
        assert!(LaneName::new("a..b").is_err());
    }

    #[test]
    fn lane_name_rejects_empty() {
        assert!(LaneName::new("").is_err());
    }

    #[test]
    fn lane_name_accepts_hyphenated() {
        assert!(LaneName::new("feature-123").is_ok());
    }

    #[test]
    fn workspace_name_allows_main() {
        assert!(WorkspaceName::new("main").is_ok());
    }

    #[test]
    fn agent_id_accepts_free_form() {
        assert!(AgentId::new("agent://claude/session-1").is_ok());
    }
}
