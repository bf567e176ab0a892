use std::{fmt, str::FromStr, sync::LazyLock};

use aho_corasick::{AhoCorasick, AhoCorasickBuilder};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::dump_parser::Sha1Hash;

/// Fingerprint of a revision's resulting content.
///
/// Dumps carry a base36 SHA1 for every revision whose text is not suppressed. When a dump ships the
/// full text but no digest, a BLAKE3 hash of the text is used instead. Within one page all hashes are
/// expected to be of the same kind, so the two variants never need to compare equal to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevisionHash {
    Sha1(Sha1Hash),
    Blake3(blake3::Hash),
}

impl fmt::Display for RevisionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionHash::Sha1(sha1) => f.write_str(sha1.as_str()),
            RevisionHash::Blake3(hash) => f.write_str(hash.to_hex().as_str()),
        }
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[error("not a base36 SHA1 or hex BLAKE3 digest: {0:?}")]
pub struct InvalidRevisionHash(pub String);

impl FromStr for RevisionHash {
    type Err = InvalidRevisionHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(sha1) = Sha1Hash::parse(s.as_bytes()) {
            return Ok(RevisionHash::Sha1(sha1));
        }
        if s.len() == 64 {
            if let Ok(hash) = blake3::Hash::from_hex(s) {
                return Ok(RevisionHash::Blake3(hash));
            }
        }
        Err(InvalidRevisionHash(s.to_string()))
    }
}

impl Serialize for RevisionHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RevisionHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Parse a revision timestamp as it appears in a dump.
///
/// Accepts both the ISO form (`2003-12-05T06:41:50Z`) and the compact MediaWiki form (`20031205064150`).
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    // Source: https://github.com/mediawiki-utilities/python-mwtypes/blob/523a93f98fe1372938fc15872b5abb1f267cc643/mwtypes/timestamp.py#L12
    const TIMESTAMP_FORMAT_LONG: &str = "%Y-%m-%dT%H:%M:%SZ";
    const TIMESTAMP_FORMAT_SHORT: &str = "%Y%m%d%H%M%S";

    let text = text.trim();
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_SHORT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT_LONG))
        .map(|dt| DateTime::from_naive_utc_and_offset(dt, Utc))
        .ok()
}

/// Edit-summary fragments that editors and tools use when undoing damage.
pub const REVERT_KEYWORDS: &[&str] = &["revert", "rvv", "rv/v", "undid", "rollback", "vandal"];

static REVERT_KEYWORD_MATCHER: LazyLock<AhoCorasick> = LazyLock::new(|| {
    AhoCorasickBuilder::new()
        .ascii_case_insensitive(true)
        .build(REVERT_KEYWORDS)
        .unwrap()
});

/// Whether an edit summary mentions reverting or vandalism.
///
/// Only ever used to corroborate a hash-detected revert, never to detect one.
pub fn has_revert_keyword(comment: Option<&str>) -> bool {
    match comment {
        Some(comment) => REVERT_KEYWORD_MATCHER.is_match(comment),
        None => false,
    }
}

/// Normalize optional text so that "present but empty" never leaks out as a value.
pub(crate) fn non_empty(text: &str) -> Option<&str> {
    let text = text.trim();
    (!text.is_empty()).then_some(text)
}
