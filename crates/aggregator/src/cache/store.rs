//! Key-value store abstraction shared by the cache adapter and metrics recorder

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Errors raised by a store backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Key {key} holds a value of the wrong type")]
    WrongType { key: String },

    #[error("Value at {key} field {field} is not a number")]
    NotANumber { key: String, field: String },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Remaining lifetime of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlStatus {
    /// The key does not exist
    Missing,
    /// The key exists without an expiry
    Persistent,
    Expires(Duration),
}

/// A single mutation applied as part of an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Incr { key: String, by: i64 },
    IncrFloat { key: String, by: f64 },
    HashIncr { key: String, field: String, by: i64 },
    HashIncrFloat { key: String, field: String, by: f64 },
    /// Seed the field on first write, afterwards keep the smaller value
    HashMin { key: String, field: String, value: f64 },
    /// Seed the field on first write, afterwards keep the larger value
    HashMax { key: String, field: String, value: f64 },
    SetAdd { key: String, member: String },
    Expire { key: String, ttl: Duration },
}

/// Primitive commands needed from the external TTL key-value store
///
/// Implementations must be safe for unrestricted concurrent use.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a string value, replacing any previous value and expiry
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    /// Enumerate keys matching a glob pattern (`*`, `?`, `[...]`)
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<TtlStatus>;

    /// All fields of a hash; empty when the key is missing
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Members of a set in enumeration order; empty when the key is missing
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Apply every operation atomically with respect to other callers
    async fn apply(&self, ops: Vec<StoreOp>) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Redis-compatible glob matching
///
/// Supports `*`, `?`, `[abc]`, `[a-z]`, `[^a]` and backslash escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    match_from(&pattern, &text)
}

fn match_from(pattern: &[char], text: &[char]) -> bool {
    let Some((&head, rest)) = pattern.split_first() else {
        return text.is_empty();
    };

    match head {
        '*' => (0..=text.len()).any(|skip| match_from(rest, &text[skip..])),
        '?' => !text.is_empty() && match_from(rest, &text[1..]),
        '[' => {
            let Some(&c) = text.first() else {
                return false;
            };
            match class_match(rest, c) {
                Some((matched, after)) => matched && match_from(after, &text[1..]),
                // Unterminated class: treat '[' literally
                None => c == '[' && match_from(rest, &text[1..]),
            }
        }
        '\\' if !rest.is_empty() => {
            !text.is_empty() && text[0] == rest[0] && match_from(&rest[1..], &text[1..])
        }
        literal => !text.is_empty() && text[0] == literal && match_from(rest, &text[1..]),
    }
}

/// Match `c` against a character class whose opening bracket was consumed
fn class_match(class: &[char], c: char) -> Option<(bool, &[char])> {
    let (negated, mut i) = match class.first() {
        Some('^') => (true, 1),
        _ => (false, 0),
    };

    let mut matched = false;
    while i < class.len() {
        match class[i] {
            ']' => return Some((matched != negated, &class[i + 1..])),
            '\\' if i + 1 < class.len() => {
                matched |= class[i + 1] == c;
                i += 2;
            }
            lo if i + 2 < class.len() && class[i + 1] == '-' && class[i + 2] != ']' => {
                let hi = class[i + 2];
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                matched |= (lo..=hi).contains(&c);
                i += 3;
            }
            single => {
                matched |= single == c;
                i += 1;
            }
        }
    }

    None
}
