//! In-process store backend
//!
//! Mirrors the subset of Redis semantics used by the gateway so the cache
//! adapter and metrics recorder can run without an external server. Expired
//! keys are removed lazily when touched.

use super::store::{glob_match, KeyValueStore, StoreError, StoreOp, StoreResult, TtlStatus};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Memory-backed [`KeyValueStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn live<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn hash_entry<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut HashMap<String, String>> {
    if live(entries, key).is_none() {
        entries.insert(key.to_string(), Entry::new(Value::Hash(HashMap::new())));
    }

    match entries.get_mut(key).map(|entry| &mut entry.value) {
        Some(Value::Hash(fields)) => Ok(fields),
        _ => Err(StoreError::WrongType {
            key: key.to_string(),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(
    key: &str,
    field: &str,
    raw: Option<&String>,
) -> StoreResult<Option<T>> {
    raw.map(|value| {
        value.parse::<T>().map_err(|_| StoreError::NotANumber {
            key: key.to_string(),
            field: field.to_string(),
        })
    })
    .transpose()
}

fn text_number<T>(
    entries: &mut HashMap<String, Entry>,
    key: &str,
    update: impl FnOnce(Option<&str>) -> StoreResult<T>,
) -> StoreResult<()>
where
    T: ToString,
{
    let current = match live(entries, key).map(|entry| &entry.value) {
        None => None,
        Some(Value::Text(text)) => Some(text.clone()),
        Some(_) => {
            return Err(StoreError::WrongType {
                key: key.to_string(),
            })
        }
    };

    let next = update(current.as_deref())?.to_string();
    match live(entries, key) {
        Some(entry) => entry.value = Value::Text(next),
        None => {
            entries.insert(key.to_string(), Entry::new(Value::Text(next)));
        }
    }
    Ok(())
}

fn op_key(op: &StoreOp) -> &str {
    match op {
        StoreOp::Incr { key, .. }
        | StoreOp::IncrFloat { key, .. }
        | StoreOp::HashIncr { key, .. }
        | StoreOp::HashIncrFloat { key, .. }
        | StoreOp::HashMin { key, .. }
        | StoreOp::HashMax { key, .. }
        | StoreOp::SetAdd { key, .. }
        | StoreOp::Expire { key, .. } => key,
    }
}

fn execute(entries: &mut HashMap<String, Entry>, op: StoreOp) -> StoreResult<()> {
    match op {
        StoreOp::Incr { key, by } => text_number(entries, &key, |current| {
            let value = current.map(str::parse::<i64>).transpose().map_err(|_| {
                StoreError::NotANumber {
                    key: key.clone(),
                    field: String::new(),
                }
            })?;
            Ok(value.unwrap_or(0) + by)
        }),
        StoreOp::IncrFloat { key, by } => text_number(entries, &key, |current| {
            let value = current.map(str::parse::<f64>).transpose().map_err(|_| {
                StoreError::NotANumber {
                    key: key.clone(),
                    field: String::new(),
                }
            })?;
            Ok(value.unwrap_or(0.0) + by)
        }),
        StoreOp::HashIncr { key, field, by } => {
            let fields = hash_entry(entries, &key)?;
            let current = parse_number::<i64>(&key, &field, fields.get(&field))?;
            fields.insert(field, (current.unwrap_or(0) + by).to_string());
            Ok(())
        }
        StoreOp::HashIncrFloat { key, field, by } => {
            let fields = hash_entry(entries, &key)?;
            let current = parse_number::<f64>(&key, &field, fields.get(&field))?;
            fields.insert(field, (current.unwrap_or(0.0) + by).to_string());
            Ok(())
        }
        StoreOp::HashMin { key, field, value } => {
            let fields = hash_entry(entries, &key)?;
            let current = parse_number::<f64>(&key, &field, fields.get(&field))?;
            if current.map_or(true, |existing| value < existing) {
                fields.insert(field, value.to_string());
            }
            Ok(())
        }
        StoreOp::HashMax { key, field, value } => {
            let fields = hash_entry(entries, &key)?;
            let current = parse_number::<f64>(&key, &field, fields.get(&field))?;
            if current.map_or(true, |existing| value > existing) {
                fields.insert(field, value.to_string());
            }
            Ok(())
        }
        StoreOp::SetAdd { key, member } => {
            if live(entries, &key).is_none() {
                entries.insert(key.clone(), Entry::new(Value::Set(BTreeSet::new())));
            }
            match entries.get_mut(&key).map(|entry| &mut entry.value) {
                Some(Value::Set(members)) => {
                    members.insert(member);
                    Ok(())
                }
                _ => Err(StoreError::WrongType { key }),
            }
        }
        StoreOp::Expire { key, ttl } => {
            if let Some(entry) = live(entries, &key) {
                entry.expires_at = Some(Instant::now() + ttl);
            }
            Ok(())
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.entries.lock();
        match live(&mut entries, key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Text(text)) => Ok(Some(text.clone())),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let entry = Entry {
            value: Value::Text(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.lock().insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        let mut entries = self.entries.lock();
        let mut removed = 0;
        for key in keys {
            if live(&mut entries, key).is_some() {
                entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| !entry.is_expired(now));

        let mut matched: Vec<String> = entries
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        matched.sort();
        Ok(matched)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(live(&mut self.entries.lock(), key).is_some())
    }

    async fn ttl(&self, key: &str) -> StoreResult<TtlStatus> {
        let mut entries = self.entries.lock();
        Ok(match live(&mut entries, key) {
            None => TtlStatus::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => TtlStatus::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => TtlStatus::Expires(at.saturating_duration_since(Instant::now())),
        })
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut entries = self.entries.lock();
        match live(&mut entries, key).map(|entry| &entry.value) {
            None => Ok(HashMap::new()),
            Some(Value::Hash(fields)) => Ok(fields.clone()),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut entries = self.entries.lock();
        match live(&mut entries, key).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(StoreError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    async fn apply(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        let mut entries = self.entries.lock();

        // Run the batch on copies of the touched entries; commit only if every op succeeds
        let touched: BTreeSet<String> = ops.iter().map(|op| op_key(op).to_string()).collect();
        let mut scratch: HashMap<String, Entry> = HashMap::with_capacity(touched.len());
        for key in &touched {
            if let Some(entry) = live(&mut entries, key) {
                scratch.insert(key.clone(), entry.clone());
            }
        }

        for op in ops {
            execute(&mut scratch, op)?;
        }

        for key in touched {
            match scratch.remove(&key) {
                Some(entry) => {
                    entries.insert(key, entry);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
