//! Redis store backend

use super::store::{KeyValueStore, StoreOp, StoreResult, TtlStatus};
use async_trait::async_trait;
use catalog_gateway_core::config::RedisConfig;
use catalog_gateway_core::telemetry::store_op_span;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, Instrument};

/// Compare-and-set for a numeric hash field: seeds the field when absent,
/// otherwise replaces it only when the new value is tighter.
const HASH_BOUND_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
local candidate = tonumber(ARGV[2])
if not current
   or (ARGV[3] == 'min' and candidate < tonumber(current))
   or (ARGV[3] == 'max' and candidate > tonumber(current)) then
  redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
end
return 0
"#;

/// [`KeyValueStore`] backed by a Redis connection manager
///
/// The manager multiplexes one connection and reconnects on failure, so
/// clones are cheap and safe to use concurrently.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect and verify the server answers PING
    #[instrument(skip(config), fields(redis_url = %config.url))]
    pub async fn connect(config: &RedisConfig) -> StoreResult<Self> {
        info!("Initializing Redis store connection");

        let client = Client::open(config.url.as_str())?;
        let connect = ConnectionManager::new(client);
        let manager = tokio::time::timeout(config.connection_timeout, connect)
            .await
            .map_err(|_| {
                redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "Timed out connecting to Redis",
                ))
            })??;

        let store = Self { manager };
        store.ping().await?;

        info!("Redis store initialized successfully");
        Ok(store)
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn
            .get(key)
            .instrument(store_op_span("GET", key))
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(seconds(ttl));
        }
        cmd.query_async::<_, ()>(&mut conn)
            .instrument(store_op_span("SET", key))
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let removed: u64 = conn
            .del(keys)
            .instrument(store_op_span("DEL", &keys.join(",")))
            .await?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let keys: Vec<String> = conn
            .keys(pattern)
            .instrument(store_op_span("KEYS", pattern))
            .await?;
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let exists: bool = conn
            .exists(key)
            .instrument(store_op_span("EXISTS", key))
            .await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> StoreResult<TtlStatus> {
        let mut conn = self.conn();
        let millis: i64 = redis::cmd("PTTL")
            .arg(key)
            .query_async(&mut conn)
            .instrument(store_op_span("PTTL", key))
            .await?;

        Ok(match millis {
            -2 => TtlStatus::Missing,
            -1 => TtlStatus::Persistent,
            ms => TtlStatus::Expires(Duration::from_millis(ms.max(0) as u64)),
        })
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.conn();
        let fields: HashMap<String, String> = conn
            .hgetall(key)
            .instrument(store_op_span("HGETALL", key))
            .await?;
        Ok(fields)
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn
            .smembers(key)
            .instrument(store_op_span("SMEMBERS", key))
            .await?;
        Ok(members)
    }

    async fn apply(&self, ops: Vec<StoreOp>) -> StoreResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in &ops {
            match op {
                StoreOp::Incr { key, by } => {
                    pipe.cmd("INCRBY").arg(key).arg(*by).ignore();
                }
                StoreOp::IncrFloat { key, by } => {
                    pipe.cmd("INCRBYFLOAT").arg(key).arg(*by).ignore();
                }
                StoreOp::HashIncr { key, field, by } => {
                    pipe.cmd("HINCRBY").arg(key).arg(field).arg(*by).ignore();
                }
                StoreOp::HashIncrFloat { key, field, by } => {
                    pipe.cmd("HINCRBYFLOAT").arg(key).arg(field).arg(*by).ignore();
                }
                StoreOp::HashMin { key, field, value } => {
                    pipe.cmd("EVAL")
                        .arg(HASH_BOUND_SCRIPT)
                        .arg(1)
                        .arg(key)
                        .arg(field)
                        .arg(*value)
                        .arg("min")
                        .ignore();
                }
                StoreOp::HashMax { key, field, value } => {
                    pipe.cmd("EVAL")
                        .arg(HASH_BOUND_SCRIPT)
                        .arg(1)
                        .arg(key)
                        .arg(field)
                        .arg(*value)
                        .arg("max")
                        .ignore();
                }
                StoreOp::SetAdd { key, member } => {
                    pipe.cmd("SADD").arg(key).arg(member).ignore();
                }
                StoreOp::Expire { key, ttl } => {
                    pipe.cmd("EXPIRE").arg(key).arg(seconds(*ttl)).ignore();
                }
            }
        }

        let mut conn = self.conn();
        pipe.query_async::<_, ()>(&mut conn)
            .instrument(store_op_span("MULTI", &format!("{} ops", ops.len())))
            .await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .instrument(store_op_span("PING", ""))
            .await?;
        Ok(())
    }
}
