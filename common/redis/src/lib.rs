use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

const DEFAULT_REDIS_TIMEOUT_MILLISECS: u64 = 100;

fn get_redis_timeout_ms() -> u64 {
    std::env::var("REDIS_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_REDIS_TIMEOUT_MILLISECS)
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CustomRedisError {
    #[error("Not found in redis")]
    NotFound,
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Redis error: {0}")]
    Other(String),
    #[error("Timeout error")]
    Timeout,
}

impl From<serde_pickle::Error> for CustomRedisError {
    fn from(err: serde_pickle::Error) -> Self {
        CustomRedisError::ParseError(err.to_string())
    }
}

impl From<RedisError> for CustomRedisError {
    fn from(err: RedisError) -> Self {
        CustomRedisError::Other(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for CustomRedisError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CustomRedisError::Timeout
    }
}

impl From<std::string::FromUtf8Error> for CustomRedisError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        CustomRedisError::ParseError(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisValueFormat {
    Pickle,
    Utf8,
    RawBytes,
}

impl Default for RedisValueFormat {
    fn default() -> Self {
        Self::Pickle
    }
}

#[async_trait]
pub trait Client {
    async fn zrangebyscore(
        &self,
        k: String,
        min: String,
        max: String,
    ) -> Result<Vec<String>, CustomRedisError>;

    async fn hincrby(
        &self,
        k: String,
        v: String,
        count: Option<i32>,
    ) -> Result<(), CustomRedisError>;

    async fn get(&self, k: String) -> Result<String, CustomRedisError>;
    async fn get_with_format(
        &self,
        k: String,
        format: RedisValueFormat,
    ) -> Result<String, CustomRedisError>;
    async fn get_raw_bytes(&self, k: String) -> Result<Vec<u8>, CustomRedisError>;
    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError>;
    async fn set_with_format(
        &self,
        k: String,
        v: String,
        format: RedisValueFormat,
    ) -> Result<(), CustomRedisError>;
    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError>;
    async fn set_nx_ex(&self, k: String, v: String, seconds: u64)
        -> Result<bool, CustomRedisError>;
    async fn set_nx_ex_with_format(
        &self,
        k: String,
        v: String,
        seconds: u64,
        format: RedisValueFormat,
    ) -> Result<bool, CustomRedisError>;
    async fn del(&self, k: String) -> Result<(), CustomRedisError>;
    async fn hget(&self, k: String, field: String) -> Result<String, CustomRedisError>;
    async fn scard(&self, k: String) -> Result<u64, CustomRedisError>;

    /// Atomically increment an integer key, creating it at 0 first if absent. Returns the
    /// post-increment value.
    async fn incr(&self, k: String) -> Result<i64, CustomRedisError>;
    /// Set a TTL (seconds) on an existing key. No-op at the protocol level if the key is gone.
    async fn expire(&self, k: String, seconds: u64) -> Result<(), CustomRedisError>;
    /// Add or update `member` in the sorted set `k` with `score`. Re-adding an existing member
    /// overwrites its score rather than duplicating the entry.
    async fn zadd(&self, k: String, member: String, score: f64) -> Result<(), CustomRedisError>;
    /// Remove `member` from the sorted set `k`. Returns `true` if it was present.
    async fn zrem(&self, k: String, member: String) -> Result<bool, CustomRedisError>;

    /// Write opaque bytes under `k` with a TTL, bypassing the string/pickle encodings used by
    /// `set*`. Pairs with `get_raw_bytes` for payloads that are not valid UTF-8.
    async fn setex_raw_bytes(&self, k: String, v: Vec<u8>, seconds: u64)
        -> Result<(), CustomRedisError>;

    /// Atomically attempts `SET nx_key nx_value NX EX nx_ttl_secs`; only if that claim succeeds,
    /// writes every `(key, value, ttl_secs)` in `follow_up` as `SETEX` in the same round trip.
    /// No follow-up write happens if the claim is lost. All values are written and read back as
    /// raw bytes, never pickled. Returns whether the claim succeeded.
    async fn set_nx_ex_with_follow_up(
        &self,
        nx_key: String,
        nx_value: Vec<u8>,
        nx_ttl_secs: u64,
        follow_up: Vec<(String, Vec<u8>, u64)>,
    ) -> Result<bool, CustomRedisError>;
}

pub struct RedisClient {
    connection: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(addr: String) -> Result<RedisClient, CustomRedisError> {
        let client = redis::Client::open(addr)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(RedisClient { connection })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn zrangebyscore(
        &self,
        k: String,
        min: String,
        max: String,
    ) -> Result<Vec<String>, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.zrangebyscore(k, min, max);
        let fut = timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn hincrby(
        &self,
        k: String,
        v: String,
        count: Option<i32>,
    ) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let count = count.unwrap_or(1);
        let results = conn.hincr(k, v, count);
        let fut = timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        fut.map_err(|e| CustomRedisError::Other(e.to_string()))
    }

    async fn get(&self, k: String) -> Result<String, CustomRedisError> {
        self.get_with_format(k, RedisValueFormat::Pickle).await
    }

    async fn get_with_format(
        &self,
        k: String,
        format: RedisValueFormat,
    ) -> Result<String, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.get(k);
        let fut: Result<Vec<u8>, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;

        // return NotFound error when empty
        if matches!(&fut, Ok(v) if v.is_empty()) {
            return Err(CustomRedisError::NotFound);
        }

        let raw_bytes = fut?;

        match format {
            RedisValueFormat::Pickle => {
                let string_response: String =
                    serde_pickle::from_slice(&raw_bytes, Default::default())?;
                Ok(string_response)
            }
            RedisValueFormat::Utf8 => {
                let string_response = String::from_utf8(raw_bytes)?;
                Ok(string_response)
            }
            RedisValueFormat::RawBytes => Err(CustomRedisError::ParseError(
                "Use get_raw_bytes() for RawBytes format".to_string(),
            )),
        }
    }

    async fn get_raw_bytes(&self, k: String) -> Result<Vec<u8>, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.get(k);
        let fut: Result<Vec<u8>, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;

        // return NotFound error when empty
        if matches!(&fut, Ok(v) if v.is_empty()) {
            return Err(CustomRedisError::NotFound);
        }

        Ok(fut?)
    }

    async fn set(&self, k: String, v: String) -> Result<(), CustomRedisError> {
        self.set_with_format(k, v, RedisValueFormat::Pickle).await
    }

    async fn set_with_format(
        &self,
        k: String,
        v: String,
        format: RedisValueFormat,
    ) -> Result<(), CustomRedisError> {
        let bytes = match format {
            RedisValueFormat::Pickle => serde_pickle::to_vec(&v, Default::default())?,
            RedisValueFormat::Utf8 => v.into_bytes(),
            RedisValueFormat::RawBytes => {
                return Err(CustomRedisError::ParseError(
                    "RawBytes format not supported for setting strings".to_string(),
                ))
            }
        };
        let mut conn = self.connection.clone();
        let results = conn.set(k, bytes);
        let fut = timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn setex(&self, k: String, v: String, seconds: u64) -> Result<(), CustomRedisError> {
        let bytes = serde_pickle::to_vec(&v, Default::default())?;
        let mut conn = self.connection.clone();
        let results = conn.set_ex(k, bytes, seconds);
        let fut = timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn set_nx_ex(
        &self,
        k: String,
        v: String,
        seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        self.set_nx_ex_with_format(k, v, seconds, RedisValueFormat::Pickle)
            .await
    }

    async fn set_nx_ex_with_format(
        &self,
        k: String,
        v: String,
        seconds: u64,
        format: RedisValueFormat,
    ) -> Result<bool, CustomRedisError> {
        let bytes = match format {
            RedisValueFormat::Pickle => serde_pickle::to_vec(&v, Default::default())?,
            RedisValueFormat::Utf8 => v.into_bytes(),
            RedisValueFormat::RawBytes => {
                return Err(CustomRedisError::ParseError(
                    "RawBytes format not supported for setting strings".to_string(),
                ))
            }
        };
        let mut conn = self.connection.clone();
        let seconds_usize = seconds as usize;

        // Use SET with both NX and EX options
        let result: Result<Option<String>, RedisError> = timeout(
            Duration::from_millis(get_redis_timeout_ms()),
            redis::cmd("SET")
                .arg(&k)
                .arg(&bytes)
                .arg("EX")
                .arg(seconds_usize)
                .arg("NX")
                .query_async(&mut conn),
        )
        .await?;

        match result {
            Ok(Some(_)) => Ok(true), // Key was set successfully
            Ok(None) => Ok(false),   // Key already existed
            Err(e) => Err(CustomRedisError::Other(e.to_string())),
        }
    }

    async fn del(&self, k: String) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.del(k);
        let fut = timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        fut.map_err(|e| CustomRedisError::Other(e.to_string()))
    }

    async fn hget(&self, k: String, field: String) -> Result<String, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.hget(k, field);
        let fut: Result<Option<String>, RedisError> =
            timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;

        match fut? {
            Some(value) => Ok(value),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn scard(&self, k: String) -> Result<u64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.scard(k);
        timeout(Duration::from_millis(get_redis_timeout_ms()), results)
            .await?
            .map_err(|e| CustomRedisError::Other(e.to_string()))
    }

    async fn incr(&self, k: String) -> Result<i64, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.incr(k, 1);
        timeout(Duration::from_millis(get_redis_timeout_ms()), results)
            .await?
            .map_err(|e| CustomRedisError::Other(e.to_string()))
    }

    async fn expire(&self, k: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.expire(k, seconds as i64);
        timeout(Duration::from_millis(get_redis_timeout_ms()), results)
            .await?
            .map_err(|e| CustomRedisError::Other(e.to_string()))
    }

    async fn zadd(&self, k: String, member: String, score: f64) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.zadd(k, member, score);
        timeout(Duration::from_millis(get_redis_timeout_ms()), results)
            .await?
            .map_err(|e| CustomRedisError::Other(e.to_string()))
    }

    async fn zrem(&self, k: String, member: String) -> Result<bool, CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.zrem(k, member);
        let removed: i64 = timeout(Duration::from_millis(get_redis_timeout_ms()), results)
            .await?
            .map_err(|e| CustomRedisError::Other(e.to_string()))?;
        Ok(removed > 0)
    }

    async fn setex_raw_bytes(
        &self,
        k: String,
        v: Vec<u8>,
        seconds: u64,
    ) -> Result<(), CustomRedisError> {
        let mut conn = self.connection.clone();
        let results = conn.set_ex(k, v, seconds);
        let fut = timeout(Duration::from_millis(get_redis_timeout_ms()), results).await?;
        Ok(fut?)
    }

    async fn set_nx_ex_with_follow_up(
        &self,
        nx_key: String,
        nx_value: Vec<u8>,
        nx_ttl_secs: u64,
        follow_up: Vec<(String, Vec<u8>, u64)>,
    ) -> Result<bool, CustomRedisError> {
        // Claims `nx_key` and, only if the claim is won, writes every follow-up key in the same
        // round trip: a script is the one primitive that lets a conditional SET and its dependent
        // writes commit as a single unit without a client-side WATCH/MULTI retry loop.
        const CLAIM_AND_WRITE: &str = r#"
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'EX', ARGV[2]) then
    local argi = 3
    for i = 2, #KEYS do
        redis.call('SETEX', KEYS[i], ARGV[argi + 1], ARGV[argi])
        argi = argi + 2
    end
    return 1
else
    return 0
end
"#;
        let mut conn = self.connection.clone();
        let num_keys = 1 + follow_up.len();

        let mut cmd = redis::cmd("EVAL");
        cmd.arg(CLAIM_AND_WRITE).arg(num_keys);
        cmd.arg(nx_key.as_str());
        for (key, _, _) in &follow_up {
            cmd.arg(key.as_str());
        }
        cmd.arg(nx_value.as_slice()).arg(nx_ttl_secs as usize);
        for (_, value, ttl) in &follow_up {
            cmd.arg(value.as_slice()).arg(*ttl as usize);
        }

        let result: Result<i64, RedisError> = timeout(
            Duration::from_millis(get_redis_timeout_ms()),
            cmd.query_async(&mut conn),
        )
        .await?;

        Ok(result? == 1)
    }
}

#[derive(Clone)]
pub struct MockRedisClient {
    zrangebyscore_ret: HashMap<String, Vec<String>>,
    hincrby_ret: HashMap<String, Result<(), CustomRedisError>>,
    get_ret: HashMap<String, Result<String, CustomRedisError>>,
    get_raw_bytes_ret: HashMap<String, Result<Vec<u8>, CustomRedisError>>,
    set_ret: HashMap<String, Result<(), CustomRedisError>>,
    set_nx_ex_ret: HashMap<String, Result<bool, CustomRedisError>>,
    del_ret: HashMap<String, Result<(), CustomRedisError>>,
    hget_ret: HashMap<String, Result<String, CustomRedisError>>,
    scard_ret: HashMap<String, Result<u64, CustomRedisError>>,
    incr_ret: HashMap<String, Result<i64, CustomRedisError>>,
    expire_ret: HashMap<String, Result<(), CustomRedisError>>,
    zadd_ret: HashMap<String, Result<(), CustomRedisError>>,
    zrem_ret: HashMap<String, Result<bool, CustomRedisError>>,
    setex_raw_bytes_ret: HashMap<String, Result<(), CustomRedisError>>,
    calls: Arc<Mutex<Vec<MockRedisCall>>>,
}

impl Default for MockRedisClient {
    fn default() -> Self {
        Self {
            zrangebyscore_ret: HashMap::new(),
            hincrby_ret: HashMap::new(),
            get_ret: HashMap::new(),
            get_raw_bytes_ret: HashMap::new(),
            set_ret: HashMap::new(),
            set_nx_ex_ret: HashMap::new(),
            del_ret: HashMap::new(),
            hget_ret: HashMap::new(),
            scard_ret: HashMap::new(),
            incr_ret: HashMap::new(),
            expire_ret: HashMap::new(),
            zadd_ret: HashMap::new(),
            zrem_ret: HashMap::new(),
            setex_raw_bytes_ret: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    // Helper method to safely lock the calls mutex
    fn lock_calls(&self) -> std::sync::MutexGuard<Vec<MockRedisCall>> {
        match self.calls.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn zrangebyscore_ret(&mut self, key: &str, ret: Vec<String>) -> Self {
        self.zrangebyscore_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn hincrby_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.hincrby_ret.insert(key.to_owned(), ret);

        self.clone()
    }

    pub fn get_ret(&mut self, key: &str, ret: Result<String, CustomRedisError>) -> Self {
        self.get_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn get_raw_bytes_ret(&mut self, key: &str, ret: Result<Vec<u8>, CustomRedisError>) -> Self {
        self.get_raw_bytes_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn set_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.set_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn del_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.del_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn hget_ret(&mut self, key: &str, ret: Result<String, CustomRedisError>) -> Self {
        self.hget_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn scard_ret(&mut self, key: &str, ret: Result<u64, CustomRedisError>) -> Self {
        self.scard_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn get_calls(&self) -> Vec<MockRedisCall> {
        self.lock_calls().clone()
    }

    pub fn set_nx_ex_ret(&mut self, key: &str, ret: Result<bool, CustomRedisError>) -> Self {
        self.set_nx_ex_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn incr_ret(&mut self, key: &str, ret: Result<i64, CustomRedisError>) -> Self {
        self.incr_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn expire_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.expire_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn zadd_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.zadd_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn zrem_ret(&mut self, key: &str, ret: Result<bool, CustomRedisError>) -> Self {
        self.zrem_ret.insert(key.to_owned(), ret);
        self.clone()
    }

    pub fn setex_raw_bytes_ret(&mut self, key: &str, ret: Result<(), CustomRedisError>) -> Self {
        self.setex_raw_bytes_ret.insert(key.to_owned(), ret);
        self.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRedisValue {
    None,
    Error(CustomRedisError),
    String(String),
    StringWithTTL(String, u64),
    VecString(Vec<String>),
    I32(i32),
    I64(i64),
    MinMax(String, String),
    StringWithFormat(String, RedisValueFormat),
    StringWithTTLAndFormat(String, u64, RedisValueFormat),
    BytesWithTTL(Vec<u8>, u64),
}

#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct MockRedisCall {
    pub op: String,
    pub key: String,
    pub value: MockRedisValue,
}

#[async_trait]
impl Client for MockRedisClient {
    async fn zrangebyscore(
        &self,
        key: String,
        min: String,
        max: String,
    ) -> Result<Vec<String>, CustomRedisError> {
        // Record the call
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "zrangebyscore".to_string(),
            key: key.clone(),
            value: MockRedisValue::MinMax(min, max),
        });

        match self.zrangebyscore_ret.get(&key) {
            Some(val) => Ok(val.clone()),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn hincrby(
        &self,
        key: String,
        field: String,
        count: Option<i32>,
    ) -> Result<(), CustomRedisError> {
        // Record the call
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "hincrby".to_string(),
            key: format!("{key}:{field}"),
            value: match count {
                None => MockRedisValue::None,
                Some(v) => MockRedisValue::I32(v),
            },
        });

        match self.hincrby_ret.get(&key) {
            Some(result) => result.clone(),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn get(&self, key: String) -> Result<String, CustomRedisError> {
        // Record the call
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "get".to_string(),
            key: key.clone(),
            value: MockRedisValue::None,
        });

        match self.get_ret.get(&key) {
            Some(result) => result.clone(),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn get_with_format(
        &self,
        key: String,
        format: RedisValueFormat,
    ) -> Result<String, CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "get_with_format".to_string(),
            key: key.clone(),
            value: MockRedisValue::StringWithFormat("".to_string(), format),
        });

        self.get_ret
            .get(&key)
            .cloned()
            .unwrap_or(Err(CustomRedisError::NotFound))
    }

    async fn get_raw_bytes(&self, key: String) -> Result<Vec<u8>, CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "get_raw_bytes".to_string(),
            key: key.clone(),
            value: MockRedisValue::String("".to_string()),
        });

        // First try the dedicated raw bytes storage
        if let Some(result) = self.get_raw_bytes_ret.get(&key) {
            return result.clone();
        }

        // Fall back to string conversion for backward compatibility
        match self
            .get_ret
            .get(&key)
            .cloned()
            .unwrap_or(Err(CustomRedisError::NotFound))
        {
            Ok(string_data) => Ok(string_data.into_bytes()),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, key: String, value: String) -> Result<(), CustomRedisError> {
        // Record the call
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "set".to_string(),
            key: key.clone(),
            value: MockRedisValue::String(value.clone()),
        });

        match self.set_ret.get(&key) {
            Some(result) => result.clone(),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set_with_format(
        &self,
        key: String,
        value: String,
        format: RedisValueFormat,
    ) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "set_with_format".to_string(),
            key: key.clone(),
            value: MockRedisValue::StringWithFormat(value.clone(), format),
        });

        self.set_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn setex(
        &self,
        key: String,
        value: String,
        seconds: u64,
    ) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "setex".to_string(),
            key: key.clone(),
            value: MockRedisValue::StringWithTTL(value.clone(), seconds),
        });

        self.set_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn set_nx_ex(
        &self,
        key: String,
        value: String,
        seconds: u64,
    ) -> Result<bool, CustomRedisError> {
        // Record the call
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "set_nx_ex".to_string(),
            key: key.clone(),
            value: MockRedisValue::StringWithTTL(value.clone(), seconds),
        });

        match self.set_nx_ex_ret.get(&key) {
            Some(result) => result.clone(),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn set_nx_ex_with_format(
        &self,
        key: String,
        value: String,
        seconds: u64,
        format: RedisValueFormat,
    ) -> Result<bool, CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "set_nx_ex_with_format".to_string(),
            key: key.clone(),
            value: MockRedisValue::StringWithTTLAndFormat(value.clone(), seconds, format),
        });

        self.set_nx_ex_ret
            .get(&key)
            .cloned()
            .unwrap_or(Err(CustomRedisError::NotFound))
    }

    async fn del(&self, key: String) -> Result<(), CustomRedisError> {
        // Record the call
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "del".to_string(),
            key: key.clone(),
            value: MockRedisValue::None,
        });

        match self.del_ret.get(&key) {
            Some(result) => result.clone(),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn hget(&self, key: String, field: String) -> Result<String, CustomRedisError> {
        // Record the call
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "hget".to_string(),
            key: format!("{key}:{field}"),
            value: MockRedisValue::None,
        });

        match self.hget_ret.get(&key) {
            Some(result) => result.clone(),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn scard(&self, key: String) -> Result<u64, CustomRedisError> {
        // Record the call
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "scard".to_string(),
            key: key.to_string(),
            value: MockRedisValue::None,
        });

        match self.scard_ret.get(&key) {
            Some(result) => result.clone(),
            None => Err(CustomRedisError::NotFound),
        }
    }

    async fn incr(&self, key: String) -> Result<i64, CustomRedisError> {
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "incr".to_string(),
            key: key.clone(),
            value: MockRedisValue::None,
        });

        match self.incr_ret.get(&key) {
            Some(result) => result.clone(),
            None => Ok(1),
        }
    }

    async fn expire(&self, key: String, seconds: u64) -> Result<(), CustomRedisError> {
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "expire".to_string(),
            key: key.clone(),
            value: MockRedisValue::I64(seconds as i64),
        });

        self.expire_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn zadd(&self, key: String, member: String, score: f64) -> Result<(), CustomRedisError> {
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "zadd".to_string(),
            key: format!("{key}:{member}"),
            value: MockRedisValue::StringWithTTL(member, score as u64),
        });

        self.zadd_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn zrem(&self, key: String, member: String) -> Result<bool, CustomRedisError> {
        let mut calls = self.lock_calls();
        calls.push(MockRedisCall {
            op: "zrem".to_string(),
            key: format!("{key}:{member}"),
            value: MockRedisValue::None,
        });

        self.zrem_ret.get(&key).cloned().unwrap_or(Ok(true))
    }

    async fn setex_raw_bytes(
        &self,
        key: String,
        value: Vec<u8>,
        seconds: u64,
    ) -> Result<(), CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "setex_raw_bytes".to_string(),
            key: key.clone(),
            value: MockRedisValue::BytesWithTTL(value, seconds),
        });

        self.setex_raw_bytes_ret.get(&key).cloned().unwrap_or(Ok(()))
    }

    async fn set_nx_ex_with_follow_up(
        &self,
        nx_key: String,
        nx_value: Vec<u8>,
        nx_ttl_secs: u64,
        follow_up: Vec<(String, Vec<u8>, u64)>,
    ) -> Result<bool, CustomRedisError> {
        self.lock_calls().push(MockRedisCall {
            op: "set_nx_ex_with_follow_up".to_string(),
            key: nx_key.clone(),
            value: MockRedisValue::BytesWithTTL(nx_value, nx_ttl_secs),
        });

        let claimed = match self.set_nx_ex_ret.get(&nx_key) {
            Some(result) => result.clone()?,
            None => return Err(CustomRedisError::NotFound),
        };

        if claimed {
            let mut calls = self.lock_calls();
            for (key, value, ttl) in follow_up {
                calls.push(MockRedisCall {
                    op: "setex_raw_bytes".to_string(),
                    key,
                    value: MockRedisValue::BytesWithTTL(value, ttl),
                });
            }
        }

        Ok(claimed)
    }
}
