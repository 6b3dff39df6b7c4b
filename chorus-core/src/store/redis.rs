//! # Redis
//!
//! Counters live in plain string keys so INCR/DECR stay atomic on the server.
//! User records and sessions are JSON strings next to them, all under one
//! namespace prefix.
//!
//! Unguarded batches go out as a `MULTI`/`EXEC` pipeline. Guarded batches run
//! as a Lua script so the compare and the writes happen in one step.

use super::{Batch, BatchOp, BatchOutcome, BatchReply, KvStore};
use crate::{ChorusError, Result};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, Script, Value, aio::ConnectionManager};

const GUARDED_BATCH: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
    if current ~= ARGV[2] then
        return false
    end
elseif current then
    return false
end

local replies = {}
for i = 2, #KEYS do
    local op = ARGV[i * 2 - 1]
    if op == 'incr' then
        table.insert(replies, redis.call('INCR', KEYS[i]))
    elseif op == 'decr' then
        table.insert(replies, redis.call('DECR', KEYS[i]))
    else
        redis.call('SET', KEYS[i], ARGV[i * 2])
        table.insert(replies, 'OK')
    end
end
return replies
"#;

pub struct RedisStore {
    conn: ConnectionManager,
    namespace: String,
    guarded_batch: Script,
}

impl RedisStore {
    pub async fn new(url: &str, namespace: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|error| ChorusError::Config(format!("invalid redis url: {}", error)))?;

        let conn = client.get_connection_manager().await?;

        tracing::info!("Connected to redis store, namespace={}", namespace);

        Ok(Self {
            conn,
            namespace: namespace.to_string(),
            guarded_batch: Script::new(GUARDED_BATCH),
        })
    }

    fn key(&self, key: &str) -> String {
        namespaced(&self.namespace, key)
    }

    async fn exec_pipeline(&self, batch: &Batch) -> Result<BatchOutcome> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in batch.ops() {
            match op {
                BatchOp::Incr(key) => pipe.cmd("INCR").arg(self.key(key)),
                BatchOp::Decr(key) => pipe.cmd("DECR").arg(self.key(key)),
                BatchOp::Set(key, value) => pipe.cmd("SET").arg(self.key(key)).arg(value),
            };
        }

        let mut conn = self.conn.clone();
        let values: Vec<Value> = pipe.query_async(&mut conn).await?;

        let replies = values
            .into_iter()
            .map(batch_reply)
            .collect::<Result<Vec<_>>>()?;
        Ok(BatchOutcome::Applied(replies))
    }

    async fn exec_guarded(&self, batch: &Batch) -> Result<BatchOutcome> {
        let (keys, args) = guarded_script_args(&self.namespace, batch)?;

        let mut invocation = self.guarded_batch.prepare_invoke();
        for key in keys {
            invocation.key(key);
        }
        for arg in args {
            invocation.arg(arg);
        }

        let mut conn = self.conn.clone();
        let value: Value = invocation.invoke_async(&mut conn).await?;

        match value {
            Value::Nil => Ok(BatchOutcome::Rejected),
            Value::Bulk(values) => {
                let replies = values
                    .into_iter()
                    .map(batch_reply)
                    .collect::<Result<Vec<_>>>()?;
                Ok(BatchOutcome::Applied(replies))
            }
            other => Err(ChorusError::Store(format!(
                "unexpected guarded batch reply: {:?}",
                other
            ))),
        }
    }
}

fn namespaced(namespace: &str, key: &str) -> String {
    format!("{}:{}", namespace, key)
}

fn strip_namespace<'a>(namespace: &str, key: &'a str) -> &'a str {
    key.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix(':'))
        .unwrap_or(key)
}

/// KEYS and ARGV for `GUARDED_BATCH`. KEYS[1] is the guarded key and ARGV[1..2]
/// its expectation; operation `n` (from 2) uses KEYS[n] and ARGV[2n-1..2n].
fn guarded_script_args(namespace: &str, batch: &Batch) -> Result<(Vec<String>, Vec<String>)> {
    let guard = batch
        .guard_condition()
        .ok_or_else(|| ChorusError::Internal("guarded batch without guard".to_string()))?;

    let mut keys = vec![namespaced(namespace, &guard.key)];
    let mut args = match &guard.expected {
        Some(expected) => vec!["1".to_string(), expected.clone()],
        None => vec!["0".to_string(), String::new()],
    };

    for op in batch.ops() {
        keys.push(namespaced(namespace, op.key()));
        let (name, value) = match op {
            BatchOp::Incr(_) => ("incr", String::new()),
            BatchOp::Decr(_) => ("decr", String::new()),
            BatchOp::Set(_, value) => ("set", value.clone()),
        };
        args.push(name.to_string());
        args.push(value);
    }

    Ok((keys, args))
}

fn batch_reply(value: Value) -> Result<BatchReply> {
    match value {
        Value::Int(n) => Ok(BatchReply::Int(n)),
        Value::Okay => Ok(BatchReply::Ok),
        Value::Status(status) if status == "OK" => Ok(BatchReply::Ok),
        Value::Data(data) if data == b"OK" => Ok(BatchReply::Ok),
        other => Err(ChorusError::Store(format!(
            "unexpected batch reply: {:?}",
            other
        ))),
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(self.key(key), value).await?;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(self.key(key), 1).await?;
        Ok(value)
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.decr(self.key(key), 1).await?;
        Ok(value)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let namespaced: Vec<String> = keys.iter().map(|key| self.key(key)).collect();
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&namespaced)
            .query_async(&mut conn)
            .await?;

        if values.len() != keys.len() {
            return Err(ChorusError::Store(format!(
                "MGET returned {} values for {} keys",
                values.len(),
                keys.len()
            )));
        }

        Ok(values)
    }

    async fn exec(&self, batch: Batch) -> Result<BatchOutcome> {
        if batch.guard_condition().is_some() {
            self.exec_guarded(&batch).await
        } else if batch.is_empty() {
            Ok(BatchOutcome::Applied(Vec::new()))
        } else {
            self.exec_pipeline(&batch).await
        }
    }

    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}*", self.key(prefix));
        let mut conn = self.conn.clone();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;

        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(strip_namespace(&self.namespace, &key).to_string());
        }

        Ok(keys)
    }
}
