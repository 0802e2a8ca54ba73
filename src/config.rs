// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Configuration for services, transactions and the lock manager.
//!
//! Every section deserializes with per-field defaults, so a partial document
//! (or none at all) yields a usable configuration. `Config::from_properties`
//! reads the flat `txstore.*` property keys instead.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Property key for the IO task retry budget.
pub const IO_TASK_RETRIES_PROPERTY: &str = "txstore.io.task.max.retries";

/// Property key for the wait between IO task retries, in milliseconds.
pub const IO_TASK_WAIT_TIME_PROPERTY: &str = "txstore.io.task.wait.time";

/// Property key for the transaction timeout, in milliseconds.
pub const TXN_TIMEOUT_PROPERTY: &str = "txstore.txn.timeout";

/// Property key for the number of times a failed task is retried.
pub const TXN_MAX_RETRIES_PROPERTY: &str = "txstore.txn.max.retries";

/// Property key for the lock manager shard count.
pub const LOCK_NUM_SHARDS_PROPERTY: &str = "txstore.lock.num.shards";

const DEFAULT_MAX_IO_RETRIES: u32 = 5;
const DEFAULT_RETRY_WAIT_MS: u64 = 100;
const DEFAULT_TXN_TIMEOUT_MS: u64 = 100;
const DEFAULT_MAX_TASK_RETRIES: u32 = 10;
const DEFAULT_NUM_SHARDS: usize = 64;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("property {name}: cannot parse {value:?} as an integer")]
    Unparsable { name: String, value: String },

    #[error("property {name}: value {value} is outside [{min}, {max}]")]
    OutOfRange {
        name: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub transaction: TransactionConfig,
    pub lock: LockConfig,
}

impl Config {
    /// Reads configuration from flat `txstore.*` properties.
    ///
    /// Missing properties take their defaults; present ones must parse and
    /// fall inside their allowed range.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let service = ServiceConfig {
            io_task_max_retries: int_property(
                props,
                IO_TASK_RETRIES_PROPERTY,
                DEFAULT_MAX_IO_RETRIES.into(),
                0,
                i32::MAX.into(),
            )? as u32,
            io_task_wait_time: Duration::from_millis(int_property(
                props,
                IO_TASK_WAIT_TIME_PROPERTY,
                DEFAULT_RETRY_WAIT_MS as i64,
                0,
                i32::MAX.into(),
            )? as u64),
        };
        let transaction = TransactionConfig {
            timeout: Duration::from_millis(int_property(
                props,
                TXN_TIMEOUT_PROPERTY,
                DEFAULT_TXN_TIMEOUT_MS as i64,
                1,
                i64::MAX,
            )? as u64),
            max_task_retries: int_property(
                props,
                TXN_MAX_RETRIES_PROPERTY,
                DEFAULT_MAX_TASK_RETRIES.into(),
                0,
                i32::MAX.into(),
            )? as u32,
        };
        let lock = LockConfig {
            num_shards: int_property(
                props,
                LOCK_NUM_SHARDS_PROPERTY,
                DEFAULT_NUM_SHARDS as i64,
                1,
                65_536,
            )? as usize,
        };
        Ok(Self {
            service,
            transaction,
            lock,
        })
    }
}

/// Reads an integer property, falling back to `default` when absent.
fn int_property(
    props: &HashMap<String, String>,
    name: &str,
    default: i64,
    min: i64,
    max: i64,
) -> Result<i64, ConfigError> {
    let Some(raw) = props.get(name) else {
        return Ok(default);
    };
    let value: i64 = raw.trim().parse().map_err(|_| ConfigError::Unparsable {
        name: name.to_string(),
        value: raw.clone(),
    })?;
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name: name.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(value)
}

/// Service lifecycle and IO retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Retries after the first failed IO attempt before the target node is
    /// reported as failed.
    pub io_task_max_retries: u32,
    /// Pause between IO attempts.
    #[serde(with = "duration_millis")]
    pub io_task_wait_time: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            io_task_max_retries: DEFAULT_MAX_IO_RETRIES,
            io_task_wait_time: Duration::from_millis(DEFAULT_RETRY_WAIT_MS),
        }
    }
}

impl ServiceConfig {
    /// Sets the IO retry budget.
    pub fn with_io_task_max_retries(mut self, retries: u32) -> Self {
        self.io_task_max_retries = retries;
        self
    }

    /// Sets the pause between IO attempts.
    pub fn with_io_task_wait_time(mut self, wait: Duration) -> Self {
        self.io_task_wait_time = wait;
        self
    }
}

/// Transaction coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Time a transaction may run before it is aborted.
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Times a task failing with a retryable error is re-run.
    pub max_task_retries: u32,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TXN_TIMEOUT_MS),
            max_task_retries: DEFAULT_MAX_TASK_RETRIES,
        }
    }
}

impl TransactionConfig {
    /// Sets the transaction timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the task retry budget.
    pub fn with_max_task_retries(mut self, retries: u32) -> Self {
        self.max_task_retries = retries;
        self
    }
}

/// Lock manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Number of independently locked shards in the lock table.
    pub num_shards: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            num_shards: DEFAULT_NUM_SHARDS,
        }
    }
}

impl LockConfig {
    /// Sets the shard count.
    pub fn with_num_shards(mut self, num_shards: usize) -> Self {
        self.num_shards = num_shards;
        self
    }
}

/// Durations are written as whole milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.service.io_task_max_retries, 5);
        assert_eq!(config.service.io_task_wait_time, Duration::from_millis(100));
        assert_eq!(config.transaction.timeout, Duration::from_millis(100));
        assert_eq!(config.lock.num_shards, 64);
    }

    #[test]
    fn test_from_empty_properties() {
        let config = Config::from_properties(&HashMap::new()).unwrap();
        assert_eq!(config.service.io_task_max_retries, 5);
        assert_eq!(config.transaction.max_task_retries, 10);
    }

    #[test]
    fn test_from_properties() {
        let config = Config::from_properties(&props(&[
            (IO_TASK_RETRIES_PROPERTY, "3"),
            (IO_TASK_WAIT_TIME_PROPERTY, " 25 "),
            (TXN_TIMEOUT_PROPERTY, "2000"),
            (LOCK_NUM_SHARDS_PROPERTY, "8"),
        ]))
        .unwrap();
        assert_eq!(config.service.io_task_max_retries, 3);
        assert_eq!(config.service.io_task_wait_time, Duration::from_millis(25));
        assert_eq!(config.transaction.timeout, Duration::from_secs(2));
        assert_eq!(config.lock.num_shards, 8);
    }

    #[test]
    fn test_rejects_unparsable() {
        let err = Config::from_properties(&props(&[(IO_TASK_RETRIES_PROPERTY, "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Unparsable { .. }));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let err =
            Config::from_properties(&props(&[(IO_TASK_WAIT_TIME_PROPERTY, "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { value: -1, min: 0, .. }));

        let err = Config::from_properties(&props(&[(LOCK_NUM_SHARDS_PROPERTY, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: Config =
            serde_json::from_str(r#"{"service": {"io_task_wait_time": 5}}"#).unwrap();
        assert_eq!(config.service.io_task_wait_time, Duration::from_millis(5));
        assert_eq!(config.service.io_task_max_retries, 5);
        assert_eq!(config.lock.num_shards, 64);
    }

    #[test]
    fn test_builders() {
        let service = ServiceConfig::default()
            .with_io_task_max_retries(1)
            .with_io_task_wait_time(Duration::ZERO);
        assert_eq!(service.io_task_max_retries, 1);
        assert_eq!(service.io_task_wait_time, Duration::ZERO);
    }
}
