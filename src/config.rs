//! Worker 配置

use crate::error::{Error, Result};

/// 默认重连队列容量
pub const DEFAULT_REACTIVE_QUEUE_CAPACITY: usize = 256;

/// 默认订阅者推送通道容量
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

/// Worker 及其周边组件的配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// 重连队列容量（满时丢弃并记录日志，不阻塞）
    pub reactive_queue_capacity: usize,
    /// 聚合器每个订阅者的推送通道容量
    pub subscriber_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            reactive_queue_capacity: DEFAULT_REACTIVE_QUEUE_CAPACITY,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl WorkerConfig {
    /// 从环境变量创建配置，未设置的项使用默认值
    ///
    /// - `ATC_REACTIVE_QUEUE_CAPACITY`
    /// - `ATC_SUBSCRIBER_CAPACITY`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(capacity) = read_capacity("ATC_REACTIVE_QUEUE_CAPACITY")? {
            config.reactive_queue_capacity = capacity;
        }
        if let Some(capacity) = read_capacity("ATC_SUBSCRIBER_CAPACITY")? {
            config.subscriber_capacity = capacity;
        }

        Ok(config)
    }
}

fn read_capacity(key: &str) -> Result<Option<usize>> {
    let raw = match std::env::var(key) {
        Ok(raw) => raw,
        Err(_) => return Ok(None),
    };

    parse_capacity(key, &raw).map(Some)
}

/// tokio mpsc 不接受 0 容量，这里提前拒绝
fn parse_capacity(key: &str, raw: &str) -> Result<usize> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(Error::Config(format!("{} must be greater than 0", key))),
        Ok(capacity) => Ok(capacity),
        Err(e) => Err(Error::Config(format!("{}={:?}: {}", key, raw, e))),
    }
}
