//! active-thread-stream - Agent 活跃线程数流监控
//!
//! 为监控服务端提供单个 Agent 的活跃线程数订阅管理。
//!
//! # 核心功能
//!
//! - **流生命周期**: 每个 Agent 一个 Worker，同一时刻最多一个流
//! - **占位结果**: 所有失败都转换为具名原因，原地更新，读者无需轮询
//! - **重连委托**: 流终止后把 Agent 交给重连队列，Worker 自己不重试
//! - **结果聚合**: 按应用汇总各 Agent 的最新结果并推送给订阅者
//!
//! # Feature Flags
//!
//! - `aggregator`: 内置 ActiveThreadCount 聚合器（默认开启）
//!
//! # 架构
//!
//! Transport → DataListener → 占位结果 + 聚合器；
//! Transport → StateListener → Worker 控制循环 → 重连队列。
//! Worker 的 start / reactive / stop 与流终止通知在同一个控制循环中顺序处理。

pub mod aggregator;
pub mod config;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod transport;
pub mod types;
pub mod worker;

// Re-exports
pub use aggregator::ResponseAggregator;
pub use config::WorkerConfig;
pub use error::{Error, Result};
pub use protocol::{ActiveThreadCountRes, Message, RouteResult, StreamChannelState, StreamCode};
pub use queue::{ChannelReactivationQueue, ReactivationQueue};
pub use transport::{
    OpenOutcome, StreamHandle, StreamMessageListener, StreamStateListener, StreamTransport,
};
pub use types::*;
pub use worker::{ActiveThreadCountWorker, HandlerWorker, WorkerStatus};

#[cfg(feature = "aggregator")]
pub use aggregator::{ActiveThreadCountAggregator, ActiveThreadCountPayload, AgentStatus};
