//! 流传输边界
//!
//! Transport 负责帧编码、连接复用等细节，这里只定义 Worker 依赖的接口。
//! 回调可能在 Transport 的任意分发线程上触发，实现方不得假设调用上下文。

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{Message, StreamChannelState, StreamCode};
use crate::types::AgentIdentity;

/// 已打开的流
pub trait StreamHandle: Send + Sync + fmt::Debug {
    /// 流 ID（用于日志）
    fn stream_id(&self) -> u32;

    /// 关闭流，释放 Transport 资源（重复调用无副作用）
    fn close(&self);
}

/// 打开流的结果
#[derive(Debug)]
pub enum OpenOutcome {
    /// 流已建立
    Opened(Box<dyn StreamHandle>),
    /// 对端拒绝创建流
    CreateFailed(StreamCode),
    /// 找不到到该 Agent 的连接
    Unreachable,
}

/// 流数据回调
pub trait StreamMessageListener: Send + Sync {
    /// 收到一条流数据
    fn on_data(&self, payload: &[u8]);

    /// 对端关闭了流
    fn on_close(&self);
}

/// 流状态回调
pub trait StreamStateListener: Send + Sync {
    /// 流状态发生变化
    fn on_state_change(&self, state: StreamChannelState);

    /// Transport 在处理状态变化时遇到异常
    fn exception_caught(&self, state: StreamChannelState, error: &crate::Error);
}

/// 流传输
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// 向 Agent 发起流命令并注册回调
    ///
    /// `Err` 表示 Transport 级故障（如不支持的请求）。
    async fn open_stream(
        &self,
        agent: &AgentIdentity,
        command: &Message,
        message_listener: Arc<dyn StreamMessageListener>,
        state_listener: Arc<dyn StreamStateListener>,
    ) -> Result<OpenOutcome>;
}
