//! 重连队列
//!
//! Worker 只负责投递，重试时机与退避策略由消费方决定。

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::WorkerConfig;
use crate::types::AgentIdentity;

/// 重连请求的接收方
pub trait ReactivationQueue: Send + Sync {
    /// 请求稍后重新激活该 Agent（非阻塞，fire-and-forget）
    fn enqueue(&self, agent: &AgentIdentity);
}

/// 基于 mpsc 通道的重连队列
#[derive(Debug, Clone)]
pub struct ChannelReactivationQueue {
    sender: mpsc::Sender<AgentIdentity>,
}

impl ChannelReactivationQueue {
    /// 创建队列，返回投递端与消费端。容量至少为 1
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AgentIdentity>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    pub fn with_config(config: &WorkerConfig) -> (Self, mpsc::Receiver<AgentIdentity>) {
        Self::new(config.reactive_queue_capacity)
    }
}

impl ReactivationQueue for ChannelReactivationQueue {
    fn enqueue(&self, agent: &AgentIdentity) {
        match self.sender.try_send(agent.clone()) {
            Ok(()) => {
                tracing::debug!("🔁 Reactivation queued: agent={}", agent);
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!("🔁 Reactivation queue full, dropping: agent={}", agent);
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("🔁 Reactivation queue closed: agent={}", agent);
            }
        }
    }
}
