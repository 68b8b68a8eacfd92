//! Worker 模块 - 单个 Agent 的活跃线程数流监控
//!
//! Worker 负责：
//! - 对 Agent 打开流命令，并保证同一时刻最多一个流
//! - 把所有失败转换为占位结果上的具名原因
//! - 流终止时标记为未激活，并把自己交给重连队列
//!
//! Worker 自己从不重试，重试时机由重连队列的消费方决定。

mod handle;
mod lifecycle;
mod listener;

use async_trait::async_trait;

use crate::types::AgentIdentity;

pub use handle::ActiveThreadCountWorker;
pub use lifecycle::WorkerStatus;

/// 会话持有的 Worker 通用接口
#[async_trait]
pub trait HandlerWorker: Send + Sync {
    async fn start(&self, agent: &AgentIdentity);

    async fn reactive(&self, agent: &AgentIdentity) -> bool;

    async fn stop(&self);

    fn agent_id(&self) -> &str;
}

#[async_trait]
impl HandlerWorker for ActiveThreadCountWorker {
    async fn start(&self, agent: &AgentIdentity) {
        ActiveThreadCountWorker::start(self, agent).await
    }

    async fn reactive(&self, agent: &AgentIdentity) -> bool {
        ActiveThreadCountWorker::reactive(self, agent).await
    }

    async fn stop(&self) {
        ActiveThreadCountWorker::stop(self).await
    }

    fn agent_id(&self) -> &str {
        ActiveThreadCountWorker::agent_id(self)
    }
}
