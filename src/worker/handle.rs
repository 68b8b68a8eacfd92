//! ActiveThreadCountWorker 句柄

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::lifecycle::{Control, ControlLoop, WorkerStatus};
use crate::aggregator::ResponseAggregator;
use crate::queue::ReactivationQueue;
use crate::transport::StreamTransport;
use crate::types::{AgentIdentity, LastResponse};

/// 单个 Agent 的活跃线程数流 Worker
///
/// 克隆共享同一个控制循环。所有克隆都释放后控制循环退出，
/// 仍打开的流会被关闭。
#[derive(Clone)]
pub struct ActiveThreadCountWorker {
    identity: AgentIdentity,
    last_response: LastResponse,
    control_tx: mpsc::UnboundedSender<Control>,
    status_rx: watch::Receiver<WorkerStatus>,
}

impl ActiveThreadCountWorker {
    /// 创建 Worker 并启动其控制循环
    ///
    /// 必须在 tokio runtime 内调用。
    pub fn new(
        identity: AgentIdentity,
        transport: Arc<dyn StreamTransport>,
        aggregator: Arc<dyn ResponseAggregator>,
        queue: Arc<dyn ReactivationQueue>,
    ) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(WorkerStatus::Idle);
        let last_response = LastResponse::new(identity.agent_id.clone());

        let control_loop = ControlLoop::new(
            identity.clone(),
            transport,
            aggregator,
            queue,
            last_response.clone(),
            control_tx.downgrade(),
            status_tx,
        );
        tokio::spawn(control_loop.run(control_rx));

        Self {
            identity,
            last_response,
            control_tx,
            status_rx,
        }
    }

    /// 启动：首次调用时尝试打开流
    ///
    /// `target` 与本 Worker 不一致时静默忽略；重复调用无副作用。
    pub async fn start(&self, target: &AgentIdentity) {
        if !self.targets(target) {
            return;
        }

        let (ack, done) = oneshot::channel();
        if self.control_tx.send(Control::Start(ack)).is_err() {
            tracing::debug!("Worker already stopped, start ignored: agent={}", self.identity);
            return;
        }
        let _ = done.await;
    }

    /// 重新激活，返回当前是否处于激活状态
    ///
    /// 只有已 start 且未 stop 时才会尝试；已激活时直接返回 `true`。
    pub async fn reactive(&self, target: &AgentIdentity) -> bool {
        if !self.targets(target) {
            return false;
        }

        let (reply, active) = oneshot::channel();
        if self.control_tx.send(Control::Reactive(reply)).is_err() {
            return false;
        }
        active.await.unwrap_or(false)
    }

    /// 停止（终态，不可恢复）
    pub async fn stop(&self) {
        let (ack, done) = oneshot::channel();
        if self.control_tx.send(Control::Stop(ack)).is_err() {
            return;
        }
        let _ = done.await;
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn agent_id(&self) -> &str {
        &self.identity.agent_id
    }

    /// 占位结果（原地更新，持有即可观察到后续变化）
    pub fn last_response(&self) -> &LastResponse {
        &self.last_response
    }

    pub fn status(&self) -> WorkerStatus {
        *self.status_rx.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.status() == WorkerStatus::Active
    }

    /// 订阅状态变化
    pub fn watch_status(&self) -> watch::Receiver<WorkerStatus> {
        self.status_rx.clone()
    }

    fn targets(&self, target: &AgentIdentity) -> bool {
        if target == &self.identity {
            return true;
        }
        tracing::trace!("Misrouted call ignored: worker={}, target={}", self.identity, target);
        false
    }
}

impl std::fmt::Debug for ActiveThreadCountWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveThreadCountWorker")
            .field("identity", &self.identity)
            .field("status", &self.status())
            .finish()
    }
}
