//! Worker 生命周期状态机
//!
//! 控制循环独占生命周期状态与流句柄，所有状态变更按顺序处理：
//! start / reactive / stop 以及流终止通知都是发往同一个通道的消息。
//! 数据路径（解码 → 占位结果 → 聚合器）不经过这里，
//! 只通过 `current` 流代号与控制循环同步：流关闭或替换后旧数据不再生效。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::listener::{DataListener, StateListener};
use crate::aggregator::ResponseAggregator;
use crate::protocol::{Message, RouteResult, StreamChannelState, StreamCode};
use crate::queue::ReactivationQueue;
use crate::transport::{OpenOutcome, StreamHandle, StreamTransport};
use crate::types::{AgentIdentity, FailReason, LastResponse};

/// 对外可见的 Worker 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerStatus {
    /// 尚未 start
    Idle,
    /// 流已打开
    Active,
    /// 已 start，但流未打开（等待重连）
    Inactive,
    /// 已停止（终态）
    Stopped,
}

impl WorkerStatus {
    /// 已 start 且未 stop
    pub fn is_turn_on(&self) -> bool {
        matches!(self, WorkerStatus::Active | WorkerStatus::Inactive)
    }
}

/// 控制消息
pub(super) enum Control {
    Start(oneshot::Sender<()>),
    Reactive(oneshot::Sender<bool>),
    Stop(oneshot::Sender<()>),
    /// 第 `generation` 次激活打开的流进入终止状态
    StreamTerminated {
        generation: u64,
        state: StreamChannelState,
    },
}

/// 流句柄只存在于 `Active` 中
enum Lifecycle {
    Idle,
    Active {
        stream: Box<dyn StreamHandle>,
        generation: u64,
    },
    Inactive,
    Stopped,
}

/// Worker 控制循环
pub(super) struct ControlLoop {
    identity: AgentIdentity,
    transport: Arc<dyn StreamTransport>,
    aggregator: Arc<dyn ResponseAggregator>,
    queue: Arc<dyn ReactivationQueue>,
    last_response: LastResponse,
    control_tx: mpsc::WeakUnboundedSender<Control>,
    status_tx: watch::Sender<WorkerStatus>,
    lifecycle: Lifecycle,
    generation: u64,
    /// 数据监听器可写入的流代号，0 表示没有
    current: Arc<AtomicU64>,
}

impl ControlLoop {
    pub(super) fn new(
        identity: AgentIdentity,
        transport: Arc<dyn StreamTransport>,
        aggregator: Arc<dyn ResponseAggregator>,
        queue: Arc<dyn ReactivationQueue>,
        last_response: LastResponse,
        control_tx: mpsc::WeakUnboundedSender<Control>,
        status_tx: watch::Sender<WorkerStatus>,
    ) -> Self {
        Self {
            identity,
            transport,
            aggregator,
            queue,
            last_response,
            control_tx,
            status_tx,
            lifecycle: Lifecycle::Idle,
            generation: 0,
            current: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 运行直到 stop，或所有 Worker 句柄都已释放
    pub(super) async fn run(mut self, mut control_rx: mpsc::UnboundedReceiver<Control>) {
        while let Some(control) = control_rx.recv().await {
            self.handle(control).await;

            if matches!(self.lifecycle, Lifecycle::Stopped) {
                break;
            }
        }

        // 句柄全部释放时流可能仍然打开
        if let Some(stream) = self.take_stream() {
            tracing::debug!(
                "🧹 Worker dropped, closing stream: agent={}, stream_id={}",
                self.identity,
                stream.stream_id()
            );
            self.close_stream(Some(stream));
            self.publish();
        }

        tracing::debug!("👋 Worker control loop exited: agent={}", self.identity);
    }

    async fn handle(&mut self, control: Control) {
        match control {
            Control::Start(ack) => {
                self.start().await;
                let _ = ack.send(());
            }
            Control::Reactive(reply) => {
                let active = self.reactive().await;
                let _ = reply.send(active);
            }
            Control::Stop(ack) => {
                self.stop();
                let _ = ack.send(());
            }
            Control::StreamTerminated { generation, state } => {
                self.on_stream_terminated(generation, state);
            }
        }
    }

    async fn start(&mut self) {
        if !matches!(self.lifecycle, Lifecycle::Idle) {
            tracing::debug!("Worker already started: agent={}", self.identity);
            return;
        }

        tracing::info!("▶️ ActiveThreadCountWorker start: agent={}", self.identity);
        self.lifecycle = Lifecycle::Inactive;
        self.activate().await;
    }

    async fn reactive(&mut self) -> bool {
        match self.lifecycle {
            Lifecycle::Idle | Lifecycle::Stopped => false,
            Lifecycle::Active { .. } => true,
            Lifecycle::Inactive => {
                tracing::info!("🔄 ActiveThreadCountWorker reactive: agent={}", self.identity);
                self.activate().await
            }
        }
    }

    fn stop(&mut self) {
        if !self.is_turn_on() {
            tracing::debug!("Worker not running, stop ignored: agent={}", self.identity);
            return;
        }

        let stream = self.take_stream();
        tracing::info!(
            "⏹️ ActiveThreadCountWorker stop: agent={}, stream_id={:?}",
            self.identity,
            stream.as_ref().map(|s| s.stream_id())
        );

        self.lifecycle = Lifecycle::Stopped;
        self.close_stream(stream);
        self.publish();
    }

    /// 打开新流。调用前状态必须是 `Inactive`
    async fn activate(&mut self) -> bool {
        self.generation += 1;
        let generation = self.generation;
        // 打开过程中就可能有数据到达
        self.current.store(generation, Ordering::Release);

        let data_listener = Arc::new(DataListener::new(
            self.identity.agent_id.clone(),
            generation,
            self.current.clone(),
            self.last_response.clone(),
            self.aggregator.clone(),
        ));
        let state_listener = Arc::new(StateListener::new(
            self.identity.clone(),
            generation,
            self.control_tx.clone(),
        ));

        let outcome = self
            .transport
            .open_stream(
                &self.identity,
                &Message::ActiveThreadCount,
                data_listener,
                state_listener,
            )
            .await;

        match outcome {
            Ok(OpenOutcome::Opened(stream)) => {
                tracing::info!(
                    "✅ Stream opened: agent={}, stream_id={}, generation={}",
                    self.identity,
                    stream.stream_id(),
                    generation
                );
                self.lifecycle = Lifecycle::Active { stream, generation };
            }
            Ok(OpenOutcome::Unreachable) => {
                tracing::warn!("⚠️ Agent unreachable: agent={}", self.identity);
                self.last_response
                    .retire(&self.current, FailReason::Stream(StreamCode::ConnectionNotFound));
                self.queue.enqueue(&self.identity);
            }
            Ok(OpenOutcome::CreateFailed(code)) => {
                tracing::warn!("⚠️ Stream create rejected: agent={}, code={}", self.identity, code);
                self.last_response.retire(&self.current, FailReason::Stream(code));
            }
            Err(e) => {
                tracing::warn!("⚠️ Stream open failed: agent={}, error={}", self.identity, e);
                self.last_response
                    .retire(&self.current, FailReason::Request(RouteResult::NotSupportedRequest));
            }
        }

        self.publish();
        matches!(self.lifecycle, Lifecycle::Active { .. })
    }

    fn on_stream_terminated(&mut self, generation: u64, state: StreamChannelState) {
        let current = match &self.lifecycle {
            Lifecycle::Active { generation: current, .. } => Some(*current),
            _ => None,
        };

        if current != Some(generation) {
            tracing::debug!(
                "Stale stream termination ignored: agent={}, generation={}, current={:?}, state={:?}",
                self.identity,
                generation,
                current,
                state
            );
            return;
        }

        tracing::info!(
            "🔌 Stream terminated: agent={}, generation={}, state={:?}",
            self.identity,
            generation,
            state
        );

        let stream = self.take_stream();
        self.close_stream(stream);
        self.queue.enqueue(&self.identity);
        self.publish();
    }

    fn is_turn_on(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active { .. } | Lifecycle::Inactive)
    }

    /// 取出流句柄，`Active` 变为 `Inactive`，其他状态不变
    fn take_stream(&mut self) -> Option<Box<dyn StreamHandle>> {
        match std::mem::replace(&mut self.lifecycle, Lifecycle::Inactive) {
            Lifecycle::Active { stream, .. } => Some(stream),
            other => {
                self.lifecycle = other;
                None
            }
        }
    }

    /// 无论是否有句柄，结束后占位结果一定是 `STATE_CLOSED`，
    /// 且该流之后到达的数据都被丢弃
    fn close_stream(&self, stream: Option<Box<dyn StreamHandle>>) {
        if let Some(stream) = stream {
            stream.close();
        }
        self.last_response
            .retire(&self.current, FailReason::Stream(StreamCode::StateClosed));
    }

    fn status(&self) -> WorkerStatus {
        match self.lifecycle {
            Lifecycle::Idle => WorkerStatus::Idle,
            Lifecycle::Active { .. } => WorkerStatus::Active,
            Lifecycle::Inactive => WorkerStatus::Inactive,
            Lifecycle::Stopped => WorkerStatus::Stopped,
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_on_statuses() {
        assert!(!WorkerStatus::Idle.is_turn_on());
        assert!(WorkerStatus::Active.is_turn_on());
        assert!(WorkerStatus::Inactive.is_turn_on());
        assert!(!WorkerStatus::Stopped.is_turn_on());
    }
}
