//! 流回调
//!
//! 两个监听器都运行在 Transport 的分发线程上，任何失败都在本地吸收，
//! 不会向 Transport 传播。

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::lifecycle::Control;
use crate::aggregator::ResponseAggregator;
use crate::error::{Error, Result};
use crate::protocol::{self, Message, RouteResult, StreamChannelState, StreamCode};
use crate::transport::{StreamMessageListener, StreamStateListener};
use crate::types::{AgentActiveThreadCount, AgentIdentity, FailReason, LastResponse, ResponseOutcome};

/// 数据监听器：解码响应，更新占位结果并转交聚合器
///
/// 只有 `generation` 仍是当前流代号时数据才生效，
/// 流被关闭或替换后到达的数据直接丢弃。
pub(super) struct DataListener {
    agent_id: String,
    generation: u64,
    current: Arc<AtomicU64>,
    last_response: LastResponse,
    aggregator: Arc<dyn ResponseAggregator>,
}

impl DataListener {
    pub(super) fn new(
        agent_id: String,
        generation: u64,
        current: Arc<AtomicU64>,
        last_response: LastResponse,
        aggregator: Arc<dyn ResponseAggregator>,
    ) -> Self {
        Self {
            agent_id,
            generation,
            current,
            last_response,
            aggregator,
        }
    }

    /// 路由包装 → 活跃线程数采样
    fn to_response(&self, payload: &[u8]) -> AgentActiveThreadCount {
        let inner = match protocol::decode(payload) {
            Some(Message::CommandTransferResponse { payload, .. }) => payload,
            _ => {
                return AgentActiveThreadCount::with_fail(
                    self.agent_id.clone(),
                    FailReason::Route(RouteResult::BadResponse),
                );
            }
        };

        match protocol::decode(&inner) {
            Some(Message::ActiveThreadCountRes(result)) => {
                AgentActiveThreadCount::with_result(self.agent_id.clone(), result)
            }
            _ => AgentActiveThreadCount::with_fail(
                self.agent_id.clone(),
                FailReason::Route(RouteResult::NotSupportedResponse),
            ),
        }
    }
}

impl StreamMessageListener for DataListener {
    fn on_data(&self, payload: &[u8]) {
        let response = self.to_response(payload);

        match &response.outcome {
            ResponseOutcome::Result(result) => tracing::trace!(
                "📥 Active thread count: agent={}, counts={:?}",
                self.agent_id,
                result.active_thread_count
            ),
            ResponseOutcome::Fail(reason) => {
                tracing::debug!("📥 Unrecognized stream data: agent={}, reason={}", self.agent_id, reason)
            }
        }

        if !self
            .last_response
            .set_outcome_if_current(&self.current, self.generation, response.outcome.clone())
        {
            tracing::debug!(
                "📥 Dropping data from retired stream: agent={}, generation={}",
                self.agent_id,
                self.generation
            );
            return;
        }

        self.aggregator.response(response);
    }

    fn on_close(&self) {
        tracing::debug!("📥 Stream closed by remote: agent={}", self.agent_id);
        self.last_response.set_outcome_if_current(
            &self.current,
            self.generation,
            ResponseOutcome::Fail(FailReason::Stream(StreamCode::StateClosed)),
        );
    }
}

/// 状态监听器：终止状态转交控制循环
pub(super) struct StateListener {
    identity: AgentIdentity,
    generation: u64,
    control_tx: mpsc::WeakUnboundedSender<Control>,
}

impl StateListener {
    pub(super) fn new(
        identity: AgentIdentity,
        generation: u64,
        control_tx: mpsc::WeakUnboundedSender<Control>,
    ) -> Self {
        Self {
            identity,
            generation,
            control_tx,
        }
    }

    fn handle_state_change(&self, state: StreamChannelState) -> Result<()> {
        if !state.is_terminal() {
            return Ok(());
        }

        let control_tx = self
            .control_tx
            .upgrade()
            .ok_or_else(|| Error::WorkerGone(self.identity.to_string()))?;

        control_tx
            .send(Control::StreamTerminated {
                generation: self.generation,
                state,
            })
            .map_err(|_| Error::WorkerGone(self.identity.to_string()))
    }
}

impl StreamStateListener for StateListener {
    fn on_state_change(&self, state: StreamChannelState) {
        tracing::info!(
            "🔌 Stream state changed: agent={}, generation={}, state={:?}",
            self.identity,
            self.generation,
            state
        );

        if let Err(e) = self.handle_state_change(state) {
            // stop 之后控制循环已退出，属于正常情况
            tracing::debug!("Stream state change not delivered: state={:?}, {}", state, e);
        }
    }

    fn exception_caught(&self, state: StreamChannelState, error: &Error) {
        tracing::warn!(
            "⚠️ Stream state exception: agent={}, generation={}, state={:?}, error={}",
            self.identity,
            self.generation,
            state,
            error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{encode, wrap_transfer, ActiveThreadCountRes};
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;

    #[derive(Default)]
    struct RecordingAggregator {
        responses: Mutex<Vec<AgentActiveThreadCount>>,
    }

    impl ResponseAggregator for RecordingAggregator {
        fn response(&self, response: AgentActiveThreadCount) {
            self.responses.lock().push(response);
        }
    }

    fn data_listener() -> (DataListener, LastResponse, Arc<RecordingAggregator>) {
        let (listener, last_response, aggregator, _current) = data_listener_with_current();
        (listener, last_response, aggregator)
    }

    fn data_listener_with_current() -> (DataListener, LastResponse, Arc<RecordingAggregator>, Arc<AtomicU64>) {
        let last_response = LastResponse::new("A1");
        let aggregator = Arc::new(RecordingAggregator::default());
        let current = Arc::new(AtomicU64::new(1));
        let listener = DataListener::new(
            "A1".to_string(),
            1,
            current.clone(),
            last_response.clone(),
            aggregator.clone(),
        );
        (listener, last_response, aggregator, current)
    }

    fn sample_envelope() -> Vec<u8> {
        let sample = ActiveThreadCountRes {
            histogram_schema_type: 2,
            active_thread_count: vec![5, 0, 0, 0],
            time_stamp: 9,
        };
        encode(&wrap_transfer(RouteResult::Ok, &Message::ActiveThreadCountRes(sample)).unwrap()).unwrap()
    }

    #[test]
    fn test_success_envelope() {
        let (listener, last_response, aggregator) = data_listener();
        let sample = ActiveThreadCountRes {
            histogram_schema_type: 2,
            active_thread_count: vec![3, 1, 0, 0],
            time_stamp: 42,
        };
        let envelope = wrap_transfer(RouteResult::Ok, &Message::ActiveThreadCountRes(sample.clone())).unwrap();

        listener.on_data(&encode(&envelope).unwrap());

        assert_eq!(last_response.snapshot().result(), Some(&sample));
        let responses = aggregator.responses.lock();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].agent_id, "A1");
        assert_eq!(responses[0].result(), Some(&sample));
    }

    #[test]
    fn test_inner_payload_not_a_sample() {
        let (listener, last_response, aggregator) = data_listener();
        let envelope = wrap_transfer(
            RouteResult::Ok,
            &Message::CommandEcho {
                message: "hello".to_string(),
            },
        )
        .unwrap();

        listener.on_data(&encode(&envelope).unwrap());

        assert_eq!(
            last_response.fail_reason().map(|r| r.to_string()).as_deref(),
            Some("ROUTE_ERROR:NOT_SUPPORTED_RESPONSE")
        );
        assert_eq!(aggregator.responses.lock().len(), 1);
    }

    #[test]
    fn test_outer_envelope_missing() {
        let (listener, last_response, aggregator) = data_listener();

        // 未经路由包装的采样也视为错误响应
        let bare = Message::ActiveThreadCountRes(ActiveThreadCountRes::default());
        listener.on_data(&encode(&bare).unwrap());
        listener.on_data(b"\x00\x01garbage");

        assert_eq!(
            last_response.fail_reason(),
            Some(FailReason::Route(RouteResult::BadResponse))
        );
        let responses = aggregator.responses.lock();
        assert_eq!(responses.len(), 2);
        assert!(responses.iter().all(|r| r.result().is_none()));
    }

    #[test]
    fn test_remote_close() {
        let (listener, last_response, aggregator) = data_listener();
        listener.on_close();

        assert_eq!(
            last_response.fail_reason(),
            Some(FailReason::Stream(StreamCode::StateClosed))
        );
        assert!(aggregator.responses.lock().is_empty());
    }

    #[test]
    fn test_retired_stream_data_dropped() {
        let (listener, last_response, aggregator, current) = data_listener_with_current();
        last_response.retire(&current, FailReason::Stream(StreamCode::StateClosed));

        listener.on_data(&sample_envelope());
        listener.on_close();

        assert_eq!(
            last_response.fail_reason(),
            Some(FailReason::Stream(StreamCode::StateClosed))
        );
        assert!(aggregator.responses.lock().is_empty());
    }

    #[test]
    fn test_replaced_stream_data_dropped() {
        let (listener, last_response, aggregator, current) = data_listener_with_current();

        // 新一代流已就位
        current.store(2, Ordering::Release);
        listener.on_data(&sample_envelope());
        listener.on_close();

        assert_eq!(
            last_response.fail_reason(),
            Some(FailReason::Stream(StreamCode::StateNotConnected))
        );
        assert!(aggregator.responses.lock().is_empty());
    }

    #[test]
    fn test_state_listener_forwards_terminal_only() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = StateListener::new(AgentIdentity::new("app", "A1"), 7, tx.downgrade());

        listener.on_state_change(StreamChannelState::Connected);
        assert!(rx.try_recv().is_err());

        listener.on_state_change(StreamChannelState::IllegalState);
        match rx.try_recv() {
            Ok(Control::StreamTerminated { generation, state }) => {
                assert_eq!(generation, 7);
                assert_eq!(state, StreamChannelState::IllegalState);
            }
            _ => panic!("Expected StreamTerminated"),
        }
    }

    #[test]
    fn test_state_listener_after_worker_gone() {
        let (tx, rx) = mpsc::unbounded_channel::<Control>();
        let listener = StateListener::new(AgentIdentity::new("app", "A1"), 1, tx.downgrade());
        drop(tx);
        drop(rx);

        assert!(matches!(
            listener.handle_state_change(StreamChannelState::Closed),
            Err(Error::WorkerGone(_))
        ));
        // 不得 panic
        listener.on_state_change(StreamChannelState::Closed);
        listener.exception_caught(
            StreamChannelState::Closed,
            &Error::Other(anyhow::anyhow!("dispatch loop failure")),
        );
    }
}
