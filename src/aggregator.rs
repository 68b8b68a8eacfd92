//! 结果聚合
//!
//! Worker 把每个采样（成功或失败）交给聚合器。
//! 内置的 [`ActiveThreadCountAggregator`] 按应用汇总各 Agent 的最新结果，
//! flush 时推送给订阅者（非阻塞，fire-and-forget）。

use crate::types::AgentActiveThreadCount;

/// 采样结果的接收方
pub trait ResponseAggregator: Send + Sync {
    /// 提交一个 Agent 的采样结果（不得阻塞）
    fn response(&self, response: AgentActiveThreadCount);
}

#[cfg(feature = "aggregator")]
pub use self::active_thread_count::{
    ActiveThreadCountAggregator, ActiveThreadCountPayload, AgentStatus, ConnId,
};

#[cfg(feature = "aggregator")]
mod active_thread_count {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;

    use parking_lot::RwLock;
    use serde::{Deserialize, Serialize};
    use tokio::sync::mpsc;

    use super::ResponseAggregator;
    use crate::config::WorkerConfig;
    use crate::types::{AgentActiveThreadCount, LastResponse, ResponseOutcome};

    /// 订阅者 ID
    pub type ConnId = u64;

    /// 消息发送通道
    type MessageSender = mpsc::Sender<String>;

    const SUCCESS_CODE: i32 = 0;
    const FAIL_CODE: i32 = -1;

    /// 推送给订阅者的汇总消息
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ActiveThreadCountPayload {
        pub application_name: String,
        pub time_stamp: i64,
        /// agent_id → 状态（按 ID 排序）
        pub active_thread_counts: BTreeMap<String, AgentStatus>,
    }

    /// 单个 Agent 的状态
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AgentStatus {
        pub code: i32,
        pub message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub status: Option<Vec<i32>>,
    }

    impl From<&AgentActiveThreadCount> for AgentStatus {
        fn from(response: &AgentActiveThreadCount) -> Self {
            match &response.outcome {
                ResponseOutcome::Result(result) => Self {
                    code: SUCCESS_CODE,
                    message: "OK".to_string(),
                    status: Some(result.active_thread_count.clone()),
                },
                ResponseOutcome::Fail(reason) => Self {
                    code: FAIL_CODE,
                    message: reason.to_string(),
                    status: None,
                },
            }
        }
    }

    /// 单个应用的活跃线程数聚合器
    pub struct ActiveThreadCountAggregator {
        application_name: String,
        subscriber_capacity: usize,
        /// agent_id → Worker 的占位结果
        workers: RwLock<HashMap<String, LastResponse>>,
        /// agent_id → 上次 flush 之后收到的最新结果
        responses: RwLock<HashMap<String, AgentActiveThreadCount>>,
        /// 订阅者：ConnId → 发送通道
        subscribers: RwLock<HashMap<ConnId, MessageSender>>,
        next_conn_id: RwLock<ConnId>,
    }

    impl ActiveThreadCountAggregator {
        pub fn new(application_name: impl Into<String>, config: &WorkerConfig) -> Arc<Self> {
            Arc::new(Self {
                application_name: application_name.into(),
                subscriber_capacity: config.subscriber_capacity,
                workers: RwLock::new(HashMap::new()),
                responses: RwLock::new(HashMap::new()),
                subscribers: RwLock::new(HashMap::new()),
                next_conn_id: RwLock::new(1),
            })
        }

        pub fn application_name(&self) -> &str {
            &self.application_name
        }

        /// 登记 Worker 的占位结果，作为没有新采样时的兜底值
        pub fn register_worker(&self, last_response: &LastResponse) {
            let agent_id = last_response.agent_id();
            tracing::debug!("📊 Worker registered: app={}, agent={}", self.application_name, agent_id);
            self.workers.write().insert(agent_id, last_response.clone());
        }

        pub fn unregister_worker(&self, agent_id: &str) {
            self.workers.write().remove(agent_id);
            self.responses.write().remove(agent_id);
            tracing::debug!("📊 Worker unregistered: app={}, agent={}", self.application_name, agent_id);
        }

        pub fn worker_count(&self) -> usize {
            self.workers.read().len()
        }

        /// 新增订阅者，返回 ID 与接收端
        pub fn subscribe(&self) -> (ConnId, mpsc::Receiver<String>) {
            let (tx, rx) = mpsc::channel(self.subscriber_capacity.max(1));

            let mut next_id = self.next_conn_id.write();
            let conn_id = *next_id;
            *next_id += 1;

            self.subscribers.write().insert(conn_id, tx);
            tracing::debug!("📡 Subscriber registered: conn_id={}", conn_id);
            (conn_id, rx)
        }

        pub fn unsubscribe(&self, conn_id: ConnId) {
            self.subscribers.write().remove(&conn_id);
            tracing::debug!("📡 Subscriber unregistered: conn_id={}", conn_id);
        }

        pub fn subscriber_count(&self) -> usize {
            self.subscribers.read().len()
        }

        /// 汇总当前结果并清空已收到的采样
        ///
        /// 没有新采样的 Agent 使用其占位结果的快照。
        pub fn take_payload(&self) -> ActiveThreadCountPayload {
            let received = std::mem::take(&mut *self.responses.write());
            let workers = self.workers.read();

            let active_thread_counts = workers
                .iter()
                .map(|(agent_id, last_response)| {
                    let status = match received.get(agent_id) {
                        Some(response) => AgentStatus::from(response),
                        None => AgentStatus::from(&last_response.snapshot()),
                    };
                    (agent_id.clone(), status)
                })
                .collect();

            ActiveThreadCountPayload {
                application_name: self.application_name.clone(),
                time_stamp: chrono::Utc::now().timestamp_millis(),
                active_thread_counts,
            }
        }

        /// 推送汇总给所有订阅者，返回成功投递的订阅者数
        pub fn flush(&self) -> usize {
            let payload = self.take_payload();

            let message = match serde_json::to_string(&payload) {
                Ok(json) => format!("{}\n", json),
                Err(e) => {
                    tracing::error!("Failed to serialize payload: {}", e);
                    return 0;
                }
            };

            let targets: Vec<(ConnId, MessageSender)> = self
                .subscribers
                .read()
                .iter()
                .map(|(conn_id, sender)| (*conn_id, sender.clone()))
                .collect();

            if targets.is_empty() {
                tracing::trace!("📡 No subscribers: app={}", self.application_name);
                return 0;
            }

            let mut delivered = 0;
            for (conn_id, sender) in targets {
                match sender.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("📡 Channel full, dropping payload: conn_id={}", conn_id);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!("📡 Channel closed: conn_id={}", conn_id);
                    }
                }
            }

            tracing::debug!(
                "📡 Flushed active thread counts: app={}, agents={}, subscribers={}",
                self.application_name,
                payload.active_thread_counts.len(),
                delivered
            );
            delivered
        }
    }

    impl ResponseAggregator for ActiveThreadCountAggregator {
        fn response(&self, response: AgentActiveThreadCount) {
            if !self.workers.read().contains_key(&response.agent_id) {
                tracing::trace!("📊 Response from unregistered agent ignored: {}", response.agent_id);
                return;
            }
            self.responses.write().insert(response.agent_id.clone(), response);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::protocol::{ActiveThreadCountRes, StreamCode};
        use crate::types::FailReason;

        fn sample(counts: Vec<i32>) -> ActiveThreadCountRes {
            ActiveThreadCountRes {
                histogram_schema_type: 2,
                active_thread_count: counts,
                time_stamp: 0,
            }
        }

        #[test]
        fn test_flush_merges_responses_and_placeholders() {
            let aggregator = ActiveThreadCountAggregator::new("app", &WorkerConfig::default());

            let a1 = LastResponse::new("A1");
            let a2 = LastResponse::new("A2");
            a2.set_fail(FailReason::Stream(StreamCode::StateClosed));
            aggregator.register_worker(&a1);
            aggregator.register_worker(&a2);

            let (_conn, mut rx) = aggregator.subscribe();

            aggregator.response(AgentActiveThreadCount::with_result("A1", sample(vec![1, 2, 3, 4])));
            assert_eq!(aggregator.flush(), 1);

            let line = rx.try_recv().unwrap();
            assert!(line.ends_with('\n'));
            let payload: ActiveThreadCountPayload = serde_json::from_str(line.trim()).unwrap();
            assert_eq!(payload.application_name, "app");

            let a1_status = &payload.active_thread_counts["A1"];
            assert_eq!(a1_status.code, 0);
            assert_eq!(a1_status.status, Some(vec![1, 2, 3, 4]));

            let a2_status = &payload.active_thread_counts["A2"];
            assert_eq!(a2_status.code, -1);
            assert_eq!(a2_status.message, "STATE_CLOSED");
            assert_eq!(a2_status.status, None);
        }

        #[test]
        fn test_flush_clears_received_responses() {
            let aggregator = ActiveThreadCountAggregator::new("app", &WorkerConfig::default());
            let a1 = LastResponse::new("A1");
            aggregator.register_worker(&a1);

            aggregator.response(AgentActiveThreadCount::with_result("A1", sample(vec![9])));
            assert_eq!(aggregator.take_payload().active_thread_counts["A1"].code, 0);

            // 没有新采样时回落到占位结果
            let status = &aggregator.take_payload().active_thread_counts["A1"];
            assert_eq!(status.message, "STATE_NOT_CONNECTED");
        }

        #[test]
        fn test_unregistered_agent_ignored() {
            let aggregator = ActiveThreadCountAggregator::new("app", &WorkerConfig::default());
            aggregator.response(AgentActiveThreadCount::with_result("ghost", sample(vec![1])));
            assert!(aggregator.take_payload().active_thread_counts.is_empty());
        }

        #[test]
        fn test_subscriber_bookkeeping() {
            let aggregator = ActiveThreadCountAggregator::new("app", &WorkerConfig::default());
            assert_eq!(aggregator.flush(), 0);

            let (conn1, _rx1) = aggregator.subscribe();
            let (conn2, rx2) = aggregator.subscribe();
            assert_ne!(conn1, conn2);
            assert_eq!(aggregator.subscriber_count(), 2);

            // 已关闭的接收端不计入投递数
            drop(rx2);
            assert_eq!(aggregator.flush(), 1);

            aggregator.unsubscribe(conn1);
            aggregator.unsubscribe(conn2);
            assert_eq!(aggregator.subscriber_count(), 0);
        }

        #[test]
        fn test_full_channel_drops_payload() {
            let config = WorkerConfig {
                subscriber_capacity: 1,
                ..WorkerConfig::default()
            };
            let aggregator = ActiveThreadCountAggregator::new("app", &config);
            let (_conn, mut rx) = aggregator.subscribe();

            assert_eq!(aggregator.flush(), 1);
            assert_eq!(aggregator.flush(), 0);
            assert!(rx.try_recv().is_ok());
            assert!(rx.try_recv().is_err());
        }

        #[test]
        fn test_zero_subscriber_capacity_clamped() {
            // 直接构造的配置绕过了 from_env 的校验
            let config = WorkerConfig {
                subscriber_capacity: 0,
                ..WorkerConfig::default()
            };
            let aggregator = ActiveThreadCountAggregator::new("app", &config);
            let (_conn, mut rx) = aggregator.subscribe();

            assert_eq!(aggregator.flush(), 1);
            assert!(rx.try_recv().is_ok());
        }
    }
}
