//! 数据类型定义

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::protocol::{ActiveThreadCountRes, RouteResult, StreamCode};

/// Agent 标识（应用名 + Agent ID）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub application_name: String,
    pub agent_id: String,
}

impl AgentIdentity {
    pub fn new(application_name: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            agent_id: agent_id.into(),
        }
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application_name, self.agent_id)
    }
}

/// 失败原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailReason {
    /// 流层错误码，如 `STATE_CLOSED`
    Stream(StreamCode),
    /// 请求未能送达，如 `NOT_SUPPORTED_REQUEST`
    Request(RouteResult),
    /// 响应无法识别，显示为 `ROUTE_ERROR:<name>`
    Route(RouteResult),
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::Stream(code) => write!(f, "{}", code.name()),
            FailReason::Request(result) => write!(f, "{}", result.name()),
            FailReason::Route(result) => write!(f, "{}:{}", StreamCode::RouteError.name(), result.name()),
        }
    }
}

/// 采样结果：成功采样与失败原因二选一
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    Result(ActiveThreadCountRes),
    Fail(FailReason),
}

/// 某个 Agent 的活跃线程数结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentActiveThreadCount {
    pub agent_id: String,
    pub outcome: ResponseOutcome,
}

impl AgentActiveThreadCount {
    /// 尚未建立流时的初始结果
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            outcome: ResponseOutcome::Fail(FailReason::Stream(StreamCode::StateNotConnected)),
        }
    }

    pub fn with_result(agent_id: impl Into<String>, result: ActiveThreadCountRes) -> Self {
        Self {
            agent_id: agent_id.into(),
            outcome: ResponseOutcome::Result(result),
        }
    }

    pub fn with_fail(agent_id: impl Into<String>, reason: FailReason) -> Self {
        Self {
            agent_id: agent_id.into(),
            outcome: ResponseOutcome::Fail(reason),
        }
    }

    pub fn set_result(&mut self, result: ActiveThreadCountRes) {
        self.outcome = ResponseOutcome::Result(result);
    }

    pub fn set_fail(&mut self, reason: FailReason) {
        self.outcome = ResponseOutcome::Fail(reason);
    }

    pub fn result(&self) -> Option<&ActiveThreadCountRes> {
        match &self.outcome {
            ResponseOutcome::Result(result) => Some(result),
            ResponseOutcome::Fail(_) => None,
        }
    }

    pub fn fail_reason(&self) -> Option<FailReason> {
        match self.outcome {
            ResponseOutcome::Fail(reason) => Some(reason),
            ResponseOutcome::Result(_) => None,
        }
    }
}

/// 最近一次结果（占位结果）
///
/// 所有克隆共享同一个单元，原地覆盖写入。
/// 持有引用的外部读者无需重新获取即可看到最新值。
#[derive(Debug, Clone)]
pub struct LastResponse {
    inner: Arc<RwLock<AgentActiveThreadCount>>,
}

impl LastResponse {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(AgentActiveThreadCount::new(agent_id))),
        }
    }

    pub fn agent_id(&self) -> String {
        self.inner.read().agent_id.clone()
    }

    pub fn set_result(&self, result: ActiveThreadCountRes) {
        self.inner.write().set_result(result);
    }

    pub fn set_fail(&self, reason: FailReason) {
        self.inner.write().set_fail(reason);
    }

    /// 仅当 `current` 仍等于 `generation` 时写入，返回是否写入
    ///
    /// 检查与写入在同一把写锁内完成，与 [`LastResponse::retire`] 互斥。
    pub fn set_outcome_if_current(
        &self,
        current: &AtomicU64,
        generation: u64,
        outcome: ResponseOutcome,
    ) -> bool {
        let mut guard = self.inner.write();
        if current.load(Ordering::Acquire) != generation {
            return false;
        }
        guard.outcome = outcome;
        true
    }

    /// 清除当前流代号（置 0）并写入失败原因
    ///
    /// 之后旧流的 [`LastResponse::set_outcome_if_current`] 都不会生效。
    pub fn retire(&self, current: &AtomicU64, reason: FailReason) {
        let mut guard = self.inner.write();
        current.store(0, Ordering::Release);
        guard.set_fail(reason);
    }

    /// 当前值的快照
    pub fn snapshot(&self) -> AgentActiveThreadCount {
        self.inner.read().clone()
    }

    pub fn fail_reason(&self) -> Option<FailReason> {
        self.inner.read().fail_reason()
    }

    /// 两个句柄是否指向同一个单元
    pub fn same_cell(&self, other: &LastResponse) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
