//! 流命令协议定义
//!
//! 消息格式：JSON，按 `type` 字段区分（与 JSONL 通道兼容）。
//! Agent 的回复由路由层包装为 `CommandTransferResponse`，
//! 其 `payload` 是被包装消息的序列化字节，需要二次解码。

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 流消息（命令、响应、路由包装）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    /// 订阅活跃线程数（流命令）
    ActiveThreadCount,

    /// 活跃线程数采样
    ActiveThreadCountRes(ActiveThreadCountRes),

    /// 路由包装
    CommandTransferResponse {
        /// 路由结果
        route_result: RouteResult,
        /// 被包装消息的序列化字节
        payload: Vec<u8>,
    },

    /// 回显（诊断用）
    CommandEcho {
        message: String,
    },
}

/// 活跃线程数采样
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveThreadCountRes {
    /// 直方图 schema 类型（决定各槽位的响应时间区间）
    pub histogram_schema_type: i32,
    /// 各区间的活跃线程数
    pub active_thread_count: Vec<i32>,
    /// 采样时间（Unix 毫秒）
    pub time_stamp: i64,
}

/// 把原始字节解码为消息，无法识别时返回 `None`
pub fn decode(bytes: &[u8]) -> Option<Message> {
    match serde_json::from_slice(bytes) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::trace!("Undecodable stream payload ({} bytes): {}", bytes.len(), e);
            None
        }
    }
}

/// 序列化消息
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// 将消息包装为路由响应
pub fn wrap_transfer(route_result: RouteResult, inner: &Message) -> Result<Message> {
    Ok(Message::CommandTransferResponse {
        route_result,
        payload: encode(inner)?,
    })
}

/// 流错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamCode {
    Ok,
    UnknownError,
    IdError,
    IdIllegal,
    IdDuplicated,
    IdNotFound,
    StateError,
    StateNotConnected,
    StateClosed,
    TypeError,
    TypeUnknown,
    TypeUnsupport,
    PacketError,
    PacketUnknown,
    PacketUnsupport,
    ConnectionError,
    ConnectionNotFound,
    ConnectionTimeout,
    ConnectionUnsupport,
    RouteError,
}

impl StreamCode {
    pub fn name(&self) -> &'static str {
        match self {
            StreamCode::Ok => "OK",
            StreamCode::UnknownError => "UNKNOWN_ERROR",
            StreamCode::IdError => "ID_ERROR",
            StreamCode::IdIllegal => "ID_ILLEGAL",
            StreamCode::IdDuplicated => "ID_DUPLICATED",
            StreamCode::IdNotFound => "ID_NOT_FOUND",
            StreamCode::StateError => "STATE_ERROR",
            StreamCode::StateNotConnected => "STATE_NOT_CONNECTED",
            StreamCode::StateClosed => "STATE_CLOSED",
            StreamCode::TypeError => "TYPE_ERROR",
            StreamCode::TypeUnknown => "TYPE_UNKNOWN",
            StreamCode::TypeUnsupport => "TYPE_UNSUPPORT",
            StreamCode::PacketError => "PACKET_ERROR",
            StreamCode::PacketUnknown => "PACKET_UNKNOWN",
            StreamCode::PacketUnsupport => "PACKET_UNSUPPORT",
            StreamCode::ConnectionError => "CONNECTION_ERROR",
            StreamCode::ConnectionNotFound => "CONNECTION_NOT_FOUND",
            StreamCode::ConnectionTimeout => "CONNECTION_TIMEOUT",
            StreamCode::ConnectionUnsupport => "CONNECTION_UNSUPPORT",
            StreamCode::RouteError => "ROUTE_ERROR",
        }
    }
}

impl std::fmt::Display for StreamCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 路由结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RouteResult {
    Ok,
    BadRequest,
    EmptyRequest,
    NotSupportedRequest,
    BadResponse,
    EmptyResponse,
    NotSupportedResponse,
    Timeout,
    NotFound,
    NotAcceptable,
    NotSupportedService,
    Unknown,
}

impl RouteResult {
    pub fn name(&self) -> &'static str {
        match self {
            RouteResult::Ok => "OK",
            RouteResult::BadRequest => "BAD_REQUEST",
            RouteResult::EmptyRequest => "EMPTY_REQUEST",
            RouteResult::NotSupportedRequest => "NOT_SUPPORTED_REQUEST",
            RouteResult::BadResponse => "BAD_RESPONSE",
            RouteResult::EmptyResponse => "EMPTY_RESPONSE",
            RouteResult::NotSupportedResponse => "NOT_SUPPORTED_RESPONSE",
            RouteResult::Timeout => "TIMEOUT",
            RouteResult::NotFound => "NOT_FOUND",
            RouteResult::NotAcceptable => "NOT_ACCEPTABLE",
            RouteResult::NotSupportedService => "NOT_SUPPORTED_SERVICE",
            RouteResult::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for RouteResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 流通道状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamChannelState {
    New,
    Open,
    OpenAwait,
    OpenArrived,
    Connected,
    Closed,
    IllegalState,
}

impl StreamChannelState {
    /// 是否为终止状态（流已不可用）
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamChannelState::Closed | StreamChannelState::IllegalState)
    }
}
