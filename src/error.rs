//! 错误类型定义
//!
//! Worker 的公开操作从不返回错误：所有失败都会被吸收并写入占位结果。
//! 这里的错误类型供 Transport 实现、编解码和配置解析使用。

use thiserror::Error;

/// 库错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// Transport 层故障（如不支持的请求）
    #[error("Transport 错误: {0}")]
    Transport(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// Worker 已释放（控制循环不再接收消息）
    #[error("Worker 已释放: {0}")]
    WorkerGone(String),

    /// 其他错误
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, Error>;
