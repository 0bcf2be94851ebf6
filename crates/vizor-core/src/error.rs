//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum VizorError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("上游服务错误: {0}")]
    Upstream(String),

    #[error("DICOM解析错误: {0}")]
    DicomParse(String),

    #[error("未检测到DICOM检查: {0}")]
    NoStudiesDetected(String),

    #[error("无可用数据: {0}")]
    NoData(String),

    #[error("操作已取消: {0}")]
    Cancelled(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 错误大类，调用方据此决定响应方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Upstream,
    NoData,
    Cancelled,
}

impl VizorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VizorError::Validation(_)
            | VizorError::Config(_)
            | VizorError::DicomParse(_)
            | VizorError::InvalidStateTransition { .. } => ErrorKind::Validation,
            VizorError::NotFound(_) => ErrorKind::NotFound,
            VizorError::NoStudiesDetected(_) | VizorError::NoData(_) => ErrorKind::NoData,
            VizorError::Cancelled(_) => ErrorKind::Cancelled,
            VizorError::Database(_)
            | VizorError::Storage(_)
            | VizorError::Upstream(_)
            | VizorError::Serialization(_)
            | VizorError::Io(_)
            | VizorError::Internal(_) => ErrorKind::Upstream,
        }
    }

    /// 不带分类前缀的错误描述，写入会话/索引状态的 last_error 字段
    pub fn detail(&self) -> String {
        match self {
            VizorError::Config(msg)
            | VizorError::Validation(msg)
            | VizorError::NotFound(msg)
            | VizorError::Database(msg)
            | VizorError::Storage(msg)
            | VizorError::Upstream(msg)
            | VizorError::DicomParse(msg)
            | VizorError::NoStudiesDetected(msg)
            | VizorError::NoData(msg)
            | VizorError::Cancelled(msg)
            | VizorError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, VizorError::Cancelled(_))
    }
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, VizorError>;
