//! 错误定义模块

use thiserror::Error;

/// 分诊系统统一错误类型
#[derive(Error, Debug)]
pub enum TriageError {
    /// 标准专科集合与关键词表/医院表不一致，启动时即失败
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 单条记录缺少必需字段或字段格式错误，只影响该记录
    #[error("记录验证错误: {0}")]
    Validation(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("系统内部错误: {0}")]
    Internal(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },
}

/// 外部生成式模型调用失败的原因
///
/// 分类器在本地把这些错误恢复为兜底专科，不向调用方传播。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerativeError {
    #[error("无法连接生成式模型服务: {0}")]
    Transport(String),

    #[error("生成式模型调用超时 ({0}ms)")]
    Timeout(u64),

    #[error("生成式模型服务返回错误状态 {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("生成式模型返回空响应")]
    EmptyResponse,

    #[error("响应解析失败: {0}")]
    Parse(String),

    #[error("返回的专科不在标准列表中: {0}")]
    UnrecognizedLabel(String),
}

/// 分诊系统统一结果类型
pub type Result<T> = std::result::Result<T, TriageError>;
