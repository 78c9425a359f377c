/// 后端客户端错误定义
///
/// 后端客户端门面（Backend Client Facade）的所有调用都返回这里定义的错误，
/// 编排核心再根据错误种类决定是否可重试。

use thiserror::Error;

/// 统一错误类型
#[derive(Error, Debug)]
pub enum Error {
    /// 会话或连接失败，始终视为可重试
    #[error("后端不可用: {0}")]
    Unavailable(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    /// 后端因结构性原因拒绝了操作（例如删除运行中的虚拟机）
    #[error("操作被后端拒绝: {0}")]
    Rejected(String),

    #[error("后端暂时性错误: {0}")]
    Transient(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// 是否为连接类错误
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::Unavailable(_))
    }
}

/// 统一结果类型
pub type Result<T> = std::result::Result<T, Error>;
