/// 生命周期错误定义
///
/// 调用方根据错误种类选择恢复策略，而不是匹配错误消息字符串。

use thiserror::Error;

/// 校验错误（不可恢复，发生在任何后端变更之前）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("缺少必填字段: {field}")]
    MissingField { field: String },

    #[error("{kind} 不存在: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("字段 {field} 的值无效: {reason}")]
    Malformed { field: String, reason: String },

    #[error("{kind} 已被占用: {name}")]
    AlreadyExists { kind: &'static str, name: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField { field: field.into() }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound { kind, name: name.into() }
    }

    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// 异步任务等待错误
#[derive(Error, Debug)]
pub enum TaskError {
    /// 任务结束但失败，携带后端上报的错误信息
    #[error("任务 {handle} 执行失败: {message}")]
    Failed { handle: String, message: String },

    #[error("任务 {handle} 在 {attempts} 次轮询后仍未完成")]
    Timeout { handle: String, attempts: u32 },

    /// 调用方取消了等待，后端任务可能仍在执行
    #[error("任务 {handle} 的等待已被取消")]
    Cancelled { handle: String },

    #[error("查询任务状态失败: {0}")]
    Backend(#[from] common::Error),
}

/// 生命周期操作错误
#[derive(Error, Debug)]
pub enum OpError {
    #[error("配置校验失败: {0}")]
    Validation(#[from] ValidationError),

    /// 调用方可稍后重新调用同一个幂等操作
    #[error("可重试错误: {0}")]
    Recoverable(String),

    /// 需要修正配置或先执行其他操作
    #[error("不可恢复错误: {0}")]
    NonRecoverable(String),

    /// 会话或连接失败，始终可重试
    #[error("后端不可用: {0}")]
    BackendUnavailable(String),
}

impl OpError {
    /// 是否可以通过重新调用同一操作恢复
    pub fn is_recoverable(&self) -> bool {
        matches!(self, OpError::Recoverable(_) | OpError::BackendUnavailable(_))
    }

    /// 将任务等待错误映射为操作错误，`operation` 描述正在执行的操作
    pub fn from_task(operation: &str, err: TaskError) -> Self {
        match err {
            TaskError::Backend(e) => OpError::from(e),
            other => OpError::Recoverable(format!("{}: {}", operation, other)),
        }
    }
}

impl From<common::Error> for OpError {
    fn from(err: common::Error) -> Self {
        match err {
            common::Error::Unavailable(msg) => OpError::BackendUnavailable(msg),
            common::Error::Rejected(_) | common::Error::NotFound(_) => {
                OpError::NonRecoverable(err.to_string())
            }
            other => OpError::Recoverable(other.to_string()),
        }
    }
}

/// 生命周期操作结果类型
pub type OpResult<T> = std::result::Result<T, OpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_mapping() {
        let err: OpError = common::Error::Unavailable("session expired".into()).into();
        assert!(matches!(err, OpError::BackendUnavailable(_)));
        assert!(err.is_recoverable());

        let err: OpError = common::Error::Rejected("vApp is powered on".into()).into();
        assert!(matches!(err, OpError::NonRecoverable(_)));
        assert!(!err.is_recoverable());

        let err: OpError = common::Error::Transient("busy".into()).into();
        assert!(matches!(err, OpError::Recoverable(_)));
    }

    #[test]
    fn test_task_error_mapping() {
        let err = OpError::from_task(
            "启动虚拟机 web",
            TaskError::Timeout {
                handle: "task-1".into(),
                attempts: 3,
            },
        );
        assert!(matches!(err, OpError::Recoverable(_)));
        assert!(err.to_string().contains("web"));

        let err = OpError::from_task(
            "启动虚拟机 web",
            TaskError::Backend(common::Error::Unavailable("down".into())),
        );
        assert!(matches!(err, OpError::BackendUnavailable(_)));
    }

    #[test]
    fn test_validation_error_message_names_field() {
        let err = ValidationError::missing("server.template");
        assert!(err.to_string().contains("server.template"));

        let err = ValidationError::not_found("catalog", "fake-catalog");
        assert!(err.to_string().contains("fake-catalog"));
    }
}
