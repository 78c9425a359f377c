/// 异步任务跟踪
///
/// 后端的变更调用立即返回任务句柄，这里负责轮询直至任务结束。
/// 等待是可取消的：取消只停止轮询，不代表后端任务被取消。

use common::TaskStatus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::backend::{BackendClient, TaskHandle};
use crate::config::PollPolicy;
use crate::errors::TaskError;

/// 被跟踪的任务
#[derive(Debug, Clone)]
pub struct TaskRef {
    handle: TaskHandle,
    status: TaskStatus,
    error_message: Option<String>,
}

impl TaskRef {
    pub fn handle(&self) -> &TaskHandle {
        &self.handle
    }

    /// 最近一次观测到的状态
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

#[derive(Clone)]
pub struct TaskTracker {
    backend: Arc<dyn BackendClient>,
    cancel: CancellationToken,
}

impl TaskTracker {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self {
            backend,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn submit(&self, handle: TaskHandle) -> TaskRef {
        TaskRef {
            handle,
            status: TaskStatus::Running,
            error_message: None,
        }
    }

    /// 单次查询任务是否结束（失败也算结束）
    pub async fn is_done(&self, task: &mut TaskRef) -> common::Result<bool> {
        if task.status.is_terminal() {
            return Ok(true);
        }

        let report = self.backend.get_task_status(&task.handle).await?;
        task.status = report.status;
        task.error_message = report.error_message;
        Ok(task.status.is_terminal())
    }

    /// 任务是否成功，仅在 `is_done` 返回 true 后有意义
    pub fn succeeded(&self, task: &TaskRef) -> bool {
        task.status == TaskStatus::Success
    }

    /// 以固定间隔轮询，最多 `policy.max_attempts` 次
    pub async fn wait(&self, mut task: TaskRef, policy: &PollPolicy) -> Result<(), TaskError> {
        for attempt in 1..=policy.max_attempts {
            if self.cancel.is_cancelled() {
                warn!("任务 {} 的等待已取消，后端任务可能仍在执行", task.handle);
                return Err(TaskError::Cancelled {
                    handle: task.handle.0,
                });
            }

            if self.is_done(&mut task).await? {
                if self.succeeded(&task) {
                    debug!("任务 {} 成功完成 (第 {} 次轮询)", task.handle, attempt);
                    return Ok(());
                }

                let message = task
                    .error_message
                    .unwrap_or_else(|| "后端未提供错误信息".to_string());
                warn!("任务 {} 执行失败: {}", task.handle, message);
                return Err(TaskError::Failed {
                    handle: task.handle.0,
                    message,
                });
            }

            debug!(
                "任务 {} 仍在执行 ({}/{})",
                task.handle, attempt, policy.max_attempts
            );

            if attempt < policy.max_attempts {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        warn!("任务 {} 的等待已取消，后端任务可能仍在执行", task.handle);
                        return Err(TaskError::Cancelled {
                            handle: task.handle.0,
                        });
                    }
                    _ = tokio::time::sleep(policy.interval) => {}
                }
            }
        }

        warn!(
            "任务 {} 在 {} 次轮询后仍未完成",
            task.handle, policy.max_attempts
        );
        Err(TaskError::Timeout {
            handle: task.handle.0,
            attempts: policy.max_attempts,
        })
    }
}
