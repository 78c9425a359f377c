/// 编排核心全局状态
///
/// 宿主只需构造一次，之后按需取出各个服务。所有服务共享同一个后端客户端，
/// 除此之外没有共享的可变状态。

use std::sync::Arc;

use crate::backend::BackendClient;
use crate::config::LifecycleConfig;
use crate::logging;
use crate::services::{
    ResourceResolver, ServerService, StateReporter, TaskTracker, VolumeService,
};

#[derive(Clone)]
pub struct Orchestrator {
    /// 后端客户端（会话由外部建立）
    pub backend: Arc<dyn BackendClient>,
    /// 各类操作的轮询预算
    pub config: Arc<LifecycleConfig>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn BackendClient>, config: LifecycleConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }

    /// 按配置的日志级别安装日志订阅者，`RUST_LOG` 仍然优先
    pub fn init_logging(&self) {
        logging::init_tracing(&self.config.log_level);
    }

    pub fn backend(&self) -> Arc<dyn BackendClient> {
        self.backend.clone()
    }

    pub fn config(&self) -> Arc<LifecycleConfig> {
        self.config.clone()
    }

    pub fn resolver(&self) -> ResourceResolver {
        ResourceResolver::new(self.backend())
    }

    pub fn task_tracker(&self) -> TaskTracker {
        TaskTracker::new(self.backend())
    }

    pub fn server_service(&self) -> ServerService {
        ServerService::new(self.clone())
    }

    pub fn volume_service(&self) -> VolumeService {
        VolumeService::new(self.clone())
    }

    pub fn state_reporter(&self) -> StateReporter {
        StateReporter::new(self.clone())
    }
}
