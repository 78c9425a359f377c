/// VCloud Lifecycle - 编排核心
///
/// 把"提交即返回、异步完成"的后端调用组织成可靠、幂等的生命周期动作：
/// 服务器的 create/start/stop/delete、存储卷的 create/delete/attach/detach，
/// 以及服务器运行时状态的上报。

pub mod backend;
pub mod config;
pub mod context;
pub mod errors;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod services;

pub use backend::{BackendClient, InMemoryBackend};
pub use config::{LifecycleConfig, PollPolicy};
pub use context::{LifecycleContext, NodeInstance, Relationship, RelationshipContext, RuntimeProperties};
pub use errors::{OpError, OpResult, TaskError, ValidationError};
pub use orchestrator::Orchestrator;
pub use services::{ServerService, StateReporter, StateSnapshot, VolumeService};
