/// 状态上报
///
/// 轮询服务器的电源与网络状态，稳定后把 `ip` 与 `networks` 写入运行时属性。

use common::PowerState;
use tracing::{debug, info, warn};

use super::{ServerService, StateSnapshot};
use crate::config::PollPolicy;
use crate::context::LifecycleContext;
use crate::errors::{OpError, OpResult};
use crate::orchestrator::Orchestrator;

pub struct StateReporter {
    server: ServerService,
}

impl StateReporter {
    pub fn new(state: Orchestrator) -> Self {
        Self {
            server: ServerService::new(state),
        }
    }

    /// 单次轮询；服务器已运行且地址已分配时写入运行时属性并返回 true
    pub async fn report(&self, ctx: &mut LifecycleContext) -> OpResult<bool> {
        let snapshot = match self.server.get_state(ctx).await? {
            StateSnapshot::Pending => {
                debug!("节点 {} 状态尚未稳定", ctx.instance.id);
                return Ok(false);
            }
            StateSnapshot::Resolved(snapshot) => snapshot,
        };

        if snapshot.power_state != PowerState::On {
            debug!(
                "节点 {} 未运行 (电源状态: {})",
                ctx.instance.id, snapshot.power_state
            );
            return Ok(false);
        }

        let Some(ip) = snapshot.ip else {
            debug!("节点 {} 已运行但尚无地址", ctx.instance.id);
            return Ok(false);
        };

        let runtime = ctx.runtime_properties_mut();
        runtime.set_ip(ip.clone());
        runtime.set_networks(&snapshot.networks);

        info!(
            "📡 节点 {} 状态已上报: ip={}, networks={:?}",
            ctx.instance.id, ip, snapshot.networks
        );
        Ok(true)
    }

    /// 按策略重复调用 `report` 直至成功
    pub async fn wait_until_reported(
        &self,
        ctx: &mut LifecycleContext,
        policy: &PollPolicy,
    ) -> OpResult<()> {
        for attempt in 1..=policy.max_attempts {
            if self.report(ctx).await? {
                return Ok(());
            }

            debug!(
                "节点 {} 第 {}/{} 次状态轮询未就绪",
                ctx.instance.id, attempt, policy.max_attempts
            );

            if attempt < policy.max_attempts {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => {
                        return Err(OpError::Recoverable(format!(
                            "节点 {} 的状态轮询已取消",
                            ctx.instance.id
                        )));
                    }
                    _ = tokio::time::sleep(policy.interval) => {}
                }
            }
        }

        warn!(
            "节点 {} 在 {} 次轮询后仍未上报状态",
            ctx.instance.id, policy.max_attempts
        );
        Err(OpError::Recoverable(format!(
            "节点 {} 在 {} 次轮询后仍未上报状态",
            ctx.instance.id, policy.max_attempts
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::config::LifecycleConfig;
    use crate::context::NodeInstance;
    use common::utils::validate_ip_address;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (InMemoryBackend, Orchestrator) {
        let backend = InMemoryBackend::builder()
            .vdc("acme", "vdc1")
            .catalog_item("acme", "public", "ubuntu")
            .network("vdc1", "mgmt")
            .task_latency(1)
            .build();
        let config = LifecycleConfig::uniform(PollPolicy::new(10, Duration::from_millis(1)));
        let orchestrator = Orchestrator::new(Arc::new(backend.clone()), config);
        (backend, orchestrator)
    }

    fn ctx() -> LifecycleContext {
        LifecycleContext::new(NodeInstance::new(
            "server_1",
            json!({
                "server": {"name": "web", "catalog": "public", "template": "ubuntu"},
                "management_network": "mgmt",
                "vcloud_config": {"org": "acme", "vdc": "vdc1"}
            }),
        ))
    }

    #[tokio::test]
    async fn test_report_only_when_running() {
        let (_backend, orchestrator) = setup();
        let server = orchestrator.server_service();
        let reporter = orchestrator.state_reporter();
        let mut ctx = ctx();

        server.create(&mut ctx).await.unwrap();
        assert!(!reporter.report(&mut ctx).await.unwrap());
        assert_eq!(ctx.runtime_properties().ip(), None);

        server.start(&ctx).await.unwrap();
        assert!(reporter.report(&mut ctx).await.unwrap());

        let ip = ctx.runtime_properties().ip().unwrap().to_string();
        assert!(validate_ip_address(&ip));
        assert_eq!(ctx.runtime_properties().networks().get("mgmt"), Some(&ip));
    }

    #[tokio::test]
    async fn test_wait_until_reported_exhausts() {
        let (_backend, orchestrator) = setup();
        let server = orchestrator.server_service();
        let reporter = orchestrator.state_reporter();
        let mut ctx = ctx();
        server.create(&mut ctx).await.unwrap();

        let err = reporter
            .wait_until_reported(&mut ctx, &PollPolicy::new(3, Duration::from_millis(1)))
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_report_waits_for_address() {
        let (backend, orchestrator) = setup();
        let server = orchestrator.server_service();
        let reporter = orchestrator.state_reporter();
        let mut ctx = ctx();
        server.create(&mut ctx).await.unwrap();

        backend.clear_network_connections("vdc1", "web").await;
        backend.force_power_state("vdc1", "web", PowerState::On).await;

        assert!(!reporter.report(&mut ctx).await.unwrap());
        assert_eq!(ctx.runtime_properties().ip(), None);
        assert!(ctx.runtime_properties().networks().is_empty());
    }

    #[tokio::test]
    async fn test_report_absent_server() {
        let (_backend, orchestrator) = setup();
        let err = orchestrator
            .state_reporter()
            .report(&mut ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::NonRecoverable(_)));
    }
}
