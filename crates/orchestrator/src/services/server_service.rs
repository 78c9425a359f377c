/// 服务器生命周期管理
///
/// 状态机：Absent → Creating → Stopped → Starting → Running → Stopping → Stopped → Deleting → Absent。
/// 每个动作开始时都重新从后端解析身份与状态，不信任任何本地缓存，因此重复调用是安全的。

use common::utils::validate_ip_address;
use common::{PowerState, ServerState};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{NetworkBinder, ResourceResolver, Scope, TaskTracker};
use crate::backend::{ComposeRequest, NetworkConnection, VApp};
use crate::context::LifecycleContext;
use crate::errors::{OpError, OpResult, TaskError, ValidationError};
use crate::models::{GuestCustomization, HardwareSpec, ServerSpec};
use crate::orchestrator::Orchestrator;

/// 电源与网络快照
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerAndNetworkSnapshot {
    pub power_state: PowerState,
    /// 管理网络地址，其次主网卡地址，再其次第一个地址
    pub ip: Option<String>,
    /// 网络名称 → 地址
    pub networks: BTreeMap<String, String>,
}

/// 单次状态查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateSnapshot {
    /// 后端尚未给出确定状态，调用方应稍后重试
    Pending,
    Resolved(PowerAndNetworkSnapshot),
}

/// 解析完成的创建计划
struct ServerPlan {
    spec: ServerSpec,
    connection: NetworkConnection,
    scope: Scope,
}

pub struct ServerService {
    state: Orchestrator,
    resolver: ResourceResolver,
}

impl ServerService {
    pub fn new(state: Orchestrator) -> Self {
        let resolver = state.resolver();
        Self { state, resolver }
    }

    fn tracker(&self, cancel: &CancellationToken) -> TaskTracker {
        self.state.task_tracker().with_cancel(cancel.clone())
    }

    fn transition(name: &str, from: ServerState, to: ServerState) {
        info!("🔄 服务器 {} 状态变更: {} → {}", name, from, to);
    }

    async fn plan(&self, ctx: &LifecycleContext) -> OpResult<ServerPlan> {
        let spec = ServerSpec::from_properties(ctx.properties())?;
        let binding = NetworkBinder::resolve(&ctx.relationships)?;
        let connection =
            NetworkBinder::connection_for(binding.as_ref(), spec.management_network.as_deref())?;
        let scope = self.resolver.resolve_scope(&spec.vcloud_config).await?;

        Ok(ServerPlan {
            spec,
            connection,
            scope,
        })
    }

    async fn locate(&self, ctx: &LifecycleContext) -> OpResult<(ServerSpec, Option<VApp>)> {
        let spec = ServerSpec::from_properties(ctx.properties())?;
        let scope = self.resolver.resolve_scope(&spec.vcloud_config).await?;
        let vapp = self.resolver.find_server(&scope, &spec.name).await?;
        Ok((spec, vapp))
    }

    /// 校验声明：必填字段、硬件取值、目录/模板/网络是否存在。不做任何后端变更。
    pub async fn validate(&self, ctx: &LifecycleContext) -> OpResult<()> {
        let plan = self.plan(ctx).await?;

        self.resolver
            .find_catalog_item(&plan.scope, &plan.spec.catalog, &plan.spec.template)
            .await?;

        let network_name = &plan.connection.network_name;
        if self
            .resolver
            .find_network(&plan.scope, network_name)
            .await?
            .is_none()
        {
            return Err(ValidationError::not_found("network", network_name).into());
        }

        info!("✅ 服务器 {} 配置校验通过", plan.spec.name);
        Ok(())
    }

    /// 创建服务器
    ///
    /// 已存在同名 vApp 时直接成功（必要时补齐网络连接）。等待超时返回可重试错误且不回滚，
    /// 再次调用会发现已存在的对象。组合任务失败时尽力删除残留的 vApp。
    pub async fn create(&self, ctx: &mut LifecycleContext) -> OpResult<()> {
        let ServerPlan {
            spec,
            connection,
            scope,
        } = self.plan(ctx).await?;
        let tracker = self.tracker(&ctx.cancel);

        if let Some(vapp) = self.resolver.find_server(&scope, &spec.name).await? {
            info!(
                "服务器 {} 已存在 (电源状态: {})，跳过创建",
                spec.name, vapp.power_state
            );
            if !vapp.is_connected_to(&connection.network_name) {
                self.reconcile_network(&tracker, &vapp, &connection).await?;
            }
            ctx.runtime_properties_mut().set_vcloud_vapp_name(&spec.name);
            return Ok(());
        }

        let catalog_item = self
            .resolver
            .find_catalog_item(&scope, &spec.catalog, &spec.template)
            .await?;

        Self::transition(&spec.name, ServerState::Absent, ServerState::Creating);
        info!(
            "🚀 组合 vApp {}: 模板 {}/{}, 网络 {} ({})",
            spec.name,
            spec.catalog,
            spec.template,
            connection.network_name,
            connection.ip_allocation_mode
        );

        let request = ComposeRequest {
            vdc: scope.vdc.clone(),
            name: spec.name.clone(),
            catalog_item,
            hardware: spec.hardware.as_ref().and_then(HardwareSpec::to_hardware),
            customization: spec
                .guest_customization
                .as_ref()
                .map(GuestCustomization::to_payload),
            network: connection,
        };

        let handle = self.state.backend.compose_vapp(&request).await?;
        let task = tracker.submit(handle);

        match tracker.wait(task, &self.state.config.create).await {
            Ok(()) => {}
            Err(TaskError::Failed { handle, message }) => {
                error!(
                    "❌ 服务器 {} 组合任务 {} 失败: {}",
                    spec.name, handle, message
                );
                self.cleanup_failed_compose(&tracker, &scope, &spec.name).await;
                return Err(OpError::Recoverable(format!(
                    "创建服务器 {} 失败: {}",
                    spec.name, message
                )));
            }
            Err(e) => {
                warn!("服务器 {} 未在预算内完成创建，可重新调用 create", spec.name);
                return Err(OpError::from_task(&format!("创建服务器 {}", spec.name), e));
            }
        }

        ctx.runtime_properties_mut().set_vcloud_vapp_name(&spec.name);
        Self::transition(&spec.name, ServerState::Creating, ServerState::Stopped);
        info!("✅ 服务器 {} 创建成功", spec.name);
        Ok(())
    }

    async fn reconcile_network(
        &self,
        tracker: &TaskTracker,
        vapp: &VApp,
        connection: &NetworkConnection,
    ) -> OpResult<()> {
        info!(
            "🔌 服务器 {} 未连接到网络 {}，更新网络连接",
            vapp.name, connection.network_name
        );
        let handle = self
            .state
            .backend
            .connect_network(vapp, connection)
            .await?;

        tracker
            .wait(tracker.submit(handle), &self.state.config.attach)
            .await
            .map_err(|e| OpError::from_task(&format!("更新服务器 {} 的网络连接", vapp.name), e))?;

        info!("✅ 服务器 {} 已连接到网络 {}", vapp.name, connection.network_name);
        Ok(())
    }

    /// 尽力清理组合失败后残留的 vApp，自身的失败只记录日志
    async fn cleanup_failed_compose(&self, tracker: &TaskTracker, scope: &Scope, name: &str) {
        let vapp = match self.resolver.find_server(scope, name).await {
            Ok(Some(vapp)) => vapp,
            Ok(None) => return,
            Err(e) => {
                warn!("清理服务器 {} 时查询失败: {}", name, e);
                return;
            }
        };

        let handle = match self.state.backend.delete_vapp(&vapp).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("清理服务器 {} 失败: {}", name, e);
                return;
            }
        };

        match tracker
            .wait(tracker.submit(handle), &self.state.config.create)
            .await
        {
            Ok(()) => info!("🧹 已清理组合失败的服务器 {}", name),
            Err(e) => warn!("清理服务器 {} 失败: {}", name, e),
        }
    }

    /// 开机，已运行时直接成功
    pub async fn start(&self, ctx: &LifecycleContext) -> OpResult<()> {
        let (spec, vapp) = self.locate(ctx).await?;
        let vapp = vapp.ok_or_else(|| {
            OpError::NonRecoverable(format!("服务器 {} 不存在，无法启动", spec.name))
        })?;

        if vapp.is_on() {
            info!("服务器 {} 已处于运行状态，跳过启动", spec.name);
            return Ok(());
        }

        let observed = ServerState::observed(Some(vapp.power_state));
        Self::transition(&spec.name, observed, ServerState::Starting);
        let handle = self.state.backend.power_on(&vapp).await?;
        let tracker = self.tracker(&ctx.cancel);
        tracker
            .wait(tracker.submit(handle), &self.state.config.power)
            .await
            .map_err(|e| OpError::from_task(&format!("启动服务器 {}", spec.name), e))?;

        Self::transition(&spec.name, ServerState::Starting, ServerState::Running);
        Ok(())
    }

    /// 关机，已关机或不存在时直接成功
    pub async fn stop(&self, ctx: &LifecycleContext) -> OpResult<()> {
        let (spec, vapp) = self.locate(ctx).await?;
        let Some(vapp) = vapp else {
            info!("服务器 {} 不存在，跳过停止", spec.name);
            return Ok(());
        };

        if vapp.power_state == PowerState::Off {
            info!("服务器 {} 已处于关机状态，跳过停止", spec.name);
            return Ok(());
        }

        let observed = ServerState::observed(Some(vapp.power_state));
        Self::transition(&spec.name, observed, ServerState::Stopping);
        let handle = self.state.backend.power_off(&vapp).await?;
        let tracker = self.tracker(&ctx.cancel);
        tracker
            .wait(tracker.submit(handle), &self.state.config.power)
            .await
            .map_err(|e| OpError::from_task(&format!("停止服务器 {}", spec.name), e))?;

        Self::transition(&spec.name, ServerState::Stopping, ServerState::Stopped);
        Ok(())
    }

    /// 删除服务器，不存在时直接成功
    ///
    /// 不会自动关机：后端拒绝删除运行中的服务器时返回不可恢复错误，调用方需先 stop。
    /// 后端可能同步拒绝，也可能受理后让任务失败，两种情况的结果相同。
    pub async fn delete(&self, ctx: &LifecycleContext) -> OpResult<()> {
        let (spec, vapp) = self.locate(ctx).await?;
        let Some(vapp) = vapp else {
            info!("服务器 {} 不存在，跳过删除", spec.name);
            return Ok(());
        };
        let observed = ServerState::observed(Some(vapp.power_state));

        let handle = match self.state.backend.delete_vapp(&vapp).await {
            Ok(handle) => handle,
            Err(common::Error::Rejected(message)) => {
                warn!("服务器 {} 删除被拒绝: {}", spec.name, message);
                return Err(OpError::NonRecoverable(format!(
                    "服务器 {} 删除被拒绝，请先停止: {}",
                    spec.name, message
                )));
            }
            Err(e) => return Err(e.into()),
        };

        Self::transition(&spec.name, observed, ServerState::Deleting);
        let tracker = self.tracker(&ctx.cancel);
        tracker
            .wait(tracker.submit(handle), &self.state.config.create)
            .await
            .map_err(|e| match e {
                TaskError::Failed { message, .. } if observed == ServerState::Running => {
                    warn!("服务器 {} 删除任务失败: {}", spec.name, message);
                    OpError::NonRecoverable(format!(
                        "服务器 {} 删除被拒绝，请先停止: {}",
                        spec.name, message
                    ))
                }
                e => OpError::from_task(&format!("删除服务器 {}", spec.name), e),
            })?;

        Self::transition(&spec.name, ServerState::Deleting, ServerState::Absent);
        Ok(())
    }

    /// 单次查询电源与网络状态
    pub async fn get_state(&self, ctx: &LifecycleContext) -> OpResult<StateSnapshot> {
        let (spec, vapp) = self.locate(ctx).await?;
        let vapp = vapp.ok_or_else(|| {
            OpError::NonRecoverable(format!("服务器 {} 不存在", spec.name))
        })?;

        if vapp.power_state == PowerState::Unresolved {
            debug!("服务器 {} 电源状态未定", spec.name);
            return Ok(StateSnapshot::Pending);
        }

        let unaddressed = vapp.network_connections.iter().any(|c| {
            !c.ip_address
                .as_deref()
                .map(validate_ip_address)
                .unwrap_or(false)
        });
        if vapp.is_on() && unaddressed {
            debug!("服务器 {} 已开机，等待地址分配", spec.name);
            return Ok(StateSnapshot::Pending);
        }

        let networks: BTreeMap<String, String> = vapp
            .network_connections
            .iter()
            .filter_map(|c| {
                c.ip_address
                    .as_ref()
                    .map(|ip| (c.network_name.clone(), ip.clone()))
            })
            .collect();

        let ip = spec
            .management_network
            .as_deref()
            .and_then(|name| networks.get(name).cloned())
            .or_else(|| {
                vapp.network_connections
                    .iter()
                    .find(|c| c.primary)
                    .and_then(|c| c.ip_address.clone())
            })
            .or_else(|| networks.values().next().cloned());

        if vapp.is_on() && ip.is_none() {
            debug!("服务器 {} 已开机但没有任何地址", spec.name);
            return Ok(StateSnapshot::Pending);
        }

        Ok(StateSnapshot::Resolved(PowerAndNetworkSnapshot {
            power_state: vapp.power_state,
            ip,
            networks,
        }))
    }
}
