/// 块存储卷生命周期管理
///
/// 挂载关系始终以后端的磁盘列表为准：变更前后都重新查询，不在本地维护计数。
/// 外部资源卷只做挂载/分离，从不创建或删除。

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ResourceResolver, Scope, TaskTracker};
use crate::backend::{CreateDiskRequest, Disk, DiskLink, VApp};
use crate::context::{LifecycleContext, NodeInstance, RelationshipContext};
use crate::errors::{OpError, OpResult, ValidationError};
use crate::models::VolumeSpec;
use crate::orchestrator::Orchestrator;

/// 挂载/分离的两端
struct Endpoints {
    spec: VolumeSpec,
    scope: Scope,
    vapp: VApp,
    disk: Disk,
    links: Vec<DiskLink>,
}

pub struct VolumeService {
    state: Orchestrator,
    resolver: ResourceResolver,
}

impl VolumeService {
    pub fn new(state: Orchestrator) -> Self {
        let resolver = state.resolver();
        Self { state, resolver }
    }

    fn tracker(&self, cancel: &CancellationToken) -> TaskTracker {
        self.state.task_tracker().with_cancel(cancel.clone())
    }

    /// 外部资源卷检查磁盘存在；否则检查名称/容量格式以及名称未被占用
    pub async fn validate(&self, ctx: &LifecycleContext) -> OpResult<()> {
        let spec = VolumeSpec::from_properties(ctx.properties())?;
        let scope = self.resolver.resolve_scope(&spec.vcloud_config).await?;
        let existing = self.resolver.find_disk(&scope, &spec.name).await?;

        match (spec.use_external_resource, existing) {
            (true, None) => {
                return Err(ValidationError::not_found("disk", &spec.name).into());
            }
            (false, Some(_)) => {
                return Err(ValidationError::AlreadyExists {
                    kind: "disk",
                    name: spec.name.clone(),
                }
                .into());
            }
            _ => {}
        }

        info!("✅ 存储卷 {} 配置校验通过", spec.name);
        Ok(())
    }

    /// 创建磁盘，外部资源或已存在时直接成功
    pub async fn create_volume(&self, ctx: &mut LifecycleContext) -> OpResult<()> {
        let spec = VolumeSpec::from_properties(ctx.properties())?;

        if spec.use_external_resource {
            info!("存储卷 {} 为外部资源，跳过创建", spec.name);
            ctx.runtime_properties_mut().set_vcloud_disk_name(&spec.name);
            return Ok(());
        }

        let scope = self.resolver.resolve_scope(&spec.vcloud_config).await?;
        if self.resolver.find_disk(&scope, &spec.name).await?.is_some() {
            info!("存储卷 {} 已存在，跳过创建", spec.name);
            ctx.runtime_properties_mut().set_vcloud_disk_name(&spec.name);
            return Ok(());
        }

        info!("💾 创建存储卷 {} ({} MB)", spec.name, spec.size_mb);
        let request = CreateDiskRequest {
            vdc: scope.vdc.clone(),
            name: spec.name.clone(),
            size_mb: spec.size_mb,
        };
        let handle = self.state.backend.create_disk(&request).await?;

        let tracker = self.tracker(&ctx.cancel);
        tracker
            .wait(tracker.submit(handle), &self.state.config.create)
            .await
            .map_err(|e| OpError::from_task(&format!("创建存储卷 {}", spec.name), e))?;

        ctx.runtime_properties_mut().set_vcloud_disk_name(&spec.name);
        info!("✅ 存储卷 {} 创建成功", spec.name);
        Ok(())
    }

    /// 删除磁盘，外部资源或不存在时直接成功；仍有挂载关系时拒绝
    pub async fn delete_volume(&self, ctx: &LifecycleContext) -> OpResult<()> {
        let spec = VolumeSpec::from_properties(ctx.properties())?;

        if spec.use_external_resource {
            info!("存储卷 {} 为外部资源，跳过删除", spec.name);
            return Ok(());
        }

        let scope = self.resolver.resolve_scope(&spec.vcloud_config).await?;
        let Some((disk, links)) = self.resolver.find_disk(&scope, &spec.name).await? else {
            info!("存储卷 {} 不存在，跳过删除", spec.name);
            return Ok(());
        };

        if !links.is_empty() {
            let attached: Vec<&str> = links.iter().map(|l| l.vapp_name.as_str()).collect();
            return Err(OpError::NonRecoverable(format!(
                "存储卷 {} 仍挂载在 {:?}，请先分离",
                spec.name, attached
            )));
        }

        info!("🗑️ 删除存储卷 {}", spec.name);
        let handle = self.state.backend.delete_disk(&disk).await?;

        let tracker = self.tracker(&ctx.cancel);
        tracker
            .wait(tracker.submit(handle), &self.state.config.create)
            .await
            .map_err(|e| OpError::from_task(&format!("删除存储卷 {}", spec.name), e))?;

        info!("✅ 存储卷 {} 已删除", spec.name);
        Ok(())
    }

    /// 服务器在后端的名称：优先取运行时属性，其次取声明
    fn server_name(target: &NodeInstance) -> OpResult<String> {
        if let Some(name) = target.runtime_properties.vcloud_vapp_name() {
            return Ok(name.to_string());
        }

        target
            .properties
            .get("server")
            .and_then(|server| server.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ValidationError::missing("vcloud_vapp_name").into())
    }

    async fn endpoints(&self, ctx: &RelationshipContext) -> OpResult<Endpoints> {
        let spec = VolumeSpec::from_properties(&ctx.source.properties)?;
        let server_name = Self::server_name(&ctx.target)?;
        let scope = self.resolver.resolve_scope(&spec.vcloud_config).await?;

        let vapp = self
            .resolver
            .find_server(&scope, &server_name)
            .await?
            .ok_or_else(|| OpError::NonRecoverable(format!("服务器 {} 不存在", server_name)))?;

        let (disk, links) = self
            .resolver
            .find_disk(&scope, &spec.name)
            .await?
            .ok_or_else(|| OpError::NonRecoverable(format!("存储卷 {} 不存在", spec.name)))?;

        Ok(Endpoints {
            spec,
            scope,
            vapp,
            disk,
            links,
        })
    }

    /// 变更后重新查询挂载关系，确认目标服务器的链接是否存在
    async fn linked_after(&self, endpoints: &Endpoints) -> OpResult<(bool, usize)> {
        let links = self
            .resolver
            .find_disk(&endpoints.scope, &endpoints.disk.id)
            .await?
            .map(|(_, links)| links)
            .unwrap_or_default();
        let linked = links.iter().any(|l| l.vapp_id == endpoints.vapp.id);
        Ok((linked, links.len()))
    }

    /// 挂载卷到服务器，已挂载时直接成功
    pub async fn attach_volume(&self, ctx: &RelationshipContext) -> OpResult<()> {
        let endpoints = self.endpoints(ctx).await?;
        let (spec, vapp, disk) = (&endpoints.spec, &endpoints.vapp, &endpoints.disk);

        if endpoints.links.iter().any(|l| l.vapp_id == vapp.id) {
            info!("存储卷 {} 已挂载到服务器 {}，跳过", spec.name, vapp.name);
            return Ok(());
        }

        info!("🔗 挂载存储卷 {} 到服务器 {}", spec.name, vapp.name);
        let handle = self.state.backend.attach_disk(vapp, disk).await?;

        let tracker = self.tracker(&ctx.cancel);
        tracker
            .wait(tracker.submit(handle), &self.state.config.attach)
            .await
            .map_err(|e| {
                OpError::from_task(&format!("挂载存储卷 {} 到 {}", spec.name, vapp.name), e)
            })?;

        let (linked, count) = self.linked_after(&endpoints).await?;
        if !linked {
            warn!("挂载任务已完成，但存储卷 {} 的挂载列表中没有 {}", spec.name, vapp.name);
            return Err(OpError::Recoverable(format!(
                "存储卷 {} 挂载到 {} 后未能确认挂载关系",
                spec.name, vapp.name
            )));
        }

        debug!(
            "存储卷 {} 挂载数: {} → {}",
            spec.name,
            endpoints.links.len(),
            count
        );
        info!("✅ 存储卷 {} 已挂载到服务器 {}", spec.name, vapp.name);
        Ok(())
    }

    /// 从服务器分离卷，未挂载时直接成功；只移除本次操作对应的链接
    pub async fn detach_volume(&self, ctx: &RelationshipContext) -> OpResult<()> {
        let endpoints = self.endpoints(ctx).await?;
        let (spec, vapp, disk) = (&endpoints.spec, &endpoints.vapp, &endpoints.disk);

        if !endpoints.links.iter().any(|l| l.vapp_id == vapp.id) {
            info!("存储卷 {} 未挂载到服务器 {}，跳过", spec.name, vapp.name);
            return Ok(());
        }

        info!("✂️ 从服务器 {} 分离存储卷 {}", vapp.name, spec.name);
        let handle = self.state.backend.detach_disk(vapp, disk).await?;

        let tracker = self.tracker(&ctx.cancel);
        tracker
            .wait(tracker.submit(handle), &self.state.config.attach)
            .await
            .map_err(|e| {
                OpError::from_task(&format!("从 {} 分离存储卷 {}", vapp.name, spec.name), e)
            })?;

        let (linked, count) = self.linked_after(&endpoints).await?;
        if linked {
            warn!("分离任务已完成，但存储卷 {} 仍挂载在 {}", spec.name, vapp.name);
            return Err(OpError::Recoverable(format!(
                "存储卷 {} 从 {} 分离后挂载关系仍然存在",
                spec.name, vapp.name
            )));
        }

        debug!(
            "存储卷 {} 挂载数: {} → {}",
            spec.name,
            endpoints.links.len(),
            count
        );
        info!("✅ 存储卷 {} 已从服务器 {} 分离", spec.name, vapp.name);
        Ok(())
    }
}
