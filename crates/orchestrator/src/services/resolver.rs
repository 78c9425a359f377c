/// 资源标识解析
///
/// 把声明中的名称（或外部资源 ID）映射到后端已存在的对象。只读，不做任何变更，
/// 每个生命周期动作开始时都重新查询，保证动作幂等。

use std::sync::Arc;
use tracing::debug;

use crate::backend::{
    BackendClient, CatalogItem, Disk, DiskLink, OrgNetwork, Organization, VApp,
    VirtualDatacenter,
};
use crate::errors::{OpResult, ValidationError};
use crate::models::VCloudConfig;

/// 已解析的后端作用域
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub org: Organization,
    pub vdc: VirtualDatacenter,
}

#[derive(Clone)]
pub struct ResourceResolver {
    backend: Arc<dyn BackendClient>,
}

impl ResourceResolver {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        Self { backend }
    }

    /// 解析组织与虚拟数据中心，不存在时为校验错误
    pub async fn resolve_scope(&self, config: &VCloudConfig) -> OpResult<Scope> {
        let org = self
            .backend
            .get_organization(&config.org)
            .await?
            .ok_or_else(|| ValidationError::not_found("organization", &config.org))?;

        let vdc = self
            .backend
            .get_virtual_datacenter(&org, &config.vdc)
            .await?
            .ok_or_else(|| ValidationError::not_found("virtual datacenter", &config.vdc))?;

        Ok(Scope { org, vdc })
    }

    /// 解析目录与模板，分别报告哪一个不存在
    pub async fn find_catalog_item(
        &self,
        scope: &Scope,
        catalog: &str,
        template: &str,
    ) -> OpResult<CatalogItem> {
        let catalog_obj = self
            .backend
            .get_catalog(&scope.org, catalog)
            .await?
            .ok_or_else(|| ValidationError::not_found("catalog", catalog))?;

        let item = self
            .backend
            .get_catalog_item(&catalog_obj, template)
            .await?
            .ok_or_else(|| ValidationError::not_found("template", template))?;

        Ok(item)
    }

    pub async fn find_network(&self, scope: &Scope, name: &str) -> OpResult<Option<OrgNetwork>> {
        Ok(self.backend.get_network(&scope.vdc, name).await?)
    }

    pub async fn find_server(&self, scope: &Scope, name: &str) -> OpResult<Option<VApp>> {
        let vapp = self.backend.get_vapp(&scope.vdc, name).await?;
        debug!(
            "查找服务器 {}/{}: {}",
            scope.vdc.name,
            name,
            vapp.as_ref().map(|v| v.power_state.as_str()).unwrap_or("absent")
        );
        Ok(vapp)
    }

    /// 按名称或 ID 查找磁盘，同时返回当前挂载关系
    pub async fn find_disk(
        &self,
        scope: &Scope,
        name_or_id: &str,
    ) -> OpResult<Option<(Disk, Vec<DiskLink>)>> {
        let disks = self.backend.get_disks(&scope.vdc).await?;
        Ok(disks
            .into_iter()
            .find(|(disk, _)| disk.name == name_or_id || disk.id == name_or_id))
    }
}
