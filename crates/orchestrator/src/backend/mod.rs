/// 后端客户端门面
///
/// 定义编排核心所需的云控制面接口。会话建立、报文编解码由外部实现负责，
/// 实现必须可以被多个生命周期调用并发使用。

pub mod memory;
pub mod types;

use async_trait::async_trait;
use common::Result;

pub use memory::{InMemoryBackend, InMemoryBackendBuilder};
pub use types::{
    Catalog, CatalogItem, ComposeRequest, CreateDiskRequest, CustomizationPayload, Disk,
    DiskLink, Hardware, NetworkConnection, OrgNetwork, Organization, TaskHandle,
    TaskStatusReport, VApp, VirtualDatacenter,
};

/// 后端客户端 Trait
///
/// 查询类方法在对象不存在时返回 `Ok(None)`，变更类方法立即返回任务句柄，
/// 由任务跟踪器轮询直至结束。
#[async_trait]
pub trait BackendClient: Send + Sync + 'static {
    /// 查找组织
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>>;

    /// 查找虚拟数据中心
    async fn get_virtual_datacenter(
        &self,
        org: &Organization,
        name: &str,
    ) -> Result<Option<VirtualDatacenter>>;

    /// 查找目录
    async fn get_catalog(&self, org: &Organization, name: &str) -> Result<Option<Catalog>>;

    /// 查找目录中的模板
    async fn get_catalog_item(&self, catalog: &Catalog, name: &str) -> Result<Option<CatalogItem>>;

    /// 查找组织网络
    async fn get_network(&self, vdc: &VirtualDatacenter, name: &str) -> Result<Option<OrgNetwork>>;

    /// 按名称查找 vApp
    async fn get_vapp(&self, vdc: &VirtualDatacenter, name: &str) -> Result<Option<VApp>>;

    /// 组合并实例化 vApp（包含硬件、客户机定制、网络连接）
    async fn compose_vapp(&self, request: &ComposeRequest) -> Result<TaskHandle>;

    /// 更新 vApp 的网络连接
    async fn connect_network(&self, vapp: &VApp, connection: &NetworkConnection) -> Result<TaskHandle>;

    /// 卸载并删除 vApp
    async fn delete_vapp(&self, vapp: &VApp) -> Result<TaskHandle>;

    /// 开机
    async fn power_on(&self, vapp: &VApp) -> Result<TaskHandle>;

    /// 关机
    async fn power_off(&self, vapp: &VApp) -> Result<TaskHandle>;

    /// 列出虚拟数据中心内的磁盘及其挂载关系
    async fn get_disks(&self, vdc: &VirtualDatacenter) -> Result<Vec<(Disk, Vec<DiskLink>)>>;

    /// 创建独立磁盘
    async fn create_disk(&self, request: &CreateDiskRequest) -> Result<TaskHandle>;

    /// 删除独立磁盘
    async fn delete_disk(&self, disk: &Disk) -> Result<TaskHandle>;

    /// 挂载磁盘到 vApp
    async fn attach_disk(&self, vapp: &VApp, disk: &Disk) -> Result<TaskHandle>;

    /// 从 vApp 分离磁盘
    async fn detach_disk(&self, vapp: &VApp, disk: &Disk) -> Result<TaskHandle>;

    /// 查询任务状态
    async fn get_task_status(&self, handle: &TaskHandle) -> Result<TaskStatusReport>;
}
