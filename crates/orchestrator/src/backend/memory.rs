/// 内存后端
///
/// `BackendClient` 的进程内实现，模拟云控制面的异步语义：变更调用立即返回任务句柄，
/// 任务在被轮询若干次后才结束，结束时才真正生效。支持故障注入，供测试和演练使用。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::utils::{generate_id, prefixed_id};
use common::{Error, IpAllocationMode, PowerState, Result, TaskStatus};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::{
    Catalog, CatalogItem, ComposeRequest, CreateDiskRequest, Disk, DiskLink, Hardware,
    NetworkConnection, OrgNetwork, Organization, TaskHandle, TaskStatusReport, VApp,
    VirtualDatacenter,
};
use super::BackendClient;

pub const OP_COMPOSE_VAPP: &str = "compose_vapp";
pub const OP_CONNECT_NETWORK: &str = "connect_network";
pub const OP_DELETE_VAPP: &str = "delete_vapp";
pub const OP_POWER_ON: &str = "power_on";
pub const OP_POWER_OFF: &str = "power_off";
pub const OP_CREATE_DISK: &str = "create_disk";
pub const OP_DELETE_DISK: &str = "delete_disk";
pub const OP_ATTACH_DISK: &str = "attach_disk";
pub const OP_DETACH_DISK: &str = "detach_disk";

/// (作用域, 名称)
type Key = (String, String);

/// 任务结束时生效的变更
#[derive(Debug, Clone)]
enum Effect {
    ComposeFinished(Key),
    Connect(Key, NetworkConnection),
    DeleteVApp(Key),
    PowerOn(Key),
    PowerOff(Key),
    CreateDisk(Disk),
    DeleteDisk(Key),
    Attach(Key, DiskLink),
    Detach(Key, String),
}

/// 任务记录
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub handle: TaskHandle,
    pub operation: &'static str,
    pub status: TaskStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    remaining_polls: u32,
    failure: Option<String>,
    effect: Option<Effect>,
}

struct DiskEntry {
    disk: Disk,
    links: Vec<DiskLink>,
}

#[derive(Default)]
struct BackendState {
    organizations: HashSet<String>,
    /// (组织, 虚拟数据中心)
    vdcs: HashSet<Key>,
    /// (组织, 目录) -> 模板名称
    catalogs: HashMap<Key, HashSet<String>>,
    /// (虚拟数据中心, 网络)
    networks: HashSet<Key>,
    vapps: BTreeMap<Key, VApp>,
    disks: BTreeMap<Key, DiskEntry>,
    tasks: HashMap<String, TaskRecord>,
    failures: HashMap<&'static str, VecDeque<String>>,
    mutations: u64,
    next_host: u32,
    task_latency: u32,
    unavailable: bool,
    /// 拒绝的删除请求以失败任务返回，而不是同步报错
    deferred_rejections: bool,
}

impl BackendState {
    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(Error::Unavailable("后端会话已断开".to_string()));
        }
        Ok(())
    }

    fn vapp_key(vdc: &str, name: &str) -> Key {
        (vdc.to_string(), name.to_string())
    }

    /// 登记一个新任务，变更计数加一
    fn submit(&mut self, operation: &'static str, effect: Effect) -> TaskHandle {
        self.mutations += 1;
        let handle = TaskHandle(prefixed_id("task"));
        let failure = self
            .failures
            .get_mut(operation)
            .and_then(|queue| queue.pop_front());

        let record = TaskRecord {
            handle: handle.clone(),
            operation,
            status: TaskStatus::Running,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
            remaining_polls: self.task_latency,
            failure,
            effect: Some(effect),
        };
        debug!("登记任务: handle={}, operation={}", handle, operation);
        self.tasks.insert(handle.0.clone(), record);
        handle
    }

    /// 拒绝一个请求：同步返回错误，或登记一个注定失败的任务
    fn reject(
        &mut self,
        operation: &'static str,
        effect: Effect,
        message: String,
    ) -> Result<TaskHandle> {
        if !self.deferred_rejections {
            return Err(Error::Rejected(message));
        }
        self.failures
            .entry(operation)
            .or_default()
            .push_front(message);
        Ok(self.submit(operation, effect))
    }

    /// 查询一次任务状态，必要时推进任务
    fn poll(&mut self, handle: &TaskHandle) -> Result<TaskStatusReport> {
        let (failure, effect) = {
            let record = self
                .tasks
                .get_mut(handle.as_str())
                .ok_or_else(|| Error::NotFound(format!("任务不存在: {}", handle)))?;

            if record.status.is_terminal() {
                return Ok(TaskStatusReport {
                    status: record.status,
                    error_message: record.error_message.clone(),
                });
            }

            if record.remaining_polls > 0 {
                record.remaining_polls -= 1;
                return Ok(TaskStatusReport {
                    status: TaskStatus::Running,
                    error_message: None,
                });
            }

            (record.failure.take(), record.effect.take())
        };

        let (status, error_message) = match failure {
            Some(message) => (TaskStatus::Error, Some(message)),
            None => {
                if let Some(effect) = effect {
                    self.apply(effect);
                }
                (TaskStatus::Success, None)
            }
        };

        if let Some(record) = self.tasks.get_mut(handle.as_str()) {
            record.status = status;
            record.error_message = error_message.clone();
            record.completed_at = Some(Utc::now());
        }

        Ok(TaskStatusReport {
            status,
            error_message,
        })
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::ComposeFinished(key) => {
                if let Some(vapp) = self.vapps.get_mut(&key) {
                    vapp.power_state = PowerState::Off;
                }
            }
            Effect::Connect(key, connection) => {
                if let Some(vapp) = self.vapps.get_mut(&key) {
                    vapp.network_connections = vec![connection];
                }
            }
            Effect::DeleteVApp(key) => {
                if let Some(vapp) = self.vapps.remove(&key) {
                    for entry in self.disks.values_mut() {
                        entry.links.retain(|link| link.vapp_id != vapp.id);
                    }
                }
            }
            Effect::PowerOn(key) => {
                let next_host = &mut self.next_host;
                if let Some(vapp) = self.vapps.get_mut(&key) {
                    vapp.power_state = PowerState::On;
                    for connection in vapp.network_connections.iter_mut() {
                        if connection.ip_address.is_none()
                            && connection.ip_allocation_mode != IpAllocationMode::Manual
                        {
                            *next_host += 1;
                            connection.ip_address = Some(format!(
                                "10.0.{}.{}",
                                *next_host / 250,
                                *next_host % 250 + 2
                            ));
                        }
                    }
                }
            }
            Effect::PowerOff(key) => {
                if let Some(vapp) = self.vapps.get_mut(&key) {
                    vapp.power_state = PowerState::Off;
                }
            }
            Effect::CreateDisk(disk) => {
                let key = Self::vapp_key(&disk.vdc, &disk.name);
                self.disks.insert(
                    key,
                    DiskEntry {
                        disk,
                        links: Vec::new(),
                    },
                );
            }
            Effect::DeleteDisk(key) => {
                self.disks.remove(&key);
            }
            Effect::Attach(key, link) => {
                if let Some(entry) = self.disks.get_mut(&key) {
                    if !entry.links.iter().any(|l| l.vapp_id == link.vapp_id) {
                        entry.links.push(link);
                    }
                }
            }
            Effect::Detach(key, vapp_id) => {
                if let Some(entry) = self.disks.get_mut(&key) {
                    entry.links.retain(|l| l.vapp_id != vapp_id);
                }
            }
        }
    }

    fn existing_vapp(&self, vapp: &VApp) -> Result<Key> {
        let key = Self::vapp_key(&vapp.vdc, &vapp.name);
        if self.vapps.contains_key(&key) {
            Ok(key)
        } else {
            Err(Error::NotFound(format!("vApp 不存在: {}", vapp.name)))
        }
    }

    fn existing_disk(&self, disk: &Disk) -> Result<Key> {
        let key = Self::vapp_key(&disk.vdc, &disk.name);
        if self.disks.contains_key(&key) {
            Ok(key)
        } else {
            Err(Error::NotFound(format!("磁盘不存在: {}", disk.name)))
        }
    }
}

/// 内存后端构建器
#[derive(Default)]
pub struct InMemoryBackendBuilder {
    state: BackendState,
}

impl InMemoryBackendBuilder {
    /// 添加组织
    pub fn organization(mut self, org: &str) -> Self {
        self.state.organizations.insert(org.to_string());
        self
    }

    /// 添加虚拟数据中心（同时添加所属组织）
    pub fn vdc(mut self, org: &str, vdc: &str) -> Self {
        self.state.organizations.insert(org.to_string());
        self.state.vdcs.insert((org.to_string(), vdc.to_string()));
        self
    }

    /// 添加目录模板
    pub fn catalog_item(mut self, org: &str, catalog: &str, item: &str) -> Self {
        self.state
            .catalogs
            .entry((org.to_string(), catalog.to_string()))
            .or_default()
            .insert(item.to_string());
        self
    }

    /// 添加组织网络
    pub fn network(mut self, vdc: &str, name: &str) -> Self {
        self.state.networks.insert((vdc.to_string(), name.to_string()));
        self
    }

    /// 添加已存在的独立磁盘
    pub fn disk(mut self, vdc: &str, name: &str, size_mb: u64) -> Self {
        let disk = Disk {
            id: generate_id(),
            name: name.to_string(),
            vdc: vdc.to_string(),
            size_mb,
        };
        self.state.disks.insert(
            (vdc.to_string(), name.to_string()),
            DiskEntry {
                disk,
                links: Vec::new(),
            },
        );
        self
    }

    /// 添加已存在的关机状态 vApp，连接到指定网络
    pub fn vapp(mut self, vdc: &str, name: &str, network: &str) -> Self {
        let vapp = VApp {
            id: generate_id(),
            name: name.to_string(),
            vdc: vdc.to_string(),
            power_state: PowerState::Off,
            hardware: Hardware::default(),
            network_connections: vec![NetworkConnection {
                network_name: network.to_string(),
                ip_allocation_mode: IpAllocationMode::Pool,
                primary: true,
                ip_address: None,
            }],
        };
        self.state
            .vapps
            .insert((vdc.to_string(), name.to_string()), vapp);
        self
    }

    /// 任务结束前需要的额外轮询次数
    pub fn task_latency(mut self, polls: u32) -> Self {
        self.state.task_latency = polls;
        self
    }

    /// 删除被拒绝时先受理请求，再让任务以错误结束
    pub fn deferred_rejections(mut self) -> Self {
        self.state.deferred_rejections = true;
        self
    }

    pub fn build(self) -> InMemoryBackend {
        InMemoryBackend {
            state: Arc::new(RwLock::new(self.state)),
        }
    }
}

/// 内存后端
#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<RwLock<BackendState>>,
}

impl InMemoryBackend {
    pub fn builder() -> InMemoryBackendBuilder {
        InMemoryBackendBuilder::default()
    }

    /// 让下一个指定类型的任务以失败结束
    pub async fn fail_next(&self, operation: &'static str, message: impl Into<String>) {
        let mut state = self.state.write().await;
        state
            .failures
            .entry(operation)
            .or_default()
            .push_back(message.into());
    }

    /// 调整任务延迟
    pub async fn set_task_latency(&self, polls: u32) {
        self.state.write().await.task_latency = polls;
    }

    /// 模拟会话断开/恢复
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// 直接修改 vApp 电源状态，模拟后端侧的外部变化
    pub async fn force_power_state(&self, vdc: &str, name: &str, power_state: PowerState) {
        let mut state = self.state.write().await;
        if let Some(vapp) = state.vapps.get_mut(&BackendState::vapp_key(vdc, name)) {
            vapp.power_state = power_state;
        }
    }

    /// 移除 vApp 的全部网络连接，模拟网卡被外部拆除
    pub async fn clear_network_connections(&self, vdc: &str, name: &str) {
        let mut state = self.state.write().await;
        if let Some(vapp) = state.vapps.get_mut(&BackendState::vapp_key(vdc, name)) {
            vapp.network_connections.clear();
        }
    }

    /// 已执行的变更调用次数
    pub async fn mutation_count(&self) -> u64 {
        self.state.read().await.mutations
    }

    /// 推进所有未结束的任务直至结束，模拟调用方放弃等待后后端继续完成任务
    pub async fn complete_pending_tasks(&self) {
        let mut state = self.state.write().await;
        let pending: Vec<TaskHandle> = state
            .tasks
            .values()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.handle.clone())
            .collect();

        for handle in pending {
            if let Some(record) = state.tasks.get_mut(handle.as_str()) {
                record.remaining_polls = 0;
            }
            let _ = state.poll(&handle);
        }
    }

    /// 任务历史（按创建时间排序）
    pub async fn task_history(&self) -> Vec<TaskRecord> {
        let state = self.state.read().await;
        let mut tasks: Vec<TaskRecord> = state.tasks.values().cloned().collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }
}

#[async_trait]
impl BackendClient for InMemoryBackend {
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state.organizations.contains(name).then(|| Organization {
            name: name.to_string(),
        }))
    }

    async fn get_virtual_datacenter(
        &self,
        org: &Organization,
        name: &str,
    ) -> Result<Option<VirtualDatacenter>> {
        let state = self.state.read().await;
        state.check_available()?;
        let key = (org.name.clone(), name.to_string());
        Ok(state.vdcs.contains(&key).then(|| VirtualDatacenter {
            org: org.name.clone(),
            name: name.to_string(),
        }))
    }

    async fn get_catalog(&self, org: &Organization, name: &str) -> Result<Option<Catalog>> {
        let state = self.state.read().await;
        state.check_available()?;
        let key = (org.name.clone(), name.to_string());
        Ok(state.catalogs.contains_key(&key).then(|| Catalog {
            org: org.name.clone(),
            name: name.to_string(),
        }))
    }

    async fn get_catalog_item(&self, catalog: &Catalog, name: &str) -> Result<Option<CatalogItem>> {
        let state = self.state.read().await;
        state.check_available()?;
        let key = (catalog.org.clone(), catalog.name.clone());
        let found = state
            .catalogs
            .get(&key)
            .map(|items| items.contains(name))
            .unwrap_or(false);
        Ok(found.then(|| CatalogItem {
            catalog: catalog.name.clone(),
            name: name.to_string(),
        }))
    }

    async fn get_network(&self, vdc: &VirtualDatacenter, name: &str) -> Result<Option<OrgNetwork>> {
        let state = self.state.read().await;
        state.check_available()?;
        let key = (vdc.name.clone(), name.to_string());
        Ok(state.networks.contains(&key).then(|| OrgNetwork {
            vdc: vdc.name.clone(),
            name: name.to_string(),
        }))
    }

    async fn get_vapp(&self, vdc: &VirtualDatacenter, name: &str) -> Result<Option<VApp>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .vapps
            .get(&BackendState::vapp_key(&vdc.name, name))
            .cloned())
    }

    async fn compose_vapp(&self, request: &ComposeRequest) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;

        let key = BackendState::vapp_key(&request.vdc.name, &request.name);
        if state.vapps.contains_key(&key) {
            return Err(Error::Rejected(format!("vApp 已存在: {}", request.name)));
        }

        let catalog_key = (request.vdc.org.clone(), request.catalog_item.catalog.clone());
        let template_exists = state
            .catalogs
            .get(&catalog_key)
            .map(|items| items.contains(&request.catalog_item.name))
            .unwrap_or(false);
        if !template_exists {
            return Err(Error::NotFound(format!(
                "模板不存在: {}/{}",
                request.catalog_item.catalog, request.catalog_item.name
            )));
        }

        // 组合过程中 vApp 已可见，但电源状态未定
        let vapp = VApp {
            id: generate_id(),
            name: request.name.clone(),
            vdc: request.vdc.name.clone(),
            power_state: PowerState::Unresolved,
            hardware: request.hardware.unwrap_or_default(),
            network_connections: vec![request.network.clone()],
        };
        state.vapps.insert(key.clone(), vapp);

        Ok(state.submit(OP_COMPOSE_VAPP, Effect::ComposeFinished(key)))
    }

    async fn connect_network(&self, vapp: &VApp, connection: &NetworkConnection) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let key = state.existing_vapp(vapp)?;
        Ok(state.submit(OP_CONNECT_NETWORK, Effect::Connect(key, connection.clone())))
    }

    async fn delete_vapp(&self, vapp: &VApp) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let key = state.existing_vapp(vapp)?;

        let powered_on = state
            .vapps
            .get(&key)
            .map(|v| v.is_on())
            .unwrap_or(false);
        if powered_on {
            return state.reject(
                OP_DELETE_VAPP,
                Effect::DeleteVApp(key),
                format!("vApp {} 正在运行，无法删除", vapp.name),
            );
        }

        Ok(state.submit(OP_DELETE_VAPP, Effect::DeleteVApp(key)))
    }

    async fn power_on(&self, vapp: &VApp) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let key = state.existing_vapp(vapp)?;
        Ok(state.submit(OP_POWER_ON, Effect::PowerOn(key)))
    }

    async fn power_off(&self, vapp: &VApp) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let key = state.existing_vapp(vapp)?;
        Ok(state.submit(OP_POWER_OFF, Effect::PowerOff(key)))
    }

    async fn get_disks(&self, vdc: &VirtualDatacenter) -> Result<Vec<(Disk, Vec<DiskLink>)>> {
        let state = self.state.read().await;
        state.check_available()?;
        Ok(state
            .disks
            .values()
            .filter(|entry| entry.disk.vdc == vdc.name)
            .map(|entry| (entry.disk.clone(), entry.links.clone()))
            .collect())
    }

    async fn create_disk(&self, request: &CreateDiskRequest) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;

        let key = BackendState::vapp_key(&request.vdc.name, &request.name);
        if state.disks.contains_key(&key) {
            return Err(Error::Rejected(format!("磁盘已存在: {}", request.name)));
        }

        let disk = Disk {
            id: generate_id(),
            name: request.name.clone(),
            vdc: request.vdc.name.clone(),
            size_mb: request.size_mb,
        };
        Ok(state.submit(OP_CREATE_DISK, Effect::CreateDisk(disk)))
    }

    async fn delete_disk(&self, disk: &Disk) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;
        let key = state.existing_disk(disk)?;

        let linked = state
            .disks
            .get(&key)
            .map(|entry| !entry.links.is_empty())
            .unwrap_or(false);
        if linked {
            return state.reject(
                OP_DELETE_DISK,
                Effect::DeleteDisk(key),
                format!("磁盘 {} 仍被挂载", disk.name),
            );
        }

        Ok(state.submit(OP_DELETE_DISK, Effect::DeleteDisk(key)))
    }

    async fn attach_disk(&self, vapp: &VApp, disk: &Disk) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;
        state.existing_vapp(vapp)?;
        let key = state.existing_disk(disk)?;
        let link = DiskLink {
            vapp_id: vapp.id.clone(),
            vapp_name: vapp.name.clone(),
        };
        Ok(state.submit(OP_ATTACH_DISK, Effect::Attach(key, link)))
    }

    async fn detach_disk(&self, vapp: &VApp, disk: &Disk) -> Result<TaskHandle> {
        let mut state = self.state.write().await;
        state.check_available()?;
        state.existing_vapp(vapp)?;
        let key = state.existing_disk(disk)?;
        Ok(state.submit(OP_DETACH_DISK, Effect::Detach(key, vapp.id.clone())))
    }

    async fn get_task_status(&self, handle: &TaskHandle) -> Result<TaskStatusReport> {
        let mut state = self.state.write().await;
        state.check_available()?;
        state.poll(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> InMemoryBackend {
        InMemoryBackend::builder()
            .vdc("org", "vdc")
            .catalog_item("org", "public", "ubuntu")
            .network("vdc", "mgmt")
            .disk("vdc", "data", 1024)
            .build()
    }

    fn vdc() -> VirtualDatacenter {
        VirtualDatacenter {
            org: "org".to_string(),
            name: "vdc".to_string(),
        }
    }

    fn compose_request(name: &str) -> ComposeRequest {
        ComposeRequest {
            vdc: vdc(),
            name: name.to_string(),
            catalog_item: CatalogItem {
                catalog: "public".to_string(),
                name: "ubuntu".to_string(),
            },
            hardware: Some(Hardware { cpu: 2, memory_mb: 2048 }),
            customization: None,
            network: NetworkConnection {
                network_name: "mgmt".to_string(),
                ip_allocation_mode: IpAllocationMode::Pool,
                primary: true,
                ip_address: None,
            },
        }
    }

    #[tokio::test]
    async fn test_task_completes_after_latency() {
        let backend = backend();
        backend.set_task_latency(2).await;

        let handle = backend.compose_vapp(&compose_request("web")).await.unwrap();
        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();
        assert_eq!(vapp.power_state, PowerState::Unresolved);

        assert_eq!(backend.get_task_status(&handle).await.unwrap().status, TaskStatus::Running);
        assert_eq!(backend.get_task_status(&handle).await.unwrap().status, TaskStatus::Running);
        assert_eq!(backend.get_task_status(&handle).await.unwrap().status, TaskStatus::Success);

        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();
        assert_eq!(vapp.power_state, PowerState::Off);
        assert_eq!(vapp.hardware.cpu, 2);
    }

    #[tokio::test]
    async fn test_injected_failure_skips_effect() {
        let backend = backend();
        let vapp = {
            let handle = backend.compose_vapp(&compose_request("web")).await.unwrap();
            backend.get_task_status(&handle).await.unwrap();
            backend.get_vapp(&vdc(), "web").await.unwrap().unwrap()
        };

        backend.fail_next(OP_POWER_ON, "no capacity").await;
        let handle = backend.power_on(&vapp).await.unwrap();
        let report = backend.get_task_status(&handle).await.unwrap();
        assert_eq!(report.status, TaskStatus::Error);
        assert_eq!(report.error_message.as_deref(), Some("no capacity"));

        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();
        assert!(!vapp.is_on());
    }

    #[tokio::test]
    async fn test_power_on_assigns_pool_addresses() {
        let backend = backend();
        let handle = backend.compose_vapp(&compose_request("web")).await.unwrap();
        backend.get_task_status(&handle).await.unwrap();
        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();

        let handle = backend.power_on(&vapp).await.unwrap();
        backend.get_task_status(&handle).await.unwrap();

        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();
        let ip = vapp.network_connections[0].ip_address.clone().unwrap();
        assert!(common::utils::validate_ip_address(&ip));
    }

    #[tokio::test]
    async fn test_delete_running_vapp_rejected() {
        let backend = backend();
        let handle = backend.compose_vapp(&compose_request("web")).await.unwrap();
        backend.get_task_status(&handle).await.unwrap();
        backend.force_power_state("vdc", "web", PowerState::On).await;

        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();
        let err = backend.delete_vapp(&vapp).await.unwrap_err();
        assert!(matches!(err, Error::Rejected(_)));
    }

    #[tokio::test]
    async fn test_deferred_rejection_fails_task() {
        let backend = InMemoryBackend::builder()
            .vdc("org", "vdc")
            .network("vdc", "mgmt")
            .vapp("vdc", "web", "mgmt")
            .deferred_rejections()
            .build();
        backend.force_power_state("vdc", "web", PowerState::On).await;

        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();
        let handle = backend.delete_vapp(&vapp).await.unwrap();
        let report = backend.get_task_status(&handle).await.unwrap();
        assert_eq!(report.status, TaskStatus::Error);
        assert!(report.error_message.unwrap().contains("正在运行"));

        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();
        assert!(vapp.is_on());
    }

    #[tokio::test]
    async fn test_clear_network_connections() {
        let backend = InMemoryBackend::builder()
            .vdc("org", "vdc")
            .network("vdc", "mgmt")
            .vapp("vdc", "web", "mgmt")
            .build();
        backend.clear_network_connections("vdc", "web").await;

        let vapp = backend.get_vapp(&vdc(), "web").await.unwrap().unwrap();
        assert!(vapp.network_connections.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let backend = backend();
        backend.set_unavailable(true).await;
        let err = backend.get_organization("org").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_complete_pending_tasks() {
        let backend = backend();
        backend.set_task_latency(100).await;
        backend.compose_vapp(&compose_request("web")).await.unwrap();
        backend.complete_pending_tasks().await;

        let history = backend.task_history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TaskStatus::Success);
        assert!(history[0].completed_at.is_some());
        assert_eq!(backend.mutation_count().await, 1);
    }
}
