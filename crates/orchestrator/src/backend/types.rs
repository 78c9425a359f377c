/// 后端对象类型
///
/// 这些类型只描述编排核心需要的字段，不对应任何具体云厂商的报文格式。

use common::{IpAllocationMode, PowerState, TaskStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 组织
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Organization {
    pub name: String,
}

/// 虚拟数据中心
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VirtualDatacenter {
    pub org: String,
    pub name: String,
}

/// 目录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    pub org: String,
    pub name: String,
}

/// 目录中的模板
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CatalogItem {
    pub catalog: String,
    pub name: String,
}

/// 虚拟数据中心内的组织网络
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrgNetwork {
    pub vdc: String,
    pub name: String,
}

/// 硬件配置
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hardware {
    pub cpu: u32,
    pub memory_mb: u64,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            cpu: 1,
            memory_mb: 1024,
        }
    }
}

/// 虚拟机的一条网络连接
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConnection {
    pub network_name: String,
    pub ip_allocation_mode: IpAllocationMode,
    pub primary: bool,
    /// manual 模式下由声明给出，其余模式在开机后由后端分配
    pub ip_address: Option<String>,
}

/// 后端虚拟机容器
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VApp {
    pub id: String,
    pub name: String,
    pub vdc: String,
    pub power_state: PowerState,
    pub hardware: Hardware,
    pub network_connections: Vec<NetworkConnection>,
}

impl VApp {
    pub fn is_on(&self) -> bool {
        self.power_state == PowerState::On
    }

    /// 是否已连接到指定网络
    pub fn is_connected_to(&self, network_name: &str) -> bool {
        self.network_connections
            .iter()
            .any(|c| c.network_name == network_name)
    }
}

/// 块存储卷（独立磁盘）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Disk {
    pub id: String,
    pub name: String,
    pub vdc: String,
    pub size_mb: u64,
}

/// 磁盘与虚拟机之间的挂载关系
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskLink {
    pub vapp_id: String,
    pub vapp_name: String,
}

/// 后端异步任务句柄
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub String);

impl TaskHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 单次任务状态查询结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskStatusReport {
    pub status: TaskStatus,
    pub error_message: Option<String>,
}

/// 客户机定制参数
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomizationPayload {
    pub computer_name: Option<String>,
    pub admin_password: Option<String>,
    pub script: Option<String>,
}

/// 组合（实例化）vApp 的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeRequest {
    pub vdc: VirtualDatacenter,
    pub name: String,
    pub catalog_item: CatalogItem,
    pub hardware: Option<Hardware>,
    pub customization: Option<CustomizationPayload>,
    pub network: NetworkConnection,
}

/// 创建独立磁盘的请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDiskRequest {
    pub vdc: VirtualDatacenter,
    pub name: String,
    pub size_mb: u64,
}
