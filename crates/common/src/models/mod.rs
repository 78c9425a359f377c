/// 共享数据模型
///
/// 定义编排核心与后端客户端共享的数据结构

use serde::{Deserialize, Serialize};
use std::fmt;

/// 虚拟机（vApp）电源状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    Off,
    On,
    /// 后端尚未给出确定状态（例如部署中）
    Unresolved,
}

impl PowerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerState::Off => "off",
            PowerState::On => "on",
            PowerState::Unresolved => "unresolved",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 后端异步任务状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Success,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Error => "error",
        }
    }

    /// 任务是否已结束（失败也算结束）
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Running)
    }
}

/// IP 分配模式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IpAllocationMode {
    #[default]
    Pool,
    Manual,
    Dhcp,
}

impl IpAllocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpAllocationMode::Pool => "pool",
            IpAllocationMode::Manual => "manual",
            IpAllocationMode::Dhcp => "dhcp",
        }
    }

    /// 解析声明中的分配模式，大小写不敏感
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pool" => Some(IpAllocationMode::Pool),
            "manual" => Some(IpAllocationMode::Manual),
            "dhcp" => Some(IpAllocationMode::Dhcp),
            _ => None,
        }
    }
}

impl fmt::Display for IpAllocationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 服务器生命周期状态机
///
/// Absent → Creating → Stopped → Starting → Running → Stopping → Stopped → Deleting → Absent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Absent,
    Creating,
    Stopped,
    Starting,
    Running,
    Stopping,
    Deleting,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Absent => "absent",
            ServerState::Creating => "creating",
            ServerState::Stopped => "stopped",
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Stopping => "stopping",
            ServerState::Deleting => "deleting",
        }
    }

    /// 由后端观测到的存在性与电源状态推导稳定状态
    pub fn observed(power: Option<PowerState>) -> Self {
        match power {
            None => ServerState::Absent,
            Some(PowerState::On) => ServerState::Running,
            Some(PowerState::Off) | Some(PowerState::Unresolved) => ServerState::Stopped,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 常量定义
pub mod constants {
    /// 创建/删除类操作默认轮询次数
    pub const DEFAULT_CREATE_ATTEMPTS: u32 = 120;

    /// 创建/删除类操作默认轮询间隔（毫秒）
    pub const DEFAULT_CREATE_INTERVAL_MS: u64 = 5000;

    /// 电源操作默认轮询次数
    pub const DEFAULT_POWER_ATTEMPTS: u32 = 30;

    /// 电源操作默认轮询间隔（毫秒）
    pub const DEFAULT_POWER_INTERVAL_MS: u64 = 2000;

    /// 挂载/分离默认轮询次数
    pub const DEFAULT_ATTACH_ATTEMPTS: u32 = 60;

    /// 挂载/分离默认轮询间隔（毫秒）
    pub const DEFAULT_ATTACH_INTERVAL_MS: u64 = 2000;

    /// 状态上报默认轮询次数
    pub const DEFAULT_STATE_ATTEMPTS: u32 = 5;

    /// 状态上报默认轮询间隔（毫秒）
    pub const DEFAULT_STATE_INTERVAL_MS: u64 = 2000;
}
