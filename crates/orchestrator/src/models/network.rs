/// 网络与端口声明

use common::utils::validate_ip_address;
use common::IpAllocationMode;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_section, required};
use crate::backend::NetworkConnection;
use crate::errors::ValidationError;

/// 端口声明：`{"port": {"network", "ip_allocation_mode", "primary_interface", "ip_address"}}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDeclaration {
    pub network: String,
    pub ip_allocation_mode: IpAllocationMode,
    pub primary_interface: bool,
    /// 仅 manual 模式使用
    pub ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPort {
    network: Option<String>,
    ip_allocation_mode: Option<String>,
    primary_interface: Option<bool>,
    ip_address: Option<String>,
}

impl PortDeclaration {
    /// 从节点属性解析端口声明，属性中没有 `port` 时返回 `None`
    pub fn from_properties(properties: &Value) -> Result<Option<Self>, ValidationError> {
        let Some(raw) = parse_section::<RawPort>(properties, "port")? else {
            return Ok(None);
        };

        let network = required(raw.network, "port.network")?;

        let ip_allocation_mode = match raw.ip_allocation_mode {
            None => IpAllocationMode::default(),
            Some(mode) => IpAllocationMode::parse(&mode).ok_or_else(|| {
                ValidationError::malformed(
                    "port.ip_allocation_mode",
                    format!("未知的分配模式 '{}'，可选 pool/manual/dhcp", mode),
                )
            })?,
        };

        let ip_address = match ip_allocation_mode {
            IpAllocationMode::Manual => {
                let ip = required(raw.ip_address, "port.ip_address")?;
                if !validate_ip_address(&ip) {
                    return Err(ValidationError::malformed(
                        "port.ip_address",
                        format!("'{}' 不是合法的 IPv4 地址", ip),
                    ));
                }
                Some(ip)
            }
            _ => None,
        };

        Ok(Some(Self {
            network,
            ip_allocation_mode,
            primary_interface: raw.primary_interface.unwrap_or(true),
            ip_address,
        }))
    }
}

/// 网络声明：`{"network": {"name"}}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDeclaration {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RawNetwork {
    name: Option<String>,
}

impl NetworkDeclaration {
    pub fn from_properties(properties: &Value) -> Result<Option<Self>, ValidationError> {
        let Some(raw) = parse_section::<RawNetwork>(properties, "network")? else {
            return Ok(None);
        };

        Ok(Some(Self {
            name: required(raw.name, "network.name")?,
        }))
    }
}

/// 服务器唯一生效的网络绑定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkBinding {
    Port(PortDeclaration),
    Network(NetworkDeclaration),
}

impl NetworkBinding {
    pub fn network_name(&self) -> &str {
        match self {
            NetworkBinding::Port(port) => &port.network,
            NetworkBinding::Network(network) => &network.name,
        }
    }

    /// 转换为一条网络连接描述
    pub fn to_connection(&self) -> NetworkConnection {
        match self {
            NetworkBinding::Port(port) => NetworkConnection {
                network_name: port.network.clone(),
                ip_allocation_mode: port.ip_allocation_mode,
                primary: port.primary_interface,
                ip_address: port.ip_address.clone(),
            },
            NetworkBinding::Network(network) => management_connection(&network.name),
        }
    }
}

/// 默认连接：pool 分配，主网卡
pub fn management_connection(network_name: &str) -> NetworkConnection {
    NetworkConnection {
        network_name: network_name.to_string(),
        ip_allocation_mode: IpAllocationMode::Pool,
        primary: true,
        ip_address: None,
    }
}
