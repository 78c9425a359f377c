/// 生命周期调用上下文
///
/// 每个生命周期动作都显式接收上下文：节点声明、关系列表、运行时属性输出以及取消令牌。
/// 不存在进程级的"当前上下文"。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

use crate::errors::ValidationError;
use crate::models::{NetworkDeclaration, PortDeclaration};

pub const IP: &str = "ip";
pub const NETWORKS: &str = "networks";
pub const VCLOUD_VAPP_NAME: &str = "vcloud_vapp_name";
pub const VCLOUD_DISK_NAME: &str = "vcloud_disk_name";

/// 运行时属性（对外可观测的输出）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuntimeProperties(Map<String, Value>);

impl RuntimeProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn ip(&self) -> Option<&str> {
        self.get_str(IP)
    }

    pub fn set_ip(&mut self, ip: impl Into<String>) {
        self.insert(IP, ip.into());
    }

    /// 网络名称 → 地址
    pub fn networks(&self) -> BTreeMap<String, String> {
        self.0
            .get(NETWORKS)
            .and_then(Value::as_object)
            .map(|networks| {
                networks
                    .iter()
                    .filter_map(|(name, ip)| ip.as_str().map(|ip| (name.clone(), ip.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn set_networks(&mut self, networks: &BTreeMap<String, String>) {
        let map: Map<String, Value> = networks
            .iter()
            .map(|(name, ip)| (name.clone(), Value::String(ip.clone())))
            .collect();
        self.insert(NETWORKS, Value::Object(map));
    }

    pub fn vcloud_vapp_name(&self) -> Option<&str> {
        self.get_str(VCLOUD_VAPP_NAME)
    }

    pub fn set_vcloud_vapp_name(&mut self, name: impl Into<String>) {
        self.insert(VCLOUD_VAPP_NAME, name.into());
    }

    pub fn vcloud_disk_name(&self) -> Option<&str> {
        self.get_str(VCLOUD_DISK_NAME)
    }

    pub fn set_vcloud_disk_name(&mut self, name: impl Into<String>) {
        self.insert(VCLOUD_DISK_NAME, name.into());
    }
}

/// 节点实例
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    pub id: String,
    /// 声明属性
    pub properties: Value,
    pub runtime_properties: RuntimeProperties,
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, properties: Value) -> Self {
        Self {
            id: id.into(),
            properties,
            runtime_properties: RuntimeProperties::new(),
        }
    }
}

/// 关系类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationshipKind {
    Port(PortDeclaration),
    Network(NetworkDeclaration),
    Other,
}

/// 与另一个节点实例的关系
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub target: NodeInstance,
}

impl Relationship {
    pub fn new(target: NodeInstance) -> Self {
        Self { target }
    }

    /// 根据目标节点的声明属性判断关系类型，`port` 优先于 `network`
    pub fn kind(&self) -> Result<RelationshipKind, ValidationError> {
        if let Some(port) = PortDeclaration::from_properties(&self.target.properties)? {
            return Ok(RelationshipKind::Port(port));
        }
        if let Some(network) = NetworkDeclaration::from_properties(&self.target.properties)? {
            return Ok(RelationshipKind::Network(network));
        }
        Ok(RelationshipKind::Other)
    }
}

/// 节点动作上下文（服务器、卷的 validate/create/start/stop/delete）
#[derive(Debug, Clone, Default)]
pub struct LifecycleContext {
    pub instance: NodeInstance,
    pub relationships: Vec<Relationship>,
    pub cancel: CancellationToken,
}

impl LifecycleContext {
    pub fn new(instance: NodeInstance) -> Self {
        Self {
            instance,
            relationships: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_relationship(mut self, target: NodeInstance) -> Self {
        self.relationships.push(Relationship::new(target));
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn properties(&self) -> &Value {
        &self.instance.properties
    }

    pub fn runtime_properties(&self) -> &RuntimeProperties {
        &self.instance.runtime_properties
    }

    pub fn runtime_properties_mut(&mut self) -> &mut RuntimeProperties {
        &mut self.instance.runtime_properties
    }
}

/// 关系动作上下文（卷的 attach/detach），source 为卷节点，target 为服务器节点
#[derive(Debug, Clone, Default)]
pub struct RelationshipContext {
    pub source: NodeInstance,
    pub target: NodeInstance,
    pub cancel: CancellationToken,
}

impl RelationshipContext {
    pub fn new(source: NodeInstance, target: NodeInstance) -> Self {
        Self {
            source,
            target,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
