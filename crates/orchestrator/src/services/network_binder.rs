/// 网络拓扑绑定
///
/// 从关系列表中选出唯一生效的网络绑定：任意位置的端口关系优先，其次是网络关系，
/// 同类关系取第一个。多余的关系不会合并，只记录警告。

use tracing::{debug, warn};

use crate::backend::NetworkConnection;
use crate::context::{Relationship, RelationshipKind};
use crate::errors::ValidationError;
use crate::models::network::management_connection;
use crate::models::{NetworkBinding, NetworkDeclaration, PortDeclaration};

pub struct NetworkBinder;

impl NetworkBinder {
    /// 按顺序扫描关系列表
    pub fn resolve(relationships: &[Relationship]) -> Result<Option<NetworkBinding>, ValidationError> {
        let mut port: Option<PortDeclaration> = None;
        let mut network: Option<NetworkDeclaration> = None;

        for relationship in relationships {
            match relationship.kind()? {
                RelationshipKind::Port(declaration) => {
                    if let Some(first) = &port {
                        warn!(
                            "⚠️ 忽略多余的端口关系 {} (已使用网络 {} 的端口)",
                            relationship.target.id, first.network
                        );
                    } else {
                        port = Some(declaration);
                    }
                }
                RelationshipKind::Network(declaration) => {
                    if let Some(first) = &network {
                        warn!(
                            "⚠️ 忽略多余的网络关系 {} (已使用网络 {})",
                            relationship.target.id, first.name
                        );
                    } else {
                        network = Some(declaration);
                    }
                }
                RelationshipKind::Other => {}
            }
        }

        let binding = match (port, network) {
            (Some(port), Some(network)) => {
                warn!(
                    "⚠️ 同时存在端口与网络关系，使用端口 ({})，忽略网络 {}",
                    port.network, network.name
                );
                Some(NetworkBinding::Port(port))
            }
            (Some(port), None) => Some(NetworkBinding::Port(port)),
            (None, Some(network)) => Some(NetworkBinding::Network(network)),
            (None, None) => None,
        };

        if let Some(binding) = &binding {
            debug!("网络绑定: {}", binding.network_name());
        }
        Ok(binding)
    }

    /// 生成唯一一条网络连接，没有绑定时回退到管理网络
    pub fn connection_for(
        binding: Option<&NetworkBinding>,
        management_network: Option<&str>,
    ) -> Result<NetworkConnection, ValidationError> {
        match (binding, management_network) {
            (Some(binding), _) => Ok(binding.to_connection()),
            (None, Some(name)) => Ok(management_connection(name)),
            (None, None) => Err(ValidationError::missing("management_network")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeInstance;
    use common::IpAllocationMode;
    use serde_json::json;

    fn port(id: &str, network: &str) -> Relationship {
        Relationship::new(NodeInstance::new(
            id,
            json!({"port": {"network": network, "ip_allocation_mode": "dhcp", "primary_interface": true}}),
        ))
    }

    fn network(id: &str, name: &str) -> Relationship {
        Relationship::new(NodeInstance::new(id, json!({"network": {"name": name}})))
    }

    fn other(id: &str) -> Relationship {
        Relationship::new(NodeInstance::new(id, json!({"volume": {"name": "data"}})))
    }

    #[test]
    fn test_port_wins_over_earlier_network() {
        let relationships = vec![other("a"), network("b", "public"), port("c", "private")];
        let binding = NetworkBinder::resolve(&relationships).unwrap().unwrap();
        assert_eq!(binding.network_name(), "private");

        let connection = NetworkBinder::connection_for(Some(&binding), Some("mgmt")).unwrap();
        assert_eq!(connection.ip_allocation_mode, IpAllocationMode::Dhcp);
    }

    #[test]
    fn test_first_match_of_kind_wins() {
        let relationships = vec![network("a", "first"), network("b", "second")];
        let binding = NetworkBinder::resolve(&relationships).unwrap().unwrap();
        assert_eq!(binding.network_name(), "first");

        let relationships = vec![port("a", "one"), port("b", "two")];
        let binding = NetworkBinder::resolve(&relationships).unwrap().unwrap();
        assert_eq!(binding.network_name(), "one");
    }

    #[test]
    fn test_network_binding_defaults() {
        let binding = NetworkBinder::resolve(&[network("a", "public")]).unwrap();
        let connection = NetworkBinder::connection_for(binding.as_ref(), None).unwrap();
        assert_eq!(connection.network_name, "public");
        assert_eq!(connection.ip_allocation_mode, IpAllocationMode::Pool);
        assert!(connection.primary);
    }

    #[test]
    fn test_fallback_to_management_network() {
        let binding = NetworkBinder::resolve(&[other("a")]).unwrap();
        assert!(binding.is_none());

        let connection = NetworkBinder::connection_for(None, Some("mgmt")).unwrap();
        assert_eq!(connection.network_name, "mgmt");

        assert_eq!(
            NetworkBinder::connection_for(None, None).unwrap_err(),
            ValidationError::missing("management_network")
        );
    }

    #[test]
    fn test_malformed_relationship_is_reported() {
        let bad = Relationship::new(NodeInstance::new("p", json!({"port": {"ip_allocation_mode": "pool"}})));
        assert_eq!(
            NetworkBinder::resolve(&[bad]).unwrap_err(),
            ValidationError::missing("port.network")
        );
    }
}
