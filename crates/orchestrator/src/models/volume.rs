/// 块存储卷声明
///
/// 节点属性形如：
/// `{"volume": {"name", "size"}, "use_external_resource", "resource_id", "vcloud_config"}`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::{parse_section, required, validate_section, VCloudConfig};
use crate::errors::ValidationError;

#[derive(Debug, Default, Deserialize, Serialize, Validate)]
struct RawVolume {
    #[validate(length(min = 1, max = 128))]
    name: Option<String>,

    /// 容量（MB）
    #[validate(range(min = 1))]
    size: Option<i64>,
}

/// 块存储卷声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// 后端磁盘名称；外部资源时为 `resource_id`
    pub name: String,
    /// 外部资源时为 0
    pub size_mb: u64,
    pub use_external_resource: bool,
    pub resource_id: Option<String>,
    pub vcloud_config: VCloudConfig,
}

impl VolumeSpec {
    pub fn from_properties(properties: &Value) -> Result<Self, ValidationError> {
        let use_external_resource = match properties.get("use_external_resource") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(_) => {
                return Err(ValidationError::malformed(
                    "use_external_resource",
                    "应为布尔值",
                ))
            }
        };

        let resource_id = match properties.get("resource_id") {
            Some(Value::String(id)) if !id.trim().is_empty() => Some(id.clone()),
            _ => None,
        };

        let vcloud_config = VCloudConfig::from_properties(properties)?;

        if use_external_resource {
            let id = required(resource_id, "resource_id")?;
            return Ok(Self {
                name: id.clone(),
                size_mb: 0,
                use_external_resource,
                resource_id: Some(id),
                vcloud_config,
            });
        }

        let raw: RawVolume = parse_section(properties, "volume")?
            .ok_or_else(|| ValidationError::missing("volume"))?;
        validate_section(&raw, "volume")?;

        let name = required(raw.name, "volume.name")?;
        let size = raw.size.ok_or_else(|| ValidationError::missing("volume.size"))?;
        let size_mb = u64::try_from(size)
            .map_err(|_| ValidationError::malformed("volume.size", "应为正整数"))?;

        Ok(Self {
            name,
            size_mb,
            use_external_resource,
            resource_id,
            vcloud_config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_managed_volume() {
        let props = json!({
            "volume": {"name": "data", "size": 1024},
            "use_external_resource": false,
            "vcloud_config": {"org": "acme", "vdc": "vdc1"}
        });
        let spec = VolumeSpec::from_properties(&props).unwrap();
        assert_eq!(spec.name, "data");
        assert_eq!(spec.size_mb, 1024);
        assert!(!spec.use_external_resource);
    }

    #[test]
    fn test_external_volume_uses_resource_id() {
        let props = json!({
            "volume": {"name": "ignored", "size": 0},
            "use_external_resource": true,
            "resource_id": "shared-disk",
            "vcloud_config": {"org": "acme", "vdc": "vdc1"}
        });
        let spec = VolumeSpec::from_properties(&props).unwrap();
        assert_eq!(spec.name, "shared-disk");
        assert!(spec.use_external_resource);

        let props = json!({
            "use_external_resource": true,
            "vcloud_config": {"org": "acme", "vdc": "vdc1"}
        });
        assert_eq!(
            VolumeSpec::from_properties(&props).unwrap_err(),
            ValidationError::missing("resource_id")
        );
    }

    #[test]
    fn test_malformed_volume() {
        let props = json!({
            "volume": {"name": "data", "size": -1},
            "vcloud_config": {"org": "acme", "vdc": "vdc1"}
        });
        let err = VolumeSpec::from_properties(&props).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { ref field, .. } if field == "volume.size"));

        let props = json!({
            "volume": {"name": "data"},
            "vcloud_config": {"org": "acme", "vdc": "vdc1"}
        });
        assert_eq!(
            VolumeSpec::from_properties(&props).unwrap_err(),
            ValidationError::missing("volume.size")
        );
    }
}
