/// 声明属性模型
///
/// 把节点声明的 JSON 属性解析为强类型结构。解析失败统一转换为 `ValidationError`，
/// 字段名使用点号路径（例如 `server.template`），便于直接定位配置问题。

pub mod network;
pub mod server;
pub mod volume;

pub use network::{NetworkBinding, NetworkDeclaration, PortDeclaration};
pub use server::{GuestCustomization, HardwareSpec, PublicKey, ServerSpec};
pub use volume::VolumeSpec;

use crate::errors::ValidationError;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

/// 后端作用域（组织 + 虚拟数据中心）
///
/// 会话凭据由外部负责，这里只取定位资源所需的名称。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCloudConfig {
    pub org: String,
    pub vdc: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawVCloudConfig {
    org: Option<String>,
    vdc: Option<String>,
}

impl VCloudConfig {
    pub fn from_properties(properties: &Value) -> Result<Self, ValidationError> {
        let raw: RawVCloudConfig = parse_section(properties, "vcloud_config")?
            .ok_or_else(|| ValidationError::missing("vcloud_config"))?;

        Ok(Self {
            org: required(raw.org, "vcloud_config.org")?,
            vdc: required(raw.vdc, "vcloud_config.vdc")?,
        })
    }
}

/// 解析属性中的一个子节，不存在或为 null 时返回 `None`
pub(crate) fn parse_section<T: DeserializeOwned>(
    properties: &Value,
    key: &str,
) -> Result<Option<T>, ValidationError> {
    match properties.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| ValidationError::malformed(key, e.to_string())),
    }
}

/// 必填字符串，空字符串视同缺失
pub(crate) fn required(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ValidationError::missing(field)),
    }
}

/// 执行 validator 校验，并把字段名加上所属子节前缀
pub(crate) fn validate_section<T: Validate>(value: &T, prefix: &str) -> Result<(), ValidationError> {
    value.validate().map_err(|errors| {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|k| format!("{}.{}", prefix, k))
            .unwrap_or_else(|| prefix.to_string());
        ValidationError::malformed(field, errors.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vcloud_config() {
        let props = json!({"vcloud_config": {"org": "acme", "vdc": "vdc1", "url": "https://example"}});
        let config = VCloudConfig::from_properties(&props).unwrap();
        assert_eq!(config.org, "acme");
        assert_eq!(config.vdc, "vdc1");

        let props = json!({"vcloud_config": {"org": "acme"}});
        assert_eq!(
            VCloudConfig::from_properties(&props).unwrap_err(),
            ValidationError::missing("vcloud_config.vdc")
        );

        assert_eq!(
            VCloudConfig::from_properties(&json!({})).unwrap_err(),
            ValidationError::missing("vcloud_config")
        );
    }

    #[test]
    fn test_parse_section_malformed() {
        let props = json!({"vcloud_config": "not-an-object"});
        let err = VCloudConfig::from_properties(&props).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { ref field, .. } if field == "vcloud_config"));
    }
}
