/// 服务器声明
///
/// 节点属性形如：
/// `{"server": {"name", "catalog", "template", "hardware", "guest_customization"},
///   "management_network", "vcloud_config"}`

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use super::{parse_section, required, validate_section, VCloudConfig};
use crate::backend::{CustomizationPayload, Hardware};
use crate::errors::ValidationError;

/// 硬件配置声明，字段出现时必须为正整数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct HardwareSpec {
    #[validate(range(min = 1, max = 1024))]
    pub cpu: Option<i64>,

    /// 内存（MB）
    #[validate(range(min = 1))]
    pub memory: Option<i64>,
}

impl HardwareSpec {
    /// 转换为后端硬件参数，未声明的字段取后端默认值
    pub fn to_hardware(&self) -> Option<Hardware> {
        if self.cpu.is_none() && self.memory.is_none() {
            return None;
        }

        let defaults = Hardware::default();
        Some(Hardware {
            cpu: self
                .cpu
                .and_then(|c| u32::try_from(c).ok())
                .unwrap_or(defaults.cpu),
            memory_mb: self
                .memory
                .and_then(|m| u64::try_from(m).ok())
                .unwrap_or(defaults.memory_mb),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// 未声明时写入 root
    #[serde(default = "default_key_user")]
    pub user: String,
    pub key: String,
}

fn default_key_user() -> String {
    "root".to_string()
}

impl PublicKey {
    /// 用户名会原样出现在脚本的路径与 chown 参数中，只允许安全字符
    fn validate(&self, field: &str) -> Result<(), ValidationError> {
        let user_ok = !self.user.is_empty()
            && !self.user.starts_with('-')
            && self
                .user
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !user_ok {
            return Err(ValidationError::malformed(
                field,
                format!("用户名 {:?} 只能包含字母、数字、'_'、'-' 和 '.'", self.user),
            ));
        }

        let key = self.key.trim();
        if key.is_empty() || key.contains(['\n', '\r']) {
            return Err(ValidationError::malformed(field, "公钥应为非空的单行文本"));
        }
        Ok(())
    }
}

/// 单引号包裹，内部的单引号写成 '\''
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// 客户机定制
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestCustomization {
    pub computer_name: Option<String>,
    pub admin_password: Option<String>,
    pub public_keys: Vec<PublicKey>,
    pub pre_script: Option<String>,
    pub post_script: Option<String>,
}

impl GuestCustomization {
    /// 渲染定制脚本
    ///
    /// 脚本以 `precustomization` / `postcustomization` 参数被调用两次，
    /// 公钥在 post 阶段写入各用户的 authorized_keys。
    pub fn render_script(&self) -> Option<String> {
        if self.public_keys.is_empty() && self.pre_script.is_none() && self.post_script.is_none() {
            return None;
        }

        let mut script = String::from("#!/bin/sh\n");
        script.push_str("if [ x$1 = x\"precustomization\" ]; then\n");
        if let Some(pre) = &self.pre_script {
            script.push_str(pre.trim_end());
            script.push('\n');
        }
        script.push_str("    :\n");
        script.push_str("elif [ x$1 = x\"postcustomization\" ]; then\n");
        for public_key in &self.public_keys {
            let home = if public_key.user == "root" {
                "/root".to_string()
            } else {
                format!("/home/{}", public_key.user)
            };
            script.push_str(&format!("    mkdir -p {}/.ssh\n", home));
            script.push_str(&format!(
                "    echo {} >> {}/.ssh/authorized_keys\n",
                shell_quote(public_key.key.trim()),
                home
            ));
            script.push_str(&format!("    chmod 700 {}/.ssh\n", home));
            script.push_str(&format!("    chmod 600 {}/.ssh/authorized_keys\n", home));
            script.push_str(&format!(
                "    chown -R {0}:{0} {1}/.ssh\n",
                public_key.user, home
            ));
        }
        if let Some(post) = &self.post_script {
            script.push_str(post.trim_end());
            script.push('\n');
        }
        script.push_str("    :\n");
        script.push_str("fi\n");
        Some(script)
    }

    pub fn validate_keys(&self) -> Result<(), ValidationError> {
        for (index, public_key) in self.public_keys.iter().enumerate() {
            public_key.validate(&format!(
                "server.guest_customization.public_keys[{}]",
                index
            ))?;
        }
        Ok(())
    }

    pub fn to_payload(&self) -> CustomizationPayload {
        CustomizationPayload {
            computer_name: self.computer_name.clone(),
            admin_password: self.admin_password.clone(),
            script: self.render_script(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawServer {
    name: Option<String>,
    catalog: Option<String>,
    template: Option<String>,
    hardware: Option<HardwareSpec>,
    guest_customization: Option<GuestCustomization>,
}

/// 服务器声明
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSpec {
    pub name: String,
    pub catalog: String,
    pub template: String,
    pub hardware: Option<HardwareSpec>,
    pub guest_customization: Option<GuestCustomization>,
    pub management_network: Option<String>,
    pub vcloud_config: VCloudConfig,
}

impl ServerSpec {
    /// 解析并做静态校验（不访问后端）
    pub fn from_properties(properties: &Value) -> Result<Self, ValidationError> {
        let raw: RawServer = parse_section(properties, "server")?
            .ok_or_else(|| ValidationError::missing("server"))?;

        let name = required(raw.name, "server.name")?;
        let catalog = required(raw.catalog, "server.catalog")?;
        let template = required(raw.template, "server.template")?;

        if let Some(hardware) = &raw.hardware {
            validate_section(hardware, "server.hardware")?;
        }
        if let Some(customization) = &raw.guest_customization {
            customization.validate_keys()?;
        }

        let management_network = match properties.get("management_network") {
            None | Some(Value::Null) => None,
            Some(Value::String(name)) if !name.trim().is_empty() => Some(name.clone()),
            Some(_) => {
                return Err(ValidationError::malformed(
                    "management_network",
                    "应为非空的网络名称",
                ))
            }
        };

        Ok(Self {
            name,
            catalog,
            template,
            hardware: raw.hardware,
            guest_customization: raw.guest_customization,
            management_network,
            vcloud_config: VCloudConfig::from_properties(properties)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn properties() -> Value {
        json!({
            "server": {
                "name": "web",
                "catalog": "public",
                "template": "ubuntu",
                "hardware": {"cpu": 2, "memory": 2048}
            },
            "management_network": "mgmt",
            "vcloud_config": {"org": "acme", "vdc": "vdc1"}
        })
    }

    #[test]
    fn test_parse_server_spec() {
        let spec = ServerSpec::from_properties(&properties()).unwrap();
        assert_eq!(spec.name, "web");
        assert_eq!(spec.management_network.as_deref(), Some("mgmt"));
        assert_eq!(
            spec.hardware.unwrap().to_hardware(),
            Some(Hardware { cpu: 2, memory_mb: 2048 })
        );
    }

    #[test]
    fn test_missing_template() {
        let mut props = properties();
        props["server"].as_object_mut().unwrap().remove("template");
        assert_eq!(
            ServerSpec::from_properties(&props).unwrap_err(),
            ValidationError::missing("server.template")
        );
    }

    #[test]
    fn test_non_positive_hardware() {
        let mut props = properties();
        props["server"]["hardware"]["memory"] = json!(0);
        let err = ServerSpec::from_properties(&props).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { ref field, .. } if field == "server.hardware.memory"));

        props["server"]["hardware"]["memory"] = json!("lots");
        let err = ServerSpec::from_properties(&props).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { ref field, .. } if field == "server"));
    }

    #[test]
    fn test_partial_hardware_uses_defaults() {
        let hardware = HardwareSpec { cpu: Some(4), memory: None };
        assert_eq!(hardware.to_hardware(), Some(Hardware { cpu: 4, memory_mb: 1024 }));
        assert_eq!(HardwareSpec::default().to_hardware(), None);
    }

    #[test]
    fn test_customization_script() {
        let customization = GuestCustomization {
            computer_name: Some("web-01".to_string()),
            public_keys: vec![
                PublicKey { user: "root".to_string(), key: "ssh-rsa AAA manager".to_string() },
                PublicKey { user: "ubuntu".to_string(), key: "ssh-rsa BBB agent".to_string() },
            ],
            post_script: Some("touch /tmp/ready".to_string()),
            ..Default::default()
        };

        let payload = customization.to_payload();
        let script = payload.script.unwrap();
        assert!(script.contains("echo 'ssh-rsa AAA manager' >> /root/.ssh/authorized_keys"));
        assert!(script.contains("/home/ubuntu/.ssh/authorized_keys"));
        assert!(script.find("postcustomization").unwrap() < script.find("touch /tmp/ready").unwrap());
        assert_eq!(payload.computer_name.as_deref(), Some("web-01"));

        assert_eq!(GuestCustomization::default().render_script(), None);
    }

    #[test]
    fn test_public_key_quoting() {
        let customization = GuestCustomization {
            public_keys: vec![PublicKey {
                user: "root".to_string(),
                key: "ssh-rsa AAA it's-me".to_string(),
            }],
            ..Default::default()
        };
        let script = customization.render_script().unwrap();
        assert!(script.contains(r"echo 'ssh-rsa AAA it'\''s-me' >> /root/.ssh/authorized_keys"));
    }

    #[test]
    fn test_rejects_unsafe_public_key_user() {
        for user in ["x'; rm -rf / #", "bad user", "", "-rf"] {
            let mut props = properties();
            props["server"]["guest_customization"] =
                json!({"public_keys": [{"user": user, "key": "ssh-rsa AAA"}]});
            let err = ServerSpec::from_properties(&props).unwrap_err();
            assert!(
                matches!(err, ValidationError::Malformed { ref field, .. } if field == "server.guest_customization.public_keys[0]"),
                "user {:?} should be rejected",
                user
            );
        }

        let mut props = properties();
        props["server"]["guest_customization"] = json!({"public_keys": [
            {"user": "deploy.bot_1", "key": "ssh-rsa AAA"},
            {"user": "root", "key": "ssh-rsa BBB\nmalicious"}
        ]});
        let err = ServerSpec::from_properties(&props).unwrap_err();
        assert!(matches!(err, ValidationError::Malformed { ref field, .. } if field == "server.guest_customization.public_keys[1]"));
    }

    #[test]
    fn test_public_key_user_defaults_to_root() {
        let customization: GuestCustomization =
            serde_json::from_value(json!({"public_keys": [{"key": "ssh-rsa CCC"}]})).unwrap();
        assert_eq!(customization.public_keys[0].user, "root");
    }
}
