/// 工具函数

use std::net::Ipv4Addr;
use uuid::Uuid;

/// 后端对象 ID（vApp、磁盘）
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// 带类型前缀的 ID，例如 `task-3f2a…`
pub fn prefixed_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

/// 是否为 IPv4 点分十进制地址
pub fn validate_ip_address(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(generate_id(), generate_id());

        let task = prefixed_id("task");
        assert!(task.starts_with("task-"));
        assert_eq!(task.len(), "task-".len() + 32);
    }

    #[test]
    fn test_validate_ip_address() {
        assert!(validate_ip_address("10.0.0.2"));
        assert!(validate_ip_address("172.16.254.1"));
        assert!(!validate_ip_address("10.0.0.256"));
        assert!(!validate_ip_address("10.0.0"));
        assert!(!validate_ip_address("10..0.1"));
        assert!(!validate_ip_address("fe80::1"));
        assert!(!validate_ip_address(""));
    }
}
