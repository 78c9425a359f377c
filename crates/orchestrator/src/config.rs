/// 配置管理

use common::models::constants::{
    DEFAULT_ATTACH_ATTEMPTS, DEFAULT_ATTACH_INTERVAL_MS, DEFAULT_CREATE_ATTEMPTS,
    DEFAULT_CREATE_INTERVAL_MS, DEFAULT_POWER_ATTEMPTS, DEFAULT_POWER_INTERVAL_MS,
    DEFAULT_STATE_ATTEMPTS, DEFAULT_STATE_INTERVAL_MS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 任务轮询策略（某一类操作的超时预算）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    pub fn from_millis(max_attempts: u32, interval_ms: u64) -> Self {
        Self::new(max_attempts, Duration::from_millis(interval_ms))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// 组合/销毁（create、delete、create_volume、delete_volume）
    pub create: PollPolicy,
    /// 开机/关机
    pub power: PollPolicy,
    /// 挂载/分离以及创建后的网络更新
    pub attach: PollPolicy,
    /// 状态上报
    pub state: PollPolicy,
    /// 日志过滤指令，供 `Orchestrator::init_logging` 使用
    pub log_level: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            create: PollPolicy::from_millis(DEFAULT_CREATE_ATTEMPTS, DEFAULT_CREATE_INTERVAL_MS),
            power: PollPolicy::from_millis(DEFAULT_POWER_ATTEMPTS, DEFAULT_POWER_INTERVAL_MS),
            attach: PollPolicy::from_millis(DEFAULT_ATTACH_ATTEMPTS, DEFAULT_ATTACH_INTERVAL_MS),
            state: PollPolicy::from_millis(DEFAULT_STATE_ATTEMPTS, DEFAULT_STATE_INTERVAL_MS),
            log_level: "info".to_string(),
        }
    }
}

impl LifecycleConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let create = policy_from_env(
            "LIFECYCLE_CREATE_ATTEMPTS",
            "LIFECYCLE_CREATE_INTERVAL_MS",
            DEFAULT_CREATE_ATTEMPTS,
            DEFAULT_CREATE_INTERVAL_MS,
        )?;

        let power = policy_from_env(
            "LIFECYCLE_POWER_ATTEMPTS",
            "LIFECYCLE_POWER_INTERVAL_MS",
            DEFAULT_POWER_ATTEMPTS,
            DEFAULT_POWER_INTERVAL_MS,
        )?;

        let attach = policy_from_env(
            "LIFECYCLE_ATTACH_ATTEMPTS",
            "LIFECYCLE_ATTACH_INTERVAL_MS",
            DEFAULT_ATTACH_ATTEMPTS,
            DEFAULT_ATTACH_INTERVAL_MS,
        )?;

        let state = policy_from_env(
            "LIFECYCLE_STATE_ATTEMPTS",
            "LIFECYCLE_STATE_INTERVAL_MS",
            DEFAULT_STATE_ATTEMPTS,
            DEFAULT_STATE_INTERVAL_MS,
        )?;

        let log_level = std::env::var("LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            create,
            power,
            attach,
            state,
            log_level,
        })
    }

    /// 所有操作共用同一策略，测试中使用毫秒级间隔
    pub fn uniform(policy: PollPolicy) -> Self {
        Self {
            create: policy,
            power: policy,
            attach: policy,
            state: policy,
            ..Self::default()
        }
    }
}

fn policy_from_env(
    attempts_var: &str,
    interval_var: &str,
    default_attempts: u32,
    default_interval_ms: u64,
) -> anyhow::Result<PollPolicy> {
    let max_attempts = match std::env::var(attempts_var) {
        Ok(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("{} 无效: {}", attempts_var, e))?,
        Err(_) => default_attempts,
    };

    let interval_ms = match std::env::var(interval_var) {
        Ok(value) => value
            .parse()
            .map_err(|e| anyhow::anyhow!("{} 无效: {}", interval_var, e))?,
        Err(_) => default_interval_ms,
    };

    if max_attempts == 0 {
        anyhow::bail!("{} 必须大于 0", attempts_var);
    }

    Ok(PollPolicy::from_millis(max_attempts, interval_ms))
}
