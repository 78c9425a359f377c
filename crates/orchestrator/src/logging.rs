/// 日志初始化

/// 安装 fmt 订阅者，`RUST_LOG` 优先于 `default_filter`
///
/// 重复调用时静默忽略（测试中多个用例可能都会初始化）。
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .try_init();
}
