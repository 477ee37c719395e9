use tracing_subscriber::EnvFilter;

/// 初始化日志；`RUST_LOG` 优先于配置文件中的 debug 开关
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug);

    // 重复初始化（例如测试中）时忽略错误
    let _ = builder.try_init();
}
