//! 配置管理模块
//!
//! 提供配置文件解析、环境变量替换、验证以及命令行覆盖

pub mod loader;
pub mod types;

// 重新导出主要类型
pub use loader::{get_default_config_path, load_config, ConfigLoader, TomlConfigLoader};
pub use types::{
    validate_config, Config, GlobalConfig, HttpConfig, RpcConfig, ServeOverrides,
    TelemetryConfig,
};
