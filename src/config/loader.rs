//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "service-lifecycle.toml";

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中 `${VAR_NAME}` 形式的环境变量
    ///
    /// 变量未设置时返回 [`ConfigError::EnvVarError`]。
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {e}")))?;

        let mut result = content.to_string();

        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    return Err(ConfigError::EnvVarError {
                        var: var_name.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(result)
    }

    /// 解析TOML内容
    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {e}")))?;

        Ok(config)
    }
}

impl Default for TomlConfigLoader {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {e}")))?;

        let config = self.parse_toml(&content)?;
        self.validate(&config)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {config:?}");

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 优先使用当前目录下的 `service-lifecycle.toml`，
/// 否则使用平台配置目录下的 `service-lifecycle/service-lifecycle.toml`。
pub fn get_default_config_path() -> PathBuf {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return local;
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("service-lifecycle").join(DEFAULT_CONFIG_FILE))
        .unwrap_or(local)
}

/// 加载配置
///
/// 显式指定的文件必须存在；未指定且默认位置没有配置文件时使用内置默认值。
pub async fn load_config(path: Option<&Path>) -> Result<Config> {
    let loader = TomlConfigLoader::default();
    match path {
        Some(path) => loader.load_from_file(path).await,
        None => {
            let default_path = get_default_config_path();
            if default_path.exists() {
                loader.load_from_file(default_path).await
            } else {
                log::debug!("未找到配置文件，使用默认配置");
                Ok(Config::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LifecycleError;
    use std::env;
    use std::io::Write;

    const TEST_CONFIG_TOML: &str = r#"
[global]
log_level = "debug"
dev_mode = true
shutdown_timeout_seconds = 15
signals = ["SIGTERM"]

[http]
bind_address = "127.0.0.1"
port = 8081

[rpc]
enabled = false
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.log_level, "debug");
        assert!(config.global.dev_mode);
        assert_eq!(config.global.shutdown_timeout_seconds, Some(15));
        assert_eq!(config.global.signals, vec!["SIGTERM"]);
        assert_eq!(config.http.listen_addr(), "127.0.0.1:8081");
        assert!(!config.rpc.enabled);
    }

    #[tokio::test]
    async fn test_env_var_substitution() {
        env::set_var("SL_TEST_OTEL_ENDPOINT", "http://collector:4318/v1/traces");
        env::set_var("SL_TEST_HTTP_PORT", "9191");

        let content = r#"
[http]
port = ${SL_TEST_HTTP_PORT}

[telemetry]
endpoint = "${SL_TEST_OTEL_ENDPOINT}"
"#;
        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_string(content).await.unwrap();

        assert_eq!(config.http.port, 9191);
        assert_eq!(
            config.telemetry.endpoint.as_deref(),
            Some("http://collector:4318/v1/traces")
        );

        env::remove_var("SL_TEST_OTEL_ENDPOINT");
        env::remove_var("SL_TEST_HTTP_PORT");
    }

    #[tokio::test]
    async fn test_env_var_substitution_missing_var() {
        let content = r#"
[telemetry]
endpoint = "${SL_TEST_MISSING_VAR}"
"#;

        let loader = TomlConfigLoader::new(true);
        let err = loader.load_from_string(content).await.unwrap_err();

        assert!(err.to_string().contains("SL_TEST_MISSING_VAR"));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let loader = TomlConfigLoader::new(false);

        let err = loader
            .load_from_string("[http]\nport = 0\n")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Config(ConfigError::ValidationError(_))
        ));

        let err = loader.load_from_string("[http\n").await.unwrap_err();
        assert!(matches!(err, LifecycleError::Config(ConfigError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG_TOML.as_bytes()).unwrap();

        let config = load_config(Some(file.path())).await.unwrap();
        assert_eq!(config.http.port, 8081);
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = load_config(Some(&path)).await.unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().ends_with(DEFAULT_CONFIG_FILE));
    }
}
