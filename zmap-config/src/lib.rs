use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub layer: LayerConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `ZMAP_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("ZMAP_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 矢量图层的初始选项。
#[derive(Debug, Clone, Deserialize)]
pub struct LayerConfig {
    #[serde(default = "LayerConfig::default_id")]
    pub id: String,
    #[serde(default = "LayerConfig::default_visible")]
    pub visible: bool,
    /// 添加几何体后是否让视图适配新增范围。
    #[serde(default)]
    pub fit_view: bool,
}

impl LayerConfig {
    fn default_id() -> String {
        "vector".to_string()
    }

    fn default_visible() -> bool {
        true
    }
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            id: Self::default_id(),
            visible: Self::default_visible(),
            fit_view: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceConfig {
    /// 样式中相对资源路径（markerFile 等）的默认根。
    #[serde(default)]
    pub style_root: Option<String>,
    #[serde(default)]
    pub sample_data: Option<PathBuf>,
    #[serde(default)]
    pub style_file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
