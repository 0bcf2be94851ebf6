//! 配置管理
//!
//! 加载顺序：内置默认值 → 可选TOML文件 → `VIZOR_` 前缀环境变量。
//! 嵌套字段用双下划线分隔，例如 `VIZOR_HEALTHCARE__STORE_ID`。

use crate::error::{Result, VizorError};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// 服务完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 云项目ID
    pub project_id: String,
    /// 上传影像所在存储桶
    pub imaging_bucket: String,
    pub healthcare: HealthcareSettings,
    pub ingest: IngestSettings,
    pub database: DatabaseSettings,
    pub logging: LoggingSettings,
}

/// 托管DICOM存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthcareSettings {
    pub location: String,
    pub dataset_id: String,
    pub store_id: String,
    pub api_base: String,
    /// OAuth访问令牌；为空时请求不带认证头
    ///
    /// 令牌在进程启动时读取一次，之后不会刷新。托管服务签发的令牌通常一小时过期，
    /// 它必须覆盖整个导入和轮询过程，长时间运行的进程需要在过期前重启。
    pub access_token: Option<String>,
}

/// 导入流程配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// 长任务轮询间隔（秒）
    pub poll_interval_secs: u64,
}

/// 元数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Postgres连接串；为空时使用进程内存储
    pub url: Option<String>,
    pub max_connections: u32,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_id: "vv-1-a".to_string(),
            imaging_bucket: "vv-storage-vault".to_string(),
            healthcare: HealthcareSettings::default(),
            ingest: IngestSettings::default(),
            database: DatabaseSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl Default for HealthcareSettings {
    fn default() -> Self {
        Self {
            location: "us-central1".to_string(),
            dataset_id: "vv-dataset-1".to_string(),
            store_id: "vv-dicom".to_string(),
            api_base: "https://healthcare.googleapis.com/v1".to_string(),
            access_token: None,
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { poll_interval_secs: 5 }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Settings {
    /// 加载配置，`config_path` 不存在时仅使用默认值与环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(false));
        }
        let settings = builder
            .add_source(
                Environment::with_prefix("VIZOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| VizorError::Config(e.to_string()))?;

        let settings: Settings = settings
            .try_deserialize()
            .map_err(|e| VizorError::Config(e.to_string()))?;
        settings.validate()?;

        info!(
            "Configuration loaded: project={}, dicom store={}",
            settings.project_id,
            settings.dicom_store_path()
        );
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let hc = &self.healthcare;
        for (name, value) in [
            ("project_id", &self.project_id),
            ("healthcare.location", &hc.location),
            ("healthcare.dataset_id", &hc.dataset_id),
            ("healthcare.store_id", &hc.store_id),
            ("healthcare.api_base", &hc.api_base),
        ] {
            if value.trim().is_empty() {
                return Err(VizorError::Config(format!("{} 不能为空", name)));
            }
        }
        if self.ingest.poll_interval_secs == 0 {
            return Err(VizorError::Config("ingest.poll_interval_secs 必须大于0".to_string()));
        }
        Ok(())
    }

    /// 托管DICOM存储的资源路径
    pub fn dicom_store_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/datasets/{}/dicomStores/{}",
            self.project_id,
            self.healthcare.location,
            self.healthcare.dataset_id,
            self.healthcare.store_id
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.ingest.poll_interval_secs)
    }
}
