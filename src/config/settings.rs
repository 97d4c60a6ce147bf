// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// 应用程序配置设置
///
/// 包含抓取调度、重试、输入输出、代理、渲染、日志和指标等所有配置项
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    /// 调度配置
    #[validate(nested)]
    pub crawler: CrawlerSettings,
    /// 重试配置
    #[validate(nested)]
    pub retry: RetrySettings,
    /// 种子输入配置
    pub input: InputSettings,
    /// 输出配置
    pub output: OutputSettings,
    /// 代理配置
    #[serde(default)]
    pub proxy: ProxySettings,
    /// 无头浏览器配置
    pub render: RenderSettings,
    /// 日志配置
    pub logging: LoggingSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// 调度配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CrawlerSettings {
    /// 工作者数量
    #[validate(range(min = 1, max = 1024))]
    pub workers: usize,
    /// 单个主机最大并发请求数
    #[validate(range(min = 1, max = 256))]
    pub domain_max_concurrency: usize,
    /// 单元墙钟超时（秒）
    #[validate(range(min = 1))]
    pub task_timeout_secs: u64,
    /// 单次请求超时（秒）
    #[validate(range(min = 1))]
    pub fetch_timeout_secs: u64,
    /// 熔断失败阈值
    #[validate(range(min = 1))]
    pub domain_fail_threshold: u32,
    /// 熔断冷却时间（秒）
    pub domain_cooldown_secs: u64,
    /// 每个机构最多写入的房源行数
    #[validate(range(min = 1))]
    pub max_per_agency: usize,
    /// 每完成多少个单元写一次检查点
    #[validate(range(min = 1))]
    pub checkpoint_every: usize,
    /// 主请求之后的节流等待（毫秒）
    pub throttle_ms: u64,
    /// 是否启用无头浏览器回退
    pub use_headless: bool,
    /// 是否将发现的替代URL加入队列
    pub follow_discovered: bool,
    /// 每个单元最多加入队列的替代URL数量
    pub max_discovered_per_unit: usize,
}

/// 重试配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RetrySettings {
    /// 最大重试次数
    #[validate(range(max = 10))]
    pub max_retries: u32,
    /// 初始退避时间（毫秒）
    pub initial_backoff_ms: u64,
    /// 最大退避时间（毫秒）
    pub max_backoff_ms: u64,
    /// 退避乘数
    #[validate(range(min = 1.0))]
    pub backoff_multiplier: f64,
}

/// 种子输入配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct InputSettings {
    /// 机构种子文件
    pub agencies_path: PathBuf,
    /// 房源种子文件（可选）
    pub listings_path: Option<PathBuf>,
    /// 分隔符
    pub delimiter: String,
}

/// 输出配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSettings {
    /// 输出目录
    pub dir: PathBuf,
    /// 进度文件名
    pub progress_file: String,
    /// 错误日志文件名
    pub error_log: String,
}

/// 代理配置设置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxySettings {
    /// 代理列表JSON文件
    pub file: Option<PathBuf>,
}

/// 无头浏览器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct RenderSettings {
    /// 页面加载后的等待时间（毫秒）
    pub settle_ms: u64,
    /// 远程Chrome调试地址
    pub remote_debugging_url: Option<String>,
}

/// 日志配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// 是否输出JSON日志
    pub json: bool,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用Prometheus导出
    pub enabled: bool,
    /// 监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次加载默认值、`config/default.toml`、`config/{APP_ENVIRONMENT}.toml` 和 `REALTY__` 前缀的环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载并校验的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("REALTY").separator("__"));

        Self::finish(builder.build()?)
    }

    /// 从指定的TOML文件加载配置（仍然应用默认值和环境变量）
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("REALTY").separator("__"));

        Self::finish(builder.build()?)
    }

    fn defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            // Crawler defaults
            .set_default("crawler.workers", 10)?
            .set_default("crawler.domain_max_concurrency", 2)?
            .set_default("crawler.task_timeout_secs", 30)?
            .set_default("crawler.fetch_timeout_secs", 20)?
            .set_default("crawler.domain_fail_threshold", 5)?
            .set_default("crawler.domain_cooldown_secs", 3600)?
            .set_default("crawler.max_per_agency", 20)?
            .set_default("crawler.checkpoint_every", 50)?
            .set_default("crawler.throttle_ms", 0)?
            .set_default("crawler.use_headless", false)?
            .set_default("crawler.follow_discovered", false)?
            .set_default("crawler.max_discovered_per_unit", 20)?
            // Retry defaults
            .set_default("retry.max_retries", 3)?
            .set_default("retry.initial_backoff_ms", 500)?
            .set_default("retry.max_backoff_ms", 10_000)?
            .set_default("retry.backoff_multiplier", 2.0)?
            // Input / output defaults
            .set_default("input.agencies_path", "agencies.csv")?
            .set_default("input.delimiter", "\t")?
            .set_default("output.dir", ".")?
            .set_default("output.progress_file", "progress.json")?
            .set_default("output.error_log", "scrape_errors.log")?
            // Render defaults
            .set_default("render.settle_ms", 1500)?
            // Logging / metrics defaults
            .set_default("logging.json", false)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")
    }

    fn finish(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(settings)
    }

    /// 单元超时
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.task_timeout_secs)
    }

    /// 请求超时
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.crawler.fetch_timeout_secs)
    }

    /// 熔断冷却时间
    pub fn domain_cooldown(&self) -> Duration {
        Duration::from_secs(self.crawler.domain_cooldown_secs)
    }

    /// 节流等待
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.crawler.throttle_ms)
    }

    /// 输出目录下的文件路径
    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output.dir.join(file_name)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
