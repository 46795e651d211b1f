use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

/// 任务队列与重试策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 最大尝试次数，超过后任务进入死信
    pub max_attempts: u32,
    /// 租约有效期（秒），到期未续约的任务会被回收重派
    pub lease_seconds: u64,
    /// 基础重试间隔（秒）
    pub retry_base_seconds: u64,
    /// 最大重试间隔（秒）
    pub retry_max_seconds: u64,
    /// 指数退避倍数
    pub retry_backoff_multiplier: f64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub retry_jitter_factor: f64,
    /// 公平性老化阈值（秒）：等待超过该时长的任务提升一个优先级档位
    pub aging_threshold_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            lease_seconds: 30,
            retry_base_seconds: 5,
            retry_max_seconds: 300,
            retry_backoff_multiplier: 2.0,
            retry_jitter_factor: 0.1,
            aging_threshold_seconds: 60,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大尝试次数必须大于0"));
        }
        if self.lease_seconds == 0 {
            return Err(anyhow::anyhow!("租约有效期必须大于0"));
        }
        if self.retry_base_seconds == 0 {
            return Err(anyhow::anyhow!("基础重试间隔必须大于0"));
        }
        if self.retry_max_seconds < self.retry_base_seconds {
            return Err(anyhow::anyhow!("最大重试间隔不能小于基础重试间隔"));
        }
        if self.retry_backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!("退避倍数必须不小于1.0"));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            return Err(anyhow::anyhow!(
                "抖动系数必须在0.0-1.0之间: {}",
                self.retry_jitter_factor
            ));
        }
        if self.aging_threshold_seconds == 0 {
            return Err(anyhow::anyhow!("老化阈值必须大于0"));
        }
        Ok(())
    }
}

/// 去重存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// 指纹保留窗口（秒），过期后相同文本会生成新任务
    pub retention_seconds: u64,
    /// 过期指纹清理间隔（秒）
    pub purge_interval_seconds: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_seconds: 86_400,
            purge_interval_seconds: 300,
        }
    }
}

impl DedupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.retention_seconds == 0 {
            return Err(anyhow::anyhow!("指纹保留窗口必须大于0"));
        }
        if self.purge_interval_seconds == 0 {
            return Err(anyhow::anyhow!("清理间隔必须大于0"));
        }
        Ok(())
    }
}

/// 检索索引配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 每个任务检索的参考段落数量
    pub top_k: usize,
    /// 参考语料目录（JSON 文件，每个文件一个段落），为空时使用内置语料
    pub corpus_dir: Option<String>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            corpus_dir: None,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(anyhow::anyhow!("top_k必须大于0"));
        }
        Ok(())
    }
}

/// 分析器执行与合并配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 单个分析器的超时（毫秒）
    pub analyzer_timeout_ms: u64,
    /// 单个任务的分析总预算（毫秒），超出后用已有结果出报告
    pub job_budget_ms: u64,
    /// 报告被标记为 Final 所需的最少成功分析器数量
    pub min_successful_analyzers: usize,
    /// 发现项去重的跨度重叠阈值（相对较短跨度的比例）
    pub overlap_threshold: f64,
    /// 各维度权重（按分析器 id），合并时只在产出分数的维度上重新归一化
    pub weights: BTreeMap<String, f64>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert("sintaxe".to_string(), 0.25);
        weights.insert("verbos".to_string(), 0.25);
        weights.insert("estrutura".to_string(), 0.25);
        weights.insert("coesao".to_string(), 0.25);
        Self {
            analyzer_timeout_ms: 5_000,
            job_budget_ms: 20_000,
            min_successful_analyzers: 3,
            overlap_threshold: 0.5,
            weights,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.analyzer_timeout_ms == 0 {
            return Err(anyhow::anyhow!("分析器超时必须大于0"));
        }
        if self.job_budget_ms < self.analyzer_timeout_ms {
            return Err(anyhow::anyhow!("任务预算不能小于单个分析器超时"));
        }
        if self.min_successful_analyzers == 0 {
            return Err(anyhow::anyhow!("最少成功分析器数量必须大于0"));
        }
        if !(0.0..=1.0).contains(&self.overlap_threshold) {
            return Err(anyhow::anyhow!(
                "重叠阈值必须在0.0-1.0之间: {}",
                self.overlap_threshold
            ));
        }
        if self.weights.is_empty() {
            return Err(anyhow::anyhow!("维度权重不能为空"));
        }
        if self.weights.values().any(|w| *w < 0.0) {
            return Err(anyhow::anyhow!("维度权重不能为负数"));
        }
        if self.weights.values().sum::<f64>() <= 0.0 {
            return Err(anyhow::anyhow!("维度权重之和必须大于0"));
        }
        Ok(())
    }
}

/// Worker 池配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker 数量
    pub workers: usize,
    /// 队列为空时的轮询间隔（毫秒）
    pub poll_interval_ms: u64,
    /// 处理中任务的租约续约间隔（秒）
    pub heartbeat_interval_seconds: u64,
    /// 作文最少词数，低于该值按 TEXT_TOO_SHORT 拒收
    pub min_essay_words: usize,
    /// 支持的作文语言
    pub supported_languages: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 250,
            heartbeat_interval_seconds: 10,
            min_essay_words: 5,
            supported_languages: vec!["pt".to_string()],
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(anyhow::anyhow!("Worker数量必须大于0"));
        }
        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("轮询间隔必须大于0"));
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(anyhow::anyhow!("心跳间隔必须大于0"));
        }
        if self.supported_languages.is_empty() {
            return Err(anyhow::anyhow!("支持的语言列表不能为空"));
        }
        Ok(())
    }
}

/// 应用总配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub queue: QueueConfig,
    pub dedup: DedupConfig,
    pub retrieval: RetrievalConfig,
    pub analysis: AnalysisConfig,
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// 加载配置：默认值 < TOML 文件 < CORRETOR__ 前缀环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&AppConfig::default()).context("序列化默认配置失败")?,
        );

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {path}"));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("CORRETOR")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.queue.validate().context("队列配置验证失败")?;
        self.dedup.validate().context("去重配置验证失败")?;
        self.retrieval.validate().context("检索配置验证失败")?;
        self.analysis.validate().context("分析配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        Ok(())
    }
}
