use super::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 流水线配置
///
/// `interval` 与 `threshold` 的默认值（30 帧 / 汉明距离 5）是经验值，
/// 最优取值取决于帧率和哈希位宽。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 每隔多少个解码帧采样一次
    pub interval: u32,
    /// 汉明距离阈值，距离必须严格大于该值才视为新幻灯片
    pub threshold: u32,
    /// 并行计算哈希的批大小，同时也是解码预读上限
    pub hash_batch_size: usize,
    /// 文字提取并发数
    pub extraction_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            interval: 30,
            threshold: 5,
            hash_batch_size: 16,
            extraction_workers: num_cpus::get().clamp(1, 4),
        }
    }
}

impl PipelineConfig {
    /// 翻页频繁的录屏：更密的采样
    pub fn for_fast_paced() -> Self {
        Self {
            interval: 10,
            threshold: 5,
            ..Default::default()
        }
    }

    /// 长时间停留的静态幻灯片：稀疏采样、更宽松的相似判定
    pub fn for_static_slides() -> Self {
        Self {
            interval: 60,
            threshold: 8,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval == 0 {
            return Err(ConfigError::InvalidInterval(self.interval));
        }
        if self.hash_batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }
        if self.extraction_workers == 0 {
            return Err(ConfigError::InvalidWorkerCount);
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
