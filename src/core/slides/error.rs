use thiserror::Error;

/// 配置错误 - 在任何解码开始前失败
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("sampling interval must be positive, got {0}")]
    InvalidInterval(u32),
    #[error("hash batch size must be positive")]
    InvalidBatchSize,
    #[error("extraction worker count must be positive")]
    InvalidWorkerCount,
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 视频源解码错误
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame {index} is corrupt: {reason}")]
    Corrupt { index: u64, reason: String },
    #[error("frame {index} is truncated: got {got} of {expected} bytes")]
    Truncated {
        index: u64,
        got: usize,
        expected: usize,
    },
    #[error("image decode error at frame {index}: {source}")]
    Image {
        index: u64,
        #[source]
        source: image::ImageError,
    },
    #[error("decoder IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 单张幻灯片的文字提取错误
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("text extraction failed: {0}")]
    Failed(String),
    #[error("image encode error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("extractor IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 提取能力本身不可用（进程无法启动、资源耗尽），整个流水线失败
    #[error("text extractor exhausted: {0}")]
    ResourceExhausted(String),
}

impl ExtractionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractionError::ResourceExhausted(_))
    }
}

/// 文档组装错误
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("document IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("slide image encode error: {0}")]
    Image(#[from] image::ImageError),
    #[error("manifest serialization error: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// 流水线级错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("decode failed after frame {last_sampled:?}: {source}")]
    Decode {
        last_sampled: Option<u64>,
        #[source]
        source: DecodeError,
    },
    #[error("text extraction aborted: {0}")]
    Extraction(#[source] ExtractionError),
    #[error("document assembly failed: {0}")]
    Assembly(#[from] AssemblyError),
    #[error("pipeline cancelled")]
    Cancelled,
}
