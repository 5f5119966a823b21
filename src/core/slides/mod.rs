//! 视频幻灯片提取 - 从演示录像中提取去重后的幻灯片及其文字
//!
//! 流程：
//! 1. 固定间隔采样 - 每 N 帧取一帧，惰性读取
//! 2. 感知哈希 - DCT pHash，容忍压缩噪声
//! 3. 贪心去重 - 与所有已保留幻灯片比较，只追加
//! 4. 文字提取 - 每张幻灯片一次，失败时记空文本
//! 5. 文档组装 - 按顺序交给文档生成方

pub mod assembler;
pub mod cancel;
pub mod config;
pub mod deduplicator;
pub mod document;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod hasher;
pub mod pipeline;
pub mod sampler;
pub mod source;
pub mod state_machine;
pub mod text_extractor;

pub use assembler::{ArtifactAssembler, SlideRecord};
pub use cancel::CancellationToken;
pub use config::PipelineConfig;
pub use deduplicator::{DedupDecision, FingerprintSet, Slide, SlideDeduplicator};
pub use document::{DirectoryAssembler, DocumentAssembler, DocumentHandle};
pub use error::{AssemblyError, ConfigError, DecodeError, ExtractionError, PipelineError};
pub use ffmpeg::FfmpegSource;
pub use frame::{Frame, RawFrame};
pub use hasher::{Fingerprint, PerceptualHasher};
pub use pipeline::{PipelineReport, SlidePipeline};
pub use sampler::FrameSampler;
pub use source::{open_source, ImageSequenceSource, MemorySource, RawFrameSource, VideoSource};
pub use state_machine::{FailureReason, PipelineState};
pub use text_extractor::{MockTextExtractor, TesseractExtractor, TextExtractor};
