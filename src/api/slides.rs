//! 幻灯片提取器 - 视频 → 去重幻灯片 + 文字 → 文档目录

use crate::core::slides::{
    open_source, CancellationToken, DirectoryAssembler, PipelineConfig, PipelineError,
    PipelineReport, PipelineState, SlidePipeline, TesseractExtractor, TextExtractor,
};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 外部工具配置，构造时显式传入
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: PathBuf,
    pub tesseract: PathBuf,
    pub language: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            tesseract: PathBuf::from("tesseract"),
            language: "eng".to_string(),
        }
    }
}

/// 幻灯片提取器
///
/// ```ignore
/// let extractor = SlideExtractor::create(PipelineConfig::default(), ToolPaths::default())?;
/// let report = extractor.extract("lecture.mp4", "out/")?;
/// println!("{} slides", report.records.len());
/// ```
pub struct SlideExtractor {
    pipeline: Mutex<SlidePipeline>,
    cancel: CancellationToken,
    text_extractor: Box<dyn TextExtractor>,
    ffmpeg: PathBuf,
}

impl SlideExtractor {
    /// 使用 tesseract 作为文字提取器
    pub fn create(config: PipelineConfig, tools: ToolPaths) -> Result<Self, PipelineError> {
        let tesseract = TesseractExtractor::new(tools.tesseract, tools.language);
        Self::with_text_extractor(config, tools.ffmpeg, Box::new(tesseract))
    }

    pub fn with_text_extractor(
        config: PipelineConfig,
        ffmpeg: PathBuf,
        text_extractor: Box<dyn TextExtractor>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        crate::init_logging();
        info!(
            "🎬 SlideExtractor: created (interval={}, threshold={})",
            config.interval, config.threshold
        );

        let pipeline = SlidePipeline::new(config);
        Ok(Self {
            cancel: pipeline.cancellation_token(),
            pipeline: Mutex::new(pipeline),
            text_extractor,
            ffmpeg,
        })
    }

    /// 从本地视频文件或帧图片目录提取幻灯片，输出到 `out_dir`
    pub fn extract(
        &self,
        location: &str,
        out_dir: impl AsRef<Path>,
    ) -> Result<PipelineReport, PipelineError> {
        let source = open_source(location, &self.ffmpeg)?;
        let document = DirectoryAssembler::new(out_dir.as_ref());
        let mut pipeline = self.pipeline.lock().unwrap_or_else(|e| e.into_inner());
        pipeline.run(source, self.text_extractor.as_ref(), &document)
    }

    /// 协作式取消，可从任意线程调用；只终止当前或下一次 `extract`
    pub fn cancel(&self) {
        info!("🛑 SlideExtractor: cancel requested");
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 最近一次运行的状态；运行中调用会等待其结束
    pub fn state(&self) -> PipelineState {
        self.pipeline
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .state()
            .clone()
    }
}

impl Drop for SlideExtractor {
    fn drop(&mut self) {
        info!("🗑️ SlideExtractor: released");
    }
}
