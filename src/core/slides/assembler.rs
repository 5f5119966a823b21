use super::cancel::CancellationToken;
use super::deduplicator::Slide;
use super::document::{DocumentAssembler, DocumentHandle};
use super::error::{AssemblyError, ExtractionError, PipelineError};
use super::hasher::Fingerprint;
use super::text_extractor::TextExtractor;
use image::RgbImage;
use log::{info, warn};
use rayon::prelude::*;
use std::sync::Arc;

/// 幻灯片 + 提取出的文字，流水线的最终数据产物
#[derive(Debug, Clone)]
pub struct SlideRecord {
    pub order: u64,
    pub image: Arc<RgbImage>,
    pub fingerprint: Fingerprint,
    pub text: String,
}

/// 为每张幻灯片提取文字并按顺序交给文档组装方
pub struct ArtifactAssembler {
    workers: usize,
}

impl ArtifactAssembler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    /// 每张幻灯片调用一次提取器
    ///
    /// 单张失败记为空文本并继续；仅提取能力本身耗尽时整体失败。
    /// 取消后丢弃所有进行中的结果。
    pub fn extract_all(
        &self,
        slides: Vec<Slide>,
        extractor: &dyn TextExtractor,
        cancel: &CancellationToken,
    ) -> Result<Vec<SlideRecord>, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| {
                PipelineError::Extraction(ExtractionError::ResourceExhausted(e.to_string()))
            })?;

        let total = slides.len();
        info!(
            "📝 Extracting text from {} slides with {} workers",
            total, self.workers
        );

        let mut records = pool.install(|| {
            slides
                .into_par_iter()
                .map(|slide| Self::extract_one(slide, extractor, cancel))
                .collect::<Result<Vec<_>, PipelineError>>()
        })?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        records.sort_by_key(|r| r.order);
        let empty = records.iter().filter(|r| r.text.is_empty()).count();
        info!(
            "✅ Text extraction complete: {} slides, {} without text",
            total, empty
        );
        Ok(records)
    }

    fn extract_one(
        slide: Slide,
        extractor: &dyn TextExtractor,
        cancel: &CancellationToken,
    ) -> Result<SlideRecord, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let text = match extractor.extract(&slide.pixels) {
            Ok(text) => text,
            Err(e) if e.is_fatal() => return Err(PipelineError::Extraction(e)),
            Err(e) => {
                warn!("⚠️ Slide {}: {}, keeping empty text", slide.order, e);
                String::new()
            }
        };

        Ok(SlideRecord {
            order: slide.order,
            image: slide.pixels,
            fingerprint: slide.fingerprint,
            text,
        })
    }

    /// 原样转交文档组装方，不做任何文字后处理
    pub fn forward(
        &self,
        records: &[SlideRecord],
        document: &dyn DocumentAssembler,
    ) -> Result<DocumentHandle, AssemblyError> {
        document.assemble(records)
    }
}

impl Default for ArtifactAssembler {
    fn default() -> Self {
        Self::new(num_cpus::get().clamp(1, 4))
    }
}
