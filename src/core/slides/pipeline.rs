use super::assembler::{ArtifactAssembler, SlideRecord};
use super::cancel::CancellationToken;
use super::config::PipelineConfig;
use super::deduplicator::{Slide, SlideDeduplicator};
use super::document::{DocumentAssembler, DocumentHandle};
use super::error::PipelineError;
use super::frame::Frame;
use super::hasher::PerceptualHasher;
use super::sampler::FrameSampler;
use super::source::VideoSource;
use super::state_machine::{FailureReason, PipelineEvent, PipelineState, PipelineStateMachine};
use super::text_extractor::TextExtractor;
use log::{error, info, warn};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub frames_decoded: u64,
    pub frames_sampled: u64,
    pub records: Vec<SlideRecord>,
    pub document: DocumentHandle,
}

/// 采样 → 去重 → 文字提取 → 文档组装
pub struct SlidePipeline {
    config: PipelineConfig,
    hasher: PerceptualHasher,
    state: PipelineStateMachine,
    cancel: CancellationToken,
}

struct Sampled {
    slides: Vec<Slide>,
    decoded: u64,
    sampled: u64,
}

impl SlidePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            hasher: PerceptualHasher::new(),
            state: PipelineStateMachine::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 用于从其他线程取消本流水线
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> &PipelineState {
        self.state.current_state()
    }

    pub fn history(&self) -> &[PipelineState] {
        self.state.history()
    }

    /// 运行一次完整流水线
    ///
    /// 视频源在采样结束（或提前终止）时即被释放。取消或失败时不产出文档。
    /// 文档组装失败时核心状态仍为 `Done`，但返回 `PipelineError::Assembly`。
    /// 取消只作用于当前（或尚未开始的下一次）运行，运行结束后标记被清除。
    pub fn run<S: VideoSource>(
        &mut self,
        source: S,
        extractor: &dyn TextExtractor,
        document: &dyn DocumentAssembler,
    ) -> Result<PipelineReport, PipelineError> {
        let result = self.run_once(source, extractor, document);
        self.cancel.reset();
        result
    }

    fn run_once<S: VideoSource>(
        &mut self,
        source: S,
        extractor: &dyn TextExtractor,
        document: &dyn DocumentAssembler,
    ) -> Result<PipelineReport, PipelineError> {
        let started = Instant::now();
        self.state.reset();

        if let Err(e) = self.config.validate() {
            error!("❌ Invalid pipeline config: {}", e);
            return Err(self.fail(e.into()));
        }
        if self.cancel.is_cancelled() {
            return Err(self.fail(PipelineError::Cancelled));
        }

        info!(
            "🎬 Pipeline start: interval={}, threshold={}, frames={}",
            self.config.interval,
            self.config.threshold,
            source
                .frame_count_hint()
                .map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );
        self.state.apply(PipelineEvent::Start);

        let sampled = match self.sample_and_deduplicate(source) {
            Ok(sampled) => sampled,
            Err(e) => return Err(self.fail(e)),
        };
        info!(
            "🖼️ {} slides from {} sampled frames ({} decoded)",
            sampled.slides.len(),
            sampled.sampled,
            sampled.decoded
        );
        self.state.apply(PipelineEvent::DeduplicationFinished);

        let assembler = ArtifactAssembler::new(self.config.extraction_workers);
        let records = match assembler.extract_all(sampled.slides, extractor, &self.cancel) {
            Ok(records) => records,
            Err(e) => return Err(self.fail(e)),
        };
        self.state.apply(PipelineEvent::ExtractionFinished);

        if self.cancel.is_cancelled() {
            return Err(self.fail(PipelineError::Cancelled));
        }

        let result = assembler.forward(&records, document);
        self.state.apply(PipelineEvent::AssemblyFinished);
        let document = result.map_err(|e| {
            error!("❌ Document assembly failed: {}", e);
            PipelineError::Assembly(e)
        })?;

        info!(
            "✅ Pipeline done in {:.2}s: {} slides",
            started.elapsed().as_secs_f64(),
            records.len()
        );
        Ok(PipelineReport {
            frames_decoded: sampled.decoded,
            frames_sampled: sampled.sampled,
            records,
            document,
        })
    }

    /// 流式采样，按批并行计算指纹；尾批在 Deduplicating 状态下收尾
    fn sample_and_deduplicate<S: VideoSource>(&mut self, source: S) -> Result<Sampled, PipelineError> {
        let batch_size = self.config.hash_batch_size;
        let mut sampler = FrameSampler::new(source, self.config.interval)?;
        let mut dedup = SlideDeduplicator::with_hasher(self.hasher.clone(), self.config.threshold);
        let mut slides = Vec::new();
        let mut batch: Vec<Frame> = Vec::with_capacity(batch_size);

        loop {
            if self.cancel.is_cancelled() {
                warn!(
                    "🛑 Cancelled during sampling after {} frames",
                    sampler.decoded_count()
                );
                return Err(PipelineError::Cancelled);
            }
            match sampler.next() {
                Some(Ok(frame)) => {
                    batch.push(frame);
                    if batch.len() >= batch_size {
                        slides.extend(dedup.observe_batch(std::mem::take(&mut batch)));
                    }
                }
                Some(Err(source)) => {
                    let last_sampled = sampler.last_sampled_index();
                    error!(
                        "❌ Decode error (last sampled frame {:?}): {}",
                        last_sampled, source
                    );
                    return Err(PipelineError::Decode {
                        last_sampled,
                        source,
                    });
                }
                None => break,
            }
        }

        let decoded = sampler.decoded_count();
        // 采样结束即释放视频源
        drop(sampler);
        self.state.apply(PipelineEvent::SamplingFinished);

        if !batch.is_empty() {
            slides.extend(dedup.observe_batch(batch));
        }

        Ok(Sampled {
            slides,
            decoded,
            sampled: dedup.seen_count(),
        })
    }

    /// 把错误映射为状态转换后原样返回
    fn fail(&mut self, err: PipelineError) -> PipelineError {
        let event = match &err {
            PipelineError::Configuration(e) => {
                Some(PipelineEvent::Fail(FailureReason::Configuration(e.to_string())))
            }
            PipelineError::Decode {
                last_sampled,
                source,
            } => Some(PipelineEvent::Fail(FailureReason::Decode {
                last_sampled: *last_sampled,
                message: source.to_string(),
            })),
            PipelineError::Extraction(e) => {
                Some(PipelineEvent::Fail(FailureReason::Extraction(e.to_string())))
            }
            PipelineError::Cancelled => Some(PipelineEvent::Cancel),
            PipelineError::SourceUnavailable(_) | PipelineError::Assembly(_) => None,
        };
        if let Some(event) = event {
            self.state.apply(event);
        }
        err
    }
}

impl Default for SlidePipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::slides::document::DirectoryAssembler;
    use crate::core::slides::error::{AssemblyError, DecodeError, ExtractionError};
    use crate::core::slides::source::{ImageSequenceSource, MemorySource};
    use crate::core::slides::testing::pattern;
    use crate::core::slides::text_extractor::MockTextExtractor;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingAssembler {
        calls: AtomicUsize,
        orders: Mutex<Vec<u64>>,
    }

    impl DocumentAssembler for RecordingAssembler {
        fn assemble(&self, records: &[SlideRecord]) -> Result<DocumentHandle, AssemblyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.orders.lock().unwrap() = records.iter().map(|r| r.order).collect();
            Ok(DocumentHandle::in_memory(records.len()))
        }
    }

    struct FailingAssembler;

    impl DocumentAssembler for FailingAssembler {
        fn assemble(&self, _records: &[SlideRecord]) -> Result<DocumentHandle, AssemblyError> {
            Err(AssemblyError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }
    }

    fn config(interval: u32, threshold: u32) -> PipelineConfig {
        PipelineConfig {
            interval,
            threshold,
            hash_batch_size: 4,
            extraction_workers: 2,
        }
    }

    fn frames(variants: &[u32]) -> Vec<RgbImage> {
        variants.iter().map(|&v| pattern(v, 96, 64)).collect()
    }

    #[test]
    fn test_two_groups_scenario() {
        let mut pipeline = SlidePipeline::new(config(1, 1));
        let document = RecordingAssembler::default();

        let report = pipeline
            .run(
                MemorySource::new(frames(&[1, 1, 1, 7, 7])),
                &MockTextExtractor::with_text("text"),
                &document,
            )
            .unwrap();

        let orders: Vec<u64> = report.records.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 3]);
        assert_eq!(*document.orders.lock().unwrap(), vec![0, 3]);
        assert_eq!(report.frames_sampled, 5);
        assert_eq!(pipeline.state(), &PipelineState::Done);
    }

    #[test]
    fn test_interval_30_samples_four_frames() {
        let variants: Vec<u32> = (0..100).collect();
        let mut pipeline = SlidePipeline::new(config(30, 5));

        let report = pipeline
            .run(
                MemorySource::new(frames(&variants)),
                &MockTextExtractor::default(),
                &RecordingAssembler::default(),
            )
            .unwrap();

        assert_eq!(report.frames_decoded, 100);
        assert_eq!(report.frames_sampled, 4);
        let orders: Vec<u64> = report.records.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 30, 60, 90]);
    }

    #[test]
    fn test_zero_interval_fails_before_decoding() {
        let source = MemorySource::new(frames(&[1, 2, 3]));
        let counter = source.decoded_counter();
        let document = RecordingAssembler::default();
        let mut pipeline = SlidePipeline::new(config(0, 5));

        let result = pipeline.run(source, &MockTextExtractor::default(), &document);

        assert!(matches!(result, Err(PipelineError::Configuration(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert!(matches!(
            pipeline.state(),
            PipelineState::Failed(FailureReason::Configuration(_))
        ));
        assert_eq!(document.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_extraction_failure_still_done() {
        let extractor = MockTextExtractor::with_fn(|img| {
            if *img == pattern(7, 96, 64) {
                Err(ExtractionError::Failed("garbled".to_string()))
            } else {
                Ok("words".to_string())
            }
        });
        let mut pipeline = SlidePipeline::new(config(1, 5));

        let report = pipeline
            .run(
                MemorySource::new(frames(&[1, 7, 3])),
                &extractor,
                &RecordingAssembler::default(),
            )
            .unwrap();

        let texts: Vec<&str> = report.records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["words", "", "words"]);
        assert_eq!(pipeline.state(), &PipelineState::Done);
    }

    #[test]
    fn test_decode_error_aborts_without_document() {
        let source = MemorySource::new(frames(&[1, 2, 3, 4, 5, 6, 7, 8])).failing_at(5);
        let document = RecordingAssembler::default();
        let mut pipeline = SlidePipeline::new(config(2, 5));

        let result = pipeline.run(source, &MockTextExtractor::default(), &document);

        match result {
            Err(PipelineError::Decode {
                last_sampled,
                source: DecodeError::Corrupt { index, .. },
            }) => {
                assert_eq!(last_sampled, Some(4));
                assert_eq!(index, 5);
            }
            other => panic!("expected decode error, got {:?}", other.map(|r| r.records.len())),
        }
        assert!(matches!(
            pipeline.state(),
            PipelineState::Failed(FailureReason::Decode { .. })
        ));
        assert_eq!(document.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fatal_extraction_fails_pipeline() {
        let extractor = MockTextExtractor::with_fn(|_| {
            Err(ExtractionError::ResourceExhausted("no engine".to_string()))
        });
        let document = RecordingAssembler::default();
        let mut pipeline = SlidePipeline::new(config(1, 5));

        let result = pipeline.run(MemorySource::new(frames(&[1, 7])), &extractor, &document);

        assert!(matches!(result, Err(PipelineError::Extraction(_))));
        assert!(matches!(
            pipeline.state(),
            PipelineState::Failed(FailureReason::Extraction(_))
        ));
        assert_eq!(document.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_assembly_error_fails_command_but_core_done() {
        let mut pipeline = SlidePipeline::new(config(1, 5));

        let result = pipeline.run(
            MemorySource::new(frames(&[1, 7])),
            &MockTextExtractor::default(),
            &FailingAssembler,
        );

        assert!(matches!(result, Err(PipelineError::Assembly(_))));
        assert_eq!(pipeline.state(), &PipelineState::Done);
    }

    #[test]
    fn test_cancel_before_run() {
        let source = MemorySource::new(frames(&[1, 2]));
        let counter = source.decoded_counter();
        let document = RecordingAssembler::default();
        let mut pipeline = SlidePipeline::new(config(1, 5));
        pipeline.cancellation_token().cancel();

        let result = pipeline.run(source, &MockTextExtractor::default(), &document);

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(pipeline.state(), &PipelineState::Cancelled);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(document.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_applies_to_one_run_only() {
        let mut pipeline = SlidePipeline::new(config(1, 5));
        pipeline.cancellation_token().cancel();
        let document = RecordingAssembler::default();

        let first = pipeline.run(
            MemorySource::new(frames(&[1, 7])),
            &MockTextExtractor::default(),
            &document,
        );
        assert!(matches!(first, Err(PipelineError::Cancelled)));
        assert!(!pipeline.cancellation_token().is_cancelled());

        let second = pipeline
            .run(
                MemorySource::new(frames(&[1, 7])),
                &MockTextExtractor::default(),
                &document,
            )
            .unwrap();
        assert_eq!(second.records[0].order, 0);
        assert_eq!(pipeline.state(), &PipelineState::Done);
    }

    #[test]
    fn test_cancel_during_extraction_emits_no_document() {
        let mut pipeline = SlidePipeline::new(config(1, 5));
        let token = pipeline.cancellation_token();
        let extractor = MockTextExtractor::with_fn(move |_| {
            token.cancel();
            Ok("partial".to_string())
        });
        let document = RecordingAssembler::default();

        let result = pipeline.run(MemorySource::new(frames(&[1, 7, 3])), &extractor, &document);

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(pipeline.state(), &PipelineState::Cancelled);
        assert_eq!(document.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_batch_size_does_not_change_result() {
        let variants = [1, 1, 7, 7, 3, 1, 9, 3, 3, 11, 7];
        let run = |batch: usize| {
            let mut cfg = config(1, 5);
            cfg.hash_batch_size = batch;
            SlidePipeline::new(cfg)
                .run(
                    MemorySource::new(frames(&variants)),
                    &MockTextExtractor::default(),
                    &RecordingAssembler::default(),
                )
                .unwrap()
                .records
                .iter()
                .map(|r| r.order)
                .collect::<Vec<_>>()
        };

        let expected = vec![0, 2, 4, 6, 9];
        assert_eq!(run(1), expected);
        assert_eq!(run(3), expected);
        assert_eq!(run(64), expected);
    }

    #[test]
    fn test_empty_source_produces_empty_document() {
        let document = RecordingAssembler::default();
        let mut pipeline = SlidePipeline::new(config(30, 5));

        let report = pipeline
            .run(MemorySource::new(Vec::new()), &MockTextExtractor::default(), &document)
            .unwrap();

        assert!(report.records.is_empty());
        assert_eq!(document.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), &PipelineState::Done);
    }

    #[test]
    fn test_end_to_end_on_disk() {
        let frames_dir = tempfile::tempdir().unwrap();
        for (i, v) in [1, 1, 1, 7, 7, 7, 1, 1, 3, 3].iter().enumerate() {
            pattern(*v, 96, 64)
                .save(frames_dir.path().join(format!("frame_{:03}.png", i)))
                .unwrap();
        }
        let out = tempfile::tempdir().unwrap();

        let mut pipeline = SlidePipeline::new(config(2, 5));
        let report = pipeline
            .run(
                ImageSequenceSource::open(frames_dir.path()).unwrap(),
                &MockTextExtractor::with_text("slide text"),
                &DirectoryAssembler::new(out.path()),
            )
            .unwrap();

        // 采样 0,2,4,6,8 → 变体 1,1,7,1,3
        let orders: Vec<u64> = report.records.iter().map(|r| r.order).collect();
        assert_eq!(orders, vec![0, 4, 8]);
        assert_eq!(report.document.slide_count, 3);
        assert!(out.path().join("slide_0003.png").exists());
        assert!(out.path().join("slides.md").exists());
    }
}
