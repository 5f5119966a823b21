//! 视频源 - 顺序解码的帧来源

use super::error::{DecodeError, PipelineError};
use super::ffmpeg::FfmpegSource;
use super::frame::RawFrame;
use image::RgbImage;
use log::{debug, info, warn};
use std::borrow::Cow;
use std::cmp;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 顺序解码的视频源，由一次流水线调用独占，drop 时释放底层资源
pub trait VideoSource: Send {
    /// 解码下一帧；`Ok(None)` 表示流已正常结束
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError>;

    /// 前进一帧而不保留像素，返回 false 表示流已结束
    ///
    /// 默认实现完整解码后丢弃，能廉价跳帧的实现应当覆盖
    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        Ok(self.next_frame()?.is_some())
    }

    /// 已知的总帧数（仅用于日志）
    fn frame_count_hint(&self) -> Option<u64> {
        None
    }
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        (**self).next_frame()
    }

    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        (**self).skip_frame()
    }

    fn frame_count_hint(&self) -> Option<u64> {
        (**self).frame_count_hint()
    }
}

/// 内存帧序列，可在指定位置注入解码失败
pub struct MemorySource {
    frames: VecDeque<RgbImage>,
    position: u64,
    fail_at: Option<u64>,
    decoded: Arc<AtomicU64>,
}

impl MemorySource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            position: 0,
            fail_at: None,
            decoded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn failing_at(mut self, index: u64) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// 已解码（含跳过）的帧计数，源被移走后仍可观察
    pub fn decoded_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.decoded)
    }
}

impl VideoSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        if self.fail_at == Some(self.position) {
            return Err(DecodeError::Corrupt {
                index: self.position,
                reason: "injected failure".to_string(),
            });
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.decoded.fetch_add(1, Ordering::SeqCst);
            self.position += 1;
        }
        Ok(frame)
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.position + self.frames.len() as u64)
    }
}

/// 宿主解码器推送的 I420 帧
pub struct RawFrameSource<I> {
    frames: I,
    position: u64,
}

impl<I> RawFrameSource<I>
where
    I: Iterator<Item = RawFrame> + Send,
{
    pub fn new(frames: I) -> Self {
        Self {
            frames,
            position: 0,
        }
    }
}

impl<I> VideoSource for RawFrameSource<I>
where
    I: Iterator<Item = RawFrame> + Send,
{
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        let Some(raw) = self.frames.next() else {
            return Ok(None);
        };
        let rgb = raw.to_rgb(self.position)?;
        self.position += 1;
        Ok(Some(rgb))
    }

    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        if self.frames.next().is_some() {
            self.position += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// 按文件名自然序排列的图片序列目录，每个文件为一帧
///
/// 数字段按数值比较，`frame_2.png` 排在 `frame_10.png` 之前，无需补零。
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && has_image_extension(p))
            .collect();
        paths.sort_by(|a, b| natural_cmp(&file_name(a), &file_name(b)));

        debug!(
            "📂 Image sequence {:?}: {} frames",
            dir.as_ref(),
            paths.len()
        );
        Ok(Self { paths, position: 0 })
    }
}

fn file_name(path: &Path) -> Cow<'_, str> {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default()
}

/// 自然序比较：连续数字作为整数比较，其余逐段按字典序
fn natural_cmp(a: &str, b: &str) -> cmp::Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        if a.is_empty() || b.is_empty() {
            return a.len().cmp(&b.len());
        }
        let (chunk_a, rest_a) = split_chunk(a);
        let (chunk_b, rest_b) = split_chunk(b);
        let ord = if is_digits(chunk_a) && is_digits(chunk_b) {
            let (trim_a, trim_b) = (chunk_a.trim_start_matches('0'), chunk_b.trim_start_matches('0'));
            trim_a
                .len()
                .cmp(&trim_b.len())
                .then_with(|| trim_a.cmp(trim_b))
                .then_with(|| chunk_a.len().cmp(&chunk_b.len()))
        } else {
            chunk_a.cmp(chunk_b)
        };
        if ord != cmp::Ordering::Equal {
            return ord;
        }
        a = rest_a;
        b = rest_b;
    }
}

fn is_digits(chunk: &str) -> bool {
    chunk.starts_with(|c: char| c.is_ascii_digit())
}

/// 切出开头的一段纯数字或纯非数字
fn split_chunk(s: &str) -> (&str, &str) {
    let digits = is_digits(s);
    let end = s
        .find(|c: char| c.is_ascii_digit() != digits)
        .unwrap_or(s.len());
    s.split_at(end)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl VideoSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };
        let index = self.position as u64;
        let img = image::open(path).map_err(|source| DecodeError::Image { index, source })?;
        self.position += 1;
        Ok(Some(img.to_rgb8()))
    }

    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        if self.position < self.paths.len() {
            self.position += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }
}

/// 根据位置标识打开视频源
///
/// - 本地目录 → 图片序列
/// - 本地文件 → ffmpeg 解码
/// - 远程地址 → 不支持（下载不在本库职责内）
pub fn open_source(location: &str, ffmpeg_path: &Path) -> Result<Box<dyn VideoSource>, PipelineError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        warn!("⚠️ Remote source rejected: {}", location);
        return Err(PipelineError::SourceUnavailable(format!(
            "remote sources must be downloaded first: {}",
            location
        )));
    }

    let path = Path::new(location);
    if path.is_dir() {
        info!("📂 Opening image sequence: {}", location);
        let source = ImageSequenceSource::open(path)
            .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {}", location, e)))?;
        return Ok(Box::new(source));
    }

    if path.is_file() {
        info!("🎞️ Opening video file via ffmpeg: {}", location);
        let source = FfmpegSource::open(path, ffmpeg_path)
            .map_err(|e| PipelineError::SourceUnavailable(format!("{}: {}", location, e)))?;
        return Ok(Box::new(source));
    }

    Err(PipelineError::SourceUnavailable(format!(
        "no such file or directory: {}",
        location
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(8, 8, Rgb([value, value, value]))
    }

    #[test]
    fn test_memory_source_counts_and_ends() {
        let mut source = MemorySource::new(vec![solid(0), solid(1)]);
        let counter = source.decoded_counter();

        assert!(source.next_frame().unwrap().is_some());
        assert!(source.skip_frame().unwrap());
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_memory_source_injected_failure() {
        let mut source = MemorySource::new(vec![solid(0), solid(1), solid(2)]).failing_at(1);

        assert!(source.next_frame().unwrap().is_some());
        assert!(matches!(
            source.next_frame(),
            Err(DecodeError::Corrupt { index: 1, .. })
        ));
    }

    #[test]
    fn test_raw_frame_source_converts_and_skips() {
        let raw = |w: u32, h: u32| RawFrame {
            width: w,
            height: h,
            y_plane: vec![100u8; (w * h) as usize],
            u_plane: vec![128u8; (w * h / 4) as usize],
            v_plane: vec![128u8; (w * h / 4) as usize],
        };
        let mut source = RawFrameSource::new(vec![raw(8, 8), raw(8, 8), raw(8, 8)].into_iter());

        assert!(source.skip_frame().unwrap());
        let rgb = source.next_frame().unwrap().unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [100, 100, 100]);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_sequence_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        solid(200).save(dir.path().join("frame_002.png")).unwrap();
        solid(10).save(dir.path().join("frame_001.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert_eq!(source.frame_count_hint(), Some(2));

        let first = source.next_frame().unwrap().unwrap();
        assert_eq!(first.get_pixel(0, 0).0, [10, 10, 10]);
        let second = source.next_frame().unwrap().unwrap();
        assert_eq!(second.get_pixel(0, 0).0, [200, 200, 200]);
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_image_sequence_natural_order() {
        let dir = tempfile::tempdir().unwrap();
        solid(10).save(dir.path().join("frame_10.png")).unwrap();
        solid(2).save(dir.path().join("frame_2.png")).unwrap();
        solid(1).save(dir.path().join("frame_1.png")).unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        let values: Vec<u8> = std::iter::from_fn(|| source.next_frame().unwrap())
            .map(|img| img.get_pixel(0, 0).0[0])
            .collect();
        assert_eq!(values, vec![1, 2, 10]);
    }

    #[test]
    fn test_natural_cmp() {
        use std::cmp::Ordering::*;
        assert_eq!(natural_cmp("frame_2.png", "frame_10.png"), Less);
        assert_eq!(natural_cmp("frame_010.png", "frame_9.png"), Greater);
        assert_eq!(natural_cmp("a1b2", "a1b2"), Equal);
        assert_eq!(natural_cmp("slide", "slide_1"), Less);
        assert_eq!(natural_cmp("b1", "a2"), Greater);
        // 数值相同时短的（补零少的）在前，保证全序
        assert_eq!(natural_cmp("f1", "f01"), Less);
    }

    #[test]
    fn test_image_sequence_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("frame_000.png"), b"definitely not png").unwrap();

        let mut source = ImageSequenceSource::open(dir.path()).unwrap();
        assert!(matches!(
            source.next_frame(),
            Err(DecodeError::Image { index: 0, .. })
        ));
    }

    #[test]
    fn test_open_source_rejects_remote() {
        let result = open_source("https://www.youtube.com/watch?v=abc", Path::new("ffmpeg"));
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    }

    #[test]
    fn test_open_source_missing_path() {
        let result = open_source("/definitely/not/here", Path::new("ffmpeg"));
        assert!(matches!(result, Err(PipelineError::SourceUnavailable(_))));
    }

    #[test]
    fn test_open_source_directory() {
        let dir = tempfile::tempdir().unwrap();
        solid(1).save(dir.path().join("a.png")).unwrap();

        let mut source = open_source(dir.path().to_str().unwrap(), Path::new("ffmpeg")).unwrap();
        assert!(source.next_frame().unwrap().is_some());
    }
}
