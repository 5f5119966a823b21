use super::error::ExtractionError;
use image::{ImageOutputFormat, RgbImage};
use log::{debug, error};
use std::io::{Cursor, ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 幻灯片文字提取能力（OCR 等），实现需可跨线程并发调用
pub trait TextExtractor: Send + Sync {
    fn extract(&self, image: &RgbImage) -> Result<String, ExtractionError>;
}

type Responder = Box<dyn Fn(&RgbImage) -> Result<String, ExtractionError> + Send + Sync>;

pub struct MockTextExtractor {
    responder: Responder,
    calls: AtomicUsize,
}

impl MockTextExtractor {
    pub fn with_text(text: &str) -> Self {
        let text = text.to_string();
        Self::with_fn(move |_| Ok(text.clone()))
    }

    pub fn with_fn<F>(responder: F) -> Self
    where
        F: Fn(&RgbImage) -> Result<String, ExtractionError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockTextExtractor {
    fn default() -> Self {
        Self::with_text("")
    }
}

impl TextExtractor for MockTextExtractor {
    fn extract(&self, image: &RgbImage) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(image)
    }
}

/// 调用 tesseract 命令行识别文字
///
/// 可执行文件路径与语言在构造时显式传入；图片以内存 PNG 经 stdin 传递，不写临时文件。
/// 输出会去掉首尾空白。
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    binary: PathBuf,
    language: String,
}

impl TesseractExtractor {
    pub fn new(binary: impl Into<PathBuf>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    fn encode_png(image: &RgbImage) -> Result<Vec<u8>, ExtractionError> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageOutputFormat::Png)?;
        Ok(buffer.into_inner())
    }
}

/// EMFILE / ENFILE：进程或系统的文件描述符耗尽
#[cfg(unix)]
const FD_EXHAUSTED: &[i32] = &[24, 23];
#[cfg(not(unix))]
const FD_EXHAUSTED: &[i32] = &[];

/// 无法启动引擎本身（缺失、无权限、内存/描述符/进程数耗尽）时，后续幻灯片也必然失败
fn spawn_error_is_fatal(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::NotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::OutOfMemory
            | ErrorKind::WouldBlock
    ) || e.raw_os_error().is_some_and(|code| FD_EXHAUSTED.contains(&code))
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl TextExtractor for TesseractExtractor {
    fn extract(&self, image: &RgbImage) -> Result<String, ExtractionError> {
        let png = Self::encode_png(image)?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                error!("❌ Cannot start tesseract at {:?}: {}", self.binary, e);
                if spawn_error_is_fatal(&e) {
                    ExtractionError::ResourceExhausted(format!(
                        "tesseract unavailable at {:?}: {}",
                        self.binary, e
                    ))
                } else {
                    ExtractionError::Io(e)
                }
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExtractionError::Failed("tesseract stdin missing".to_string()))?;
        // 单独线程写入，避免与 stdout 读取互相阻塞
        let writer = std::thread::spawn(move || stdin.write_all(&png));

        let output = child.wait_with_output()?;
        let written = writer
            .join()
            .map_err(|_| ExtractionError::Failed("stdin writer panicked".to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        written?;

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("📝 tesseract returned {} chars", text.len());
        Ok(text)
    }
}
