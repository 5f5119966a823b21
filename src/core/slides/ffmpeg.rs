//! ffmpeg 管道解码：rgb24 原始帧从 stdout 流式读取，不落盘

use super::error::DecodeError;
use super::source::VideoSource;
use image::RgbImage;
use log::{debug, info, warn};
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

pub struct FfmpegSource {
    child: Child,
    reader: BufReader<ChildStdout>,
    width: u32,
    height: u32,
    buf: Vec<u8>,
    position: u64,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(video: &Path, ffmpeg_path: &Path) -> io::Result<Self> {
        let probe = Command::new(ffmpeg_path)
            .arg("-hide_banner")
            .arg("-i")
            .arg(video)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()?;
        let banner = String::from_utf8_lossy(&probe.stderr);
        let (width, height) = parse_video_dimensions(&banner).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                "cannot determine video dimensions",
            )
        })?;
        info!("🎞️ ffmpeg probe: {}x{}", width, height);

        // 横幅中的尺寸是未旋转的存储尺寸，解码时同样关闭自动旋转
        let mut child = Command::new(ffmpeg_path)
            .args(["-v", "error", "-noautorotate", "-i"])
            .arg(video)
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-an", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "ffmpeg stdout missing"))?;

        let frame_size = width as usize * height as usize * 3;
        Ok(Self {
            child,
            reader: BufReader::with_capacity(frame_size.max(64 * 1024), stdout),
            width,
            height,
            buf: vec![0u8; frame_size],
            position: 0,
            finished: false,
        })
    }

    /// 读满一帧；返回 false 表示干净的流结束
    fn read_frame(&mut self) -> Result<bool, DecodeError> {
        if self.finished {
            return Ok(false);
        }

        let expected = self.buf.len();
        let mut filled = 0;
        while filled < expected {
            match self.reader.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(DecodeError::Io(e)),
            }
        }

        if filled == 0 {
            self.finished = true;
            let status = self.child.wait()?;
            if !status.success() {
                return Err(DecodeError::Corrupt {
                    index: self.position,
                    reason: format!("ffmpeg exited with {}", status),
                });
            }
            debug!("🏁 ffmpeg stream ended after {} frames", self.position);
            return Ok(false);
        }
        if filled < expected {
            self.finished = true;
            return Err(DecodeError::Truncated {
                index: self.position,
                got: filled,
                expected,
            });
        }

        self.position += 1;
        Ok(true)
    }
}

impl VideoSource for FfmpegSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>, DecodeError> {
        let index = self.position;
        if !self.read_frame()? {
            return Ok(None);
        }
        RgbImage::from_raw(self.width, self.height, self.buf.clone())
            .map(Some)
            .ok_or_else(|| DecodeError::Corrupt {
                index,
                reason: "frame buffer size mismatch".to_string(),
            })
    }

    fn skip_frame(&mut self) -> Result<bool, DecodeError> {
        self.read_frame()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.child.kill() {
                warn!("⚠️ Failed to stop ffmpeg: {}", e);
            }
        }
        let _ = self.child.wait();
        debug!("🗑️ FfmpegSource: released after {} frames", self.position);
    }
}

/// 从 ffmpeg 横幅的 `Video:` 行解析 `WxH`
pub fn parse_video_dimensions(banner: &str) -> Option<(u32, u32)> {
    banner
        .lines()
        .filter(|line| line.contains("Video:"))
        .flat_map(|line| line.split(|c: char| c.is_whitespace() || c == ','))
        .filter(|token| !token.starts_with("0x"))
        .find_map(|token| {
            let (w, h) = token.split_once('x')?;
            let w: u32 = w.parse().ok()?;
            let h: u32 = h.parse().ok()?;
            (w > 0 && h > 0).then_some((w, h))
        })
}
