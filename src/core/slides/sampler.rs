use super::error::{ConfigError, DecodeError};
use super::frame::Frame;
use super::source::VideoSource;
use log::{debug, trace};

/// 固定间隔采样器
///
/// 惰性、只进：第 k 个产出帧对应解码位置 `k * interval`。
/// 流结束时迭代器返回 `None`；解码失败产出一次 `Err` 后熔断。
pub struct FrameSampler<S> {
    source: S,
    interval: u64,
    position: u64,
    decoded: u64,
    last_sampled: Option<u64>,
    exhausted: bool,
    failed: bool,
}

impl<S: VideoSource> FrameSampler<S> {
    pub fn new(source: S, interval: u32) -> Result<Self, ConfigError> {
        if interval == 0 {
            return Err(ConfigError::InvalidInterval(interval));
        }
        Ok(Self {
            source,
            interval: interval as u64,
            position: 0,
            decoded: 0,
            last_sampled: None,
            exhausted: false,
            failed: false,
        })
    }

    /// 是否已正常读到流尾
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// 已从源读取（含跳过）的帧数
    pub fn decoded_count(&self) -> u64 {
        self.decoded
    }

    /// 最近一次成功采样的原始帧序号
    pub fn last_sampled_index(&self) -> Option<u64> {
        self.last_sampled
    }

    fn fail(&mut self, err: DecodeError) -> Option<Result<Frame, DecodeError>> {
        debug!(
            "💥 Decode failed at position {} (last sampled {:?})",
            self.position, self.last_sampled
        );
        self.failed = true;
        Some(Err(err))
    }
}

impl<S: VideoSource> Iterator for FrameSampler<S> {
    type Item = Result<Frame, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted || self.failed {
            return None;
        }

        // 跳过两个采样点之间的帧
        while self.position % self.interval != 0 {
            match self.source.skip_frame() {
                Ok(true) => {
                    self.position += 1;
                    self.decoded += 1;
                }
                Ok(false) => {
                    self.exhausted = true;
                    debug!("🏁 Source exhausted after {} frames", self.decoded);
                    return None;
                }
                Err(e) => return self.fail(e),
            }
        }

        match self.source.next_frame() {
            Ok(Some(pixels)) => {
                let frame = Frame::new(self.position, pixels);
                trace!("🎯 Sampled frame {}", self.position);
                self.last_sampled = Some(self.position);
                self.position += 1;
                self.decoded += 1;
                Some(Ok(frame))
            }
            Ok(None) => {
                self.exhausted = true;
                debug!("🏁 Source exhausted after {} frames", self.decoded);
                None
            }
            Err(e) => self.fail(e),
        }
    }
}

impl<S: VideoSource> std::iter::FusedIterator for FrameSampler<S> {}
