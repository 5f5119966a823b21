use super::frame::Frame;
use super::hasher::{Fingerprint, PerceptualHasher};
use image::RgbImage;
use log::{debug, info};
use rayon::prelude::*;
use std::sync::Arc;

/// 保留下来的幻灯片，`order` 为其原始帧序号
#[derive(Debug, Clone)]
pub struct Slide {
    pub order: u64,
    pub pixels: Arc<RgbImage>,
    pub fingerprint: Fingerprint,
}

/// 已接受指纹集合 - 只追加，从不裁剪
///
/// 成员判定与遍历顺序无关：候选与集合中**每一个**指纹的距离都大于阈值才算新内容。
#[derive(Debug, Default)]
pub struct FingerprintSet {
    entries: Vec<(u64, Fingerprint)>,
}

impl FingerprintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, order: u64, fingerprint: Fingerprint) {
        self.entries.push((order, fingerprint));
    }

    /// 与集合中所有指纹的距离是否都严格大于 `threshold`（空集恒为真）
    pub fn is_distinct(&self, fingerprint: Fingerprint, threshold: u32) -> bool {
        self.entries
            .iter()
            .all(|&(_, fp)| fp.distance(fingerprint) > threshold)
    }

    /// 距离最近的已接受条目 (order, distance)
    pub fn nearest(&self, fingerprint: Fingerprint) -> Option<(u64, u32)> {
        self.entries
            .iter()
            .map(|&(order, fp)| (order, fp.distance(fingerprint)))
            .min_by_key(|&(order, dist)| (dist, order))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 去重决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupDecision {
    /// 第一帧，无条件保留
    First,
    /// 与所有已保留幻灯片都不相似，保留
    Distinct { nearest_distance: u32 },
    /// 与某张已保留幻灯片过于相似，丢弃
    Duplicate { of: u64, distance: u32 },
}

/// 贪心在线去重器
pub struct SlideDeduplicator {
    hasher: PerceptualHasher,
    threshold: u32,
    accepted: FingerprintSet,
    last_order: Option<u64>,
    seen: u64,
}

impl SlideDeduplicator {
    pub fn new(threshold: u32) -> Self {
        Self::with_hasher(PerceptualHasher::new(), threshold)
    }

    pub fn with_hasher(hasher: PerceptualHasher, threshold: u32) -> Self {
        Self {
            hasher,
            threshold,
            accepted: FingerprintSet::new(),
            last_order: None,
            seen: 0,
        }
    }

    /// 仅做判定，不修改状态
    pub fn decide(&self, fingerprint: Fingerprint) -> DedupDecision {
        match self.accepted.nearest(fingerprint) {
            None => DedupDecision::First,
            Some((of, distance)) if !self.accepted.is_distinct(fingerprint, self.threshold) => {
                DedupDecision::Duplicate { of, distance }
            }
            Some((_, nearest_distance)) => DedupDecision::Distinct { nearest_distance },
        }
    }

    /// 对已计算好指纹的帧做判定；帧必须按原始顺序到达
    pub fn observe_hashed(&mut self, frame: Frame, fingerprint: Fingerprint) -> Option<Slide> {
        debug_assert!(
            self.last_order.map_or(true, |last| frame.index > last),
            "frames must arrive in decode order"
        );
        self.last_order = Some(frame.index);
        self.seen += 1;

        let decision = self.decide(fingerprint);
        match decision {
            DedupDecision::Duplicate { of, distance } => {
                debug!(
                    "🔁 Frame {} duplicates slide {} (distance {})",
                    frame.index, of, distance
                );
                None
            }
            _ => {
                self.accepted.insert(frame.index, fingerprint);
                info!(
                    "🆕 Slide #{} from frame {} ({:?}, fp {})",
                    self.accepted.len(),
                    frame.index,
                    decision,
                    fingerprint
                );
                Some(Slide {
                    order: frame.index,
                    pixels: frame.pixels,
                    fingerprint,
                })
            }
        }
    }

    pub fn observe(&mut self, frame: Frame) -> Option<Slide> {
        let fingerprint = self.hasher.hash(&frame.pixels);
        self.observe_hashed(frame, fingerprint)
    }

    /// 批处理：并行计算指纹，再按原始顺序逐帧判定
    pub fn observe_batch(&mut self, frames: Vec<Frame>) -> Vec<Slide> {
        let hasher = &self.hasher;
        let hashed: Vec<(Frame, Fingerprint)> = frames
            .into_par_iter()
            .map(|frame| {
                let fp = hasher.hash(&frame.pixels);
                (frame, fp)
            })
            .collect();

        hashed
            .into_iter()
            .filter_map(|(frame, fp)| self.observe_hashed(frame, fp))
            .collect()
    }

    pub fn seen_count(&self) -> u64 {
        self.seen
    }
}
