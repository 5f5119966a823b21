use image::imageops::{self, FilterType};
use image::RgbImage;
use rustdct::{DctPlanner, TransformType2And3};
use std::fmt;
use std::sync::Arc;

/// DCT 输入网格边长
pub const HASH_GRID: usize = 32;
/// 指纹位数
pub const HASH_BITS: usize = 64;

/// 64 位感知指纹
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// 汉明距离：不同位的个数
    pub fn distance(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// pHash 计算器
///
/// 灰度 → 缩放到 32x32 → 二维 DCT-II → 取第 1..9 行、第 1..9 列的 8x8 低频块
/// （跳过第 0 行和第 0 列，直流分量随之排除）→ 与中位数比较得到各位。
/// 纯函数，无内部可变状态，可跨线程共享。
#[derive(Clone)]
pub struct PerceptualHasher {
    dct: Arc<dyn TransformType2And3<f32>>,
    low_freq: Arc<[usize]>,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        let mut planner = DctPlanner::new();
        Self {
            dct: planner.plan_dct2(HASH_GRID),
            low_freq: low_frequency_positions().into(),
        }
    }

    pub fn hash(&self, pixels: &RgbImage) -> Fingerprint {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Fingerprint(0);
        }

        let gray = imageops::grayscale(pixels);
        let small = imageops::resize(
            &gray,
            HASH_GRID as u32,
            HASH_GRID as u32,
            FilterType::Lanczos3,
        );

        let mut coeffs: Vec<f32> = small.pixels().map(|p| p.0[0] as f32).collect();
        self.dct_2d(&mut coeffs);

        let selected: Vec<f32> = self.low_freq.iter().map(|&pos| coeffs[pos]).collect();
        let median = median(&selected);

        let mut bits = 0u64;
        for (i, &c) in selected.iter().enumerate() {
            if c > median {
                bits |= 1 << i;
            }
        }
        Fingerprint(bits)
    }

    /// 行变换 → 转置 → 行变换 → 转置回原方向
    fn dct_2d(&self, data: &mut [f32]) {
        for row in data.chunks_exact_mut(HASH_GRID) {
            self.dct.process_dct2(row);
        }
        transpose(data);
        for row in data.chunks_exact_mut(HASH_GRID) {
            self.dct.process_dct2(row);
        }
        transpose(data);
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// 低频块边长
const LOW_FREQ_BLOCK: usize = 8;
const _: () = assert!(LOW_FREQ_BLOCK * LOW_FREQ_BLOCK == HASH_BITS);

/// 低频块在 32x32 系数矩阵中的下标，按行优先，第 i 个对应第 i 位
fn low_frequency_positions() -> Vec<usize> {
    (1..=LOW_FREQ_BLOCK)
        .flat_map(|r| (1..=LOW_FREQ_BLOCK).map(move |c| r * HASH_GRID + c))
        .collect()
}

fn transpose(data: &mut [f32]) {
    for r in 0..HASH_GRID {
        for c in (r + 1)..HASH_GRID {
            data.swap(r * HASH_GRID + c, c * HASH_GRID + r);
        }
    }
}

fn median(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
