use super::error::DecodeError;
use image::RgbImage;
use std::sync::Arc;

/// 采样得到的帧（解码序号 + RGB 像素），创建后不可变
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub pixels: Arc<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, pixels: RgbImage) -> Self {
        Self {
            index,
            pixels: Arc::new(pixels),
        }
    }

    /// 从 RGB24 紧密排列的字节构造，长度不符时返回 None
    pub fn from_rgb(index: u64, width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, data).map(|img| Self::new(index, img))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel_count(&self) -> usize {
        (self.width() * self.height()) as usize
    }
}

/// 由宿主解码器传入的 I420 原始帧
#[derive(Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub u_plane: Vec<u8>,
    pub v_plane: Vec<u8>,
}

impl RawFrame {
    fn chroma_len(&self) -> usize {
        (self.width.div_ceil(2) * self.height.div_ceil(2)) as usize
    }

    /// YUV420 转 RGB；平面长度与尺寸不符视为损坏帧
    pub fn to_rgb(&self, index: u64) -> Result<RgbImage, DecodeError> {
        let luma_len = (self.width * self.height) as usize;
        let chroma_len = self.chroma_len();
        if self.width == 0 || self.height == 0 {
            return Err(DecodeError::Corrupt {
                index,
                reason: "zero-sized frame".to_string(),
            });
        }
        if self.y_plane.len() < luma_len
            || self.u_plane.len() < chroma_len
            || self.v_plane.len() < chroma_len
        {
            return Err(DecodeError::Corrupt {
                index,
                reason: format!(
                    "plane sizes {}/{}/{} do not fit {}x{}",
                    self.y_plane.len(),
                    self.u_plane.len(),
                    self.v_plane.len(),
                    self.width,
                    self.height
                ),
            });
        }

        let chroma_w = self.width.div_ceil(2);
        let mut rgb = Vec::with_capacity(luma_len * 3);

        for y in 0..self.height {
            for x in 0..self.width {
                let y_idx = (y * self.width + x) as usize;
                let uv_idx = ((y / 2) * chroma_w + x / 2) as usize;

                let y_val = self.y_plane[y_idx] as f32;
                let u_val = self.u_plane[uv_idx] as f32 - 128.0;
                let v_val = self.v_plane[uv_idx] as f32 - 128.0;

                rgb.push((y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8);
                rgb.push((y_val - 0.344136 * u_val - 0.714136 * v_val).clamp(0.0, 255.0) as u8);
                rgb.push((y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8);
            }
        }

        RgbImage::from_raw(self.width, self.height, rgb).ok_or_else(|| DecodeError::Corrupt {
            index,
            reason: "rgb buffer size mismatch".to_string(),
        })
    }
}
