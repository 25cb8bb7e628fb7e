// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! Letterbox 预处理
//!
//! 等比缩放到方形画布, 其余部分用 114 灰色填充, 并记录逆变换参数.
use std::borrow::Cow;

use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use ndarray::Array4;

/// 填充色 (YOLO 系列训练时的均值灰)
pub const PAD_VALUE: u8 = 114;

/// letterbox 正变换参数: canvas = source * scale + pad
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// 计算缩放比例、缩放后尺寸与单侧填充
    ///
    /// 返回 `(变换, new_w, new_h)`. 填充为总填充量整除 2, 奇数时右/下多 1 像素.
    pub fn compute(src_w: u32, src_h: u32, dst_w: u32, dst_h: u32) -> (Self, u32, u32) {
        let r = (dst_w as f32 / src_w as f32).min(dst_h as f32 / src_h as f32);
        let new_w = ((src_w as f32 * r).round() as u32).clamp(1, dst_w);
        let new_h = ((src_h as f32 * r).round() as u32).clamp(1, dst_h);
        let lb = Self {
            scale: r,
            pad_x: (dst_w - new_w) / 2,
            pad_y: (dst_h - new_h) / 2,
        };
        (lb, new_w, new_h)
    }

    /// 画布坐标 → 原图坐标 (未裁剪)
    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    /// 原图坐标 → 画布坐标
    #[cfg(test)]
    pub fn to_canvas(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.pad_x as f32,
            y * self.scale + self.pad_y as f32,
        )
    }
}

impl Default for Letterbox {
    fn default() -> Self {
        Self {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        }
    }
}

/// 将图片 letterbox 到 `dst_w x dst_h` 画布
pub fn letterbox(image: &RgbImage, dst_w: u32, dst_h: u32) -> (RgbImage, Letterbox) {
    let (lb, new_w, new_h) = Letterbox::compute(image.width(), image.height(), dst_w, dst_h);

    let mut canvas = RgbImage::from_pixel(dst_w, dst_h, Rgb([PAD_VALUE; 3]));
    if (new_w, new_h) == image.dimensions() {
        image::imageops::replace(&mut canvas, image, lb.pad_x as i64, lb.pad_y as i64);
    } else {
        let resized = image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
        image::imageops::replace(&mut canvas, &resized, lb.pad_x as i64, lb.pad_y as i64);
    }
    (canvas, lb)
}

/// 宽度超过上限时等比缩小 (只缩小不放大)
pub fn cap_width(image: &RgbImage, max_width: u32) -> Cow<'_, RgbImage> {
    let (w, h) = image.dimensions();
    if w <= max_width {
        return Cow::Borrowed(image);
    }
    let scale = max_width as f32 / w as f32;
    let new_w = ((w as f32 * scale) as u32).max(1);
    let new_h = ((h as f32 * scale) as u32).max(1);
    Cow::Owned(image::imageops::resize(
        image,
        new_w,
        new_h,
        FilterType::Triangle,
    ))
}

/// HWC u8 → NCHW f32 (归一化到 0-1)
pub fn to_nchw(image: &RgbImage) -> Array4<f32> {
    let (w, h) = image.dimensions();
    let mut ys = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, rgb) in image.enumerate_pixels() {
        let x = x as usize;
        let y = y as usize;
        let [r, g, b] = rgb.0;
        ys[[0, 0, y, x]] = (r as f32) / 255.0;
        ys[[0, 1, y, x]] = (g as f32) / 255.0;
        ys[[0, 2, y, x]] = (b as f32) / 255.0;
    }
    ys
}
