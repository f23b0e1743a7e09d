// 该文件是 Mailuo （脉络） 项目的一部分。
// src/enhance/tophat.rs - 多尺度白顶帽变换
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Mailuo Contributors

use image::{GrayImage, Luma};
use imageproc::morphology::{Mask, grayscale_open};

use super::kernel::FloatPlane;

/// 掩码边长上限
pub const MAX_ELEMENT_SIZE: usize = 511;

/// 椭圆结构元素，按行存储掩码
#[derive(Debug, Clone, PartialEq)]
pub struct StructuringElement {
  size: usize,
  offsets: Vec<(isize, isize)>,
}

impl StructuringElement {
  /// 与常见的 `MORPH_ELLIPSE` 栅格化方式一致
  pub fn ellipse(size: usize) -> Self {
    let size = size.clamp(1, MAX_ELEMENT_SIZE);
    let r = (size / 2) as isize;
    let c = (size / 2) as isize;
    let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };
    let mut offsets = Vec::new();

    for i in 0..size as isize {
      let dy = i - r;
      let (j1, j2) = if dy.abs() <= r {
        let dx = (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round() as isize;
        ((c - dx).max(0), (c + dx + 1).min(size as isize))
      } else {
        (0, 0)
      };
      for j in j1..j2 {
        offsets.push((j - c, dy));
      }
    }

    Self { size, offsets }
  }

  pub fn size(&self) -> usize {
    self.size
  }

  pub fn contains(&self, dx: isize, dy: isize) -> bool {
    self.offsets.contains(&(dx, dy))
  }

  /// 栅格化为以中心为锚点的形态学掩码
  pub fn to_mask(&self) -> Mask {
    let side = self.size as u32;
    let anchor = (self.size / 2) as isize;
    let mut image = GrayImage::new(side, side);
    for &(dx, dy) in &self.offsets {
      image.put_pixel((dx + anchor) as u32, (dy + anchor) as u32, Luma([255]));
    }
    Mask::from_image(&image, anchor as u8, anchor as u8)
  }
}

/// 白顶帽：原图减去开运算结果
///
/// 开运算中落在图像外的邻域像素不参与取极值。
pub fn white_tophat(image: &GrayImage, mask: &Mask) -> GrayImage {
  let opened = grayscale_open(image, mask);
  let mut out = image.clone();
  for (o, &p) in out.iter_mut().zip(opened.iter()) {
    *o = o.saturating_sub(p);
  }
  out
}

#[derive(Debug, Clone)]
pub struct TopHatEnhancer {
  masks: Vec<Mask>,
}

impl TopHatEnhancer {
  pub fn new(kernel_sizes: &[usize]) -> Self {
    Self {
      masks: kernel_sizes
        .iter()
        .map(|&k| StructuringElement::ellipse(k).to_mask())
        .collect(),
    }
  }

  /// 各尺寸顶帽响应的算术平均
  pub fn tophat(&self, image: &GrayImage) -> GrayImage {
    if self.masks.is_empty() {
      return GrayImage::new(image.width(), image.height());
    }

    let mut acc = FloatPlane::zeros(image.width() as usize, image.height() as usize);
    for mask in &self.masks {
      acc.add_assign(&FloatPlane::from_gray(&white_tophat(image, mask)));
    }
    let n = self.masks.len() as f32;
    acc.map(|v| v / n).to_gray_saturating()
  }
}
