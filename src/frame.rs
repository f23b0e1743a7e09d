// 该文件是 Mailuo （脉络） 项目的一部分。
// src/frame.rs - 灰度 / RGB 帧定义
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

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

const GRAY_CHANNELS: usize = 1;
const RGB_CHANNELS: usize = 3;

/// 流水线中的一帧，8 位单通道或三通道
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
  Gray(GrayImage),
  Rgb(RgbImage),
}

impl Frame {
  pub fn width(&self) -> usize {
    match self {
      Frame::Gray(img) => img.width() as usize,
      Frame::Rgb(img) => img.width() as usize,
    }
  }

  pub fn height(&self) -> usize {
    match self {
      Frame::Gray(img) => img.height() as usize,
      Frame::Rgb(img) => img.height() as usize,
    }
  }

  pub fn channels(&self) -> usize {
    match self {
      Frame::Gray(_) => GRAY_CHANNELS,
      Frame::Rgb(_) => RGB_CHANNELS,
    }
  }

  pub fn is_empty(&self) -> bool {
    self.width() == 0 || self.height() == 0
  }

  pub fn to_gray(&self) -> GrayImage {
    match self {
      Frame::Gray(img) => img.clone(),
      Frame::Rgb(img) => rgb_to_gray(img),
    }
  }

  /// 将处理后的灰度图恢复为与本帧相同的通道数
  pub fn restore_channels(&self, gray: GrayImage) -> Frame {
    match self {
      Frame::Gray(_) => Frame::Gray(gray),
      Frame::Rgb(_) => Frame::Rgb(gray_to_rgb(&gray)),
    }
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    match self {
      Frame::Gray(img) => gray_to_rgb(img),
      Frame::Rgb(img) => img.clone(),
    }
  }
}

impl From<GrayImage> for Frame {
  fn from(image: GrayImage) -> Self {
    Frame::Gray(image)
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    Frame::Rgb(image)
  }
}

impl From<DynamicImage> for Frame {
  fn from(image: DynamicImage) -> Self {
    match image {
      DynamicImage::ImageLuma8(img) => Frame::Gray(img),
      DynamicImage::ImageRgb8(img) => Frame::Rgb(img),
      other if other.color().has_color() => Frame::Rgb(other.to_rgb8()),
      other => Frame::Gray(other.to_luma8()),
    }
  }
}

/// ITU-R BT.601 亮度，14 位定点
pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
  GrayImage::from_fn(image.width(), image.height(), |x, y| {
    let Rgb([r, g, b]) = *image.get_pixel(x, y);
    let y = (r as u32 * 4899 + g as u32 * 9617 + b as u32 * 1868 + 8192) >> 14;
    Luma([y.min(255) as u8])
  })
}

pub fn gray_to_rgb(image: &GrayImage) -> RgbImage {
  RgbImage::from_fn(image.width(), image.height(), |x, y| {
    let v = image.get_pixel(x, y)[0];
    Rgb([v, v, v])
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn gray_conversion_weights() {
    let img = RgbImage::from_fn(3, 1, |x, _| match x {
      0 => Rgb([255, 0, 0]),
      1 => Rgb([0, 255, 0]),
      _ => Rgb([0, 0, 255]),
    });
    let gray = rgb_to_gray(&img);
    assert_eq!(gray.as_raw(), &vec![76, 150, 29]);
  }

  #[test]
  fn white_stays_white() {
    let img = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
    assert!(rgb_to_gray(&img).iter().all(|&v| v == 255));
  }

  #[test]
  fn restore_keeps_channel_count() {
    let rgb = Frame::from(RgbImage::new(4, 3));
    let gray = rgb.to_gray();
    let restored = rgb.restore_channels(gray);
    assert_eq!(restored.channels(), 3);
    assert_eq!((restored.width(), restored.height()), (4, 3));

    let gray_frame = Frame::from(GrayImage::new(4, 3));
    assert_eq!(gray_frame.restore_channels(GrayImage::new(4, 3)).channels(), 1);
  }

  #[test]
  fn zero_sized_frame_is_empty() {
    assert!(Frame::from(GrayImage::new(0, 5)).is_empty());
    assert!(!Frame::from(GrayImage::new(1, 1)).is_empty());
  }
}
