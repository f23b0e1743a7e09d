// 该文件是 Mailuo （脉络） 项目的一部分。
// tests/common/mod.rs - 集成测试共用的合成图像
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

#![allow(dead_code)]

use image::{GrayImage, Luma, Rgb, RgbImage};

use mailuo::postprocess::{BoundingBox, Detection};

/// 明亮背景上的一条竖直暗静脉与一条斜向暗静脉，带轻微纹理
pub fn synthetic_vein(width: u32, height: u32) -> GrayImage {
  GrayImage::from_fn(width, height, |x, y| {
    let texture = ((x * 7 + y * 13) % 11) as i32 - 5;
    let mut value = 170 + texture;
    if x.abs_diff(width / 3) <= 1 {
      value -= 60;
    }
    if (x as i32 - y as i32 - (width as i32 / 4)).abs() <= 1 {
      value -= 45;
    }
    Luma([value.clamp(0, 255) as u8])
  })
}

pub fn synthetic_vein_rgb(width: u32, height: u32) -> RgbImage {
  let gray = synthetic_vein(width, height);
  RgbImage::from_fn(width, height, |x, y| {
    let v = gray.get_pixel(x, y)[0];
    Rgb([v, v.saturating_sub(10), v.saturating_add(5)])
  })
}

pub fn detection(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Detection {
  Detection {
    bbox: BoundingBox::new(x, y, w, h),
    confidence,
    class_id: 0,
    class_name: "vein".to_string(),
  }
}

/// 确定性的伪随机检测集合
pub fn scattered_detections(count: usize, seed: u64) -> Vec<Detection> {
  let mut state = seed;
  let mut next = move || {
    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    ((state >> 33) as f32) / ((1u64 << 31) as f32)
  };
  (0..count)
    .map(|_| {
      let x = next() * 200.0;
      let y = next() * 200.0;
      let w = 5.0 + next() * 60.0;
      let h = 5.0 + next() * 60.0;
      detection(x, y, w, h, next())
    })
    .collect()
}
