// 该文件是 Mailuo （脉络） 项目的一部分。
// src/enhance/clahe.rs - 限制对比度自适应直方图均衡
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

use image::GrayImage;

use super::{FilterError, kernel::reflect_101};

const HIST_SIZE: usize = 256;

/// 对灰度图执行 CLAHE
///
/// 图像尺寸不能被网格整除时，按 reflect-101 在右侧与下方虚拟补齐，
/// 保证每个分块大小一致。各分块直方图在 `max(1, clip_limit * 面积 / 256)`
/// 处截断，超出部分均匀回填；最终结果由相邻四个分块的查找表双线性插值得到。
pub fn clahe(
  image: &GrayImage,
  clip_limit: f32,
  tiles_x: usize,
  tiles_y: usize,
) -> Result<GrayImage, FilterError> {
  if tiles_x == 0 || tiles_y == 0 {
    return Err(FilterError::InvalidParameter(format!(
      "CLAHE 网格尺寸必须大于 0: {}x{}",
      tiles_x, tiles_y
    )));
  }
  if !clip_limit.is_finite() {
    return Err(FilterError::InvalidParameter(format!(
      "CLAHE 截断阈值无效: {}",
      clip_limit
    )));
  }

  let (width, height) = (image.width() as usize, image.height() as usize);
  if width == 0 || height == 0 {
    return Err(FilterError::EmptyImage);
  }

  let padded_w = width + (tiles_x - width % tiles_x) % tiles_x;
  let padded_h = height + (tiles_y - height % tiles_y) % tiles_y;
  let tile_w = padded_w / tiles_x;
  let tile_h = padded_h / tiles_y;
  let tile_area = tile_w * tile_h;

  let clip = if clip_limit > 0.0 {
    ((clip_limit * tile_area as f32 / HIST_SIZE as f32) as usize).max(1)
  } else {
    0
  };
  let lut_scale = 255.0 / tile_area as f32;
  let src = image.as_raw();

  let mut luts = vec![[0u8; HIST_SIZE]; tiles_x * tiles_y];
  for ty in 0..tiles_y {
    for tx in 0..tiles_x {
      let mut hist = [0usize; HIST_SIZE];
      for py in ty * tile_h..(ty + 1) * tile_h {
        let sy = reflect_101(py as isize, height);
        for px in tx * tile_w..(tx + 1) * tile_w {
          let sx = reflect_101(px as isize, width);
          hist[src[sy * width + sx] as usize] += 1;
        }
      }

      if clip > 0 {
        clip_histogram(&mut hist, clip);
      }

      let lut = &mut luts[ty * tiles_x + tx];
      let mut sum = 0usize;
      for (i, &count) in hist.iter().enumerate() {
        sum += count;
        lut[i] = (sum as f32 * lut_scale).round().clamp(0.0, 255.0) as u8;
      }
    }
  }

  let inv_tw = 1.0 / tile_w as f32;
  let inv_th = 1.0 / tile_h as f32;
  let mut out = GrayImage::new(width as u32, height as u32);
  let dst: &mut [u8] = &mut out;

  for y in 0..height {
    let tyf = y as f32 * inv_th - 0.5;
    let ty1 = tyf.floor() as isize;
    let ya = tyf - ty1 as f32;
    let ty2 = ((ty1 + 1) as usize).min(tiles_y - 1);
    let ty1 = ty1.max(0) as usize;

    for x in 0..width {
      let txf = x as f32 * inv_tw - 0.5;
      let tx1 = txf.floor() as isize;
      let xa = txf - tx1 as f32;
      let tx2 = ((tx1 + 1) as usize).min(tiles_x - 1);
      let tx1 = tx1.max(0) as usize;

      let v = src[y * width + x] as usize;
      let l11 = luts[ty1 * tiles_x + tx1][v] as f32;
      let l12 = luts[ty1 * tiles_x + tx2][v] as f32;
      let l21 = luts[ty2 * tiles_x + tx1][v] as f32;
      let l22 = luts[ty2 * tiles_x + tx2][v] as f32;

      let res = (l11 * (1.0 - xa) + l12 * xa) * (1.0 - ya) + (l21 * (1.0 - xa) + l22 * xa) * ya;
      dst[y * width + x] = res.round().clamp(0.0, 255.0) as u8;
    }
  }

  Ok(out)
}

/// 截断直方图并把多余计数回填到所有灰度级
fn clip_histogram(hist: &mut [usize; HIST_SIZE], clip: usize) {
  let mut clipped = 0usize;
  for count in hist.iter_mut() {
    if *count > clip {
      clipped += *count - clip;
      *count = clip;
    }
  }

  let batch = clipped / HIST_SIZE;
  let mut residual = clipped - batch * HIST_SIZE;
  for count in hist.iter_mut() {
    *count += batch;
  }

  if residual != 0 {
    let step = (HIST_SIZE / residual).max(1);
    let mut i = 0;
    while i < HIST_SIZE && residual > 0 {
      hist[i] += 1;
      residual -= 1;
      i += step;
    }
  }
}
