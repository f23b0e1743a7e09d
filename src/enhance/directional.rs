// 该文件是 Mailuo （脉络） 项目的一部分。
// src/enhance/directional.rs - 方向滤波器组
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

use super::kernel::{FloatPlane, correlate};

pub const ORIENTED_KERNEL_SIZE: usize = 15;
const CORE_HALF_WIDTH: f32 = 2.0;
const CORE_HALF_LENGTH: f32 = 8.0;
const SURROUND_HALF_WIDTH: f32 = 4.0;
const CORE_WEIGHT: f32 = 1.0;
const SURROUND_WEIGHT: f32 = -0.5;

/// 一组取向线检测核，逐像素保留最强响应
#[derive(Debug, Clone)]
pub struct DirectionalFilterBank {
  kernels: Vec<Vec<f32>>,
}

impl DirectionalFilterBank {
  /// `angles` 以度为单位
  pub fn new(angles: &[f32]) -> Self {
    Self {
      kernels: angles.iter().map(|&a| oriented_line_kernel(a)).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.kernels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.kernels.is_empty()
  }

  pub fn max_oriented_response(&self, image: &GrayImage) -> GrayImage {
    let plane = FloatPlane::from_gray(image);
    let mut response = FloatPlane::zeros(plane.width(), plane.height());
    for kernel in &self.kernels {
      let r = correlate(&plane, kernel, ORIENTED_KERNEL_SIZE, ORIENTED_KERNEL_SIZE).map(f32::abs);
      response.max_assign(&r);
    }
    response.to_gray_saturating()
  }
}

/// 15x15 取向线核：中心细带 +1，外围抑制带 -0.5，按绝对值之和归一化
pub fn oriented_line_kernel(angle_deg: f32) -> Vec<f32> {
  let (sin, cos) = angle_deg.to_radians().sin_cos();
  let center = (ORIENTED_KERNEL_SIZE / 2) as f32;
  let mut kernel = vec![0.0f32; ORIENTED_KERNEL_SIZE * ORIENTED_KERNEL_SIZE];

  for row in 0..ORIENTED_KERNEL_SIZE {
    for col in 0..ORIENTED_KERNEL_SIZE {
      let dx = col as f32 - center;
      let dy = row as f32 - center;
      let along = dx * cos + dy * sin;
      let perp = -dx * sin + dy * cos;

      kernel[row * ORIENTED_KERNEL_SIZE + col] =
        if perp.abs() < CORE_HALF_WIDTH && along.abs() < CORE_HALF_LENGTH {
          CORE_WEIGHT
        } else if perp.abs() < SURROUND_HALF_WIDTH {
          SURROUND_WEIGHT
        } else {
          0.0
        };
    }
  }

  let l1: f32 = kernel.iter().map(|k| k.abs()).sum();
  if l1 > 0.0 {
    kernel.iter_mut().for_each(|k| *k /= l1);
  }
  kernel
}
