// 该文件是 Mailuo （脉络） 项目的一部分。
// src/enhance/bilateral.rs - 双边滤波
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
use imageproc::filter::{bilateral::GaussianEuclideanColorDistance, bilateral_filter as bilateral};

use super::FilterError;

/// 双边滤波：空间距离与灰度差共同决定邻域权重
///
/// 窗口半径取 `diameter / 2`，`diameter <= 0` 时取 `round(1.5 * sigma_space)`。
pub fn bilateral_filter(
  image: &GrayImage,
  diameter: i32,
  sigma_color: f32,
  sigma_space: f32,
) -> Result<GrayImage, FilterError> {
  if !(sigma_color > 0.0 && sigma_color.is_finite()) || !(sigma_space > 0.0 && sigma_space.is_finite()) {
    return Err(FilterError::InvalidParameter(format!(
      "双边滤波标准差必须为正数: color={}, space={}",
      sigma_color, sigma_space
    )));
  }
  if image.width() == 0 || image.height() == 0 {
    return Err(FilterError::EmptyImage);
  }

  let radius = if diameter <= 0 {
    (sigma_space * 1.5).round() as i64
  } else {
    i64::from(diameter / 2)
  }
  .max(1);
  let radius = u8::try_from(radius)
    .map_err(|_| FilterError::InvalidParameter(format!("双边滤波半径过大: {}", radius)))?;

  Ok(bilateral(
    image,
    radius,
    sigma_space,
    GaussianEuclideanColorDistance::new(sigma_color),
  ))
}
