// 该文件是 Mailuo （脉络） 项目的一部分。
// src/enhance/ridge.rs - 多尺度血管脊线增强
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

//! 基于 Hessian 特征值的 Frangi 血管度量。
//!
//! 每个尺度 σ 的响应都落在 `[0, 1]`，多尺度结果取逐像素最大值。
//! Hessian 检测器在某个尺度失败（或被关闭）时，该尺度退化为
//! 高斯模糊后的拉普拉斯绝对值，按最大值归一化。

use image::GrayImage;
use tracing::{debug, warn};

use super::{
  Filtered, FilterError,
  kernel::{FloatPlane, gaussian_blur, gaussian_ksize, gradient_x, gradient_y, laplacian_3x3},
};
use crate::config::RidgeParams;

/// 图像最小边长，Hessian 需要至少三个像素做二阶差分
const MIN_HESSIAN_EXTENT: usize = 3;
const EIGEN_EPSILON: f32 = 1e-10;

#[derive(Debug, Clone)]
pub struct VesselRidgeEnhancer {
  params: RidgeParams,
}

impl VesselRidgeEnhancer {
  pub fn new(params: RidgeParams) -> Self {
    Self { params }
  }

  pub fn params(&self) -> &RidgeParams {
    &self.params
  }

  /// 多尺度脊线响应，缩放到 [0, 255]。永不失败。
  pub fn ridge_response(&self, image: &GrayImage, sigma_set: &[f32]) -> GrayImage {
    self
      .ridge_response_normalized(image, sigma_set)
      .map(|v| v * 255.0)
      .to_gray_saturating()
  }

  /// 多尺度脊线响应，保持在 [0, 1]
  pub fn ridge_response_normalized(&self, image: &GrayImage, sigma_set: &[f32]) -> FloatPlane {
    let plane = FloatPlane::from_gray_scaled(image, 1.0 / 255.0);
    let mut response = FloatPlane::zeros(plane.width(), plane.height());

    for &sigma in sigma_set {
      match self.scale_response(&plane, sigma) {
        Filtered::Primary(r) => response.max_assign(&r),
        Filtered::Fallback(r, reason) => {
          warn!("尺度 σ={} 的 Hessian 响应不可用，改用拉普拉斯回退: {}", sigma, reason);
          response.max_assign(&r);
        }
      }
    }

    response
  }

  /// 严格版本：任一尺度失败即返回错误，由调用方决定回退方式
  pub fn try_ridge_response_normalized(
    &self,
    image: &GrayImage,
    sigma_set: &[f32],
  ) -> Result<FloatPlane, FilterError> {
    if !self.params.use_hessian {
      return Err(FilterError::Unavailable("Hessian 脊线检测已关闭"));
    }
    if sigma_set.is_empty() {
      return Err(FilterError::InvalidParameter("尺度集合为空".to_string()));
    }

    let plane = FloatPlane::from_gray_scaled(image, 1.0 / 255.0);
    let mut response = FloatPlane::zeros(plane.width(), plane.height());
    for &sigma in sigma_set {
      let r = frangi_scale(&plane, sigma, &self.params)?;
      response.max_assign(&r);
    }
    Ok(response)
  }

  fn scale_response(&self, plane: &FloatPlane, sigma: f32) -> Filtered<FloatPlane> {
    if !self.params.use_hessian {
      let fallback = laplacian_scale(plane, sigma);
      return Filtered::Fallback(fallback, FilterError::Unavailable("Hessian 脊线检测已关闭"));
    }

    match frangi_scale(plane, sigma, &self.params) {
      Ok(r) => Filtered::Primary(r),
      Err(e) => Filtered::Fallback(laplacian_scale(plane, sigma), e),
    }
  }
}

/// 单尺度 Frangi 血管度量，`plane` 取值 0-1
pub fn frangi_scale(plane: &FloatPlane, sigma: f32, params: &RidgeParams) -> Result<FloatPlane, FilterError> {
  if !(sigma.is_finite() && sigma > 0.0) {
    return Err(FilterError::InvalidParameter(format!("尺度必须为正数: {}", sigma)));
  }
  if plane.width() < MIN_HESSIAN_EXTENT || plane.height() < MIN_HESSIAN_EXTENT {
    return Err(FilterError::ImageTooSmall {
      width: plane.width(),
      height: plane.height(),
      min: MIN_HESSIAN_EXTENT,
    });
  }

  let smoothed = gaussian_blur(plane, sigma, gaussian_ksize(sigma));
  let dx = gradient_x(&smoothed);
  let dy = gradient_y(&smoothed);
  let dxx = gradient_x(&dx);
  let dxy = gradient_y(&dx);
  let dyy = gradient_y(&dy);

  let norm = sigma.powf(params.gamma);
  let mut out = FloatPlane::zeros(plane.width(), plane.height());
  for (i, v) in out.data_mut().iter_mut().enumerate() {
    let (l1, l2) = eigenvalues_by_magnitude(
      dxx.data()[i] * norm,
      dxy.data()[i] * norm,
      dyy.data()[i] * norm,
    );
    *v = vesselness(l1, l2, params);
  }

  if out.data().iter().any(|v| !v.is_finite()) {
    return Err(FilterError::NonFinite("Frangi 响应"));
  }
  debug!("尺度 σ={} 的 Frangi 响应最大值: {:.4}", sigma, out.max_value());
  Ok(out.map(|v| v.clamp(0.0, 1.0)))
}

/// 单像素 Frangi 度量，`|l1| <= |l2|`
///
/// `beta2` 直接作为结构常数 c，与 0-1 图像上的特征值同单位。
pub fn vesselness(l1: f32, l2: f32, params: &RidgeParams) -> f32 {
  // 暗脊线（静脉在近红外下偏暗）要求 λ2 > 0，亮脊线要求 λ2 < 0
  let wrong_polarity = if params.black_ridges { l2 < 0.0 } else { l2 > 0.0 };
  if wrong_polarity || l2.abs() < EIGEN_EPSILON {
    return 0.0;
  }

  let blob = 2.0 * params.beta1 * params.beta1;
  let structure = 2.0 * params.beta2 * params.beta2;
  let rb = l1 / l2;
  let s2 = l1 * l1 + l2 * l2;
  (-(rb * rb) / blob).exp() * (1.0 - (-s2 / structure).exp())
}

/// 回退：高斯模糊后取拉普拉斯绝对值，并按最大值归一化到 [0, 1]
pub fn laplacian_scale(plane: &FloatPlane, sigma: f32) -> FloatPlane {
  let sigma = if sigma.is_finite() && sigma > 0.0 { sigma } else { 1.0 };
  let blurred = gaussian_blur(plane, sigma, gaussian_ksize(sigma));
  let response = laplacian_3x3(&blurred).map(f32::abs);
  let max = response.max_value();
  if max > 0.0 && max.is_finite() {
    response.map(|v| v / max)
  } else {
    FloatPlane::zeros(plane.width(), plane.height())
  }
}

/// 对称 2x2 矩阵 [[a, b], [b, d]] 的特征值，按绝对值升序
fn eigenvalues_by_magnitude(a: f32, b: f32, d: f32) -> (f32, f32) {
  let tmp = ((a - d) * (a - d) + 4.0 * b * b).sqrt();
  let mu1 = 0.5 * (a + d + tmp);
  let mu2 = 0.5 * (a + d - tmp);
  if mu1.abs() <= mu2.abs() { (mu1, mu2) } else { (mu2, mu1) }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  fn dark_line(width: u32, height: u32, column: u32, half_width: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| {
      if x.abs_diff(column) <= half_width {
        image::Luma([60])
      } else {
        image::Luma([200])
      }
    })
  }

  #[test]
  fn eigenvalues_sorted_by_magnitude() {
    let (l1, l2) = eigenvalues_by_magnitude(1.0, 0.0, -5.0);
    assert_abs_diff_eq!(l1, 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(l2, -5.0, epsilon = 1e-6);
  }

  #[test]
  fn dark_vessel_responds_on_axis() {
    let enhancer = VesselRidgeEnhancer::new(RidgeParams::default());
    let image = dark_line(41, 21, 20, 1);
    let response = enhancer.ridge_response_normalized(&image, &[1.0, 2.0]);
    let on_axis = response.get(20, 10);
    let background = response.get(3, 10);
    assert!(on_axis > background, "轴线 {} 应高于背景 {}", on_axis, background);
  }

  #[test]
  fn structure_constant_is_beta2_itself() {
    let params = RidgeParams::default();
    // 纯线状结构：Rb = 0，只剩结构项 1 - exp(-S²/2c²)，c = 15
    assert_abs_diff_eq!(
      vesselness(0.0, 1.5, &params),
      1.0 - (-2.25f32 / 450.0).exp(),
      epsilon = 1e-7
    );
    assert_abs_diff_eq!(vesselness(0.0, 1.5, &params), 0.004988, epsilon = 1e-5);

    let strong = RidgeParams {
      beta2: 1.0,
      ..RidgeParams::default()
    };
    assert!(vesselness(0.0, 1.5, &strong) > 0.6);
  }

  #[test]
  fn wrong_polarity_scores_zero() {
    let params = RidgeParams::default();
    assert_eq!(vesselness(0.1, -2.0, &params), 0.0);
    assert!(vesselness(0.1, 2.0, &params) > 0.0);
  }

  #[test]
  fn bright_polarity_ignores_dark_vessel() {
    let params = RidgeParams {
      black_ridges: false,
      ..RidgeParams::default()
    };
    let image = dark_line(41, 21, 20, 1);
    let plane = FloatPlane::from_gray_scaled(&image, 1.0 / 255.0);
    let response = frangi_scale(&plane, 1.5, &params).unwrap();
    assert_abs_diff_eq!(response.get(20, 10), 0.0, epsilon = 1e-6);
  }

  #[test]
  fn tiny_image_falls_back_per_scale() {
    let enhancer = VesselRidgeEnhancer::new(RidgeParams::default());
    let image = GrayImage::from_fn(2, 2, |x, y| image::Luma([(x * 100 + y * 50) as u8]));
    let response = enhancer.ridge_response(&image, &[1.0]);
    assert_eq!(response.dimensions(), (2, 2));
    assert!(enhancer.try_ridge_response_normalized(&image, &[1.0]).is_err());
  }

  #[test]
  fn disabled_hessian_is_reported_unavailable() {
    let params = RidgeParams {
      use_hessian: false,
      ..RidgeParams::default()
    };
    let enhancer = VesselRidgeEnhancer::new(params);
    let image = dark_line(21, 21, 10, 1);
    assert!(matches!(
      enhancer.try_ridge_response_normalized(&image, &[1.0]),
      Err(FilterError::Unavailable(_))
    ));
    // 回退路径依旧给出响应
    let response = enhancer.ridge_response(&image, &[1.0]);
    assert!(response.as_raw().iter().any(|&v| v > 0));
  }

  #[test]
  fn empty_sigma_set_yields_black_image() {
    let enhancer = VesselRidgeEnhancer::new(RidgeParams::default());
    let image = dark_line(16, 16, 8, 1);
    let response = enhancer.ridge_response(&image, &[]);
    assert!(response.as_raw().iter().all(|&v| v == 0));
  }
}
