// 该文件是 Mailuo （脉络） 项目的一部分。
// src/enhance/kernel.rs - 浮点图像平面与卷积核
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

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::{
  filter::{filter, filter_clamped, horizontal_filter, separable_filter_equal, vertical_filter},
  kernel::Kernel,
};

/// 3x3 孔径的拉普拉斯核（与 ksize=3 的经典实现一致）
const LAPLACIAN_3X3: [i32; 9] = [2, 0, 2, 0, -8, 0, 2, 0, 2];
/// 中心差分 `(f(x+1) - f(x-1)) / 2`
const CENTRAL_DIFFERENCE: [f32; 3] = [-0.5, 0.0, 0.5];

pub type GrayFloatImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// 单通道浮点图像平面
#[derive(Debug, Clone, PartialEq)]
pub struct FloatPlane {
  image: GrayFloatImage,
}

impl FloatPlane {
  pub fn zeros(width: usize, height: usize) -> Self {
    Self {
      image: GrayFloatImage::new(width as u32, height as u32),
    }
  }

  pub fn from_gray(image: &GrayImage) -> Self {
    Self::from_gray_scaled(image, 1.0)
  }

  /// 以 `scale` 缩放后的灰度值构造（例如 1/255 归一化到 0-1）
  pub fn from_gray_scaled(image: &GrayImage, scale: f32) -> Self {
    Self {
      image: GrayFloatImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([image.get_pixel(x, y)[0] as f32 * scale])
      }),
    }
  }

  pub fn width(&self) -> usize {
    self.image.width() as usize
  }

  pub fn height(&self) -> usize {
    self.image.height() as usize
  }

  pub fn as_image(&self) -> &GrayFloatImage {
    &self.image
  }

  pub fn data(&self) -> &[f32] {
    self.image.as_raw()
  }

  pub fn data_mut(&mut self) -> &mut [f32] {
    &mut self.image
  }

  #[inline]
  pub fn get(&self, x: usize, y: usize) -> f32 {
    self.image.get_pixel(x as u32, y as u32)[0]
  }

  pub fn max_value(&self) -> f32 {
    self.data().iter().copied().fold(0.0f32, f32::max)
  }

  pub fn map(mut self, f: impl Fn(f32) -> f32) -> Self {
    self.data_mut().iter_mut().for_each(|v| *v = f(*v));
    self
  }

  /// 逐像素取最大值，两个平面尺寸必须一致
  pub fn max_assign(&mut self, other: &FloatPlane) {
    debug_assert_eq!(self.image.dimensions(), other.image.dimensions());
    for (a, &b) in self.data_mut().iter_mut().zip(other.data()) {
      if b > *a {
        *a = b;
      }
    }
  }

  pub fn add_assign(&mut self, other: &FloatPlane) {
    debug_assert_eq!(self.image.dimensions(), other.image.dimensions());
    for (a, &b) in self.data_mut().iter_mut().zip(other.data()) {
      *a += b;
    }
  }

  /// 四舍五入并裁剪到 [0, 255]
  pub fn to_gray_saturating(&self) -> GrayImage {
    GrayImage::from_fn(self.image.width(), self.image.height(), |x, y| {
      Luma([saturate_u8(self.image.get_pixel(x, y)[0])])
    })
  }
}

impl From<GrayFloatImage> for FloatPlane {
  fn from(image: GrayFloatImage) -> Self {
    Self { image }
  }
}

#[inline]
pub fn saturate_u8(value: f32) -> u8 {
  if value.is_nan() {
    0
  } else {
    value.round().clamp(0.0, 255.0) as u8
  }
}

/// reflect-101 边界：`gfedcb|abcdefgh|gfedcba`
#[inline]
pub fn reflect_101(index: isize, len: usize) -> usize {
  if len <= 1 {
    return 0;
  }
  let len = len as isize;
  let period = 2 * (len - 1);
  let mut i = index.rem_euclid(period);
  if i >= len {
    i = period - i;
  }
  i as usize
}

/// 二维相关运算（锚点位于核中心），边界按最近像素延拓
pub fn correlate(plane: &FloatPlane, kernel: &[f32], kernel_width: usize, kernel_height: usize) -> FloatPlane {
  let kernel = Kernel::new(kernel, kernel_width as u32, kernel_height as u32);
  let out: GrayFloatImage = filter(plane.as_image(), kernel, |v| v);
  out.into()
}

/// 归一化的一维高斯核
pub fn gaussian_kernel_1d(ksize: usize, sigma: f32) -> Vec<f32> {
  let center = (ksize as f32 - 1.0) / 2.0;
  let denom = 2.0 * sigma * sigma;
  let mut kernel: Vec<f32> = (0..ksize)
    .map(|i| {
      let d = i as f32 - center;
      (-(d * d) / denom).exp()
    })
    .collect();
  let sum: f32 = kernel.iter().sum();
  if sum > 0.0 {
    kernel.iter_mut().for_each(|k| *k /= sum);
  }
  kernel
}

/// `round(6σ + 1)`，偶数时加一
pub fn gaussian_ksize(sigma: f32) -> usize {
  let k = (6.0 * sigma + 1.0).round().max(1.0) as usize;
  if k % 2 == 0 { k + 1 } else { k }
}

/// 指定核长的可分离高斯模糊
pub fn gaussian_blur(plane: &FloatPlane, sigma: f32, ksize: usize) -> FloatPlane {
  let kernel = gaussian_kernel_1d(ksize, sigma);
  separable_filter_equal(plane.as_image(), &kernel).into()
}

/// 8 位饱和的 3x3 拉普拉斯
pub fn laplacian_3x3_u8(image: &GrayImage) -> GrayImage {
  filter_clamped::<_, i32, u8>(image, Kernel::new(&LAPLACIAN_3X3, 3, 3))
}

/// 浮点 3x3 拉普拉斯
pub fn laplacian_3x3(plane: &FloatPlane) -> FloatPlane {
  let kernel: Vec<f32> = LAPLACIAN_3X3.iter().map(|&k| k as f32).collect();
  correlate(plane, &kernel, 3, 3)
}

/// 水平方向中心差分
pub fn gradient_x(plane: &FloatPlane) -> FloatPlane {
  horizontal_filter(plane.as_image(), &CENTRAL_DIFFERENCE).into()
}

pub fn gradient_y(plane: &FloatPlane) -> FloatPlane {
  vertical_filter(plane.as_image(), &CENTRAL_DIFFERENCE).into()
}
