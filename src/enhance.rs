// 该文件是 Mailuo （脉络） 项目的一部分。
// src/enhance.rs - 近红外静脉图像增强流水线
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

use std::fmt;
use std::time::Instant;

use image::GrayImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::{ConfigError, ConfigStore, FilterParameters},
  frame::Frame,
};

pub mod kernel;

mod bilateral;
mod clahe;
mod directional;
mod ridge;
mod tophat;

pub use self::bilateral::bilateral_filter;
pub use self::clahe::clahe;
pub use self::directional::{DirectionalFilterBank, oriented_line_kernel};
pub use self::ridge::{VesselRidgeEnhancer, frangi_scale, laplacian_scale, vesselness};
pub use self::tophat::{MAX_ELEMENT_SIZE, StructuringElement, TopHatEnhancer, white_tophat};

use self::kernel::{FloatPlane, laplacian_3x3_u8, saturate_u8};

/// 单个滤波器的可恢复错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("图像为空")]
  EmptyImage,
  #[error("图像尺寸 {width}x{height} 小于最小要求 {min}")]
  ImageTooSmall { width: usize, height: usize, min: usize },
  #[error("{0} 出现非有限值")]
  NonFinite(&'static str),
  #[error("滤波器不可用: {0}")]
  Unavailable(&'static str),
}

/// 带回退值的滤波结果：失败时携带回退计算的结果与原因
#[derive(Debug, Clone)]
pub enum Filtered<T> {
  Primary(T),
  Fallback(T, FilterError),
}

impl<T> Filtered<T> {
  pub fn into_inner(self) -> T {
    match self {
      Filtered::Primary(v) | Filtered::Fallback(v, _) => v,
    }
  }

  pub fn is_fallback(&self) -> bool {
    matches!(self, Filtered::Fallback(..))
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Clahe,
  Bilateral,
  Vessel,
  Contrast,
  RidgeBlend,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Stage::Clahe => "CLAHE",
      Stage::Bilateral => "双边滤波",
      Stage::Vessel => "血管增强",
      Stage::Contrast => "对比度拉伸",
      Stage::RidgeBlend => "脊线融合",
    };
    f.write_str(name)
  }
}

#[derive(Error, Debug)]
pub enum EnhanceError {
  #[error("输入帧为空")]
  EmptyFrame,
  #[error("{stage} 阶段失败: {source}")]
  Stage {
    stage: Stage,
    #[source]
    source: FilterError,
  },
}

/// 对单帧执行完整增强链
///
/// 灰度化 → CLAHE → 双边滤波 → 脊线/方向/顶帽加权融合 → 对比度拉伸
/// → 脊线响应融合 → 恢复通道数。
#[derive(Debug, Clone)]
pub struct FrameEnhancer {
  params: FilterParameters,
  ridge: VesselRidgeEnhancer,
  blend_ridge: VesselRidgeEnhancer,
  directional: DirectionalFilterBank,
  tophat: TopHatEnhancer,
}

impl FrameEnhancer {
  pub fn new(params: FilterParameters) -> Result<Self, ConfigError> {
    params.validate()?;
    Ok(Self {
      ridge: VesselRidgeEnhancer::new(params.vessel.ridge.clone()),
      blend_ridge: VesselRidgeEnhancer::new(params.ridge_blend.ridge.clone()),
      directional: DirectionalFilterBank::new(&params.vessel.orientations),
      tophat: TopHatEnhancer::new(&params.vessel.tophat_kernel_sizes),
      params,
    })
  }

  pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
    Self::new(FilterParameters::from_store(store)?)
  }

  pub fn params(&self) -> &FilterParameters {
    &self.params
  }

  /// 增强失败时原样返回输入帧，不会中断流水线
  pub fn enhance(&self, frame: &Frame) -> Frame {
    match self.try_enhance(frame) {
      Ok(enhanced) => enhanced,
      Err(e) => {
        error!("静脉增强失败，返回原始帧: {}", e);
        frame.clone()
      }
    }
  }

  pub fn try_enhance(&self, frame: &Frame) -> Result<Frame, EnhanceError> {
    if frame.is_empty() {
      return Err(EnhanceError::EmptyFrame);
    }

    let started = Instant::now();
    let p = &self.params;
    let mut gray = frame.to_gray();

    if p.clahe.enabled {
      gray = self.run_stage(Stage::Clahe, || {
        clahe(
          &gray,
          p.clahe.clip_limit,
          p.clahe.tile_grid_size_x,
          p.clahe.tile_grid_size_y,
        )
      })?;
    }

    if p.bilateral.enabled {
      gray = self.run_stage(Stage::Bilateral, || {
        bilateral_filter(
          &gray,
          p.bilateral.diameter,
          p.bilateral.sigma_color,
          p.bilateral.sigma_space,
        )
      })?;
    }

    if p.vessel.any_enabled() {
      gray = self.run_stage(Stage::Vessel, || self.enhance_vessels(&gray))?;
    }

    if p.contrast.enabled {
      gray = self.run_stage(Stage::Contrast, || {
        Ok(contrast_stretch(&gray, p.contrast.alpha, p.contrast.beta))
      })?;
    }

    if p.ridge_blend.enabled {
      gray = self.run_stage(Stage::RidgeBlend, || Ok(self.ridge_blend(&gray)))?;
    }

    debug!("单帧增强完成，耗时: {:.2?}", started.elapsed());
    Ok(frame.restore_channels(gray))
  }

  /// 脊线、方向、顶帽三路响应取平均后与阶段输入加权融合
  pub fn enhance_vessels(&self, image: &GrayImage) -> Result<GrayImage, FilterError> {
    let v = &self.params.vessel;
    let mut responses = Vec::with_capacity(3);
    if v.ridge_enabled {
      responses.push(self.ridge.ridge_response(image, &v.sigmas));
    }
    if v.directional_enabled {
      responses.push(self.directional.max_oriented_response(image));
    }
    if v.tophat_enabled {
      responses.push(self.tophat.tophat(image));
    }
    if responses.is_empty() {
      return Ok(image.clone());
    }

    let n = responses.len() as f32;
    let mut combined = FloatPlane::zeros(image.width() as usize, image.height() as usize);
    for response in &responses {
      combined.add_assign(&FloatPlane::from_gray(response));
    }

    let src = image.as_raw();
    let mut blended = combined;
    for (i, c) in blended.data_mut().iter_mut().enumerate() {
      *c = v.original_weight * src[i] as f32 + v.enhancement_weight * (*c / n);
    }
    if blended.data().iter().any(|x| !x.is_finite()) {
      return Err(FilterError::NonFinite("血管增强融合"));
    }
    Ok(blended.to_gray_saturating())
  }

  /// 归一化脊线响应（失败时为反相拉普拉斯）与图像按固定权重融合
  pub fn ridge_blend(&self, image: &GrayImage) -> GrayImage {
    let p = &self.params.ridge_blend;
    let response = self.ridge_blend_response(image);
    if let Filtered::Fallback(_, reason) = &response {
      warn!("脊线滤波不可用，改用反相拉普拉斯: {}", reason);
    }
    add_weighted(image, p.image_weight, &response.into_inner(), p.ridge_weight)
  }

  pub fn ridge_blend_response(&self, image: &GrayImage) -> Filtered<GrayImage> {
    let p = &self.params.ridge_blend;
    match self.blend_ridge.try_ridge_response_normalized(image, &p.sigmas) {
      Ok(r) => Filtered::Primary(r.map(|v| v * 255.0).to_gray_saturating()),
      Err(e) => Filtered::Fallback(inverted_laplacian(image), e),
    }
  }

  fn run_stage<T>(
    &self,
    stage: Stage,
    f: impl FnOnce() -> Result<T, FilterError>,
  ) -> Result<T, EnhanceError> {
    let now = Instant::now();
    let out = f().map_err(|source| EnhanceError::Stage { stage, source })?;
    if self.params.debug_mode {
      info!("{} 完成，耗时: {:.2?}", stage, now.elapsed());
    } else {
      debug!("{} 完成，耗时: {:.2?}", stage, now.elapsed());
    }
    Ok(out)
  }
}

/// `clip(alpha * x + beta, 0, 255)`
pub fn contrast_stretch(image: &GrayImage, alpha: f32, beta: f32) -> GrayImage {
  let mut out = image.clone();
  out.iter_mut().for_each(|v| *v = saturate_u8(alpha * *v as f32 + beta));
  out
}

/// `saturate(wa * a + wb * b)`，两幅图尺寸必须一致
pub fn add_weighted(a: &GrayImage, wa: f32, b: &GrayImage, wb: f32) -> GrayImage {
  let mut out = a.clone();
  for (o, &bv) in out.iter_mut().zip(b.iter()) {
    *o = saturate_u8(wa * *o as f32 + wb * bv as f32);
  }
  out
}

/// 8 位饱和的 3x3 拉普拉斯，再取反
pub fn inverted_laplacian(image: &GrayImage) -> GrayImage {
  let mut out = laplacian_3x3_u8(image);
  out.iter_mut().for_each(|v| *v = 255 - *v);
  out
}
