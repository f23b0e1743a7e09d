// 该文件是 Mailuo （脉络） 项目的一部分。
// src/config.rs - 配置存储与滤波参数
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_yaml::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::enhance::MAX_ELEMENT_SIZE;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("读取配置文件 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("解析配置失败: {0}")]
  Parse(#[from] serde_yaml::Error),
  #[error("配置节 '{key}' 格式错误: {source}")]
  InvalidSection {
    key: String,
    #[source]
    source: serde_yaml::Error,
  },
  #[error("参数无效: {0}")]
  Invalid(String),
}

/// 以点号路径访问的只读 YAML 配置
#[derive(Debug, Clone)]
pub struct ConfigStore {
  root: Value,
  source: Option<PathBuf>,
}

impl Default for ConfigStore {
  fn default() -> Self {
    Self {
      root: Value::Mapping(Default::default()),
      source: None,
    }
  }
}

impl ConfigStore {
  /// 加载配置文件；文件缺失或损坏时记录日志并退回内置默认值
  pub fn load(path: impl AsRef<Path>) -> Self {
    let path = path.as_ref();
    if !path.exists() {
      warn!("配置文件不存在: {}，使用默认配置", path.display());
      return Self::default();
    }

    match Self::try_load(path) {
      Ok(store) => store,
      Err(e) => {
        error!("加载配置失败: {}，使用默认配置", e);
        Self::default()
      }
    }
  }

  pub fn try_load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let mut store = Self::from_yaml_str(&contents)?;
    store.source = Some(path.to_path_buf());
    info!("已加载配置: {}", path.display());
    Ok(store)
  }

  pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
    let root: Value = serde_yaml::from_str(contents)?;
    let root = match root {
      Value::Null => Value::Mapping(Default::default()),
      other => other,
    };
    Ok(Self { root, source: None })
  }

  pub fn source(&self) -> Option<&Path> {
    self.source.as_deref()
  }

  /// 按 `a.b.c` 路径查找原始值
  pub fn lookup(&self, key_path: &str) -> Option<&Value> {
    key_path
      .split('.')
      .try_fold(&self.root, |value, key| value.get(key))
  }

  /// 按路径读取并转换为 `T`；缺失或类型不符时返回 `default`
  pub fn get<T: DeserializeOwned>(&self, key_path: &str, default: T) -> T {
    match self.lookup(key_path) {
      Some(value) => match serde_yaml::from_value(value.clone()) {
        Ok(v) => v,
        Err(e) => {
          warn!("配置项 '{}' 类型不匹配: {}，使用默认值", key_path, e);
          default
        }
      },
      None => default,
    }
  }

  /// 读取整个配置节；缺失时为 `T::default()`，格式错误时报错
  pub fn section<T: DeserializeOwned + Default>(&self, key_path: &str) -> Result<T, ConfigError> {
    match self.lookup(key_path) {
      None | Some(Value::Null) => Ok(T::default()),
      Some(value) => serde_yaml::from_value(value.clone()).map_err(|source| ConfigError::InvalidSection {
        key: key_path.to_string(),
        source,
      }),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaheParams {
  pub enabled: bool,
  pub clip_limit: f32,
  pub tile_grid_size_x: usize,
  pub tile_grid_size_y: usize,
}

impl Default for ClaheParams {
  fn default() -> Self {
    Self {
      enabled: true,
      clip_limit: 3.0,
      tile_grid_size_x: 8,
      tile_grid_size_y: 8,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralParams {
  pub enabled: bool,
  pub diameter: i32,
  pub sigma_color: f32,
  pub sigma_space: f32,
}

impl Default for BilateralParams {
  fn default() -> Self {
    Self {
      enabled: true,
      diameter: 9,
      sigma_color: 75.0,
      sigma_space: 75.0,
    }
  }
}

/// Hessian 脊线检测器参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeParams {
  /// 关闭后所有尺度都走拉普拉斯回退
  pub use_hessian: bool,
  /// 对团块结构的抑制强度
  pub beta1: f32,
  /// 结构强度常数 c，与 0-1 归一化图像的 Hessian 范数同单位
  pub beta2: f32,
  /// 尺度归一化指数，Hessian 乘以 σ^gamma
  pub gamma: f32,
  /// true 检测暗脊线（近红外下的静脉），false 检测亮脊线
  pub black_ridges: bool,
}

impl Default for RidgeParams {
  fn default() -> Self {
    Self {
      use_hessian: true,
      beta1: 0.5,
      beta2: 15.0,
      gamma: 2.0,
      black_ridges: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VesselParams {
  pub ridge_enabled: bool,
  pub directional_enabled: bool,
  pub tophat_enabled: bool,
  pub sigmas: Vec<f32>,
  /// 角度，单位为度
  pub orientations: Vec<f32>,
  pub tophat_kernel_sizes: Vec<usize>,
  pub original_weight: f32,
  pub enhancement_weight: f32,
  pub ridge: RidgeParams,
}

impl Default for VesselParams {
  fn default() -> Self {
    Self {
      ridge_enabled: true,
      directional_enabled: true,
      tophat_enabled: true,
      sigmas: vec![1.0, 2.0, 3.0, 4.0],
      orientations: vec![0.0, 30.0, 60.0, 90.0, 120.0, 150.0],
      tophat_kernel_sizes: vec![5, 7, 9, 11],
      original_weight: 0.6,
      enhancement_weight: 0.4,
      ridge: RidgeParams::default(),
    }
  }
}

impl VesselParams {
  pub fn any_enabled(&self) -> bool {
    self.ridge_enabled || self.directional_enabled || self.tophat_enabled
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContrastParams {
  pub enabled: bool,
  pub alpha: f32,
  pub beta: f32,
}

impl Default for ContrastParams {
  fn default() -> Self {
    Self {
      enabled: true,
      alpha: 1.8,
      beta: 10.0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeBlendParams {
  pub enabled: bool,
  /// 尺度范围 1..10，步长 2
  pub sigmas: Vec<f32>,
  pub image_weight: f32,
  pub ridge_weight: f32,
  pub ridge: RidgeParams,
}

impl Default for RidgeBlendParams {
  fn default() -> Self {
    Self {
      enabled: true,
      sigmas: vec![1.0, 3.0, 5.0, 7.0, 9.0],
      image_weight: 0.7,
      ridge_weight: 0.3,
      ridge: RidgeParams::default(),
    }
  }
}

/// 一次增强调用使用的全部参数，构造时校验一次
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParameters {
  pub clahe: ClaheParams,
  pub bilateral: BilateralParams,
  pub vessel: VesselParams,
  pub contrast: ContrastParams,
  pub ridge_blend: RidgeBlendParams,
  /// 调试模式下各阶段耗时以 info 级别输出
  pub debug_mode: bool,
}

impl FilterParameters {
  pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
    let params = Self {
      clahe: store.section("image_processing.clahe")?,
      bilateral: store.section("image_processing.bilateral")?,
      vessel: store.section("image_processing.vessel")?,
      contrast: store.section("image_processing.contrast")?,
      ridge_blend: store.section("image_processing.ridge_blend")?,
      debug_mode: store.get("application.debug_mode", false),
    };
    params.validate()?;
    Ok(params)
  }

  /// 所有阶段都关闭，输出等于灰度转换
  pub fn all_disabled() -> Self {
    let mut params = Self::default();
    params.clahe.enabled = false;
    params.bilateral.enabled = false;
    params.vessel.ridge_enabled = false;
    params.vessel.directional_enabled = false;
    params.vessel.tophat_enabled = false;
    params.contrast.enabled = false;
    params.ridge_blend.enabled = false;
    params
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    let clahe = &self.clahe;
    if clahe.tile_grid_size_x == 0 || clahe.tile_grid_size_y == 0 {
      return Err(invalid(format!(
        "CLAHE 网格尺寸必须大于 0: {}x{}",
        clahe.tile_grid_size_x, clahe.tile_grid_size_y
      )));
    }
    ensure_finite("clahe.clip_limit", clahe.clip_limit)?;
    if clahe.clip_limit < 0.0 {
      return Err(invalid(format!("CLAHE 截断阈值不能为负: {}", clahe.clip_limit)));
    }

    ensure_positive("bilateral.sigma_color", self.bilateral.sigma_color)?;
    ensure_positive("bilateral.sigma_space", self.bilateral.sigma_space)?;

    let vessel = &self.vessel;
    for &sigma in &vessel.sigmas {
      ensure_positive("vessel.sigmas", sigma)?;
    }
    for &angle in &vessel.orientations {
      ensure_finite("vessel.orientations", angle)?;
    }
    if let Some(&size) = vessel
      .tophat_kernel_sizes
      .iter()
      .find(|&&k| k == 0 || k > MAX_ELEMENT_SIZE)
    {
      return Err(invalid(format!(
        "顶帽结构元素尺寸必须在 1..={} 之间: {}",
        MAX_ELEMENT_SIZE, size
      )));
    }
    ensure_finite("vessel.original_weight", vessel.original_weight)?;
    ensure_finite("vessel.enhancement_weight", vessel.enhancement_weight)?;
    validate_ridge("vessel.ridge", &vessel.ridge)?;

    ensure_finite("contrast.alpha", self.contrast.alpha)?;
    ensure_finite("contrast.beta", self.contrast.beta)?;

    let blend = &self.ridge_blend;
    ensure_finite("ridge_blend.image_weight", blend.image_weight)?;
    ensure_finite("ridge_blend.ridge_weight", blend.ridge_weight)?;
    for &sigma in &blend.sigmas {
      ensure_positive("ridge_blend.sigmas", sigma)?;
    }
    validate_ridge("ridge_blend.ridge", &blend.ridge)?;

    Ok(())
  }
}

/// 检测后处理参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionParameters {
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
}

impl Default for DetectionParameters {
  fn default() -> Self {
    Self {
      confidence_threshold: 0.5,
      iou_threshold: 0.4,
    }
  }
}

impl DetectionParameters {
  pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
    let defaults = Self::default();
    let params = Self {
      confidence_threshold: store.get("model.confidence_threshold", defaults.confidence_threshold),
      iou_threshold: store.get("detection.iou_threshold", defaults.iou_threshold),
    };
    params.validate()?;
    Ok(params)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    for (name, v) in [
      ("confidence_threshold", self.confidence_threshold),
      ("iou_threshold", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&v) {
        return Err(invalid(format!("{} 必须位于 [0, 1]: {}", name, v)));
      }
    }
    Ok(())
  }
}

fn validate_ridge(name: &str, ridge: &RidgeParams) -> Result<(), ConfigError> {
  ensure_positive(&format!("{}.beta1", name), ridge.beta1)?;
  ensure_positive(&format!("{}.beta2", name), ridge.beta2)?;
  ensure_finite(&format!("{}.gamma", name), ridge.gamma)
}

fn invalid(msg: String) -> ConfigError {
  ConfigError::Invalid(msg)
}

fn ensure_finite(name: &str, value: f32) -> Result<(), ConfigError> {
  if value.is_finite() {
    Ok(())
  } else {
    Err(invalid(format!("{} 必须为有限值: {}", name, value)))
  }
}

fn ensure_positive(name: &str, value: f32) -> Result<(), ConfigError> {
  if value.is_finite() && value > 0.0 {
    Ok(())
  } else {
    Err(invalid(format!("{} 必须为正数: {}", name, value)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SAMPLE: &str = r#"
application:
  debug_mode: true
model:
  confidence_threshold: 0.35
image_processing:
  clahe:
    clip_limit: 2.0
    tile_grid_size_x: 4
  vessel:
    sigmas: [1.5, 2.5]
detection:
  iou_threshold: 0.5
"#;

  #[test]
  fn dotted_lookup_with_defaults() {
    let store = ConfigStore::from_yaml_str(SAMPLE).unwrap();
    assert!((store.get("model.confidence_threshold", 0.0f32) - 0.35).abs() < 1e-6);
    assert_eq!(store.get("camera.primary_nir_port", 0i64), 0);
    assert!(store.get("application.debug_mode", false));
    // 类型不符时回退默认值
    assert_eq!(store.get("image_processing.clahe", 7u32), 7);
  }

  #[test]
  fn sections_fill_missing_fields() {
    let store = ConfigStore::from_yaml_str(SAMPLE).unwrap();
    let params = FilterParameters::from_store(&store).unwrap();
    assert_eq!(params.clahe.tile_grid_size_x, 4);
    assert_eq!(params.clahe.tile_grid_size_y, 8);
    assert!(params.clahe.enabled);
    assert_eq!(params.vessel.sigmas, vec![1.5, 2.5]);
    assert_eq!(params.vessel.orientations.len(), 6);
    assert!(params.debug_mode);

    let detection = DetectionParameters::from_store(&store).unwrap();
    assert!((detection.iou_threshold - 0.5).abs() < 1e-6);
  }

  #[test]
  fn empty_document_is_default() {
    let store = ConfigStore::from_yaml_str("").unwrap();
    assert_eq!(FilterParameters::from_store(&store).unwrap(), FilterParameters::default());
  }

  #[test]
  fn rejects_zero_tile_grid() {
    let store =
      ConfigStore::from_yaml_str("image_processing:\n  clahe:\n    tile_grid_size_y: 0\n").unwrap();
    assert!(matches!(
      FilterParameters::from_store(&store),
      Err(ConfigError::Invalid(_))
    ));
  }

  #[test]
  fn rejects_oversized_tophat_element() {
    let mut params = FilterParameters::default();
    params.vessel.tophat_kernel_sizes = vec![5, MAX_ELEMENT_SIZE + 1];
    assert!(matches!(params.validate(), Err(ConfigError::Invalid(_))));
    params.vessel.tophat_kernel_sizes = vec![5, MAX_ELEMENT_SIZE];
    assert!(params.validate().is_ok());
  }

  #[test]
  fn rejects_malformed_section() {
    let store = ConfigStore::from_yaml_str("image_processing:\n  bilateral: 12\n").unwrap();
    assert!(matches!(
      FilterParameters::from_store(&store),
      Err(ConfigError::InvalidSection { .. })
    ));
  }

  #[test]
  fn rejects_out_of_range_threshold() {
    let store = ConfigStore::from_yaml_str("detection:\n  iou_threshold: 1.5\n").unwrap();
    assert!(DetectionParameters::from_store(&store).is_err());
  }

  #[test]
  fn missing_file_falls_back_to_defaults() {
    let store = ConfigStore::load("/nonexistent/mailuo.yaml");
    assert!(store.source().is_none());
    assert!(store.lookup("model").is_none());
  }
}
