// 该文件是 Mailuo （脉络） 项目的一部分。
// src/camera.rs - 近红外摄像头推荐参数
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

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{ConfigError, ConfigStore};

/// 静脉成像时摄像头应设置的参数，由采集端负责下发
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
  pub auto_exposure: f32,
  pub exposure: f32,
  pub auto_white_balance: bool,
  pub white_balance_temperature: u32,
  pub brightness: u32,
  pub contrast: u32,
  pub saturation: u32,
  pub gain: u32,
  pub sharpness: u32,
}

impl Default for CameraSettings {
  fn default() -> Self {
    Self {
      auto_exposure: 0.25,
      exposure: -6.0,
      auto_white_balance: false,
      white_balance_temperature: 4000,
      brightness: 64,
      contrast: 32,
      saturation: 16,
      gain: 24,
      sharpness: 24,
    }
  }
}

impl CameraSettings {
  /// 以内置推荐值为基础，叠加 `camera.settings` 中的覆盖项
  pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
    store.section("camera.settings")
  }
}

/// 返回内置的推荐摄像头参数
pub fn apply_camera_settings() -> CameraSettings {
  let settings = CameraSettings::default();
  info!("摄像头参数: {:?}", settings);
  settings
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn recommended_values() {
    let s = apply_camera_settings();
    assert_eq!(s.auto_exposure, 0.25);
    assert_eq!(s.exposure, -6.0);
    assert!(!s.auto_white_balance);
    assert_eq!(s.white_balance_temperature, 4000);
    assert_eq!((s.brightness, s.contrast, s.saturation, s.gain, s.sharpness), (64, 32, 16, 24, 24));
  }

  #[test]
  fn store_overrides_single_field() {
    let store = ConfigStore::from_yaml_str("camera:\n  settings:\n    gain: 40\n").unwrap();
    let s = CameraSettings::from_store(&store).unwrap();
    assert_eq!(s.gain, 40);
    assert_eq!(s.brightness, 64);
  }
}
