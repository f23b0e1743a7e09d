// 该文件是 Mailuo （脉络） 项目的一部分。
// src/model/replay.rs - 回放录制检测结果的模型
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
use std::sync::Mutex;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{InferRequest, Model},
  postprocess::RawDetection,
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{found}'")]
  SchemeMismatch { expected: &'static str, found: String },
  #[error("路径解码失败: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("读取回放文件 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("回放文件格式错误: {0}")]
  Parse(#[from] serde_json::Error),
  #[error("回放游标锁已中毒")]
  Poisoned,
}

/// 按帧回放预先录制的原始检测结果
///
/// 文件是 JSON 数组，每个元素对应一帧的检测列表。
/// 帧数用尽后从头循环。
#[derive(Debug)]
pub struct ReplayModel {
  frames: Vec<Vec<RawDetection>>,
  cursor: Mutex<usize>,
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!("URI 方案不匹配: 期望 '{}', 实际 '{}'", Self::SCHEME, url.scheme());
      return Err(ReplayModelError::SchemeMismatch {
        expected: Self::SCHEME,
        found: url.scheme().to_string(),
      });
    }

    let path = urlencoding::decode(url.path())?;
    Self::load(path.into_owned())
  }
}

impl ReplayModel {
  pub fn new(frames: Vec<Vec<RawDetection>>) -> Self {
    Self {
      frames,
      cursor: Mutex::new(0),
    }
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayModelError> {
    let path = path.as_ref();
    info!("加载回放文件: {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|source| ReplayModelError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let frames: Vec<Vec<RawDetection>> = serde_json::from_str(&contents)?;
    info!("回放文件包含 {} 帧", frames.len());
    Ok(Self::new(frames))
  }

  /// 模型文件缺失或无法解析时给出警告并返回 `None`，检测结果将为空
  pub fn from_url_or_skip(url: &Url) -> Option<Self> {
    match Self::from_url(url) {
      Ok(model) => Some(model),
      Err(e) => {
        warn!("无法加载模型 {}: {}，将不进行检测", url, e);
        None
      }
    }
  }

  pub fn frame_count(&self) -> usize {
    self.frames.len()
  }

  fn next_index(&self) -> Result<Option<usize>, ReplayModelError> {
    if self.frames.is_empty() {
      return Ok(None);
    }
    let mut cursor = self.cursor.lock().map_err(|_| ReplayModelError::Poisoned)?;
    let index = *cursor % self.frames.len();
    *cursor = index + 1;
    Ok(Some(index))
  }
}

impl Model for ReplayModel {
  type Error = ReplayModelError;

  fn infer(&self, frame: &Frame, request: &InferRequest) -> Result<Vec<RawDetection>, Self::Error> {
    let Some(index) = self.next_index()? else {
      return Ok(Vec::new());
    };
    let detections: Vec<RawDetection> = self.frames[index]
      .iter()
      .filter(|d| d.confidence >= request.confidence_threshold)
      .copied()
      .collect();
    debug!(
      "回放第 {} 帧 ({}x{}, 设备 {})，输出 {} 个检测",
      index,
      frame.width(),
      frame.height(),
      request.device,
      detections.len()
    );
    Ok(detections)
  }
}
