// 该文件是 Mailuo （脉络） 项目的一部分。
// src/model.rs - 检测模型协作接口与静脉检测器
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
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::DetectionParameters,
  enhance::FrameEnhancer,
  frame::Frame,
  postprocess::{BoundingBox, Detection, DetectionPostProcessor, RawDetection},
};

mod replay;
pub use self::replay::{ReplayModel, ReplayModelError};

const DEFAULT_CLASS_NAME: &str = "vein";
const UNKNOWN_CLASS_NAME: &str = "unknown";

/// 外部检测模型：输入增强后的帧，输出角点形式的原始检测
pub trait Model {
  type Error: fmt::Display;

  fn infer(&self, frame: &Frame, request: &InferRequest) -> Result<Vec<RawDetection>, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
  #[default]
  Cpu,
  Cuda(u32),
  Npu,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("无法识别的推理设备: {0}")]
pub struct DeviceParseError(String);

impl FromStr for Device {
  type Err = DeviceParseError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let lower = s.trim().to_ascii_lowercase();
    match lower.as_str() {
      "cpu" => Ok(Device::Cpu),
      "npu" => Ok(Device::Npu),
      "cuda" | "gpu" => Ok(Device::Cuda(0)),
      other => other
        .strip_prefix("cuda:")
        .and_then(|index| index.parse().ok())
        .map(Device::Cuda)
        .ok_or_else(|| DeviceParseError(s.to_string())),
    }
  }
}

impl fmt::Display for Device {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Device::Cpu => f.write_str("cpu"),
      Device::Cuda(index) => write!(f, "cuda:{}", index),
      Device::Npu => f.write_str("npu"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferRequest {
  pub confidence_threshold: f32,
  pub device: Device,
}

#[derive(Error, Debug)]
pub enum ClassNamesError {
  #[error("读取类别文件 {path} 失败: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("类别文件 {0} 中没有任何类别")]
  Empty(PathBuf),
}

/// 有序类别名称表，索引即类别编号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
  names: Vec<String>,
}

impl Default for ClassNames {
  fn default() -> Self {
    Self {
      names: vec![DEFAULT_CLASS_NAME.to_string()],
    }
  }
}

impl ClassNames {
  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  /// 读取失败或文件为空时退化为 `["vein"]`
  pub fn load(path: impl AsRef<Path>) -> Self {
    match Self::try_load(path) {
      Ok(names) => names,
      Err(e) => {
        warn!("{}，使用默认类别 [{}]", e, DEFAULT_CLASS_NAME);
        Self::default()
      }
    }
  }

  /// 每行一个类别，忽略空行与首尾空白
  pub fn try_load(path: impl AsRef<Path>) -> Result<Self, ClassNamesError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ClassNamesError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let names: Vec<String> = contents
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect();
    if names.is_empty() {
      return Err(ClassNamesError::Empty(path.to_path_buf()));
    }
    info!("加载 {} 个类别: {:?}", names.len(), names);
    Ok(Self { names })
  }

  pub fn name_of(&self, class_id: usize) -> &str {
    self.names.get(class_id).map_or(UNKNOWN_CLASS_NAME, String::as_str)
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

/// 一帧的检测结果，按列存储
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionBatch {
  pub boxes: Vec<BoundingBox>,
  pub confidences: Vec<f32>,
  pub class_ids: Vec<usize>,
  pub class_names: Vec<String>,
}

impl DetectionBatch {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = Detection> + '_ {
    self
      .boxes
      .iter()
      .zip(&self.confidences)
      .zip(&self.class_ids)
      .zip(&self.class_names)
      .map(|(((bbox, &confidence), &class_id), class_name)| Detection {
        bbox: *bbox,
        confidence,
        class_id,
        class_name: class_name.clone(),
      })
  }
}

impl From<Vec<Detection>> for DetectionBatch {
  fn from(detections: Vec<Detection>) -> Self {
    let mut batch = DetectionBatch {
      boxes: Vec::with_capacity(detections.len()),
      confidences: Vec::with_capacity(detections.len()),
      class_ids: Vec::with_capacity(detections.len()),
      class_names: Vec::with_capacity(detections.len()),
    };
    for d in detections {
      batch.boxes.push(d.bbox);
      batch.confidences.push(d.confidence);
      batch.class_ids.push(d.class_id);
      batch.class_names.push(d.class_name);
    }
    batch
  }
}

/// 单帧推理的完整结果：增强后的帧与检测批次
#[derive(Debug, Clone)]
pub struct Inference {
  pub enhanced: Frame,
  pub batch: DetectionBatch,
}

/// 增强 → 模型推理 → 置信度过滤与 NMS
pub struct VeinDetector<M> {
  model: Option<M>,
  enhancer: FrameEnhancer,
  postprocessor: DetectionPostProcessor,
  class_names: ClassNames,
  device: Device,
}

impl<M: Model> VeinDetector<M> {
  pub fn new(
    model: Option<M>,
    enhancer: FrameEnhancer,
    params: DetectionParameters,
    class_names: ClassNames,
  ) -> Self {
    if model.is_none() {
      warn!("未加载检测模型，检测结果将始终为空");
    }
    Self {
      model,
      enhancer,
      postprocessor: DetectionPostProcessor::new(params),
      class_names,
      device: Device::default(),
    }
  }

  pub fn with_device(mut self, device: Device) -> Self {
    self.device = device;
    self
  }

  pub fn class_names(&self) -> &ClassNames {
    &self.class_names
  }

  pub fn enhancer(&self) -> &FrameEnhancer {
    &self.enhancer
  }

  pub fn has_model(&self) -> bool {
    self.model.is_some()
  }

  pub fn confidence_threshold(&self) -> f32 {
    self.postprocessor.params().confidence_threshold
  }

  pub fn detect(&self, frame: &Frame, confidence_threshold: f32) -> DetectionBatch {
    self.infer_frame(frame, confidence_threshold).batch
  }

  /// 使用构造时配置的置信度阈值
  pub fn detect_default(&self, frame: &Frame) -> DetectionBatch {
    self.detect(frame, self.confidence_threshold())
  }

  pub fn infer_frame(&self, frame: &Frame, confidence_threshold: f32) -> Inference {
    let enhanced = self.enhancer.enhance(frame);
    let batch = self.run_model(&enhanced, confidence_threshold);
    Inference { enhanced, batch }
  }

  fn run_model(&self, enhanced: &Frame, confidence_threshold: f32) -> DetectionBatch {
    let Some(model) = &self.model else {
      return DetectionBatch::empty();
    };

    let request = InferRequest {
      confidence_threshold,
      device: self.device,
    };
    let now = Instant::now();
    let raw = match model.infer(enhanced, &request) {
      Ok(raw) => raw,
      Err(e) => {
        error!("模型推理失败: {}", e);
        return DetectionBatch::empty();
      }
    };
    debug!("模型推理完成，耗时: {:.2?}，原始检测 {} 个", now.elapsed(), raw.len());

    let detections: Vec<Detection> = raw
      .into_iter()
      .filter_map(|r| r.into_detection(self.class_names.name_of(r.class_id)))
      .collect();
    DetectionBatch::from(self.postprocessor.process_with(detections, confidence_threshold))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::FilterParameters;
  use image::GrayImage;

  struct FixedModel(Vec<RawDetection>);

  impl Model for FixedModel {
    type Error = String;

    fn infer(&self, _: &Frame, _: &InferRequest) -> Result<Vec<RawDetection>, Self::Error> {
      Ok(self.0.clone())
    }
  }

  struct FailingModel;

  impl Model for FailingModel {
    type Error = String;

    fn infer(&self, _: &Frame, _: &InferRequest) -> Result<Vec<RawDetection>, Self::Error> {
      Err("设备不可用".to_string())
    }
  }

  fn raw(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: usize) -> RawDetection {
    RawDetection { x1, y1, x2, y2, confidence, class_id }
  }

  fn detector<M: Model>(model: Option<M>) -> VeinDetector<M> {
    let enhancer = FrameEnhancer::new(FilterParameters::all_disabled()).unwrap();
    VeinDetector::new(model, enhancer, DetectionParameters::default(), ClassNames::default())
  }

  #[test]
  fn device_parsing() {
    assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
    assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
    assert_eq!("cuda:1".parse::<Device>().unwrap(), Device::Cuda(1));
    assert_eq!("npu".parse::<Device>().unwrap(), Device::Npu);
    assert!("tpu".parse::<Device>().is_err());
    assert_eq!(Device::Cuda(2).to_string(), "cuda:2");
  }

  #[test]
  fn unknown_class_id() {
    let names = ClassNames::new(vec!["vein".into(), "artery".into()]);
    assert_eq!(names.name_of(1), "artery");
    assert_eq!(names.name_of(7), "unknown");
  }

  #[test]
  fn batch_columns_stay_aligned() {
    let dets = vec![
      raw(0.0, 0.0, 10.0, 10.0, 0.9, 0).into_detection("vein").unwrap(),
      raw(50.0, 50.0, 60.0, 70.0, 0.7, 0).into_detection("vein").unwrap(),
    ];
    let batch = DetectionBatch::from(dets.clone());
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.iter().collect::<Vec<_>>(), dets);
  }

  #[test]
  fn detect_filters_and_deduplicates() {
    let model = FixedModel(vec![
      raw(10.0, 10.0, 30.0, 30.0, 0.9, 0),
      raw(12.0, 12.0, 32.0, 32.0, 0.8, 0),
      raw(100.0, 100.0, 120.0, 120.0, 0.3, 0),
      raw(200.0, 200.0, 200.0, 220.0, 0.95, 0),
      raw(60.0, 60.0, 80.0, 80.0, 0.6, 3),
    ]);
    let detector = detector(Some(model));
    let batch = detector.detect(&Frame::from(GrayImage::new(8, 8)), 0.5);
    assert_eq!(batch.confidences, vec![0.9, 0.6]);
    assert_eq!(batch.class_names, vec!["vein".to_string(), "unknown".to_string()]);
    assert_eq!(batch.boxes[0], BoundingBox::new(10.0, 10.0, 20.0, 20.0));
  }

  #[test]
  fn model_failure_gives_empty_batch() {
    let detector = detector(Some(FailingModel));
    let batch = detector.detect(&Frame::from(GrayImage::new(8, 8)), 0.5);
    assert_eq!(batch, DetectionBatch::empty());
  }

  #[test]
  fn missing_model_gives_empty_batch() {
    let detector = detector::<FailingModel>(None);
    assert!(!detector.has_model());
    assert!(detector.detect_default(&Frame::from(GrayImage::new(8, 8))).is_empty());
  }
}
