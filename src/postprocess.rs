// 该文件是 Mailuo （脉络） 项目的一部分。
// src/postprocess.rs - 检测结果置信度过滤与非极大值抑制
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
use tracing::debug;

use crate::config::DetectionParameters;

/// 左上角坐标加宽高的边界框，单位为像素
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl BoundingBox {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self { x, y, width, height }
  }

  /// 由角点坐标构造，宽或高不为正时返回 `None`
  pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
    let (width, height) = (x2 - x1, y2 - y1);
    if width > 0.0 && height > 0.0 {
      Some(Self::new(x1, y1, width, height))
    } else {
      None
    }
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// 交并比，并集为零时定义为 0
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let x1 = self.x.max(other.x);
    let y1 = self.y.max(other.y);
    let x2 = (self.x + self.width).min(other.x + other.width);
    let y2 = (self.y + self.height).min(other.y + other.height);

    let (iw, ih) = (x2 - x1, y2 - y1);
    if !(iw > 0.0 && ih > 0.0) {
      return 0.0;
    }

    let intersection = iw * ih;
    let union = self.area() + other.area() - intersection;
    if union > 0.0 { intersection / union } else { 0.0 }
  }
}

/// 检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub bbox: BoundingBox,
  /// 置信度
  pub confidence: f32,
  /// 类别索引
  pub class_id: usize,
  /// 类别名称
  pub class_name: String,
}

/// 模型给出的原始检测，角点形式
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
  pub x1: f32,
  pub y1: f32,
  pub x2: f32,
  pub y2: f32,
  pub confidence: f32,
  pub class_id: usize,
}

impl RawDetection {
  /// 转换为 `(x, y, w, h)`，退化框被丢弃
  pub fn into_detection(self, class_name: impl Into<String>) -> Option<Detection> {
    let bbox = BoundingBox::from_corners(self.x1, self.y1, self.x2, self.y2)?;
    Some(Detection {
      bbox,
      confidence: self.confidence,
      class_id: self.class_id,
      class_name: class_name.into(),
    })
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionPostProcessor {
  params: DetectionParameters,
}

impl DetectionPostProcessor {
  pub fn new(params: DetectionParameters) -> Self {
    Self { params }
  }

  pub fn params(&self) -> DetectionParameters {
    self.params
  }

  /// 使用构造时的阈值过滤并去重
  pub fn process(&self, detections: Vec<Detection>) -> Vec<Detection> {
    self.process_with(detections, self.params.confidence_threshold)
  }

  /// 单次调用指定置信度阈值，IoU 阈值沿用构造参数
  pub fn process_with(&self, detections: Vec<Detection>, confidence_threshold: f32) -> Vec<Detection> {
    filter_and_deduplicate(detections, confidence_threshold, self.params.iou_threshold)
  }
}

/// 置信度门限 + 与类别无关的贪心 NMS
///
/// 置信度相同的检测保持输入中的相对顺序；输出按贪心选取顺序排列。
pub fn filter_and_deduplicate(
  detections: Vec<Detection>,
  confidence_threshold: f32,
  iou_threshold: f32,
) -> Vec<Detection> {
  let total = detections.len();
  let mut candidates: Vec<Detection> = detections
    .into_iter()
    .filter(|d| d.confidence >= confidence_threshold)
    .collect();

  // sort_by 是稳定排序
  candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
  let mut pool = candidates;
  while !pool.is_empty() {
    let best = pool.remove(0);
    pool.retain(|d| best.bbox.iou(&d.bbox) < iou_threshold);
    kept.push(best);
  }

  debug!("NMS: 输入 {} 个检测，保留 {} 个", total, kept.len());
  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  fn det(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> Detection {
    Detection {
      bbox: BoundingBox::new(x, y, w, h),
      confidence,
      class_id: 0,
      class_name: "vein".to_string(),
    }
  }

  #[test]
  fn iou_identical_and_disjoint() {
    let a = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
    let b = BoundingBox::new(100.0, 100.0, 5.0, 5.0);
    assert_abs_diff_eq!(a.iou(&a), 1.0, epsilon = 1e-6);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_is_symmetric() {
    let a = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
    let b = BoundingBox::new(15.0, 15.0, 20.0, 20.0);
    assert_eq!(a.iou(&b), b.iou(&a));
    assert_abs_diff_eq!(a.iou(&b), 225.0 / 575.0, epsilon = 1e-6);
  }

  #[test]
  fn touching_edges_do_not_overlap() {
    let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
    let b = BoundingBox::new(10.0, 0.0, 10.0, 10.0);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn zero_area_boxes_have_zero_iou() {
    let a = BoundingBox::new(5.0, 5.0, 0.0, 0.0);
    assert_eq!(a.iou(&a), 0.0);
  }

  #[test]
  fn overlapping_box_is_suppressed() {
    let out = filter_and_deduplicate(
      vec![det(10.0, 10.0, 20.0, 20.0, 0.9), det(12.0, 12.0, 20.0, 20.0, 0.8)],
      0.5,
      0.4,
    );
    assert_eq!(out, vec![det(10.0, 10.0, 20.0, 20.0, 0.9)]);
  }

  #[test]
  fn low_overlap_box_survives() {
    let out = filter_and_deduplicate(
      vec![det(10.0, 10.0, 20.0, 20.0, 0.9), det(15.0, 15.0, 20.0, 20.0, 0.8)],
      0.5,
      0.4,
    );
    assert_eq!(out.len(), 2);
  }

  #[test]
  fn confidence_gate() {
    let out = filter_and_deduplicate(
      vec![
        det(0.0, 0.0, 10.0, 10.0, 0.9),
        det(50.0, 0.0, 10.0, 10.0, 0.3),
        det(100.0, 0.0, 10.0, 10.0, 0.6),
      ],
      0.5,
      0.4,
    );
    let confidences: Vec<f32> = out.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.6]);
  }

  #[test]
  fn threshold_is_inclusive_and_nan_is_dropped() {
    let out = filter_and_deduplicate(
      vec![det(0.0, 0.0, 10.0, 10.0, 0.5), det(50.0, 0.0, 10.0, 10.0, f32::NAN)],
      0.5,
      0.4,
    );
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].confidence, 0.5);
  }

  #[test]
  fn ties_keep_input_order() {
    let mut first = det(0.0, 0.0, 10.0, 10.0, 0.7);
    first.class_name = "first".to_string();
    let mut second = det(50.0, 0.0, 10.0, 10.0, 0.7);
    second.class_name = "second".to_string();
    let out = filter_and_deduplicate(vec![first, second], 0.5, 0.4);
    assert_eq!(out[0].class_name, "first");
    assert_eq!(out[1].class_name, "second");
  }

  #[test]
  fn processor_overrides_confidence_only() {
    let processor = DetectionPostProcessor::new(DetectionParameters {
      confidence_threshold: 0.5,
      iou_threshold: 0.4,
    });
    let detections = vec![
      det(10.0, 10.0, 20.0, 20.0, 0.9),
      det(12.0, 12.0, 20.0, 20.0, 0.8),
      det(100.0, 0.0, 10.0, 10.0, 0.3),
    ];
    assert_eq!(processor.process(detections.clone()).len(), 1);
    let relaxed = processor.process_with(detections, 0.2);
    let confidences: Vec<f32> = relaxed.iter().map(|d| d.confidence).collect();
    assert_eq!(confidences, vec![0.9, 0.3]);
  }

  #[test]
  fn empty_in_empty_out() {
    assert!(filter_and_deduplicate(Vec::new(), 0.5, 0.4).is_empty());
  }

  #[test]
  fn degenerate_raw_box_is_dropped() {
    let raw = RawDetection {
      x1: 10.0,
      y1: 10.0,
      x2: 10.0,
      y2: 30.0,
      confidence: 0.9,
      class_id: 0,
    };
    assert!(raw.into_detection("vein").is_none());

    let raw = RawDetection { x2: 25.0, ..raw };
    let detection = raw.into_detection("vein").unwrap();
    assert_eq!(detection.bbox, BoundingBox::new(10.0, 10.0, 15.0, 20.0));
  }
}
