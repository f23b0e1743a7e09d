// 该文件是 Mailuo （脉络） 项目的一部分。
// src/output/draw.rs - 静脉检测结果可视化与文本记录
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

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
  config::{ConfigError, ConfigStore},
  frame::Frame,
  model::DetectionBatch,
  postprocess::Detection,
};

const LABEL_CHAR_WIDTH_RATIO: f32 = 0.55; // 每字符平均宽度与字号之比（粗略估计）
const LABEL_VERTICAL_PADDING: i32 = 2;

/// 检测框绘制样式，对应 `detection.visualization`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawStyle {
  pub show_boxes: bool,
  pub show_labels: bool,
  pub show_confidence: bool,
  pub box_color: [u8; 3],
  pub text_color: [u8; 3],
  pub thickness: u32,
  pub font_size: f32,
  pub font_path: Option<PathBuf>,
}

impl Default for DrawStyle {
  fn default() -> Self {
    Self {
      show_boxes: true,
      show_labels: true,
      show_confidence: true,
      box_color: [0, 255, 0],
      text_color: [255, 255, 255],
      thickness: 2,
      font_size: 18.0,
      font_path: None,
    }
  }
}

impl DrawStyle {
  pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
    store.section("detection.visualization")
  }
}

pub struct Draw {
  style: DrawStyle,
  font: Option<FontVec>,
}

impl Default for Draw {
  fn default() -> Self {
    Self::new(DrawStyle::default())
  }
}

impl Draw {
  /// 字体加载失败时只绘制检测框
  pub fn new(style: DrawStyle) -> Self {
    let font = style.font_path.as_deref().and_then(load_font);
    Self { style, font }
  }

  pub fn style(&self) -> &DrawStyle {
    &self.style
  }

  pub fn label_text(&self, detection: &Detection) -> String {
    if self.style.show_confidence {
      format!("{} {:.2}", detection.class_name, detection.confidence)
    } else {
      detection.class_name.clone()
    }
  }

  pub fn draw_detection(&self, frame: &Frame, batch: &DetectionBatch) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_detections_on_image(&mut image, batch);
    image
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, batch: &DetectionBatch) {
    for detection in batch.iter() {
      let Some(rect) = clamp_rect(image, &detection) else {
        continue;
      };
      if self.style.show_boxes {
        self.draw_box(image, rect);
      }
      if self.style.show_labels {
        self.draw_label(image, rect, &self.label_text(&detection));
      }
    }
  }

  fn draw_box(&self, image: &mut RgbImage, rect: Rect) {
    let color = Rgb(self.style.box_color);
    for t in 0..self.style.thickness.max(1) {
      let (w, h) = (rect.width() as i64 - 2 * t as i64, rect.height() as i64 - 2 * t as i64);
      if w <= 0 || h <= 0 {
        break;
      }
      let inner = Rect::at(rect.left() + t as i32, rect.top() + t as i32).of_size(w as u32, h as u32);
      draw_hollow_rect_mut(image, inner, color);
    }
  }

  fn draw_label(&self, image: &mut RgbImage, rect: Rect, label: &str) {
    let Some(font) = &self.font else {
      return;
    };

    let text_height = self.style.font_size.ceil() as i32 + 2 * LABEL_VERTICAL_PADDING;
    let text_width = (label.chars().count() as f32 * self.style.font_size * LABEL_CHAR_WIDTH_RATIO) as i32;
    let label_x = rect.left().max(0);
    let label_y = (rect.top() - text_height).max(0);
    let label_width = text_width.min(image.width() as i32 - label_x);

    if label_width > 0 && text_height > 0 {
      let background = Rect::at(label_x, label_y).of_size(label_width as u32, text_height as u32);
      draw_filled_rect_mut(image, background, Rgb(self.style.box_color));
      draw_text_mut(
        image,
        Rgb(self.style.text_color),
        label_x,
        label_y + LABEL_VERTICAL_PADDING,
        PxScale::from(self.style.font_size),
        font,
        label,
      );
    }
  }
}

fn load_font(path: &Path) -> Option<FontVec> {
  let data = match std::fs::read(path) {
    Ok(data) => data,
    Err(e) => {
      warn!("无法读取字体文件 {}: {}，标签将不被绘制", path.display(), e);
      return None;
    }
  };
  match FontVec::try_from_vec(data) {
    Ok(font) => {
      info!("已加载标签字体: {}", path.display());
      Some(font)
    }
    Err(e) => {
      warn!("字体文件 {} 无效: {}，标签将不被绘制", path.display(), e);
      None
    }
  }
}

/// 裁剪到图像范围内的像素矩形，完全落在图像外时返回 `None`
fn clamp_rect(image: &RgbImage, detection: &Detection) -> Option<Rect> {
  let (w, h) = (image.width() as f32, image.height() as f32);
  let b = &detection.bbox;
  let x_min = b.x.floor().clamp(0.0, w - 1.0) as i32;
  let y_min = b.y.floor().clamp(0.0, h - 1.0) as i32;
  let x_max = (b.x + b.width).ceil().clamp(0.0, w - 1.0) as i32;
  let y_max = (b.y + b.height).ceil().clamp(0.0, h - 1.0) as i32;
  if x_min >= x_max || y_min >= y_max {
    return None;
  }
  Some(Rect::at(x_min, y_min).of_size((x_max - x_min + 1) as u32, (y_max - y_min + 1) as u32))
}

/// 将检测结果写为文本：`名称或编号, 置信度, x, y, 宽, 高`
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn record(&self, batch: &DetectionBatch, path: &Path) -> Result<(), std::io::Error> {
    let lines: Vec<String> = batch
      .iter()
      .map(|d| {
        let name = if self.label_with_name {
          d.class_name.clone()
        } else {
          d.class_id.to_string()
        };
        format!(
          "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
          name, d.confidence, d.bbox.x, d.bbox.y, d.bbox.width, d.bbox.height
        )
      })
      .collect();
    std::fs::write(path.with_extension("txt"), lines.join("\n"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::postprocess::BoundingBox;
  use image::GrayImage;

  fn batch() -> DetectionBatch {
    DetectionBatch::from(vec![Detection {
      bbox: BoundingBox::new(2.0, 3.0, 10.0, 8.0),
      confidence: 0.87,
      class_id: 0,
      class_name: "vein".to_string(),
    }])
  }

  #[test]
  fn boxes_are_drawn_in_box_color() {
    let draw = Draw::default();
    let image = draw.draw_detection(&Frame::from(GrayImage::new(20, 20)), &batch());
    assert_eq!(image.get_pixel(2, 3), &Rgb([0, 255, 0]));
    assert_eq!(image.get_pixel(12, 11), &Rgb([0, 255, 0]));
    assert_eq!(image.get_pixel(7, 7), &Rgb([0, 0, 0]));
  }

  #[test]
  fn hidden_boxes_leave_frame_untouched() {
    let draw = Draw::new(DrawStyle {
      show_boxes: false,
      ..DrawStyle::default()
    });
    let frame = Frame::from(GrayImage::new(20, 20));
    assert_eq!(draw.draw_detection(&frame, &batch()), frame.to_rgb_image());
  }

  #[test]
  fn label_text_respects_confidence_flag() {
    let detection = batch().iter().next().unwrap();
    assert_eq!(Draw::default().label_text(&detection), "vein 0.87");
    let draw = Draw::new(DrawStyle {
      show_confidence: false,
      ..DrawStyle::default()
    });
    assert_eq!(draw.label_text(&detection), "vein");
  }

  #[test]
  fn missing_font_is_tolerated() {
    let draw = Draw::new(DrawStyle {
      font_path: Some(PathBuf::from("/nonexistent/font.ttf")),
      ..DrawStyle::default()
    });
    assert!(draw.font.is_none());
  }

  #[test]
  fn record_writes_one_line_per_detection() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    Record { label_with_name: true }.record(&batch(), &path).unwrap();
    let text = std::fs::read_to_string(dir.path().join("frame.txt")).unwrap();
    assert_eq!(text, "vein, 0.8700, 2.0, 3.0, 10.0, 8.0");
  }
}
