// 该文件是 Mailuo （脉络） 项目的一部分。
// src/output/directory_record.rs - 按日期分目录记录检测帧
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

use chrono::{Datelike, Local};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::DetectionBatch,
  output::{
    Render,
    draw::{Draw, DrawStyle, Record},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("路径解码失败: {0}")]
  PathDecode(#[from] std::string::FromUtf8Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("帧计数器锁已中毒")]
  Poisoned,
}

/// 标注后保存，或保存原图并另写一份文本记录
pub enum RecordMode {
  Draw(Box<Draw>),
  Record(Record),
}

impl RecordMode {
  pub fn with(kind: &str) -> Self {
    match kind {
      "record-name" => RecordMode::Record(Record {
        label_with_name: true,
      }),
      "record-id" => RecordMode::Record(Record {
        label_with_name: false,
      }),
      _ => RecordMode::Draw(Box::default()),
    }
  }

  fn save_result(
    &self,
    path: &Path,
    frame: &Frame,
    result: &DetectionBatch,
  ) -> Result<(), DirectoryRecordOutputError> {
    match self {
      RecordMode::Draw(draw) => draw.draw_detection(frame, result).save(path)?,
      RecordMode::Record(record) => {
        frame.to_rgb_image().save(path)?;
        record.record(result, path)?;
      }
    }
    Ok(())
  }
}

/// `folder://<目录>[?record[=id]&always]`
///
/// 文件按 `年/月/日/时-分-秒-序号.png` 存放；未设置 `always` 时只保存有检测结果的帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  mode: RecordMode,
  frame_counter: Mutex<u32>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| if v == "id" { "record-id" } else { "record-name" })
      .unwrap_or("draw");
    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let directory = urlencoding::decode(uri.path())?.into_owned();

    Ok(Self::new(directory, RecordMode::with(kind), always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>, mode: RecordMode, always: bool) -> Self {
    Self {
      directory: directory.into(),
      mode,
      frame_counter: Mutex::new(0),
      always,
    }
  }

  /// 仅对标注模式生效
  pub fn with_style(mut self, style: DrawStyle) -> Self {
    if let RecordMode::Draw(_) = self.mode {
      self.mode = RecordMode::Draw(Box::new(Draw::new(style)));
    }
    self
  }

  fn frame_id(&self) -> Result<u32, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::Poisoned)?;
    *counter = counter.wrapping_add(1);
    Ok(*counter)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Local::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:06}.png",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }
}

impl Render<Frame, DetectionBatch> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectionBatch) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      debug!("本帧无检测结果，跳过保存");
      return Ok(());
    }
    let path = self.frame_path()?;
    self.mode.save_result(&path, frame, result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::postprocess::{BoundingBox, Detection};
  use image::GrayImage;

  fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
      let path = entry.unwrap().path();
      if path.is_dir() {
        out.extend(files_under(&path));
      } else {
        out.push(path);
      }
    }
    out.sort();
    out
  }

  #[test]
  fn empty_results_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = Frame::from(GrayImage::new(8, 8));

    let output = DirectoryRecordOutput::new(dir.path(), RecordMode::with("draw"), false);
    output.render_result(&frame, &DetectionBatch::empty()).unwrap();
    assert!(files_under(dir.path()).is_empty());

    let output = DirectoryRecordOutput::new(dir.path(), RecordMode::with("draw"), true);
    output.render_result(&frame, &DetectionBatch::empty()).unwrap();
    assert_eq!(files_under(dir.path()).len(), 1);
  }

  #[test]
  fn record_mode_writes_text_next_to_image() {
    let dir = tempfile::tempdir().unwrap();
    let url = url::Url::parse(&format!("folder://{}?record=id", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let batch = DetectionBatch::from(vec![Detection {
      bbox: BoundingBox::new(1.0, 1.0, 3.0, 3.0),
      confidence: 0.9,
      class_id: 0,
      class_name: "vein".to_string(),
    }]);
    output.render_result(&Frame::from(GrayImage::new(8, 8)), &batch).unwrap();

    let files = files_under(dir.path());
    assert_eq!(files.len(), 2);
    let text = files.iter().find(|p| p.extension().is_some_and(|e| e == "txt")).unwrap();
    assert!(std::fs::read_to_string(text).unwrap().starts_with("0, 0.9000"));
  }
}
