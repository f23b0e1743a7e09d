// 该文件是 Mailuo （脉络） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use mailuo::{
  FromUrl,
  camera::CameraSettings,
  config::{ConfigStore, DetectionParameters},
  enhance::FrameEnhancer,
  input::InputWrapper,
  model::{ClassNames, Device, ReplayModel, VeinDetector},
  output::{OutputWrapper, draw::DrawStyle},
  task::ContinuousTask,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();
  let store = ConfigStore::load(&args.config);

  if args.camera_settings {
    let settings = CameraSettings::from_store(&store)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    return Ok(());
  }

  let input_url = args.input.context("缺少 --input")?;
  let output_url = args.output.context("缺少 --output")?;
  info!("输入来源: {}", input_url);
  info!("输出路径: {}", output_url);

  let mut params = DetectionParameters::from_store(&store)?;
  if let Some(confidence) = args.confidence {
    params.confidence_threshold = confidence;
  }
  if let Some(iou) = args.nms_threshold {
    params.iou_threshold = iou;
  }
  params.validate()?;

  let device: Device = match args.device {
    Some(device) => device.parse()?,
    None => store.get("model.device", "cpu".to_string()).parse()?,
  };

  let model_url = match args.model {
    Some(url) => Some(url),
    None => store
      .get::<Option<String>>("model.primary_model_path", None)
      .and_then(|s| match url::Url::parse(&s) {
        Ok(url) => Some(url),
        Err(e) => {
          warn!("model.primary_model_path 不是合法的 URL ({}): {}", s, e);
          None
        }
      }),
  };
  let model = model_url.as_ref().and_then(|url| {
    info!("模型: {}", url);
    ReplayModel::from_url_or_skip(url)
  });

  let class_names = match args.classes {
    Some(path) => ClassNames::load(path),
    None => match store.get::<Option<String>>("model.class_path", None) {
      Some(path) => ClassNames::load(path),
      None => ClassNames::default(),
    },
  };

  let enhancer = FrameEnhancer::from_store(&store)?;
  let detector = VeinDetector::new(model, enhancer, params, class_names).with_device(device);
  info!(
    "置信度阈值: {}，NMS 阈值: {}，设备: {}",
    params.confidence_threshold, params.iou_threshold, device
  );

  let input = InputWrapper::from_url(&input_url)?;
  let output = OutputWrapper::from_url(&output_url)?.with_style(DrawStyle::from_store(&store)?);

  ContinuousTask::default()
    .with_frame_number(Some(args.max_frames))
    .with_interrupt()
    .run(input, &detector, output)?;

  Ok(())
}
