// 该文件是 Mailuo （脉络） 项目的一部分。
// src/bin/enhance.rs - 仅执行静脉增强
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use mailuo::{
  FromUrl,
  config::ConfigStore,
  enhance::FrameEnhancer,
  input::InputWrapper,
  model::DetectionBatch,
  output::{Render, SaveImageFileOutput},
};
use tracing::info;

/// 对单张图像执行增强并保存
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// YAML 配置文件
  #[arg(long, value_name = "FILE", default_value = "config/mailuo.yaml")]
  pub config: PathBuf,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let store = ConfigStore::load(&args.config);
  let enhancer = FrameEnhancer::from_store(&store)?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = SaveImageFileOutput::from_url(&args.output)?;

  let now = std::time::Instant::now();
  for frame in input.take(1) {
    let enhanced = enhancer.enhance(&frame);
    info!("增强完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&enhanced, &DetectionBatch::empty())?;
  }

  Ok(())
}
