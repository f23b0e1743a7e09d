// 该文件是 Mailuo （脉络） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Parser;
use url::Url;

/// Mailuo 近红外静脉增强与检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入来源
  /// - 单张图像: image:///path/to/frame.png
  /// - 图像目录: folder:///path/to/frames
  #[arg(long, value_name = "SOURCE", required_unless_present = "camera_settings")]
  pub input: Option<Url>,

  /// 输出路径
  /// - 标注图像: image:///path/to/out.png
  /// - 按日期记录: folder:///path/to/records[?record[=id]&always]
  #[arg(long, value_name = "OUTPUT", required_unless_present = "camera_settings")]
  pub output: Option<Url>,

  /// 检测模型，例如 replay:///path/to/detections.json；缺省时只做增强
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,

  /// 类别名称文件，每行一个
  #[arg(long, value_name = "FILE")]
  pub classes: Option<PathBuf>,

  /// YAML 配置文件
  #[arg(long, value_name = "FILE", default_value = "config/mailuo.yaml")]
  pub config: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IoU 阈值 (0.0 - 1.0)，覆盖配置文件
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,

  /// 推理设备: cpu、cuda[:N] 或 npu
  #[arg(long, value_name = "DEVICE")]
  pub device: Option<String>,

  /// 最大处理帧数，0 表示无限制
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: usize,

  /// 以 JSON 打印推荐的摄像头参数后退出
  #[arg(long)]
  pub camera_settings: bool,
}
