// 该文件是 Mailuo （脉络） 项目的一部分。
// src/task.rs - 单帧与连续帧处理任务
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

use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use std::thread;

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  frame::Frame,
  model::{DetectionBatch, Model, VeinDetector},
  output::Render,
};

pub trait Task<I, D, O>: Sized {
  type Error;
  fn run_task(self, input: I, detector: D, output: O) -> Result<(), Self::Error>;
}

/// 任务累计统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskSummary {
  pub frames: usize,
  pub detections: usize,
}

fn process_frame<M, O, RE>(
  detector: &VeinDetector<M>,
  output: &O,
  frame: &Frame,
) -> anyhow::Result<DetectionBatch>
where
  M: Model,
  O: Render<Frame, DetectionBatch, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  let now = Instant::now();
  let inference = detector.infer_frame(frame, detector.confidence_threshold());
  let elapsed_a = now.elapsed();
  output.render_result(&inference.enhanced, &inference.batch)?;
  let elapsed_b = now.elapsed();
  info!(
    "检测到 {} 条静脉，推理耗时: {:.2?} / 含输出: {:.2?}",
    inference.batch.len(),
    elapsed_a,
    elapsed_b
  );
  Ok(inference.batch)
}

pub struct OneShotTask;

impl<'a, M, I, O, RE> Task<I, &'a VeinDetector<M>, O> for OneShotTask
where
  M: Model,
  I: Iterator<Item = Frame>,
  O: Render<Frame, DetectionBatch, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, detector: &'a VeinDetector<M>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功: {}x{}，开始处理...", frame.width(), frame.height());
    process_frame(detector, &output, &frame)?;
    Ok(())
  }
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  handle_interrupt: bool,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number.filter(|&n| n > 0);
    self
  }

  /// 注册 Ctrl-C 处理器，在帧之间检查中断
  pub fn with_interrupt(mut self) -> Self {
    self.handle_interrupt = true;
    self
  }

  fn install_interrupt(&self) -> anyhow::Result<Option<Receiver<()>>> {
    if !self.handle_interrupt {
      return Ok(None);
    }
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法注册 Ctrl-C 处理器")?;
    Ok(Some(rx))
  }

  pub fn run<M, I, O, RE>(
    self,
    input: I,
    detector: &VeinDetector<M>,
    output: O,
  ) -> anyhow::Result<TaskSummary>
  where
    M: Model,
    I: Iterator<Item = Frame>,
    O: Render<Frame, DetectionBatch, Error = RE>,
    RE: std::error::Error + Sync + Send + 'static,
  {
    info!("开始任务...");
    let interrupt = self.install_interrupt()?;
    let mut summary = TaskSummary::default();

    for frame in input {
      summary.frames += 1;
      info!("处理第 {} 帧图像", summary.frames);
      summary.detections += process_frame(detector, &output, &frame)?.len();

      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
      if interrupt.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    info!(
      "任务完成，共处理 {} 帧，检测到 {} 条静脉",
      summary.frames, summary.detections
    );
    Ok(summary)
  }
}

impl<'a, M, I, O, RE> Task<I, &'a VeinDetector<M>, O> for ContinuousTask
where
  M: Model,
  I: Iterator<Item = Frame>,
  O: Render<Frame, DetectionBatch, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, detector: &'a VeinDetector<M>, output: O) -> Result<(), Self::Error> {
    self.run(input, detector, output).map(|_| ())
  }
}
