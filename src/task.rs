// 该文件是 Beifeng （北风） 项目的一部分。
// src/task.rs - 批量检测任务
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use anyhow::Context;
use image::RgbImage;
use tracing::{debug, info, warn};

use crate::{
  input::ImageFrame,
  model::{DetectResult, Model},
  output::Render,
  profile::{StageObserver, reborrow},
};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TaskReport {
  pub batches: usize,
  pub images: usize,
  pub detections: usize,
  /// 不足一个批次而未处理的图像
  pub skipped: usize,
  pub interrupted: bool,
}

/// 按模型批大小聚合输入图像，逐批检测并输出
#[derive(Default)]
pub struct BatchTask<'a> {
  stop: Option<Arc<AtomicBool>>,
  observer: Option<&'a mut dyn StageObserver>,
}

impl<'a> BatchTask<'a> {
  pub fn new() -> Self {
    Self::default()
  }

  /// 每个批次开始前检查停止标志
  pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
    self.stop = Some(stop);
    self
  }

  pub fn with_observer(mut self, observer: &'a mut dyn StageObserver) -> Self {
    self.observer = Some(observer);
    self
  }
}

fn stopped(stop: &Option<Arc<AtomicBool>>) -> bool {
  stop
    .as_ref()
    .is_some_and(|stop| stop.load(Ordering::SeqCst))
}

impl<'a, E, ME, RE, I, M, O> Task<I, M, O> for BatchTask<'a>
where
  E: std::error::Error + Send + Sync + 'static,
  ME: std::error::Error + Send + Sync + 'static,
  RE: std::error::Error + Send + Sync + 'static,
  I: Iterator<Item = Result<ImageFrame, E>>,
  M: Model<Input = [RgbImage], Output = Vec<DetectResult>, Error = ME>,
  O: Render<ImageFrame, DetectResult, Error = RE>,
{
  type Output = TaskReport;
  type Error = anyhow::Error;

  fn run_task(self, input: I, mut model: M, output: O) -> Result<Self::Output, Self::Error> {
    let batch_size = model.batch_size();
    anyhow::ensure!(batch_size > 0, "模型批大小为 0");
    info!("开始任务, 批大小 {}", batch_size);

    let mut report = TaskReport::default();
    let mut names = Vec::with_capacity(batch_size);
    let mut images = Vec::with_capacity(batch_size);
    let BatchTask { stop, mut observer } = self;

    for frame in input {
      if names.is_empty() && stopped(&stop) {
        warn!("中断信号接收，退出任务循环");
        report.interrupted = true;
        break;
      }

      let frame = frame.context("读取输入图像失败")?;
      debug!("加入批次: {}", frame.name);
      names.push(frame.name);
      images.push(frame.image);
      if images.len() < batch_size {
        continue;
      }

      let results = model
        .infer(&images, reborrow(&mut observer))
        .with_context(|| format!("第 {} 批推理失败", report.batches + 1))?;
      anyhow::ensure!(
        results.len() == images.len(),
        "模型返回 {} 个结果, 期望 {}",
        results.len(),
        images.len()
      );

      let frames = names.drain(..).zip(images.drain(..));
      for ((name, image), result) in frames.zip(&results) {
        let frame = ImageFrame { name, image };
        output
          .render_result(&frame, result)
          .with_context(|| format!("输出 {} 失败", frame.name))?;
        report.detections += result.len();
        report.images += 1;
      }
      report.batches += 1;
    }

    if !images.is_empty() {
      warn!("剩余 {} 张图像不足一个批次，已跳过", images.len());
      report.skipped = images.len();
    }

    info!(
      "任务完成: {} 批, {} 张图像, {} 个目标",
      report.batches, report.images, report.detections
    );
    Ok(report)
  }
}
