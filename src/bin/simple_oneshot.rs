// 该文件是 Beifeng （北风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单张图像推理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use beifeng::{
  FromUrl,
  input::InputWrapper,
  model::FasterRcnnBuilder,
  output::OutputWrapper,
  profile::TimeStamp,
  runtime::{RknpuRuntime, Shape},
  task::{BatchTask, Task},
};

/// Beifeng 单张推理参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型，例如 frcnn:///path/model.rknn?device=0&threshold=0.3
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，image:///a.jpg 或 list:///images.txt
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，可重复：folder:///dir、folder:///dir?record、console:
  #[arg(long, value_name = "OUTPUT", required = true)]
  pub output: Vec<Url>,
  /// 网络输入形状 HxWxC
  #[arg(long, default_value = "300x300x3", value_name = "SHAPE")]
  pub input_shape: Shape,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  for output in &args.output {
    info!("输出路径: {}", output);
  }

  let input = InputWrapper::from_url(&args.input)?;
  let input_shape = args.input_shape;
  let model = FasterRcnnBuilder::from_url(&args.model)?
    .build_with(|device_id| RknpuRuntime::open(device_id, input_shape))?;
  let output = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;

  info!("开始推理...");
  let mut timer = TimeStamp::new();
  let report = BatchTask::new()
    .with_observer(&mut timer)
    .run_task(input, model, output)?;
  info!("推理完成, 共 {} 个目标", report.detections);
  timer.show_summary("oneshot");

  Ok(())
}
