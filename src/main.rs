// 该文件是 Beifeng （北风） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::{
  Arc,
  atomic::{AtomicBool, Ordering},
};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use beifeng::{
  input::ImageListInput,
  model::FasterRcnnBuilder,
  output::{ConsoleOutput, DirectoryRecordOutput, OutputWrapper},
  profile::TimeStamp,
  runtime::RknpuRuntime,
  task::{BatchTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  println!("Beifeng 批量检测");
  println!("==================");
  println!("图像列表: {}", args.image_list.display());
  println!("模型文件路径: {}", args.model.display());
  println!("设备号: {}", args.device_id);
  println!("置信度阈值: {}", args.score_threshold);
  println!("输出目录: {}", args.output_dir.display());
  println!();

  anyhow::ensure!(
    args.image_list.is_file(),
    "找不到输入图像列表文件: {}",
    args.image_list.display()
  );
  anyhow::ensure!(
    args.model.is_file(),
    "找不到有效的模型文件: {}",
    args.model.display()
  );

  let stop = Arc::new(AtomicBool::new(false));
  {
    let stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
      warn!("收到中断信号，当前批次结束后退出...");
      stop.store(true, Ordering::SeqCst);
    })
    .context("设置 Ctrl-C 处理函数失败")?;
  }

  let input_shape = args.input_shape;
  let model = FasterRcnnBuilder::new(args.model.clone(), args.device_id)
    .score_threshold(args.score_threshold)
    .build_with(|device_id| RknpuRuntime::open(device_id, input_shape))
    .context("创建检测管线失败")?;
  info!("批大小: {}", model.batch_size());

  let input = ImageListInput::open(&args.image_list)?;
  let output = vec![
    OutputWrapper::Console(ConsoleOutput),
    OutputWrapper::DirectoryRecordOutput(
      DirectoryRecordOutput::new(args.output_dir.clone()).with_record(args.record),
    ),
  ];

  let mut timer = TimeStamp::new();
  let report = BatchTask::new()
    .with_stop_flag(stop)
    .with_observer(&mut timer)
    .run_task(input, model, output)?;

  timer.show_summary("Faster-RCNN");
  println!();
  println!("处理完成!");
  println!("总批次: {}", report.batches);
  println!("总图像数: {}", report.images);
  println!("总检测数: {}", report.detections);

  Ok(())
}
