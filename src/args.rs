// 该文件是 Beifeng （北风） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use beifeng::{model::decode::DEFAULT_SCORE_THRESHOLD, runtime::Shape};
use clap::Parser;

/// Beifeng 批量检测参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 图像列表文件，每行一个图像路径
  #[arg(value_name = "IMAGE_LIST")]
  pub image_list: PathBuf,

  /// 预编译的模型文件路径
  #[arg(value_name = "MODEL")]
  pub model: PathBuf,

  /// 加速器设备号
  #[arg(value_name = "DEVICE_ID")]
  pub device_id: u32,

  /// 置信度阈值，严格大于该值的检测才会保留
  #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
  pub score_threshold: f32,

  /// 结果图像输出目录
  #[arg(long, default_value = "result_imgs", value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 同时为每张图像写入 JSON 检测记录
  #[arg(long)]
  pub record: bool,

  /// 网络输入形状 HxWxC
  #[arg(long, default_value = "300x300x3", value_name = "SHAPE")]
  pub input_shape: Shape,
}
