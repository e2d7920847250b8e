// 该文件是 Beifeng （北风） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use crate::profile::StageObserver;

pub trait Model {
  type Input: ?Sized;
  type Output;
  type Error;

  /// 每次推理需要的输入数量
  fn batch_size(&self) -> usize;

  fn infer(
    &mut self,
    input: &Self::Input,
    observer: Option<&mut dyn StageObserver>,
  ) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x1, y1, x2, y2]，原图像素坐标
}

impl DetectItem {
  pub fn x1(&self) -> f32 {
    self.bbox[0]
  }

  pub fn y1(&self) -> f32 {
    self.bbox[1]
  }

  pub fn x2(&self) -> f32 {
    self.bbox[2]
  }

  pub fn y2(&self) -> f32 {
    self.bbox[3]
  }
}

/// 单张图像的检测结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub mod decode;
mod fasterrcnn;
pub use self::fasterrcnn::{FasterRcnn, FasterRcnnBuilder, FasterRcnnError};
