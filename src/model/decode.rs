// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/decode.rs - 检测输出解码
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

//! 检测输出为定长记录序列，每条 6 个 f32：
//!
//! ```text
//! [class_id, score, x1, y1, x2, y2]
//! ```
//!
//! 坐标位于网络输入空间。末尾不足一条的元素被忽略。

use super::{DetectItem, DetectResult};

pub const RECORD_STRIDE: usize = 6;
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;

const FIELD_CLASS_ID: usize = 0;
const FIELD_SCORE: usize = 1;
const FIELD_X1: usize = 2;
const FIELD_Y1: usize = 3;
const FIELD_X2: usize = 4;
const FIELD_Y2: usize = 5;

/// 一条未经过滤的原始记录
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord<'a> {
  fields: &'a [f32; RECORD_STRIDE],
}

impl RawRecord<'_> {
  pub fn class_id(&self) -> f32 {
    self.fields[FIELD_CLASS_ID]
  }

  pub fn score(&self) -> f32 {
    self.fields[FIELD_SCORE]
  }

  pub fn bbox(&self) -> [f32; 4] {
    [
      self.fields[FIELD_X1],
      self.fields[FIELD_Y1],
      self.fields[FIELD_X2],
      self.fields[FIELD_Y2],
    ]
  }
}

/// 平铺浮点序列上的记录视图
#[derive(Debug, Clone, Copy)]
pub struct DetectionRecords<'a> {
  data: &'a [f32],
}

impl<'a> DetectionRecords<'a> {
  pub fn new(data: &'a [f32]) -> Self {
    Self { data }
  }

  /// 完整记录条数
  pub fn len(&self) -> usize {
    self.data.len() / RECORD_STRIDE
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// 末尾被忽略的元素数量
  pub fn remainder(&self) -> usize {
    self.data.len() % RECORD_STRIDE
  }

  pub fn iter(&self) -> impl Iterator<Item = RawRecord<'a>> + 'a {
    let data = self.data;
    data.chunks_exact(RECORD_STRIDE).filter_map(|chunk| {
      <&[f32; RECORD_STRIDE]>::try_from(chunk)
        .ok()
        .map(|fields| RawRecord { fields })
    })
  }
}

/// 网络输入尺寸到原图尺寸的线性缩放
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
  pub original_width: f32,
  pub original_height: f32,
  pub network_width: f32,
  pub network_height: f32,
}

impl Rescale {
  pub fn new(original: (u32, u32), network: (usize, usize)) -> Self {
    Self {
      original_width: original.0 as f32,
      original_height: original.1 as f32,
      network_width: network.0 as f32,
      network_height: network.1 as f32,
    }
  }

  pub fn x(&self, x: f32) -> f32 {
    x * self.original_width / self.network_width
  }

  pub fn y(&self, y: f32) -> f32 {
    y * self.original_height / self.network_height
  }
}

/// 按阈值（严格大于）过滤并缩放，保持记录原有顺序
pub fn decode_detections(data: &[f32], threshold: f32, rescale: &Rescale) -> DetectResult {
  DetectionRecords::new(data)
    .iter()
    .filter(|record| record.score() > threshold)
    .map(|record| {
      let [x1, y1, x2, y2] = record.bbox();
      DetectItem {
        class_id: record.class_id() as u32,
        score: record.score(),
        bbox: [
          rescale.x(x1),
          rescale.y(y1),
          rescale.x(x2),
          rescale.y(y2),
        ],
      }
    })
    .collect::<Vec<_>>()
    .into()
}

#[cfg(test)]
mod tests {
  use super::*;

  const IDENTITY: Rescale = Rescale {
    original_width: 300.0,
    original_height: 300.0,
    network_width: 300.0,
    network_height: 300.0,
  };

  #[test]
  fn records_are_counted_by_stride() {
    let data = [0f32; 20];
    let records = DetectionRecords::new(&data);
    assert_eq!(records.len(), 3);
    assert_eq!(records.remainder(), 2);
    assert_eq!(records.iter().count(), 3);
    assert!(DetectionRecords::new(&data[..5]).is_empty());
  }

  #[test]
  fn field_order_is_class_score_box() {
    let data = [3.0, 0.5, 1.0, 2.0, 3.0, 4.0];
    let record = DetectionRecords::new(&data).iter().next().unwrap();
    assert_eq!(record.class_id(), 3.0);
    assert_eq!(record.score(), 0.5);
    assert_eq!(record.bbox(), [1.0, 2.0, 3.0, 4.0]);
  }

  #[test]
  fn threshold_is_strict() {
    let data = [
      1.0, 0.3, 0.0, 0.0, 1.0, 1.0, //
      2.0, 0.30001, 0.0, 0.0, 1.0, 1.0,
    ];
    let result = decode_detections(&data, DEFAULT_SCORE_THRESHOLD, &IDENTITY);
    assert_eq!(result.len(), 1);
    assert_eq!(result.items[0].class_id, 2);
    assert!(result.items.iter().all(|item| item.score > DEFAULT_SCORE_THRESHOLD));
  }

  #[test]
  fn rescale_is_per_axis() {
    let data = [2.0, 0.9, 30.0, 30.0, 150.0, 150.0];
    let rescale = Rescale::new((640, 480), (300, 300));
    let result = decode_detections(&data, DEFAULT_SCORE_THRESHOLD, &rescale);
    assert_eq!(result.items[0].bbox, [64.0, 48.0, 320.0, 240.0]);
  }

  #[test]
  fn order_is_preserved_and_remainder_ignored() {
    let data = [
      5.0, 0.4, 0.0, 0.0, 0.0, 0.0, //
      1.0, 0.1, 0.0, 0.0, 0.0, 0.0, //
      7.0, 0.8, 0.0, 0.0, 0.0, 0.0, //
      9.0, 0.99, 0.0, 0.0,
    ];
    let result = decode_detections(&data, DEFAULT_SCORE_THRESHOLD, &IDENTITY);
    let classes: Vec<u32> = result.items.iter().map(|item| item.class_id).collect();
    assert_eq!(classes, vec![5, 7]);
  }

  #[test]
  fn class_id_is_truncated() {
    let data = [2.7, 0.9, 0.0, 0.0, 1.0, 1.0, -1.0, 0.9, 0.0, 0.0, 1.0, 1.0];
    let result = decode_detections(&data, DEFAULT_SCORE_THRESHOLD, &IDENTITY);
    assert_eq!(result.items[0].class_id, 2);
    assert_eq!(result.items[1].class_id, 0);
  }

  #[test]
  fn nan_scores_are_dropped() {
    let data = [1.0, f32::NAN, 0.0, 0.0, 1.0, 1.0];
    assert!(decode_detections(&data, DEFAULT_SCORE_THRESHOLD, &IDENTITY).is_empty());
  }
}
