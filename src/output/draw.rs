// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use chrono::Utc;
use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde_json::json;

use crate::model::{DetectItem, DetectResult};

const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const BOX_THICKNESS: u32 = 2;

pub struct Draw {
  color: [u8; 3],
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      color: BOX_COLOR,
      thickness: BOX_THICKNESS,
    }
  }
}

impl Draw {
  // 坐标截断为整数像素，边框向内加粗
  fn draw_bbox(&self, image: &mut RgbImage, item: &DetectItem) {
    let x_min = item.x1() as i32;
    let y_min = item.y1() as i32;
    let x_max = item.x2() as i32;
    let y_max = item.y2() as i32;

    for t in 0..self.thickness as i32 {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.color));
    }
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    for item in result.items.iter() {
      self.draw_bbox(image, item);
    }
  }

  pub fn draw_detection(&self, image: &RgbImage, result: &DetectResult) -> RgbImage {
    let mut image = image.clone();
    self.draw_detections_on_image(&mut image, result);
    image
  }
}

/// 检测结果的 JSON 记录
pub struct Record;

impl Record {
  pub fn to_json(&self, name: &str, result: &DetectResult) -> serde_json::Value {
    let detections: Vec<serde_json::Value> = result
      .items
      .iter()
      .map(|item| {
        json!({
          "class_id": item.class_id,
          "score": item.score,
          "bbox": item.bbox,
        })
      })
      .collect();

    json!({
      "image": name,
      "timestamp": Utc::now().to_rfc3339(),
      "detections": detections,
    })
  }

  pub fn record(
    &self,
    name: &str,
    result: &DetectResult,
    path: &std::path::Path,
  ) -> Result<(), std::io::Error> {
    let content = serde_json::to_string_pretty(&self.to_json(name, result))?;
    std::fs::write(path.with_extension("json"), content)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn result(bbox: [f32; 4]) -> DetectResult {
    vec![DetectItem {
      class_id: 1,
      score: 0.8,
      bbox,
    }]
    .into()
  }

  #[test]
  fn box_edges_are_painted() {
    let image = RgbImage::new(20, 20);
    let drawn = Draw::default().draw_detection(&image, &result([2.0, 3.0, 12.0, 15.0]));
    let blue = Rgb(BOX_COLOR);
    assert_eq!(*drawn.get_pixel(2, 3), blue);
    assert_eq!(*drawn.get_pixel(3, 4), blue);
    assert_eq!(*drawn.get_pixel(11, 14), blue);
    assert_eq!(*drawn.get_pixel(7, 9), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_and_outside_boxes_are_ignored() {
    let image = RgbImage::new(10, 10);
    let draw = Draw::default();
    let drawn = draw.draw_detection(&image, &result([5.0, 5.0, 5.0, 9.0]));
    assert_eq!(drawn, image);
    // 超出图像的部分被裁剪
    let drawn = draw.draw_detection(&image, &result([-5.0, -5.0, 40.0, 40.0]));
    assert_eq!(drawn.dimensions(), (10, 10));
  }

  #[test]
  fn record_json_lists_detections() {
    let value = Record.to_json("a.jpg", &result([1.0, 2.0, 3.0, 4.0]));
    assert_eq!(value["image"], "a.jpg");
    assert_eq!(value["detections"][0]["class_id"], 1);
    assert_eq!(value["detections"][0]["bbox"][2], 3.0);
  }
}
