// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/console.rs - 终端输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;

use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageFrame,
  model::{DetectItem, DetectResult},
  output::Render,
};

/// 把每个检测结果打印到标准输出
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = super::OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(super::OutputError::SchemeMismatch(url.scheme().to_string()));
    }
    Ok(ConsoleOutput)
  }
}

impl ConsoleOutput {
  pub fn format_item(item: &DetectItem) -> String {
    format!(
      "class_id: {} Score: {:.6} : {},{},{},{}",
      item.class_id,
      item.score,
      item.x1() as i32,
      item.y1() as i32,
      item.x2() as i32,
      item.y2() as i32
    )
  }

  pub fn print(&self, frame: &ImageFrame, result: &DetectResult) {
    if !result.is_empty() {
      println!("{}: 检测到 {} 个对象", frame.name, result.len());
    }
    for item in result.items.iter() {
      println!("{}", Self::format_item(item));
    }
  }
}

impl Render<ImageFrame, DetectResult> for ConsoleOutput {
  type Error = Infallible;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    self.print(frame, result);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn coordinates_are_truncated() {
    let item = DetectItem {
      class_id: 2,
      score: 0.9,
      bbox: [64.7, 48.2, 320.9, 240.0],
    };
    assert_eq!(
      ConsoleOutput::format_item(&item),
      "class_id: 2 Score: 0.900000 : 64,48,320,240"
    );
  }
}
