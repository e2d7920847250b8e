// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageFrame,
  model::DetectResult,
  output::{
    Render,
    draw::{Draw, Record},
  },
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("URI 路径解码失败: {0}")]
  PathDecode(String),
}

/// 把画好框的图像以原文件名写入目录，可选同名 JSON 记录
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: bool,
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    Self {
      directory: directory.into(),
      draw: Draw::default(),
      record: false,
    }
  }

  pub fn with_record(mut self, record: bool) -> Self {
    self.record = record;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn frame_path(&self, frame: &ImageFrame) -> PathBuf {
    self.directory.join(&frame.name)
  }
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let directory = urlencoding::decode(uri.path())
      .map_err(|e| DirectoryRecordOutputError::PathDecode(e.to_string()))?
      .into_owned();
    let record = uri.query_pairs().any(|(k, _)| k == "record");

    Ok(DirectoryRecordOutput::new(directory).with_record(record))
  }
}

impl Render<ImageFrame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    std::fs::create_dir_all(&self.directory)?;

    let path = self.frame_path(frame);
    let image = self.draw.draw_detection(&frame.image, result);
    image.save(&path)?;
    debug!("已保存 {}", path.display());

    if self.record {
      Record.record(&frame.name, result, &path)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage};
  use url::Url;

  use super::*;
  use crate::model::DetectItem;

  fn frame(name: &str) -> ImageFrame {
    ImageFrame {
      name: name.to_string(),
      image: RgbImage::from_pixel(32, 24, Rgb([255, 255, 255])),
    }
  }

  #[test]
  fn url_does_not_touch_the_filesystem() {
    let url = Url::parse("folder:///nonexistent/result_imgs?record").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory(), Path::new("/nonexistent/result_imgs"));
    assert!(output.record);
    assert!(!output.directory().exists());

    let url = Url::parse("console:").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn annotated_image_keeps_its_name() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("result_imgs");
    let output = DirectoryRecordOutput::new(&target).with_record(true);

    let result: DetectResult = vec![DetectItem {
      class_id: 3,
      score: 0.75,
      bbox: [4.0, 4.0, 20.0, 16.0],
    }]
    .into();
    output.render_result(&frame("cat.png"), &result).unwrap();

    let saved = image::open(target.join("cat.png")).unwrap().to_rgb8();
    assert_eq!(saved.dimensions(), (32, 24));
    assert_eq!(*saved.get_pixel(4, 4), Rgb([0, 0, 255]));
    assert_eq!(*saved.get_pixel(12, 10), Rgb([255, 255, 255]));

    let json = std::fs::read_to_string(target.join("cat.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["detections"][0]["class_id"], 3);
  }

  #[test]
  fn empty_result_still_writes_the_image() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path());
    output
      .render_result(&frame("empty.png"), &DetectResult::from(vec![]))
      .unwrap();
    assert!(dir.path().join("empty.png").exists());
    assert!(!dir.path().join("empty.json").exists());
  }
}
