// 该文件是 Beifeng （北风） 项目的一部分。
// src/input.rs - 图像输入
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

use std::path::Path;

use image::{ImageReader, RgbImage};
use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme};

mod image_list;
mod read_image_file;

pub use self::image_list::ImageListInput;
pub use self::read_image_file::ImageFileInput;

/// 一张待检测的图像及其文件名
#[derive(Debug, Clone)]
pub struct ImageFrame {
  pub name: String,
  pub image: RgbImage,
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("找不到输入图像列表文件: {0}")]
  ListNotFound(String),
  #[error("I/O 错误 [{path}]: {source}")]
  Io {
    path: String,
    source: std::io::Error,
  },
  #[error("读取图像失败 [{path}]: {source}")]
  ImageLoad {
    path: String,
    source: image::ImageError,
  },
  #[error("路径没有文件名: {0}")]
  MissingFileName(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("URI 路径解码失败: {0}")]
  PathDecode(String),
}

/// 读取并解码为 RGB 图像，文件名取路径最后一段
pub fn load_frame(path: &Path) -> Result<ImageFrame, InputError> {
  let display = path.display().to_string();
  let name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .ok_or_else(|| InputError::MissingFileName(display.clone()))?;

  let image = ImageReader::open(path)
    .map_err(|source| InputError::Io {
      path: display.clone(),
      source,
    })?
    .decode()
    .map_err(|source| InputError::ImageLoad {
      path: display,
      source,
    })?
    .to_rgb8();

  Ok(ImageFrame { name, image })
}

fn url_path(url: &url::Url) -> Result<String, InputError> {
  urlencoding::decode(url.path())
    .map(|path| path.into_owned())
    .map_err(|e| InputError::PathDecode(e.to_string()))
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  ImageList(ImageListInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      ImageListInput::SCHEME => Ok(InputWrapper::ImageList(ImageListInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Iterator for InputWrapper {
  type Item = Result<ImageFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      InputWrapper::ImageList(input) => input.next(),
    }
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  #[test]
  fn load_frame_keeps_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cat.png");
    RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])).save(&path).unwrap();

    let frame = load_frame(&path).unwrap();
    assert_eq!(frame.name, "cat.png");
    assert_eq!(frame.image.dimensions(), (8, 6));
  }

  #[test]
  fn unreadable_image_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not an image").unwrap();
    assert!(matches!(
      load_frame(&path),
      Err(InputError::ImageLoad { .. })
    ));
    assert!(matches!(
      load_frame(&dir.path().join("missing.png")),
      Err(InputError::Io { .. })
    ));
  }

  #[test]
  fn wrapper_dispatches_on_scheme() {
    let url = url::Url::parse("rtsp://camera/stream").unwrap();
    assert!(matches!(
      InputWrapper::from_url(&url),
      Err(InputError::SchemeMismatch(_))
    ));
  }
}
