// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/image_list.rs - 图像列表文件输入
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

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use url::Url;

use super::{ImageFrame, InputError, load_frame, url_path};
use crate::{FromUrl, FromUrlWithScheme};

/// 每行一个图像路径的列表文件，图像按需读取
pub struct ImageListInput {
  paths: std::vec::IntoIter<PathBuf>,
}

impl ImageListInput {
  pub fn open(list: impl AsRef<Path>) -> Result<Self, InputError> {
    let list = list.as_ref();
    if !list.exists() {
      return Err(InputError::ListNotFound(list.display().to_string()));
    }

    let content = std::fs::read_to_string(list).map_err(|source| InputError::Io {
      path: list.display().to_string(),
      source,
    })?;
    let paths = content
      .lines()
      .map(|line| line.trim_end_matches('\r'))
      .filter(|line| !line.trim().is_empty())
      .map(PathBuf::from)
      .collect::<Vec<_>>();

    info!("图像列表 {} 共 {} 项", list.display(), paths.len());
    Ok(Self {
      paths: paths.into_iter(),
    })
  }

  /// 尚未读取的图像数量
  pub fn remaining(&self) -> usize {
    self.paths.len()
  }
}

impl FromUrlWithScheme for ImageListInput {
  const SCHEME: &'static str = "list";
}

impl FromUrl for ImageListInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    ImageListInput::open(url_path(url)?)
  }
}

impl Iterator for ImageListInput {
  type Item = Result<ImageFrame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.next()?;
    debug!("处理 {}", path.display());
    Some(load_frame(&path))
  }
}

#[cfg(test)]
mod tests {
  use image::{Rgb, RgbImage};

  use super::*;

  #[test]
  fn missing_list_is_reported() {
    assert!(matches!(
      ImageListInput::open("/nonexistent/list.txt"),
      Err(InputError::ListNotFound(_))
    ));
  }

  #[test]
  fn lines_are_read_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    RgbImage::from_pixel(3, 2, Rgb([0, 0, 0])).save(&a).unwrap();
    RgbImage::from_pixel(5, 4, Rgb([9, 9, 9])).save(&b).unwrap();

    let list = dir.path().join("list.txt");
    std::fs::write(
      &list,
      format!("{}\r\n\n{}\n", a.display(), b.display()),
    )
    .unwrap();

    let input = ImageListInput::open(&list).unwrap();
    assert_eq!(input.remaining(), 2);
    let frames = input.collect::<Result<Vec<_>, _>>().unwrap();
    let names: Vec<&str> = frames.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a.png", "b.png"]);
    assert_eq!(frames[1].image.dimensions(), (5, 4));
  }

  #[test]
  fn bad_entry_surfaces_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let list = dir.path().join("list.txt");
    std::fs::write(&list, "/nonexistent/x.png\n").unwrap();
    let mut input = ImageListInput::open(&list).unwrap();
    assert!(input.next().unwrap().is_err());
    assert!(input.next().is_none());
  }
}
