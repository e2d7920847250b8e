// 该文件是 Beifeng （北风） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::ImageFrame, model::DetectResult};

pub trait Render<Frame, Output> {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

impl<F, D, T: Render<F, D>> Render<F, D> for Vec<T> {
  type Error = T::Error;

  fn render_result(&self, frame: &F, result: &D) -> Result<(), Self::Error> {
    self
      .iter()
      .try_for_each(|output| output.render_result(frame, result))
  }
}

pub mod draw;

mod console;
pub use self::console::ConsoleOutput;

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  Console(ConsoleOutput),
  DirectoryRecordOutput(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleOutput::SCHEME => Ok(OutputWrapper::Console(ConsoleOutput::from_url(url)?)),
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecordOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Render<ImageFrame, DetectResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => {
        output.print(frame, result);
        Ok(())
      }
      OutputWrapper::DirectoryRecordOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;

  struct Collect(RefCell<Vec<usize>>);

  impl Render<usize, ()> for Collect {
    type Error = String;

    fn render_result(&self, frame: &usize, _: &()) -> Result<(), Self::Error> {
      if *frame == 13 {
        return Err("unlucky".to_string());
      }
      self.0.borrow_mut().push(*frame);
      Ok(())
    }
  }

  #[test]
  fn vec_renders_every_output() {
    let outputs = vec![Collect(RefCell::new(vec![])), Collect(RefCell::new(vec![]))];
    outputs.render_result(&7, &()).unwrap();
    assert!(outputs.iter().all(|o| *o.0.borrow() == vec![7]));
    assert!(outputs.render_result(&13, &()).is_err());
  }

  #[test]
  fn output_urls_are_dispatched() {
    let console = Url::parse("console:").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&console),
      Ok(OutputWrapper::Console(_))
    ));

    let folder = Url::parse("folder:///tmp/result_imgs?record").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&folder),
      Ok(OutputWrapper::DirectoryRecordOutput(_))
    ));

    let video = Url::parse("video:///tmp/a.mp4").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&video),
      Err(OutputError::SchemeMismatch(_))
    ));
  }
}
