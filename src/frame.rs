// 该文件是 Beifeng （北风） 项目的一部分。
// src/frame.rs - NHWC 帧预处理
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

use std::{borrow::Cow, str::FromStr};

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;

use crate::runtime::{DataType, Shape};

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("无效的网络输入形状: {0}")]
  InvalidInputShape(Shape),
  #[error("不支持的输入通道数: {0}")]
  UnsupportedChannels(usize),
  #[error("不支持的输入元素类型: {0}")]
  UnsupportedInputType(DataType),
  #[error("未知的通道顺序: {0}")]
  UnknownChannelOrder(String),
}

/// 网络输入几何
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetGeometry {
  pub batch: usize,
  pub height: usize,
  pub width: usize,
  pub channels: usize,
}

impl NetGeometry {
  /// 由首个输入形状推导，支持 `[N, H, W, C]` 与 `[H, W, C]`
  pub fn from_shape(shape: &Shape) -> Result<Self, FrameError> {
    let geometry = match *shape.dims() {
      [batch, height, width, channels] => NetGeometry {
        batch,
        height,
        width,
        channels,
      },
      [height, width, channels] => NetGeometry {
        batch: 1,
        height,
        width,
        channels,
      },
      _ => return Err(FrameError::InvalidInputShape(shape.clone())),
    };

    if geometry.batch == 0 || geometry.height == 0 || geometry.width == 0 {
      return Err(FrameError::InvalidInputShape(shape.clone()));
    }
    if geometry.channels != RGB_CHANNELS {
      return Err(FrameError::UnsupportedChannels(geometry.channels));
    }
    Ok(geometry)
  }

  /// 单张图像的元素数量
  pub fn image_elements(&self) -> usize {
    self.height * self.width * self.channels
  }
}

/// 网络期望的通道顺序
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

impl FromStr for ChannelOrder {
  type Err = FrameError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "rgb" => Ok(ChannelOrder::Rgb),
      "bgr" => Ok(ChannelOrder::Bgr),
      _ => Err(FrameError::UnknownChannelOrder(s.to_string())),
    }
  }
}

/// 缩放到网络尺寸、调整通道顺序并按元素类型编码，追加到 `dst`
pub fn stage_image(
  image: &RgbImage,
  geometry: &NetGeometry,
  order: ChannelOrder,
  dtype: DataType,
  dst: &mut Vec<u8>,
) -> Result<(), FrameError> {
  let (width, height) = (geometry.width as u32, geometry.height as u32);
  let resized = if image.dimensions() == (width, height) {
    Cow::Borrowed(image)
  } else {
    Cow::Owned(image::imageops::resize(
      image,
      width,
      height,
      FilterType::Triangle,
    ))
  };

  let pixels = resized.pixels().flat_map(|pixel| {
    let [r, g, b] = pixel.0;
    match order {
      ChannelOrder::Rgb => [r, g, b],
      ChannelOrder::Bgr => [b, g, r],
    }
  });

  match dtype {
    DataType::UInt8 => dst.extend(pixels),
    DataType::Float32 => dst.extend(pixels.flat_map(|v| (v as f32).to_le_bytes())),
    other => return Err(FrameError::UnsupportedInputType(other)),
  }
  Ok(())
}
