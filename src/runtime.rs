// 该文件是 Beifeng （北风） 项目的一部分。
// src/runtime.rs - 加速器运行时抽象
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

use std::{fmt, path::Path, str::FromStr};

use half::f16;
use thiserror::Error;

pub mod host;
#[cfg(feature = "rknpu")]
mod rknpu_backend;
#[cfg(feature = "rknpu")]
pub use self::rknpu_backend::{RknpuRuntime, RknpuTensor};

/// 张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
  Float32,
  Float16,
  Int8,
  UInt8,
  Int16,
  UInt16,
  Int32,
  UInt32,
}

impl DataType {
  pub fn byte_size(self) -> usize {
    match self {
      DataType::Int8 | DataType::UInt8 => 1,
      DataType::Float16 | DataType::Int16 | DataType::UInt16 => 2,
      DataType::Float32 | DataType::Int32 | DataType::UInt32 => 4,
    }
  }

  /// 总是以量化形式出现的类型
  pub fn is_quantized(self) -> bool {
    matches!(self, DataType::Int8)
  }

  pub fn is_integer(self) -> bool {
    !matches!(self, DataType::Float32 | DataType::Float16)
  }
}

impl fmt::Display for DataType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      DataType::Float32 => "f32",
      DataType::Float16 => "f16",
      DataType::Int8 => "i8",
      DataType::UInt8 => "u8",
      DataType::Int16 => "i16",
      DataType::UInt16 => "u16",
      DataType::Int32 => "i32",
      DataType::UInt32 => "u32",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
  pub fn new(dims: impl Into<Vec<usize>>) -> Self {
    Shape(dims.into())
  }

  pub fn dims(&self) -> &[usize] {
    &self.0
  }

  pub fn rank(&self) -> usize {
    self.0.len()
  }

  /// 元素总数，空形状视为 0
  pub fn count(&self) -> usize {
    if self.0.is_empty() {
      0
    } else {
      self.0.iter().product()
    }
  }
}

impl From<&[usize]> for Shape {
  fn from(dims: &[usize]) -> Self {
    Shape(dims.to_vec())
  }
}

/// 解析 `300x300x3` 形式的维度串，各维度须为正整数
impl FromStr for Shape {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let dims = s
      .split(['x', 'X'])
      .map(|dim| match dim.trim().parse::<usize>() {
        Ok(0) | Err(_) => Err(format!("无效的维度 '{}' (形状 {})", dim, s)),
        Ok(dim) => Ok(dim),
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Shape(dims))
  }
}

impl fmt::Display for Shape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let dims: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
    write!(f, "[{}]", dims.join(", "))
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
  pub dtype: DataType,
  pub shape: Shape,
  /// 仅量化类型有意义
  pub scale: f32,
}

impl TensorSpec {
  pub fn new(dtype: DataType, shape: Shape) -> Self {
    Self {
      dtype,
      shape,
      scale: 1.0,
    }
  }

  pub fn with_scale(mut self, scale: f32) -> Self {
    self.scale = scale;
    self
  }

  pub fn byte_size(&self) -> usize {
    self.shape.count() * self.dtype.byte_size()
  }

  /// `Int8`，或缩放因子不为 1 的整数类型
  pub fn is_quantized(&self) -> bool {
    self.dtype.is_quantized() || (self.dtype.is_integer() && self.scale != 1.0)
  }
}

/// 已加载网络的元信息
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkInfo {
  pub name: String,
  pub inputs: Vec<TensorSpec>,
  pub outputs: Vec<TensorSpec>,
}

#[derive(Error, Debug)]
pub enum RuntimeError {
  #[error("设备 {0} 不可用: {1}")]
  DeviceUnavailable(u32, String),
  #[error("模型加载失败 [{path}]: {reason}")]
  ModelLoad { path: String, reason: String },
  #[error("未知网络: {0}")]
  UnknownNetwork(String),
  #[error("设备内存分配失败: {0}")]
  Allocation(String),
  #[error("数据传输失败: {0}")]
  Transfer(String),
  #[error("推理执行失败: {0}")]
  Launch(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[cfg(feature = "rknpu")]
  #[error("RKNN 错误: {0}")]
  Rknn(rknpu::Error),
}

#[cfg(feature = "rknpu")]
impl From<rknpu::Error> for RuntimeError {
  fn from(err: rknpu::Error) -> Self {
    RuntimeError::Rknn(err)
  }
}

/// 设备侧张量，释放时归还设备内存
pub trait DeviceTensor {
  fn dtype(&self) -> DataType;
  fn shape(&self) -> &Shape;

  fn byte_size(&self) -> usize {
    self.shape().count() * self.dtype().byte_size()
  }
}

/// 绑定在单个设备上的推理运行时上下文
///
/// 张量由上下文分配，必须在上下文之前释放。所有操作均为同步阻塞调用。
pub trait Runtime {
  type Tensor: DeviceTensor;

  fn device_id(&self) -> u32;

  fn load_model(&mut self, path: &Path) -> Result<(), RuntimeError>;

  fn network_names(&self) -> Vec<String>;

  fn network_info(&self, name: &str) -> Result<NetworkInfo, RuntimeError>;

  fn alloc_tensor(&self, spec: &TensorSpec) -> Result<Self::Tensor, RuntimeError>;

  /// 将主机数据整体写入设备张量
  fn copy_to_device(&self, tensor: &mut Self::Tensor, data: &[u8]) -> Result<(), RuntimeError>;

  /// 将设备张量读回主机浮点缓冲区
  fn copy_to_host(&self, tensor: &Self::Tensor, dst: &mut [f32]) -> Result<(), RuntimeError>;

  /// 同步执行网络，返回时输出张量已就绪
  fn launch(
    &self,
    network: &str,
    inputs: &[Self::Tensor],
    outputs: &mut [Self::Tensor],
  ) -> Result<(), RuntimeError>;
}

/// 按元素类型把设备字节解释为 f32，仅支持浮点输出
pub fn bytes_to_f32(dtype: DataType, src: &[u8], dst: &mut [f32]) -> Result<(), RuntimeError> {
  let elem = dtype.byte_size();
  if src.len() != dst.len() * elem {
    return Err(RuntimeError::Transfer(format!(
      "缓冲区大小不匹配: 设备 {} 字节, 主机 {} 个 {} 元素",
      src.len(),
      dst.len(),
      dtype
    )));
  }

  match dtype {
    DataType::Float32 => {
      for (out, chunk) in dst.iter_mut().zip(src.chunks_exact(4)) {
        *out = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
      }
    }
    DataType::Float16 => {
      for (out, chunk) in dst.iter_mut().zip(src.chunks_exact(2)) {
        *out = f16::from_le_bytes([chunk[0], chunk[1]]).to_f32();
      }
    }
    other => {
      return Err(RuntimeError::Transfer(format!(
        "不支持的输出元素类型: {}",
        other
      )));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shape_count_and_display() {
    let shape = Shape::new(vec![1, 300, 300, 3]);
    assert_eq!(shape.count(), 270_000);
    assert_eq!(shape.rank(), 4);
    assert_eq!(shape.to_string(), "[1, 300, 300, 3]");
    assert_eq!(Shape::default().count(), 0);
  }

  #[test]
  fn shape_from_dimension_string() {
    let shape: Shape = "300x300x3".parse().unwrap();
    assert_eq!(shape.dims(), &[300, 300, 3]);
    let shape: Shape = "2X224x224x3".parse().unwrap();
    assert_eq!(shape.rank(), 4);
    assert!("300x0x3".parse::<Shape>().is_err());
    assert!("300xx3".parse::<Shape>().is_err());
  }

  #[test]
  fn scaled_integer_specs_are_quantized() {
    let shape = Shape::new(vec![300, 300, 3]);
    assert!(TensorSpec::new(DataType::Int8, shape.clone()).is_quantized());
    assert!(!TensorSpec::new(DataType::UInt8, shape.clone()).is_quantized());
    assert!(
      TensorSpec::new(DataType::UInt8, shape.clone())
        .with_scale(0.0078)
        .is_quantized()
    );
    assert!(
      !TensorSpec::new(DataType::Float32, shape)
        .with_scale(0.5)
        .is_quantized()
    );
  }

  #[test]
  fn float_bytes_are_read_back() {
    let values = [1.5f32, -2.0, 0.3];
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let mut out = [0f32; 3];
    bytes_to_f32(DataType::Float32, &bytes, &mut out).unwrap();
    assert_eq!(out, values);
  }

  #[test]
  fn half_precision_is_expanded() {
    // 1.0, -2.0, 0.5
    let bytes: Vec<u8> = [0x3c00u16, 0xc000, 0x3800]
      .iter()
      .flat_map(|v| v.to_le_bytes())
      .collect();
    let mut out = [0f32; 3];
    bytes_to_f32(DataType::Float16, &bytes, &mut out).unwrap();
    assert_eq!(out, [1.0, -2.0, 0.5]);
  }

  #[test]
  fn integer_outputs_are_not_read_back() {
    let mut out = [0f32; 2];
    let err = bytes_to_f32(DataType::UInt8, &[1, 2], &mut out).unwrap_err();
    assert!(matches!(err, RuntimeError::Transfer(_)));
  }

  #[test]
  fn size_mismatch_is_a_transfer_error() {
    let mut out = [0f32; 2];
    let err = bytes_to_f32(DataType::Float32, &[0u8; 4], &mut out).unwrap_err();
    assert!(matches!(err, RuntimeError::Transfer(_)));
  }
}
