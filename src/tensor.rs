// 该文件是 Beifeng （北风） 项目的一部分。
// src/tensor.rs - 输入输出张量管理
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

use tracing::debug;

use crate::runtime::{DeviceTensor, NetworkInfo, Runtime, RuntimeError};

/// 单个推理阶段所需的全部张量
///
/// 字段按释放顺序声明：主机输出缓冲区、输入张量、输出张量。
pub struct TensorSet<T> {
  host_outputs: Vec<Vec<f32>>,
  inputs: Vec<T>,
  outputs: Vec<T>,
}

impl<T: DeviceTensor> TensorSet<T> {
  /// 按网络声明的输入输出分配张量，失败时已分配部分随即释放
  pub fn allocate<R>(runtime: &R, info: &NetworkInfo) -> Result<Self, RuntimeError>
  where
    R: Runtime<Tensor = T>,
  {
    let inputs = info
      .inputs
      .iter()
      .map(|spec| runtime.alloc_tensor(spec))
      .collect::<Result<Vec<_>, _>>()?;

    let outputs = info
      .outputs
      .iter()
      .map(|spec| runtime.alloc_tensor(spec))
      .collect::<Result<Vec<_>, _>>()?;

    let host_outputs = info
      .outputs
      .iter()
      .map(|spec| vec![0f32; spec.shape.count()])
      .collect::<Vec<_>>();

    debug!(
      "已分配 {} 个输入张量, {} 个输出张量",
      inputs.len(),
      outputs.len()
    );

    Ok(Self {
      host_outputs,
      inputs,
      outputs,
    })
  }

  pub fn input_mut(&mut self, index: usize) -> Option<&mut T> {
    self.inputs.get_mut(index)
  }

  pub fn host_output(&self, index: usize) -> Option<&[f32]> {
    self.host_outputs.get(index).map(Vec::as_slice)
  }

  /// 同步执行网络并把全部输出拷回主机缓冲区（覆盖上一次结果）
  pub fn launch<R>(&mut self, runtime: &R, network: &str) -> Result<(), RuntimeError>
  where
    R: Runtime<Tensor = T>,
  {
    runtime.launch(network, &self.inputs, &mut self.outputs)?;
    for (tensor, host) in self.outputs.iter().zip(self.host_outputs.iter_mut()) {
      runtime.copy_to_host(tensor, host)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;

  use super::*;
  use crate::runtime::{
    DataType, Shape, TensorSpec,
    host::{HostModel, HostRuntime},
  };

  fn counting_model() -> HostModel {
    HostModel::new(
      "count",
      vec![TensorSpec::new(DataType::UInt8, Shape::new(vec![3]))],
      vec![
        TensorSpec::new(DataType::Float32, Shape::new(vec![3])),
        TensorSpec::new(DataType::Float32, Shape::new(vec![1])),
      ],
      |inputs| {
        let sum: f32 = inputs[0].iter().map(|&b| b as f32).sum();
        Ok(vec![inputs[0].iter().map(|&b| b as f32 * 2.0).collect(), vec![sum]])
      },
    )
  }

  fn runtime() -> HostRuntime {
    let mut runtime = HostRuntime::new(0).register("count.bin", counting_model());
    runtime.load_model(Path::new("count.bin")).unwrap();
    runtime
  }

  #[test]
  fn sizes_follow_network_info() {
    let runtime = runtime();
    let info = runtime.network_info("count").unwrap();
    let ledger = runtime.ledger();
    let mut set = TensorSet::allocate(&runtime, &info).unwrap();
    assert_eq!(ledger.live_tensors(), 3);
    assert!(set.input_mut(0).is_some_and(|t| t.byte_size() == 3));
    assert!(set.input_mut(1).is_none());
    assert_eq!(set.host_output(0).map(<[f32]>::len), Some(3));
    assert_eq!(set.host_output(1).map(<[f32]>::len), Some(1));
    assert!(set.host_output(2).is_none());
  }

  #[test]
  fn launch_overwrites_host_buffers() {
    let runtime = runtime();
    let info = runtime.network_info("count").unwrap();
    let mut set = TensorSet::allocate(&runtime, &info).unwrap();

    let input = set.input_mut(0).unwrap();
    runtime.copy_to_device(input, &[1, 2, 3]).unwrap();
    set.launch(&runtime, "count").unwrap();
    assert_eq!(set.host_output(0).unwrap(), &[2.0, 4.0, 6.0]);

    let input = set.input_mut(0).unwrap();
    runtime.copy_to_device(input, &[0, 0, 1]).unwrap();
    set.launch(&runtime, "count").unwrap();
    assert_eq!(set.host_output(0).unwrap(), &[0.0, 0.0, 2.0]);
    assert_eq!(set.host_output(1).unwrap(), &[1.0]);
  }

  #[test]
  fn partial_allocation_is_released() {
    let mut runtime = HostRuntime::new(0)
      .register("count.bin", counting_model())
      .fail_alloc_after(2);
    runtime.load_model(Path::new("count.bin")).unwrap();
    let ledger = runtime.ledger();
    let info = runtime.network_info("count").unwrap();

    assert!(TensorSet::allocate(&runtime, &info).is_err());
    assert_eq!(ledger.allocated(), 2);
    assert_eq!(ledger.live_tensors(), 0);
  }
}
