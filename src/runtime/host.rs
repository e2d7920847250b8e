// 该文件是 Beifeng （北风） 项目的一部分。
// src/runtime/host.rs - 主机内存运行时
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

//! 以主机内存模拟设备内存的运行时。
//!
//! 网络由注册的闭包实现，适合离线调试与测试。分配、释放与执行情况记录在
//! [`HostLedger`] 中，可用于检查资源释放顺序。

use std::{
  collections::HashMap,
  path::{Path, PathBuf},
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use half::f16;
use tracing::{debug, info};

use super::{DataType, DeviceTensor, NetworkInfo, Runtime, RuntimeError, Shape, TensorSpec};

pub type HostForward = Box<dyn Fn(&[&[u8]]) -> Result<Vec<Vec<f32>>, String> + Send>;

/// 注册到主机运行时的网络
pub struct HostModel {
  info: NetworkInfo,
  forward: HostForward,
}

impl HostModel {
  pub fn new<F>(name: &str, inputs: Vec<TensorSpec>, outputs: Vec<TensorSpec>, forward: F) -> Self
  where
    F: Fn(&[&[u8]]) -> Result<Vec<Vec<f32>>, String> + Send + 'static,
  {
    Self {
      info: NetworkInfo {
        name: name.to_string(),
        inputs,
        outputs,
      },
      forward: Box::new(forward),
    }
  }

  pub fn info(&self) -> &NetworkInfo {
    &self.info
  }
}

#[derive(Debug, Default)]
pub struct HostLedger {
  live_tensors: AtomicUsize,
  allocated: AtomicUsize,
  launches: AtomicUsize,
  context_released: AtomicBool,
  live_at_release: AtomicUsize,
}

impl HostLedger {
  pub fn live_tensors(&self) -> usize {
    self.live_tensors.load(Ordering::SeqCst)
  }

  pub fn allocated(&self) -> usize {
    self.allocated.load(Ordering::SeqCst)
  }

  pub fn launches(&self) -> usize {
    self.launches.load(Ordering::SeqCst)
  }

  pub fn context_released(&self) -> bool {
    self.context_released.load(Ordering::SeqCst)
  }

  /// 上下文释放时仍存活的张量数量
  pub fn live_at_release(&self) -> usize {
    self.live_at_release.load(Ordering::SeqCst)
  }
}

pub struct HostTensor {
  spec: TensorSpec,
  data: Vec<u8>,
  ledger: Arc<HostLedger>,
}

impl HostTensor {
  pub fn bytes(&self) -> &[u8] {
    &self.data
  }
}

impl DeviceTensor for HostTensor {
  fn dtype(&self) -> DataType {
    self.spec.dtype
  }

  fn shape(&self) -> &Shape {
    &self.spec.shape
  }
}

impl Drop for HostTensor {
  fn drop(&mut self) {
    self.ledger.live_tensors.fetch_sub(1, Ordering::SeqCst);
  }
}

pub struct HostRuntime {
  device_id: u32,
  catalog: HashMap<PathBuf, HostModel>,
  loaded: Option<HostModel>,
  ledger: Arc<HostLedger>,
  alloc_limit: Option<usize>,
}

impl HostRuntime {
  pub fn new(device_id: u32) -> Self {
    debug!("创建主机运行时, 设备 {}", device_id);
    Self {
      device_id,
      catalog: HashMap::new(),
      loaded: None,
      ledger: Arc::new(HostLedger::default()),
      alloc_limit: None,
    }
  }

  /// 以模型路径为键注册网络
  pub fn register(mut self, path: impl Into<PathBuf>, model: HostModel) -> Self {
    self.catalog.insert(path.into(), model);
    self
  }

  /// 第 `limit` 次之后的分配全部失败
  pub fn fail_alloc_after(mut self, limit: usize) -> Self {
    self.alloc_limit = Some(limit);
    self
  }

  pub fn ledger(&self) -> Arc<HostLedger> {
    Arc::clone(&self.ledger)
  }

  fn loaded(&self, name: &str) -> Result<&HostModel, RuntimeError> {
    self
      .loaded
      .as_ref()
      .filter(|model| model.info.name == name)
      .ok_or_else(|| RuntimeError::UnknownNetwork(name.to_string()))
  }
}

impl Runtime for HostRuntime {
  type Tensor = HostTensor;

  fn device_id(&self) -> u32 {
    self.device_id
  }

  fn load_model(&mut self, path: &Path) -> Result<(), RuntimeError> {
    let model = self
      .catalog
      .remove(path)
      .ok_or_else(|| RuntimeError::ModelLoad {
        path: path.display().to_string(),
        reason: if path.exists() {
          "不是已注册的主机模型".to_string()
        } else {
          "文件不存在".to_string()
        },
      })?;
    info!("主机运行时加载网络: {}", model.info.name);
    self.loaded = Some(model);
    Ok(())
  }

  fn network_names(&self) -> Vec<String> {
    self
      .loaded
      .iter()
      .map(|model| model.info.name.clone())
      .collect()
  }

  fn network_info(&self, name: &str) -> Result<NetworkInfo, RuntimeError> {
    self.loaded(name).map(|model| model.info.clone())
  }

  fn alloc_tensor(&self, spec: &TensorSpec) -> Result<Self::Tensor, RuntimeError> {
    let index = self.ledger.allocated.load(Ordering::SeqCst);
    if self.alloc_limit.is_some_and(|limit| index >= limit) {
      return Err(RuntimeError::Allocation(format!(
        "第 {} 个张量 {} {} 超出限制",
        index + 1,
        spec.dtype,
        spec.shape
      )));
    }

    self.ledger.allocated.fetch_add(1, Ordering::SeqCst);
    self.ledger.live_tensors.fetch_add(1, Ordering::SeqCst);
    Ok(HostTensor {
      spec: spec.clone(),
      data: vec![0u8; spec.byte_size()],
      ledger: Arc::clone(&self.ledger),
    })
  }

  fn copy_to_device(&self, tensor: &mut Self::Tensor, data: &[u8]) -> Result<(), RuntimeError> {
    if data.len() != tensor.data.len() {
      return Err(RuntimeError::Transfer(format!(
        "写入 {} 字节, 张量大小 {} 字节",
        data.len(),
        tensor.data.len()
      )));
    }
    tensor.data.copy_from_slice(data);
    Ok(())
  }

  fn copy_to_host(&self, tensor: &Self::Tensor, dst: &mut [f32]) -> Result<(), RuntimeError> {
    super::bytes_to_f32(tensor.spec.dtype, &tensor.data, dst)
  }

  fn launch(
    &self,
    network: &str,
    inputs: &[Self::Tensor],
    outputs: &mut [Self::Tensor],
  ) -> Result<(), RuntimeError> {
    let model = self.loaded(network)?;
    self.ledger.launches.fetch_add(1, Ordering::SeqCst);

    let views: Vec<&[u8]> = inputs.iter().map(|t| t.data.as_slice()).collect();
    let results = (model.forward)(&views).map_err(RuntimeError::Launch)?;

    if results.len() != outputs.len() {
      return Err(RuntimeError::Launch(format!(
        "网络产生 {} 个输出, 期望 {}",
        results.len(),
        outputs.len()
      )));
    }

    for (tensor, values) in outputs.iter_mut().zip(results) {
      if values.len() != tensor.spec.shape.count() {
        return Err(RuntimeError::Launch(format!(
          "输出元素数量 {} 与形状 {} 不符",
          values.len(),
          tensor.spec.shape
        )));
      }
      match tensor.spec.dtype {
        DataType::Float32 => {
          for (chunk, value) in tensor.data.chunks_exact_mut(4).zip(values) {
            chunk.copy_from_slice(&value.to_le_bytes());
          }
        }
        DataType::Float16 => {
          for (chunk, value) in tensor.data.chunks_exact_mut(2).zip(values) {
            chunk.copy_from_slice(&f16::from_f32(value).to_le_bytes());
          }
        }
        other => {
          return Err(RuntimeError::Launch(format!(
            "主机运行时仅支持浮点输出, 实际为 {}",
            other
          )));
        }
      }
    }
    Ok(())
  }
}

impl Drop for HostRuntime {
  fn drop(&mut self) {
    self
      .ledger
      .live_at_release
      .store(self.ledger.live_tensors(), Ordering::SeqCst);
    self.ledger.context_released.store(true, Ordering::SeqCst);
    debug!("释放主机运行时, 设备 {}", self.device_id);
  }
}
