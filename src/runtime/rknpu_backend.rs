// 该文件是 Beifeng （北风） 项目的一部分。
// src/runtime/rknpu_backend.rs - RKNPU 运行时后端
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};

use super::{DataType, DeviceTensor, NetworkInfo, Runtime, RuntimeError, Shape, TensorSpec};

const RKNPU_DEVICE_ID: u32 = 0;

struct LoadedNetwork {
  context: Context,
  info: NetworkInfo,
}

/// RKNPU 上下文
///
/// 绑定层不提供输入属性查询，输入几何由调用方给出；输出形状在加载时以一次
/// 全零输入的试运行确定。
pub struct RknpuRuntime {
  device_id: u32,
  input_shape: Shape,
  network: Option<LoadedNetwork>,
}

pub struct RknpuTensor {
  spec: TensorSpec,
  data: Vec<u8>,
}

impl DeviceTensor for RknpuTensor {
  fn dtype(&self) -> DataType {
    self.spec.dtype
  }

  fn shape(&self) -> &Shape {
    &self.spec.shape
  }
}

impl RknpuRuntime {
  pub fn open(device_id: u32, input_shape: Shape) -> Result<Self, RuntimeError> {
    if device_id != RKNPU_DEVICE_ID {
      return Err(RuntimeError::DeviceUnavailable(
        device_id,
        format!("RKNPU 仅提供设备 {}", RKNPU_DEVICE_ID),
      ));
    }
    Ok(Self {
      device_id,
      input_shape,
      network: None,
    })
  }

  fn network(&self, name: &str) -> Result<&LoadedNetwork, RuntimeError> {
    self
      .network
      .as_ref()
      .filter(|net| net.info.name == name)
      .ok_or_else(|| RuntimeError::UnknownNetwork(name.to_string()))
  }

  fn infer_output_specs(context: &Context, input: &TensorSpec) -> Result<Vec<TensorSpec>, RuntimeError> {
    info!("以全零输入试运行一次以确定输出形状");
    let zeros = vec![0u8; input.byte_size()];
    context.set_input(0, &zeros, TensorFormat::NHWC, TensorType::UInt8)?;
    context.run()?;
    let output = context.get_outputs()?;

    let num_outputs = context.num_outputs()? as usize;
    let mut specs = Vec::with_capacity(num_outputs);
    for index in 0..num_outputs {
      let len = output
        .get_f32(index)
        .map_err(|e| RuntimeError::Transfer(format!("获取第 {} 个输出失败: {}", index, e)))?
        .len();
      debug!("输出 {} 元素数量: {}", index, len);
      specs.push(TensorSpec::new(DataType::Float32, Shape::new(vec![len])));
    }
    Ok(specs)
  }
}

impl Runtime for RknpuRuntime {
  type Tensor = RknpuTensor;

  fn device_id(&self) -> u32 {
    self.device_id
  }

  fn load_model(&mut self, path: &Path) -> Result<(), RuntimeError> {
    info!("加载模型文件: {}", path.display());
    let model_data = std::fs::read(path).map_err(|e| RuntimeError::ModelLoad {
      path: path.display().to_string(),
      reason: e.to_string(),
    })?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let context = Context::new(&model_data, InitFlags::default()).map_err(|e| RuntimeError::ModelLoad {
      path: path.display().to_string(),
      reason: e.to_string(),
    })?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("RKNN API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("RKNN 驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(e.into());
      }
    }

    let num_inputs = context.num_inputs()?;
    if num_inputs != 1 {
      return Err(RuntimeError::ModelLoad {
        path: path.display().to_string(),
        reason: format!("仅支持单输入模型, 实际输入数量 {}", num_inputs),
      });
    }

    let input = TensorSpec::new(DataType::UInt8, self.input_shape.clone());
    let outputs = Self::infer_output_specs(&context, &input)?;

    let name = path
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_else(|| "network".to_string());

    self.network = Some(LoadedNetwork {
      context,
      info: NetworkInfo {
        name,
        inputs: vec![input],
        outputs,
      },
    });
    Ok(())
  }

  fn network_names(&self) -> Vec<String> {
    self.network.iter().map(|net| net.info.name.clone()).collect()
  }

  fn network_info(&self, name: &str) -> Result<NetworkInfo, RuntimeError> {
    self.network(name).map(|net| net.info.clone())
  }

  fn alloc_tensor(&self, spec: &TensorSpec) -> Result<Self::Tensor, RuntimeError> {
    Ok(RknpuTensor {
      spec: spec.clone(),
      data: vec![0u8; spec.byte_size()],
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
    let net = self.network(network)?;

    for (index, input) in inputs.iter().enumerate() {
      if input.spec.dtype != DataType::UInt8 {
        return Err(RuntimeError::Launch(format!(
          "RKNPU 输入 {} 类型 {} 不受支持",
          index, input.spec.dtype
        )));
      }
      net
        .context
        .set_input(index as _, &input.data, TensorFormat::NHWC, TensorType::UInt8)?;
    }

    net
      .context
      .run()
      .map_err(|e| RuntimeError::Launch(e.to_string()))?;

    let result = net.context.get_outputs()?;
    for (index, output) in outputs.iter_mut().enumerate() {
      let values = result
        .get_f32(index)
        .map_err(|e| RuntimeError::Transfer(format!("获取第 {} 个输出失败: {}", index, e)))?;
      if values.len() != output.spec.shape.count() {
        return Err(RuntimeError::Transfer(format!(
          "输出 {} 元素数量 {} 与形状 {} 不符",
          index,
          values.len(),
          output.spec.shape
        )));
      }
      for (chunk, value) in output.data.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&value.to_le_bytes());
      }
    }
    Ok(())
  }
}
