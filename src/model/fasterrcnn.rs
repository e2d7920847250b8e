// 该文件是 Beifeng （北风） 项目的一部分。
// src/model/fasterrcnn.rs - Faster-RCNN 推理管线
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{ChannelOrder, FrameError, NetGeometry, stage_image},
  model::{
    DetectResult, Model,
    decode::{DEFAULT_SCORE_THRESHOLD, Rescale, decode_detections},
  },
  profile::{
    STAGE_DETECTION, STAGE_OVERALL, STAGE_POST_PROCESS, STAGE_PRE_PROCESS, StageObserver,
    reborrow, timed,
  },
  runtime::{DataType, NetworkInfo, Runtime, RuntimeError},
  tensor::TensorSet,
};

#[derive(Error, Debug)]
pub enum FasterRcnnError {
  #[error("运行时错误: {0}")]
  Runtime(#[from] RuntimeError),
  #[error("模型中没有可用网络")]
  NoNetwork,
  #[error("网络 {0} 没有输入")]
  NoInput(String),
  #[error("网络 {0} 没有输出")]
  NoOutput(String),
  #[error("仅支持浮点模型, 网络 {name} 输入类型为 {dtype}")]
  QuantizedInput { name: String, dtype: DataType },
  #[error("输入帧错误: {0}")]
  Frame(#[from] FrameError),
  #[error("批大小不匹配: 期望 {expected}, 实际 {actual}")]
  BatchSizeMismatch { expected: usize, actual: usize },
  #[error("没有已暂存的批次")]
  NoStagedBatch,
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

pub struct FasterRcnnBuilder {
  model_path: PathBuf,
  device_id: u32,
  score_threshold: f32,
  channel_order: ChannelOrder,
}

impl FromUrlWithScheme for FasterRcnnBuilder {
  const SCHEME: &'static str = "frcnn";
}

impl FromUrl for FasterRcnnBuilder {
  type Error = FasterRcnnError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(FasterRcnnError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let path = urlencoding::decode(url.path())
      .map_err(|e| FasterRcnnError::ModelPathError(e.to_string()))?
      .into_owned();
    let mut builder = FasterRcnnBuilder::new(path, 0);

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "device" => {
          builder.device_id = value.parse().map_err(|_| {
            FasterRcnnError::ModelPathError(format!("无效的设备号: {}", value))
          })?;
        }
        "threshold" => {
          builder.score_threshold = value.parse().map_err(|_| {
            FasterRcnnError::ModelPathError(format!("无效的置信度阈值: {}", value))
          })?;
        }
        "order" => builder.channel_order = value.parse()?,
        _ => warn!("忽略未知的模型参数: {}={}", key, value),
      }
    }

    Ok(builder)
  }
}

impl FasterRcnnBuilder {
  pub fn new(model_path: impl Into<PathBuf>, device_id: u32) -> Self {
    Self {
      model_path: model_path.into(),
      device_id,
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      channel_order: ChannelOrder::default(),
    }
  }

  pub fn score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn channel_order(mut self, order: ChannelOrder) -> Self {
    self.channel_order = order;
    self
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn device_id(&self) -> u32 {
    self.device_id
  }

  /// 通过 `open` 获取设备上下文，加载模型并分配张量
  ///
  /// 任一步骤失败时，已获取的上下文与张量都会被释放。
  pub fn build_with<R, F>(self, open: F) -> Result<FasterRcnn<R>, FasterRcnnError>
  where
    R: Runtime,
    F: FnOnce(u32) -> Result<R, RuntimeError>,
  {
    info!("打开设备 {}", self.device_id);
    let mut runtime = open(self.device_id)?;

    info!("加载模型文件: {}", self.model_path.display());
    runtime.load_model(&self.model_path)?;

    let name = runtime
      .network_names()
      .into_iter()
      .next()
      .ok_or(FasterRcnnError::NoNetwork)?;
    info!("模型 {} 加载成功", name);

    let network = runtime.network_info(&name)?;
    let input = network
      .inputs
      .first()
      .ok_or_else(|| FasterRcnnError::NoInput(name.clone()))?;
    if network.outputs.is_empty() {
      return Err(FasterRcnnError::NoOutput(name));
    }

    info!("输入缩放: {}", input.scale);
    info!("输出缩放: {}", network.outputs[0].scale);
    info!("输入数量: {}", network.inputs.len());
    info!("输出数量: {}", network.outputs.len());

    if input.is_quantized() {
      error!("仅支持浮点模型");
      return Err(FasterRcnnError::QuantizedInput {
        name,
        dtype: input.dtype,
      });
    }
    if !matches!(input.dtype, DataType::UInt8 | DataType::Float32) {
      return Err(FrameError::UnsupportedInputType(input.dtype).into());
    }

    let geometry = NetGeometry::from_shape(&input.shape)?;
    debug!(
      "网络输入: 批大小 {}, {}x{}x{}, 元素数量 {}",
      geometry.batch,
      geometry.height,
      geometry.width,
      geometry.channels,
      input.shape.count()
    );
    for (index, output) in network.outputs.iter().enumerate() {
      debug!("输出 {}: {} {}", index, output.dtype, output.shape);
    }

    let tensors = TensorSet::allocate(&runtime, &network)?;

    Ok(FasterRcnn {
      tensors,
      network,
      geometry,
      score_threshold: self.score_threshold,
      channel_order: self.channel_order,
      staged: Vec::new(),
      runtime,
    })
  }
}

/// Faster-RCNN 推理管线
///
/// 一个实例独占一个设备上下文。每批次依次调用 [`pre_forward`](Self::pre_forward)、
/// [`forward`](Self::forward)、[`post_forward`](Self::post_forward)，
/// 或直接调用 [`detect`](Self::detect)。
pub struct FasterRcnn<R: Runtime> {
  // 张量先于上下文释放
  tensors: TensorSet<R::Tensor>,
  network: NetworkInfo,
  geometry: NetGeometry,
  score_threshold: f32,
  channel_order: ChannelOrder,
  staged: Vec<(u32, u32)>,
  runtime: R,
}

impl<R: Runtime> FasterRcnn<R> {
  pub fn batch_size(&self) -> usize {
    self.geometry.batch
  }

  pub fn geometry(&self) -> &NetGeometry {
    &self.geometry
  }

  pub fn network_name(&self) -> &str {
    &self.network.name
  }

  pub fn network_info(&self) -> &NetworkInfo {
    &self.network
  }

  pub fn score_threshold(&self) -> f32 {
    self.score_threshold
  }

  pub fn runtime(&self) -> &R {
    &self.runtime
  }

  /// 预处理一批图像并写入输入张量
  pub fn pre_forward(
    &mut self,
    images: &[RgbImage],
    mut observer: Option<&mut dyn StageObserver>,
  ) -> Result<(), FasterRcnnError> {
    timed(&mut observer, STAGE_PRE_PROCESS, || self.stage_in(images))
  }

  /// 同步执行网络，并把输出拷回主机缓冲区
  pub fn forward(
    &mut self,
    mut observer: Option<&mut dyn StageObserver>,
  ) -> Result<(), FasterRcnnError> {
    timed(&mut observer, STAGE_DETECTION, || {
      self
        .tensors
        .launch(&self.runtime, &self.network.name)
        .map_err(|e| {
          error!("推理失败: {}", e);
          FasterRcnnError::from(e)
        })
    })
  }

  /// 解码主机输出缓冲区，每张图像一个结果
  pub fn post_forward(
    &self,
    mut observer: Option<&mut dyn StageObserver>,
  ) -> Result<Vec<DetectResult>, FasterRcnnError> {
    timed(&mut observer, STAGE_POST_PROCESS, || self.decode())
  }

  pub fn detect(
    &mut self,
    images: &[RgbImage],
    mut observer: Option<&mut dyn StageObserver>,
  ) -> Result<Vec<DetectResult>, FasterRcnnError> {
    if let Some(observer) = observer.as_deref_mut() {
      observer.save(STAGE_OVERALL);
    }
    let result = self
      .pre_forward(images, reborrow(&mut observer))
      .and_then(|_| self.forward(reborrow(&mut observer)))
      .and_then(|_| self.post_forward(reborrow(&mut observer)));
    if let Some(observer) = observer.as_deref_mut() {
      observer.save(STAGE_OVERALL);
    }
    result
  }

  fn stage_in(&mut self, images: &[RgbImage]) -> Result<(), FasterRcnnError> {
    if images.len() != self.geometry.batch {
      return Err(FasterRcnnError::BatchSizeMismatch {
        expected: self.geometry.batch,
        actual: images.len(),
      });
    }

    let input = &self.network.inputs[0];
    let mut data = Vec::with_capacity(input.byte_size());
    for image in images {
      stage_image(
        image,
        &self.geometry,
        self.channel_order,
        input.dtype,
        &mut data,
      )?;
    }

    let tensor = self
      .tensors
      .input_mut(0)
      .ok_or_else(|| FasterRcnnError::NoInput(self.network.name.clone()))?;
    self.runtime.copy_to_device(tensor, &data)?;

    self.staged = images.iter().map(RgbImage::dimensions).collect();
    debug!("已暂存 {} 张图像", self.staged.len());
    Ok(())
  }

  fn decode(&self) -> Result<Vec<DetectResult>, FasterRcnnError> {
    if self.staged.is_empty() {
      return Err(FasterRcnnError::NoStagedBatch);
    }

    let blobs = self
      .tensors
      .host_output(0)
      .ok_or_else(|| FasterRcnnError::NoOutput(self.network.name.clone()))?;
    let per_image = blobs.len() / self.geometry.batch;
    let network_size = (self.geometry.width, self.geometry.height);

    let results = blobs
      .chunks(per_image.max(1))
      .chain(std::iter::repeat(&[][..]))
      .zip(&self.staged)
      .map(|(slice, &original)| {
        decode_detections(
          slice,
          self.score_threshold,
          &Rescale::new(original, network_size),
        )
      })
      .collect::<Vec<_>>();

    debug!(
      "检测到 {} 个物体",
      results.iter().map(DetectResult::len).sum::<usize>()
    );
    Ok(results)
  }
}

impl<R: Runtime> Drop for FasterRcnn<R> {
  fn drop(&mut self) {
    debug!("释放推理管线: {}", self.network.name);
  }
}

impl<R: Runtime> Model for FasterRcnn<R> {
  type Input = [RgbImage];
  type Output = Vec<DetectResult>;
  type Error = FasterRcnnError;

  fn batch_size(&self) -> usize {
    self.geometry.batch
  }

  fn infer(
    &mut self,
    input: &Self::Input,
    observer: Option<&mut dyn StageObserver>,
  ) -> Result<Self::Output, Self::Error> {
    self.detect(input, observer)
  }
}
