// 该文件是 Renying （人影） 项目的一部分。
// src/detector.rs - ACF 多尺度检测器
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

use std::{fmt, marker::PhantomData, path::PathBuf, str::FromStr, sync::Arc, time::Instant};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  channel::ChannelParams,
  detection::DetectionList,
  features::FeatureError,
  frame::AsNhwcFrame,
  model::{AcfModel, AcfModelError, Model},
  nms::{self, NmsError},
  pyramid::{FeaturePyramid, PyramidParams},
};

pub mod cascade;
pub use self::cascade::{Cascade, WindowHit, WindowScore};

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("特征计算错误: {0}")]
  Feature(#[from] FeatureError),
  #[error("非极大值抑制错误: {0}")]
  Nms(#[from] NmsError),
  #[error("线程池创建失败: {0}")]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
  #[error("模型错误: {0}")]
  Model(#[from] AcfModelError),
  #[error("帧数据长度不匹配: 期望 {expected}, 实际 {actual}")]
  FrameSize { expected: usize, actual: usize },
  #[error("参数无效: {0}")]
  InvalidParameter(String),
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
}

/// 检测器的运行参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
  pub scales_per_octave: usize,
  pub nms_overlap: f32,
  /// 近似尺度的最小像素面积, 0 表示全部可近似
  pub real_scale_area_threshold: usize,
  /// 工作线程数, `None` 时由 rayon 决定
  pub threads: Option<usize>,
  pub nms: bool,
  /// 合并后的检测框最小宽高
  pub min_size: Option<(f32, f32)>,
  pub channel: ChannelParams,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      scales_per_octave: 8,
      nms_overlap: nms::DEFAULT_OVERLAP,
      real_scale_area_threshold: 0,
      threads: None,
      nms: true,
      min_size: None,
      channel: ChannelParams::default(),
    }
  }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, DetectError> {
  value
    .parse()
    .map_err(|_| DetectError::InvalidParameter(format!("{} = {}", key, value)))
}

impl DetectorConfig {
  /// 读取 URL 查询参数覆盖默认值
  pub fn from_url_query(url: &Url) -> Result<Self, DetectError> {
    let mut config = Self::default();
    let (mut min_width, mut min_height) = (None, None);
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "scales" => config.scales_per_octave = parse_value(&key, &value)?,
        "threads" => config.threads = Some(parse_value(&key, &value)?),
        "overlap" => config.nms_overlap = parse_value(&key, &value)?,
        "nms" => config.nms = parse_value(&key, &value)?,
        "area" => config.real_scale_area_threshold = parse_value(&key, &value)?,
        "min_width" => min_width = Some(parse_value(&key, &value)?),
        "min_height" => min_height = Some(parse_value(&key, &value)?),
        _ => warn!("忽略未知的检测器参数: {}={}", key, value),
      }
    }
    if min_width.is_some() || min_height.is_some() {
      config.min_size = Some((min_width.unwrap_or(0.0), min_height.unwrap_or(0.0)));
    }
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), DetectError> {
    if self.scales_per_octave == 0 {
      return Err(DetectError::InvalidParameter("每个八度的尺度数必须为正".into()));
    }
    if !(self.nms_overlap > 0.0 && self.nms_overlap <= 1.0) {
      return Err(DetectError::InvalidParameter(format!(
        "重合阈值 {} 不在 (0, 1] 内",
        self.nms_overlap
      )));
    }
    if self.threads == Some(0) {
      return Err(DetectError::InvalidParameter("线程数必须为正".into()));
    }
    Ok(())
  }
}

/// 单帧耗时, 以毫秒计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameTimings {
  pub feature_ms: u64,
  pub classifier_ms: u64,
}

impl FrameTimings {
  pub fn total_ms(&self) -> u64 {
    self.feature_ms + self.classifier_ms
  }
}

/// 一帧的检测结果
#[derive(Debug, Clone, Serialize)]
pub struct AcfResult {
  pub width: usize,
  pub height: usize,
  /// 合并前的检测数量
  pub raw_count: usize,
  #[serde(skip)]
  pub raw: DetectionList,
  pub detections: DetectionList,
  pub timings: FrameTimings,
}

impl AcfResult {
  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }
}

impl fmt::Display for AcfResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}x{} ftr:{:2}ms clf:{:3}ms total:{:3}ms nDet:{:2} nHS:{}",
      self.width,
      self.height,
      self.timings.feature_ms,
      self.timings.classifier_ms,
      self.timings.total_ms(),
      self.raw_count,
      self.detections.len()
    )
  }
}

/// 特征金字塔 + 级联 + 非极大值抑制
pub struct AcfDetector<Frame> {
  model: Arc<AcfModel>,
  config: DetectorConfig,
  pool: rayon::ThreadPool,
  _phantom: PhantomData<fn() -> Frame>,
}

impl<Frame> AcfDetector<Frame> {
  pub fn new(model: impl Into<Arc<AcfModel>>, config: DetectorConfig) -> Result<Self, DetectError> {
    config.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
      .num_threads(config.threads.unwrap_or(0))
      .thread_name(|i| format!("acf-worker-{}", i))
      .build()?;
    info!("检测线程池: {} 个线程", pool.current_num_threads());

    Ok(Self {
      model: model.into(),
      config,
      pool,
      _phantom: PhantomData,
    })
  }

  pub fn model(&self) -> &AcfModel {
    &self.model
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn pyramid_params(&self) -> PyramidParams {
    let o = self.model.opts();
    PyramidParams {
      scales_per_octave: self.config.scales_per_octave,
      min_width: o.model_width,
      min_height: o.model_height,
      shrink: o.shrink,
      pad_width: o.pad_width,
      pad_height: o.pad_height,
      lambdas: o.lambdas,
      real_scale_area_threshold: self.config.real_scale_area_threshold,
      channel: self.config.channel,
    }
  }

  /// 在交错 RGB 图像上检测
  pub fn detect(&self, rgb: &[u8], width: usize, height: usize) -> Result<AcfResult, DetectError> {
    let expected = width * height * 3;
    if rgb.len() != expected {
      return Err(DetectError::FrameSize {
        expected,
        actual: rgb.len(),
      });
    }
    self.pool.install(|| self.detect_in_pool(rgb, width, height))
  }

  fn detect_in_pool(&self, rgb: &[u8], width: usize, height: usize) -> Result<AcfResult, DetectError> {
    let start = Instant::now();
    let pyramid = FeaturePyramid::build(rgb, width, height, &self.pyramid_params())?;
    let feature_ms = start.elapsed().as_millis() as u64;

    let start = Instant::now();
    let raw = self.classify(&pyramid);
    let classifier_ms = start.elapsed().as_millis() as u64;
    let raw_count = raw.len();

    let mut detections = if self.config.nms {
      nms::suppress(&raw, self.config.nms_overlap)?
    } else {
      raw.clone()
    };
    if let Some((min_width, min_height)) = self.config.min_size {
      detections = detections.filter_size(min_width, min_height);
    }

    let result = AcfResult {
      width,
      height,
      raw_count,
      raw,
      detections,
      timings: FrameTimings {
        feature_ms,
        classifier_ms,
      },
    };
    debug!("{}", result);
    Ok(result)
  }

  /// 逐层求值并换算回原图坐标
  pub fn classify(&self, pyramid: &FeaturePyramid) -> DetectionList {
    let cascade = Cascade::new(&self.model);
    let per_layer: Vec<DetectionList> = pyramid
      .layers()
      .par_iter()
      .enumerate()
      .map(|(i, layer)| {
        let (sx, sy) = pyramid.scale_xy(i);
        let hits = cascade.scan(layer);
        trace!("第 {} 层 {}x{}: {} 个窗口通过", i, layer.width(), layer.height(), hits.len());
        let mut layer_dets: DetectionList = hits.iter().map(|hit| cascade.to_detection(hit)).collect();
        layer_dets.resize((1.0 / sx) as f32, (1.0 / sy) as f32);
        layer_dets
      })
      .collect();
    per_layer.into_iter().flatten().collect()
  }
}

impl<Frame: AsNhwcFrame> Model for AcfDetector<Frame> {
  type Input = Frame;
  type Output = AcfResult;
  type Error = DetectError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.detect(input.as_nhwc(), input.width(), input.height())
  }
}

/// 由 `acf:///path/model.json?scales=8&threads=4` 形式的 URL 构造检测器
pub struct AcfDetectorBuilder {
  model_path: PathBuf,
  config: DetectorConfig,
}

impl FromUrlWithScheme for AcfDetectorBuilder {
  const SCHEME: &'static str = "acf";
}

impl FromUrl for AcfDetectorBuilder {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DetectError::SchemeMismatch(Self::SCHEME));
    }

    Ok(AcfDetectorBuilder {
      model_path: PathBuf::from(url.path()),
      config: DetectorConfig::from_url_query(url)?,
    })
  }
}

impl AcfDetectorBuilder {
  pub fn config(mut self, config: DetectorConfig) -> Self {
    self.config = config;
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.config.threads = Some(threads);
    self
  }

  pub fn build<Frame>(self) -> Result<AcfDetector<Frame>, DetectError> {
    let model = AcfModel::load(&self.model_path)?;
    debug!("检测器参数: {:?}", self.config);
    AcfDetector::new(model, self.config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::Detection;

  #[test]
  fn query_overrides_defaults() {
    let url = Url::parse("acf:///models/hs.json?scales=4&threads=2&nms=false&min_width=30").unwrap();
    let builder = AcfDetectorBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, PathBuf::from("/models/hs.json"));
    assert_eq!(builder.config.scales_per_octave, 4);
    assert_eq!(builder.config.threads, Some(2));
    assert!(!builder.config.nms);
    assert_eq!(builder.config.min_size, Some((30.0, 0.0)));
    assert_eq!(builder.config.nms_overlap, 0.65);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("yolo:///models/hs.json").unwrap();
    assert!(matches!(
      AcfDetectorBuilder::from_url(&url),
      Err(DetectError::SchemeMismatch("acf"))
    ));
  }

  #[test]
  fn bad_query_value_is_rejected() {
    let url = Url::parse("acf:///m.json?overlap=abc").unwrap();
    assert!(matches!(
      AcfDetectorBuilder::from_url(&url),
      Err(DetectError::InvalidParameter(_))
    ));
    let url = Url::parse("acf:///m.json?scales=0").unwrap();
    assert!(matches!(
      AcfDetectorBuilder::from_url(&url),
      Err(DetectError::InvalidParameter(_))
    ));
  }

  #[test]
  fn status_line_matches_layout() {
    let result = AcfResult {
      width: 960,
      height: 720,
      raw_count: 7,
      raw: DetectionList::new(),
      detections: vec![Detection::new(0.0, 0.0, 1.0, 1.0, 1.0)].into(),
      timings: FrameTimings {
        feature_ms: 5,
        classifier_ms: 42,
      },
    };
    assert_eq!(
      result.to_string(),
      "960x720 ftr: 5ms clf: 42ms total: 47ms nDet: 7 nHS:1"
    );
  }
}
