// 该文件是 Renying （人影） 项目的一部分。
// src/pyramid.rs - 多尺度特征金字塔
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

use rayon::prelude::*;
use tracing::debug;

use crate::{
  channel::{
    ChannelParams,
    color::{rgb_to_luv, split_planes},
    resize::resize_planes,
  },
  features::{ChannelFeatures, FeatureError, FeatureLayer},
};

/// 缩放系数搜索时在两个候选之间尝试的插值份数
const SNAP_STEPS: usize = 100;

/// 构建特征金字塔所需的参数
#[derive(Debug, Clone)]
pub struct PyramidParams {
  pub scales_per_octave: usize,
  /// 最小尺度下图像不应小于的尺寸 (未填充的模型窗口)
  pub min_width: usize,
  pub min_height: usize,
  pub shrink: usize,
  /// 以像素计的填充量
  pub pad_width: usize,
  pub pad_height: usize,
  /// 颜色, 梯度幅值, 梯度直方图三组通道的近似指数
  pub lambdas: [f32; 3],
  /// 近似尺度的最小像素面积, 不足者单独作为真实尺度计算
  pub real_scale_area_threshold: usize,
  pub channel: ChannelParams,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaledSize {
  pub width: usize,
  pub height: usize,
}

impl ScaledSize {
  pub fn area(&self) -> usize {
    self.width * self.height
  }
}

/// 选择金字塔各层的目标图像尺寸
///
/// 每个名义缩放系数被微调到使长短边都尽量接近 `shrink` 的整数倍, 结果去重后按从大到小排列.
pub fn select_scales(width: usize, height: usize, params: &PyramidParams) -> Vec<ScaledSize> {
  let spo = params.scales_per_octave.max(1);
  let shrink = params.shrink.max(1) as f32;
  let min_w = params.min_width.max(1) as f32;
  let min_h = params.min_height.max(1) as f32;

  let n_oct = (width as f32 / min_w).min(height as f32 / min_h).log2();
  let n_scales = (spo as f32 * n_oct + 1.0).floor();
  if !(n_scales >= 1.0) {
    return Vec::new();
  }
  let n_scales = n_scales as usize;

  let (dim_short, dim_long) = if height < width {
    (height as f32, width as f32)
  } else {
    (width as f32, height as f32)
  };

  let mut sizes: Vec<ScaledSize> = Vec::with_capacity(n_scales);
  for s in 0..n_scales {
    let nominal = 2f64.powf(-(s as f64) / spo as f64) as f32;
    let scale = snap_scale(nominal, dim_short, dim_long, shrink);

    let w = ((width as f32 * scale / shrink).round() * shrink) as usize;
    let h = ((height as f32 * scale / shrink).round() * shrink) as usize;
    let size = ScaledSize { width: w, height: h };
    if size.area() == 0 {
      continue;
    }
    if !sizes.contains(&size) {
      sizes.push(size);
    }
  }

  sizes
}

// 在 ±0.25*shrink 的范围内搜索, 使长短边取整误差中较大者最小
fn snap_scale(scale: f32, dim_short: f32, dim_long: f32, shrink: f32) -> f32 {
  let rounded = (dim_short * scale / shrink).round() * shrink;
  let scale_short = (rounded - 0.25 * shrink) / dim_short;
  let scale_long = (rounded + 0.25 * shrink) / dim_short;

  let error = |v: f32| (v - (v / shrink).round() * shrink).abs();

  let mut best = scale_short;
  let mut best_error = f32::INFINITY;
  for i in 0..=SNAP_STEPS {
    let percent = i as f64 / SNAP_STEPS as f64;
    let candidate = (percent * (scale_long - scale_short) as f64 + scale_short as f64) as f32;
    let e = error(candidate * dim_short).max(error(candidate * dim_long));
    if e < best_error {
      best_error = e;
      best = candidate;
    }
  }
  best
}

/// 一个真实尺度与由它近似得到的尺度
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleCluster {
  pub real: usize,
  pub approximates: Vec<usize>,
}

/// 将尺度按倍频程分组
///
/// 每隔 `scales_per_octave` 个尺度取一个真实尺度, 其前后半个倍频程内面积不小于阈值的尺度
/// 由它近似. 未被分组的尺度各自作为没有子尺度的真实尺度.
pub fn build_scale_tree(sizes: &[ScaledSize], scales_per_octave: usize, area_threshold: usize) -> Vec<ScaleCluster> {
  let n = sizes.len();
  let spo = scales_per_octave.max(1);
  let mut assigned = vec![false; n];
  let mut tree = Vec::new();

  for i in (0..n).step_by(spo) {
    let front = i.saturating_sub((spo - 1) / 2);
    let back = (i + spo / 2).min(n - 1);
    let approximates: Vec<usize> = (front..=back)
      .filter(|&j| j != i && sizes[j].area() >= area_threshold)
      .collect();
    if !approximates.is_empty() {
      approximates.iter().for_each(|&j| assigned[j] = true);
      assigned[i] = true;
      tree.push(ScaleCluster { real: i, approximates });
    }
  }

  for (i, done) in assigned.iter().enumerate() {
    if !done {
      tree.push(ScaleCluster {
        real: i,
        approximates: Vec::new(),
      });
    }
  }

  tree
}

/// 一帧图像的特征金字塔
#[derive(Debug)]
pub struct FeaturePyramid {
  width: usize,
  height: usize,
  sizes: Vec<ScaledSize>,
  layers: Vec<FeatureLayer>,
}

impl FeaturePyramid {
  /// 由交错存储的 RGB 图像构建金字塔
  ///
  /// 真实尺度与其近似尺度在当前 rayon 线程池中并行计算.
  pub fn build(rgb: &[u8], width: usize, height: usize, params: &PyramidParams) -> Result<Self, FeatureError> {
    let sizes = select_scales(width, height, params);
    let tree = build_scale_tree(&sizes, params.scales_per_octave, params.real_scale_area_threshold);
    debug!(
      "{}x{} 图像共 {} 个尺度, {} 个真实尺度",
      width,
      height,
      sizes.len(),
      tree.len()
    );

    let n = width * height;
    let luv = rgb_to_luv(&split_planes(rgb, width, height), n, 1.0 / 255.0);

    let shrink = params.shrink.max(1);
    let pad_lr = params.pad_width / shrink;
    let pad_tb = params.pad_height / shrink;
    let smooth_p = params.channel.smooth_p;

    let built: Vec<Vec<(usize, FeatureLayer)>> = tree
      .par_iter()
      .map(|cluster| -> Result<Vec<(usize, FeatureLayer)>, FeatureError> {
        let size = sizes[cluster.real];
        let scaled = resize_planes(&luv, 3, height, width, size.height, size.width);
        let real = ChannelFeatures::from_luv(scaled, size.width, size.height, shrink, &params.channel)?;

        let mut layers: Vec<(usize, FeatureLayer)> = cluster
          .approximates
          .par_iter()
          .map(|&j| {
            let child = sizes[j];
            real
              .approximate(child.width, child.height, &params.lambdas)?
              .smooth_pad(pad_lr, pad_tb, smooth_p)
              .map(|layer| (j, layer))
          })
          .collect::<Result<_, FeatureError>>()?;

        layers.push((cluster.real, real.smooth_pad(pad_lr, pad_tb, smooth_p)?));
        Ok(layers)
      })
      .collect::<Result<_, FeatureError>>()?;
    drop(luv);

    let mut slots: Vec<Option<FeatureLayer>> = (0..sizes.len()).map(|_| None).collect();
    for (index, layer) in built.into_iter().flatten() {
      slots[index] = Some(layer);
    }
    let layers = slots
      .into_iter()
      .enumerate()
      .map(|(index, layer)| layer.ok_or(FeatureError::MissingLayer { index }))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(Self {
      width,
      height,
      sizes,
      layers,
    })
  }

  pub fn len(&self) -> usize {
    self.layers.len()
  }

  pub fn is_empty(&self) -> bool {
    self.layers.is_empty()
  }

  pub fn layers(&self) -> &[FeatureLayer] {
    &self.layers
  }

  pub fn sizes(&self) -> &[ScaledSize] {
    &self.sizes
  }

  /// 第 `index` 层相对原图的宽高缩放比例
  pub fn scale_xy(&self, index: usize) -> (f64, f64) {
    let size = self.sizes[index];
    (
      size.width as f64 / self.width as f64,
      size.height as f64 / self.height as f64,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params() -> PyramidParams {
    PyramidParams {
      scales_per_octave: 8,
      min_width: 32,
      min_height: 64,
      shrink: 4,
      pad_width: 8,
      pad_height: 8,
      lambdas: [0.0, 0.1105, 0.1105],
      real_scale_area_threshold: 0,
      channel: ChannelParams::default(),
    }
  }

  #[test]
  fn first_scale_is_full_resolution() {
    let sizes = select_scales(960, 720, &params());
    assert_eq!(sizes[0], ScaledSize { width: 960, height: 720 });
  }

  #[test]
  fn sizes_are_multiples_of_shrink_and_decreasing() {
    let sizes = select_scales(640, 480, &params());
    assert!(!sizes.is_empty());
    for s in &sizes {
      assert_eq!(s.width % 4, 0);
      assert_eq!(s.height % 4, 0);
    }
    assert!(sizes.windows(2).all(|w| w[1].area() < w[0].area()));
  }

  #[test]
  fn image_smaller_than_model_has_no_scales() {
    assert!(select_scales(16, 16, &params()).is_empty());
  }

  #[test]
  fn tree_covers_every_scale_once() {
    let sizes = select_scales(960, 720, &params());
    let tree = build_scale_tree(&sizes, 8, 0);
    let mut seen = vec![0usize; sizes.len()];
    for cluster in &tree {
      seen[cluster.real] += 1;
      for &j in &cluster.approximates {
        seen[j] += 1;
      }
    }
    assert!(seen.iter().all(|&c| c == 1));
    assert_eq!(tree[0].real, 0);
    assert_eq!(tree[0].approximates, vec![1, 2, 3, 4]);
  }

  #[test]
  fn area_threshold_promotes_small_scales() {
    let sizes: Vec<ScaledSize> = (0..10)
      .map(|i| ScaledSize {
        width: 100 - i * 8,
        height: 100 - i * 8,
      })
      .collect();
    let tree = build_scale_tree(&sizes, 8, 70 * 70);
    assert_eq!(
      tree[0],
      ScaleCluster {
        real: 0,
        approximates: vec![1, 2, 3]
      }
    );
    // 其余尺度面积不足, 各自单独计算
    let singles: Vec<usize> = tree[1..].iter().map(|c| c.real).collect();
    assert_eq!(singles, vec![4, 5, 6, 7, 8, 9]);
    assert!(tree[1..].iter().all(|c| c.approximates.is_empty()));
  }

  #[test]
  fn pyramid_layers_match_sizes() {
    let (w, h) = (96, 128);
    let rgb: Vec<u8> = (0..w * h * 3).map(|i| (i % 251) as u8).collect();
    let pyramid = FeaturePyramid::build(&rgb, w, h, &params()).unwrap();
    assert_eq!(pyramid.len(), pyramid.sizes().len());
    for (i, layer) in pyramid.layers().iter().enumerate() {
      let size = pyramid.sizes()[i];
      assert_eq!(layer.width(), size.width / 4 + 4);
      assert_eq!(layer.height(), size.height / 4 + 4);
    }
    let (sx, sy) = pyramid.scale_xy(0);
    assert!((sx - 1.0).abs() < 1e-9 && (sy - 1.0).abs() < 1e-9);
  }
}
