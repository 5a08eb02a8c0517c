// 该文件是 Renying （人影） 项目的一部分。
// src/features.rs - 单一尺度的通道特征
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
use thiserror::Error;
use tracing::trace;

use crate::channel::{
  Border, Channel, ChannelKind, ChannelParams, N_ORIENTS,
  conv::conv_tri1,
  gradient::{grad_hist, grad_mag, grad_mag_norm},
  resize::resize_plane,
};

/// 每个尺度的通道平面总数 (3 LUV + 1 幅值 + 6 方向直方图)
pub const N_CHANNELS: usize = 10;

#[derive(Error, Debug)]
pub enum FeatureError {
  #[error("通道数量错误: 期望 {expected}, 实际 {found}")]
  ChannelCount { expected: usize, found: usize },
  #[error("通道尺寸为空: {width}x{height} (缩小系数 {shrink})")]
  EmptyChannel {
    width: usize,
    height: usize,
    shrink: usize,
  },
  #[error("LUV 缓冲区长度不匹配: 期望 {expected}, 实际 {actual}")]
  LuvLength { expected: usize, actual: usize },
  #[error("特征金字塔第 {index} 层缺失")]
  MissingLayer { index: usize },
}

/// 未填充的通道特征, 每个通道的尺寸为图像尺寸除以 `shrink`
#[derive(Debug, Clone)]
pub struct ChannelFeatures {
  width: usize,
  height: usize,
  shrink: usize,
  channels: Vec<Channel>,
}

fn check_planes(channels: &[Channel]) -> Result<(), FeatureError> {
  let found: usize = channels.iter().map(Channel::planes).sum();
  if found != N_CHANNELS {
    return Err(FeatureError::ChannelCount {
      expected: N_CHANNELS,
      found,
    });
  }
  Ok(())
}

fn channel_dims(width: usize, height: usize, shrink: usize) -> Result<(usize, usize), FeatureError> {
  let shrink = shrink.max(1);
  let (cw, ch) = (width / shrink, height / shrink);
  if cw == 0 || ch == 0 {
    return Err(FeatureError::EmptyChannel {
      width,
      height,
      shrink,
    });
  }
  Ok((cw, ch))
}

impl ChannelFeatures {
  /// 由 LUV 图像直接计算全部通道 (真实尺度)
  ///
  /// `luv` 为三个按列存储的 `width x height` 平面, 所有权转交给本结构.
  pub fn from_luv(
    luv: Vec<f32>,
    width: usize,
    height: usize,
    shrink: usize,
    params: &ChannelParams,
  ) -> Result<Self, FeatureError> {
    let (cw, ch) = channel_dims(width, height, shrink)?;
    let area = width * height;
    if luv.len() != 3 * area {
      return Err(FeatureError::LuvLength {
        expected: 3 * area,
        actual: luv.len(),
      });
    }

    // 梯度只在 L 通道上计算
    let (mut magnitude, orientation) =
      grad_mag(&luv[..area], height, width, 1, params.full_orientation);
    grad_mag_norm(
      &mut magnitude,
      height,
      width,
      params.norm_radius,
      params.norm_const,
    );
    let histogram = grad_hist(
      &magnitude,
      &orientation,
      height,
      width,
      shrink,
      N_ORIENTS,
      params.full_orientation,
    );
    drop(orientation);

    let color = Channel::new(ChannelKind::Color, width, height, luv).resized(cw, ch);
    let magnitude = Channel::new(ChannelKind::GradientMagnitude, width, height, magnitude).resized(cw, ch);
    let histogram = Channel::new(ChannelKind::GradientHistogram, cw, ch, histogram);

    let channels = vec![color, magnitude, histogram];
    check_planes(&channels)?;
    trace!("计算真实尺度通道 {}x{} -> {}x{}", width, height, cw, ch);

    Ok(Self {
      width: cw,
      height: ch,
      shrink,
      channels,
    })
  }

  /// 由已有通道重采样得到新尺度的近似通道
  ///
  /// `width`/`height` 为目标图像尺寸, 每个平面乘以 `ratio^lambda[group]`,
  /// 其中 `ratio` 为新旧通道宽高比的平均值.
  pub fn approximate(&self, width: usize, height: usize, lambdas: &[f32; 3]) -> Result<Self, FeatureError> {
    check_planes(&self.channels)?;
    let (cw, ch) = channel_dims(width, height, self.shrink)?;

    let ratio = (cw as f32 / self.width as f32 + ch as f32 / self.height as f32) / 2.0;
    let src_area = self.width * self.height;

    let planes: Vec<(ChannelKind, &[f32])> = self
      .channels
      .iter()
      .flat_map(|c| c.data.chunks_exact(src_area).map(move |p| (c.kind, p)))
      .collect();

    let resampled: Vec<Vec<f32>> = planes
      .par_iter()
      .map(|&(kind, plane)| {
        let mut out = resize_plane(plane, self.height, self.width, ch, cw);
        let factor = ratio.powf(lambdas[kind.group()]);
        if (factor - 1.0).abs() > 0.001 {
          out.iter_mut().for_each(|v| *v *= factor);
        }
        out
      })
      .collect();

    let mut resampled = resampled.into_iter();
    let channels = ChannelKind::ALL
      .iter()
      .map(|&kind| {
        let data: Vec<f32> = resampled.by_ref().take(kind.planes()).flatten().collect();
        Channel::new(kind, cw, ch, data)
      })
      .collect::<Vec<_>>();
    check_planes(&channels)?;
    trace!(
      "近似尺度通道 {}x{} -> {}x{}, 比例 {:.4}",
      self.width, self.height, cw, ch, ratio
    );

    Ok(Self {
      width: cw,
      height: ch,
      shrink: self.shrink,
      channels,
    })
  }

  /// 平滑每个平面并填充边界, 拼接为一块连续内存
  ///
  /// 颜色通道复制边界像素, 其余通道补零. 结果宽高各增加 `2*pad_lr` 与 `2*pad_tb`.
  pub fn smooth_pad(self, pad_lr: usize, pad_tb: usize, smooth_p: f32) -> Result<FeatureLayer, FeatureError> {
    check_planes(&self.channels)?;
    let (w, h) = (self.width, self.height);
    let (pw, ph) = (w + 2 * pad_lr, h + 2 * pad_tb);
    let padded_area = pw * ph;

    let planes: Vec<(Border, &[f32])> = self
      .channels
      .iter()
      .flat_map(|c| c.data.chunks_exact(w * h).map(move |p| (c.kind.border(), p)))
      .collect();

    let mut data = vec![0.0f32; N_CHANNELS * padded_area];
    data
      .par_chunks_mut(padded_area)
      .zip(planes.par_iter())
      .for_each(|(dst, &(border, plane))| {
        let smoothed = conv_tri1(plane, h, w, smooth_p, 1);
        pad_plane(&smoothed, h, w, dst, pad_lr, pad_tb, border);
      });

    Ok(FeatureLayer {
      width: pw,
      height: ph,
      shrink: self.shrink,
      data,
    })
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn shrink(&self) -> usize {
    self.shrink
  }

  pub fn n_channels(&self) -> usize {
    self.channels.iter().map(Channel::planes).sum()
  }

  pub fn channels(&self) -> &[Channel] {
    &self.channels
  }
}

// 将按列存储的平面写入带边框的目标平面
fn pad_plane(src: &[f32], h: usize, w: usize, dst: &mut [f32], pad_lr: usize, pad_tb: usize, border: Border) {
  let ph = h + 2 * pad_tb;
  for (x, column) in dst.chunks_exact_mut(ph).enumerate() {
    let sx = x as isize - pad_lr as isize;
    let inside_x = (0..w as isize).contains(&sx);
    if !inside_x && border == Border::Zero {
      column.iter_mut().for_each(|v| *v = 0.0);
      continue;
    }
    let sx = sx.clamp(0, w as isize - 1) as usize;
    let src_col = &src[sx * h..(sx + 1) * h];
    for (y, v) in column.iter_mut().enumerate() {
      let sy = y as isize - pad_tb as isize;
      *v = if (0..h as isize).contains(&sy) {
        src_col[sy as usize]
      } else {
        match border {
          Border::Replicate => src_col[sy.clamp(0, h as isize - 1) as usize],
          Border::Zero => 0.0,
        }
      };
    }
  }
}

/// 平滑并填充后的特征层, 供级联分类器直接读取
///
/// 内存布局为 `plane * (width * height) + x * height + y`.
#[derive(Debug, Clone)]
pub struct FeatureLayer {
  width: usize,
  height: usize,
  shrink: usize,
  data: Vec<f32>,
}

impl FeatureLayer {
  /// 填充后的通道宽度
  pub fn width(&self) -> usize {
    self.width
  }

  /// 填充后的通道高度
  pub fn height(&self) -> usize {
    self.height
  }

  pub fn shrink(&self) -> usize {
    self.shrink
  }

  pub fn n_channels(&self) -> usize {
    N_CHANNELS
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn plane(&self, index: usize) -> &[f32] {
    let area = self.width * self.height;
    &self.data[index * area..(index + 1) * area]
  }

  pub fn value(&self, plane: usize, x: usize, y: usize) -> f32 {
    self.plane(plane)[x * self.height + y]
  }

  /// 以给定数据直接构造特征层, 数据长度必须为 `10 * width * height`
  pub fn from_raw(width: usize, height: usize, shrink: usize, data: Vec<f32>) -> Result<Self, FeatureError> {
    let area = width * height;
    if area == 0 || data.len() != N_CHANNELS * area {
      return Err(FeatureError::ChannelCount {
        expected: N_CHANNELS,
        found: if area == 0 { 0 } else { data.len() / area },
      });
    }
    Ok(Self {
      width,
      height,
      shrink,
      data,
    })
  }
}
