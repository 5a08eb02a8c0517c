// 该文件是 Renying （人影） 项目的一部分。
// src/channel.rs - 通道描述与计算参数
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

pub mod color;
pub mod conv;
pub mod gradient;
pub mod resize;

use serde::{Deserialize, Serialize};

/// 梯度方向直方图的方向数
pub const N_ORIENTS: usize = 6;

/// 通道种类, 决定平面数量、缩放指数分组与填充方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
  Color,
  GradientMagnitude,
  GradientHistogram,
}

/// 填充边界的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Border {
  Replicate,
  Zero,
}

impl ChannelKind {
  /// 按存储顺序排列的全部通道种类
  pub const ALL: [ChannelKind; 3] = [
    ChannelKind::Color,
    ChannelKind::GradientMagnitude,
    ChannelKind::GradientHistogram,
  ];

  pub const fn planes(self) -> usize {
    match self {
      ChannelKind::Color => 3,
      ChannelKind::GradientMagnitude => 1,
      ChannelKind::GradientHistogram => N_ORIENTS,
    }
  }

  /// 该种类在 `lambdas` 中的下标
  pub const fn group(self) -> usize {
    match self {
      ChannelKind::Color => 0,
      ChannelKind::GradientMagnitude => 1,
      ChannelKind::GradientHistogram => 2,
    }
  }

  pub const fn border(self) -> Border {
    match self {
      ChannelKind::Color => Border::Replicate,
      _ => Border::Zero,
    }
  }

  pub const fn name(self) -> &'static str {
    match self {
      ChannelKind::Color => "color",
      ChannelKind::GradientMagnitude => "gradient magnitude",
      ChannelKind::GradientHistogram => "gradient histogram",
    }
  }
}

/// 一组共享尺寸的平面, 平面按列存储并首尾相接
#[derive(Debug, Clone)]
pub struct Channel {
  pub kind: ChannelKind,
  pub width: usize,
  pub height: usize,
  pub data: Vec<f32>,
}

impl Channel {
  pub fn new(kind: ChannelKind, width: usize, height: usize, data: Vec<f32>) -> Self {
    debug_assert_eq!(data.len(), kind.planes() * width * height);
    Self {
      kind,
      width,
      height,
      data,
    }
  }

  pub fn planes(&self) -> usize {
    self.kind.planes()
  }

  pub fn plane(&self, index: usize) -> &[f32] {
    let area = self.width * self.height;
    &self.data[index * area..(index + 1) * area]
  }

  /// 双线性缩放全部平面到新尺寸
  pub fn resized(&self, width: usize, height: usize) -> Channel {
    if width == self.width && height == self.height {
      return self.clone();
    }
    let data = resize::resize_planes(
      &self.data,
      self.planes(),
      self.height,
      self.width,
      height,
      width,
    );
    Channel::new(self.kind, width, height, data)
  }
}

/// 通道计算的可调参数
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelParams {
  /// 梯度幅值归一化的三角滤波半径
  pub norm_radius: usize,
  /// 梯度幅值归一化常数
  pub norm_const: f32,
  /// 填充前平滑所用 `[1 p 1]` 滤波的中心权重
  pub smooth_p: f32,
  pub full_orientation: bool,
}

impl Default for ChannelParams {
  fn default() -> Self {
    Self {
      norm_radius: 5,
      norm_const: 0.005,
      smooth_p: 2.0,
      full_orientation: false,
    }
  }
}
