// 该文件是 Renying （人影） 项目的一部分。
// src/channel/resize.rs - 通道平面重采样
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

/// 单个输出位置的双线性采样参数
#[derive(Debug, Clone, Copy)]
struct Tap {
  i0: usize,
  i1: usize,
  frac: f32,
}

// 像素中心对齐: src = (dst + 0.5) * scale - 0.5, 越界时贴边
fn axis_taps(src: usize, dst: usize) -> Vec<Tap> {
  let scale = src as f64 / dst as f64;
  (0..dst)
    .map(|d| {
      let f = (d as f64 + 0.5) * scale - 0.5;
      let mut s = f.floor();
      let mut frac = (f - s) as f32;
      if s < 0.0 {
        s = 0.0;
        frac = 0.0;
      }
      let mut i0 = s as usize;
      if i0 >= src - 1 {
        i0 = src - 1;
        frac = 0.0;
      }
      Tap {
        i0,
        i1: (i0 + 1).min(src - 1),
        frac,
      }
    })
    .collect()
}

/// 双线性缩放一个按列存储的平面
pub fn resize_plane(
  src: &[f32],
  src_height: usize,
  src_width: usize,
  dst_height: usize,
  dst_width: usize,
) -> Vec<f32> {
  debug_assert_eq!(src.len(), src_height * src_width);
  if src_height == dst_height && src_width == dst_width {
    return src.to_vec();
  }
  if dst_height == 0 || dst_width == 0 || src_height == 0 || src_width == 0 {
    return vec![0.0; dst_height * dst_width];
  }

  let xs = axis_taps(src_width, dst_width);
  let ys = axis_taps(src_height, dst_height);

  let mut dst = vec![0.0f32; dst_height * dst_width];
  for (column, tx) in dst.chunks_exact_mut(dst_height).zip(xs.iter()) {
    let c0 = &src[tx.i0 * src_height..][..src_height];
    let c1 = &src[tx.i1 * src_height..][..src_height];
    for (o, ty) in column.iter_mut().zip(ys.iter()) {
      let a = c0[ty.i0] + ty.frac * (c0[ty.i1] - c0[ty.i0]);
      let b = c1[ty.i0] + ty.frac * (c1[ty.i1] - c1[ty.i0]);
      *o = a + tx.frac * (b - a);
    }
  }
  dst
}

/// 依次缩放连续存放的多个平面
pub fn resize_planes(
  src: &[f32],
  planes: usize,
  src_height: usize,
  src_width: usize,
  dst_height: usize,
  dst_width: usize,
) -> Vec<f32> {
  let plane_len = src_height * src_width;
  let mut dst = Vec::with_capacity(planes * dst_height * dst_width);
  for plane in src.chunks_exact(plane_len).take(planes) {
    dst.extend(resize_plane(plane, src_height, src_width, dst_height, dst_width));
  }
  dst
}
