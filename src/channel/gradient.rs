// 该文件是 Renying （人影） 项目的一部分。
// src/channel/gradient.rs - 梯度幅值与方向直方图
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

use std::f32::consts::PI;
use std::sync::OnceLock;

use super::conv::conv_tri;

const ACOS_STEPS: i32 = 10000;
const ACOS_GUARD: i32 = 10;
const ACOS_LEN: usize = (2 * (ACOS_STEPS + ACOS_GUARD)) as usize;

// 表项 `i` 对应 acos((i - n - b) / n), 两端各留 b 个保护项
fn acos_table() -> &'static [f32; ACOS_LEN] {
  static TABLE: OnceLock<[f32; ACOS_LEN]> = OnceLock::new();
  TABLE.get_or_init(|| {
    let (n, b) = (ACOS_STEPS, ACOS_GUARD);
    let mut table = [0.0f32; ACOS_LEN];
    for i in -n - b..n + b {
      let v = if i < -n {
        PI
      } else if i < n {
        (i as f32 / n as f32).acos()
      } else {
        0.0
      };
      table[(i + n + b) as usize] = v;
    }
    for i in -n - b..n / 10 {
      let v = &mut table[(i + n + b) as usize];
      if *v > PI - 1e-6 {
        *v = PI - 1e-6;
      }
    }
    table
  })
}

#[inline]
fn acos_lookup(v: f32) -> f32 {
  let index = (v as i32 + ACOS_STEPS + ACOS_GUARD).clamp(0, ACOS_LEN as i32 - 1);
  acos_table()[index as usize]
}

// 一阶中心差分, 两端退化为单侧差分, 长度为 1 时为 0
#[inline]
fn diff(prev: f32, next: f32, at_border: bool) -> f32 {
  if at_border { next - prev } else { 0.5 * (next - prev) }
}

fn column_gradient(plane: &[f32], height: usize, width: usize, x: usize, gx: &mut [f32], gy: &mut [f32]) {
  let column = |c: usize| &plane[c * height..(c + 1) * height];

  if width == 1 {
    gx.iter_mut().for_each(|v| *v = 0.0);
  } else {
    let (p, n) = match x {
      0 => (0, 1),
      x if x == width - 1 => (x - 1, x),
      x => (x - 1, x + 1),
    };
    let border = x == 0 || x == width - 1;
    for ((g, &a), &b) in gx.iter_mut().zip(column(p)).zip(column(n)) {
      *g = diff(a, b, border);
    }
  }

  let col = column(x);
  if height == 1 {
    gy[0] = 0.0;
    return;
  }
  gy[0] = col[1] - col[0];
  for y in 1..height - 1 {
    gy[y] = diff(col[y - 1], col[y + 1], false);
  }
  gy[height - 1] = col[height - 1] - col[height - 2];
}

/// 计算梯度幅值与方向
///
/// 输入为 `depth` 个连续存放的按列平面, 每个像素取梯度平方幅值最大的那个平面.
/// 方向范围为 `[0, π)`, `full` 为真时扩展到 `[0, 2π)`.
pub fn grad_mag(input: &[f32], height: usize, width: usize, depth: usize, full: bool) -> (Vec<f32>, Vec<f32>) {
  let area = height * width;
  debug_assert_eq!(input.len(), area * depth);

  let mut magnitude = vec![0.0f32; area];
  let mut orientation = vec![0.0f32; area];
  if area == 0 {
    return (magnitude, orientation);
  }

  let mut gx = vec![0.0f32; height];
  let mut gy = vec![0.0f32; height];
  let mut cx = vec![0.0f32; height];
  let mut cy = vec![0.0f32; height];
  let mut m2 = vec![0.0f32; height];

  for x in 0..width {
    for c in 0..depth {
      let plane = &input[c * area..(c + 1) * area];
      if c == 0 {
        column_gradient(plane, height, width, x, &mut gx, &mut gy);
        for y in 0..height {
          m2[y] = gx[y] * gx[y] + gy[y] * gy[y];
        }
        continue;
      }
      column_gradient(plane, height, width, x, &mut cx, &mut cy);
      for y in 0..height {
        let v = cx[y] * cx[y] + cy[y] * cy[y];
        if v > m2[y] {
          m2[y] = v;
          gx[y] = cx[y];
          gy[y] = cy[y];
        }
      }
    }

    let m_col = &mut magnitude[x * height..(x + 1) * height];
    let o_col = &mut orientation[x * height..(x + 1) * height];
    for y in 0..height {
      let inv = (1.0 / m2[y].sqrt()).min(1e10);
      m_col[y] = 1.0 / inv;

      let mut gxn = gx[y] * inv * ACOS_STEPS as f32;
      if gy[y].is_sign_negative() {
        gxn = -gxn;
      }
      let mut o = acos_lookup(gxn);
      if full && gy[y] < 0.0 {
        o += PI;
      }
      o_col[y] = o;
    }
  }

  (magnitude, orientation)
}

/// 以局部平均幅值归一化: `M / (convTri(M, radius) + norm)`
pub fn grad_mag_norm(magnitude: &mut [f32], height: usize, width: usize, radius: usize, norm: f32) {
  let smoothed = conv_tri(magnitude, height, width, radius, 1);
  for (m, s) in magnitude.iter_mut().zip(smoothed) {
    *m /= s + norm;
  }
}

/// 计算梯度方向直方图
///
/// 输出 `n_orients` 个 `(height/bin, width/bin)` 的平面. 超出整块范围的像素被丢弃.
/// 每个像素按方向在相邻两个方向桶之间线性分配, 空间上只落入所在的块.
pub fn grad_hist(
  magnitude: &[f32],
  orientation: &[f32],
  height: usize,
  width: usize,
  bin: usize,
  n_orients: usize,
  full: bool,
) -> Vec<f32> {
  let bin = bin.max(1);
  let hb = height / bin;
  let wb = width / bin;
  let nb = hb * wb;
  let mut hist = vec![0.0f32; n_orients * nb];
  if nb == 0 || n_orients == 0 {
    return hist;
  }

  let to_orient = n_orients as f32 / if full { 2.0 * PI } else { PI };
  let norm = 1.0 / (bin * bin) as f32;
  let o_max = n_orients as f32 - 0.001;

  for x in 0..wb * bin {
    let m_col = &magnitude[x * height..];
    let o_col = &orientation[x * height..];
    let base = (x / bin) * hb;
    for y in 0..hb * bin {
      let o = (o_col[y] * to_orient).clamp(0.0, o_max);
      let o0 = o as usize;
      let od = o - o0 as f32;
      let o1 = (o0 + 1) % n_orients;

      let m = m_col[y] * norm;
      let m1 = od * m;
      let cell = base + y / bin;
      hist[o0 * nb + cell] += m - m1;
      hist[o1 * nb + cell] += m1;
    }
  }

  hist
}
