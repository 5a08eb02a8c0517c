// 该文件是 Renying （人影） 项目的一部分。
// src/channel/conv.rs - 三角滤波卷积
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

//! 通道平面均按列存储: 平面中 `(x, y)` 位于 `x * height + y`.
//! 边界采用对称反射: 下标 `-1` 读取 `0`, `-2` 读取 `1`, 依此类推.

/// 对称反射下标, 对半径超过尺寸的情况再截断到合法范围
#[inline]
pub(crate) fn reflect(i: isize, n: usize) -> usize {
  let n = n as isize;
  let j = if i < 0 {
    -i - 1
  } else if i >= n {
    2 * n - i - 1
  } else {
    i
  };
  j.clamp(0, n - 1) as usize
}

/// 半径为 `radius` 的二维三角滤波, 并按 `stride` 降采样
///
/// 一维核为 `[1 2 .. r+1 .. 2 1]`, 归一化系数 `1/(r+1)^4`.
/// 保留的输出位置为 `stride/2 + i*stride`, 输出尺寸为 `(height/stride, width/stride)`.
pub fn conv_tri(input: &[f32], height: usize, width: usize, radius: usize, stride: usize) -> Vec<f32> {
  debug_assert_eq!(input.len(), height * width);
  let stride = stride.max(1);
  let out_h = height / stride;
  let out_w = width / stride;
  if out_h == 0 || out_w == 0 {
    return Vec::new();
  }

  let r = radius as isize;
  let weights: Vec<f32> = (-r..=r).map(|k| (r + 1 - k.abs()) as f32).collect();
  let nrm = 1.0 / ((radius + 1) as f32).powi(4);
  let offset = stride / 2;

  let mut output = vec![0.0f32; out_h * out_w];
  let mut column = vec![0.0f32; height];

  for xo in 0..out_w {
    let x = (offset + xo * stride) as isize;

    // 水平方向: 仅计算需要保留的列
    column.iter_mut().for_each(|v| *v = 0.0);
    for (k, &wk) in (-r..=r).zip(weights.iter()) {
      let src = &input[reflect(x + k, width) * height..][..height];
      for (c, &s) in column.iter_mut().zip(src) {
        *c += wk * s;
      }
    }

    // 垂直方向
    let out_col = &mut output[xo * out_h..(xo + 1) * out_h];
    for (yo, o) in out_col.iter_mut().enumerate() {
      let y = (offset + yo * stride) as isize;
      let mut acc = 0.0f32;
      for (k, &wk) in (-r..=r).zip(weights.iter()) {
        acc += wk * column[reflect(y + k, height)];
      }
      *o = nrm * acc;
    }
  }

  output
}

/// `[1 p 1]` 三角滤波, 归一化系数 `1/(p+2)^2`
///
/// `p = 2` 时等价于半径为 1 的三角滤波.
pub fn conv_tri1(input: &[f32], height: usize, width: usize, p: f32, stride: usize) -> Vec<f32> {
  debug_assert_eq!(input.len(), height * width);
  let stride = stride.max(1);
  let out_h = height / stride;
  let out_w = width / stride;
  if out_h == 0 || out_w == 0 {
    return Vec::new();
  }

  let nrm = 1.0 / ((p + 2.0) * (p + 2.0));
  let offset = stride / 2;

  let mut output = vec![0.0f32; out_h * out_w];
  let mut column = vec![0.0f32; height];

  for xo in 0..out_w {
    let x = (offset + xo * stride) as isize;
    let left = &input[reflect(x - 1, width) * height..][..height];
    let mid = &input[x as usize * height..][..height];
    let right = &input[reflect(x + 1, width) * height..][..height];
    for y in 0..height {
      column[y] = nrm * (left[y] + p * mid[y] + right[y]);
    }

    let out_col = &mut output[xo * out_h..(xo + 1) * out_h];
    for (yo, o) in out_col.iter_mut().enumerate() {
      let y = (offset + yo * stride) as isize;
      *o = column[reflect(y - 1, height)] + p * column[y as usize] + column[reflect(y + 1, height)];
    }
  }

  output
}
