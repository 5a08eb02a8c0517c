// 该文件是 Renying （人影） 项目的一部分。
// src/channel/color.rs - RGB 到 LUV 颜色通道
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

use std::sync::OnceLock;

/// L 查找表采样点数 (覆盖 y ∈ [0, 1])
const L_TABLE_SAMPLES: usize = 1025;
/// 查找表总长度, 尾部以最后一个值填充
const L_TABLE_LEN: usize = 1064;

const WHITE_UN: f32 = 0.197833;
const WHITE_VN: f32 = 0.468331;
const L_MAX_INV: f32 = 1.0 / 270.0;

// RGB -> XYZ, 每一行是 R/G/B 对 X/Y/Z 的贡献
const RGB_TO_XYZ: [[f32; 3]; 3] = [
  [0.430574, 0.222015, 0.020183],
  [0.341550, 0.706655, 0.129553],
  [0.178325, 0.071330, 0.939180],
];

// y -> L 的查找表, 已乘以 1/270
fn l_table() -> &'static [f32; L_TABLE_LEN] {
  static TABLE: OnceLock<[f32; L_TABLE_LEN]> = OnceLock::new();
  TABLE.get_or_init(|| {
    let y0 = ((6.0 / 29.0) * (6.0 / 29.0) * (6.0 / 29.0)) as f32;
    let a = ((29.0 / 3.0) * (29.0 / 3.0) * (29.0 / 3.0)) as f32;
    let mut table = [0.0f32; L_TABLE_LEN];
    for (i, entry) in table.iter_mut().take(L_TABLE_SAMPLES).enumerate() {
      let y = (i as f64 / 1024.0) as f32;
      let l = if y > y0 {
        116.0 * (y as f64).powf(1.0 / 3.0) as f32 - 16.0
      } else {
        y * a
      };
      *entry = l * L_MAX_INV;
    }
    let last = table[L_TABLE_SAMPLES - 1];
    table[L_TABLE_SAMPLES..].iter_mut().for_each(|v| *v = last);
    table
  })
}

/// 将交错存储的 RGB 图像拆分为按列存储的 R/G/B 三个平面
pub fn split_planes(rgb: &[u8], width: usize, height: usize) -> Vec<u8> {
  debug_assert_eq!(rgb.len(), width * height * 3);
  let n = width * height;
  let mut planar = vec![0u8; n * 3];
  for y in 0..height {
    for x in 0..width {
      let src = (y * width + x) * 3;
      let dst = x * height + y;
      planar[dst] = rgb[src];
      planar[n + dst] = rgb[src + 1];
      planar[2 * n + dst] = rgb[src + 2];
    }
  }
  planar
}

/// RGB 平面转换为 L/U/V 三个浮点平面
///
/// `planar` 依次存放 R, G, B 三个长度为 `n` 的平面, `nrm` 为归一化系数 (通常为 1/255).
/// L 分量通过 1024 级查找表按截断下标取值, 不做插值; 阈值是按该近似训练的.
pub fn rgb_to_luv(planar: &[u8], n: usize, nrm: f32) -> Vec<f32> {
  debug_assert_eq!(planar.len(), n * 3);
  let table = l_table();
  let mr = RGB_TO_XYZ[0].map(|v| v * nrm);
  let mg = RGB_TO_XYZ[1].map(|v| v * nrm);
  let mb = RGB_TO_XYZ[2].map(|v| v * nrm);
  let minu = -88.0 * L_MAX_INV;
  let minv = -134.0 * L_MAX_INV;
  let un13 = 13.0 * WHITE_UN;
  let vn13 = 13.0 * WHITE_VN;

  let (red, rest) = planar.split_at(n);
  let (green, blue) = rest.split_at(n);

  let mut luv = vec![0.0f32; n * 3];
  let (l_plane, rest) = luv.split_at_mut(n);
  let (u_plane, v_plane) = rest.split_at_mut(n);

  for i in 0..n {
    let (r, g, b) = (red[i] as f32, green[i] as f32, blue[i] as f32);
    let x = mr[0] * r + mg[0] * g + mb[0] * b;
    let y = mr[1] * r + mg[1] * g + mb[1] * b;
    let z = mr[2] * r + mg[2] * g + mb[2] * b;

    let d = 1.0 / (x + 1e-35 + 15.0 * y + 3.0 * z);
    let index = ((1024.0 * y) as i64).clamp(0, L_TABLE_LEN as i64 - 1) as usize;
    let l = table[index];

    l_plane[i] = l;
    u_plane[i] = l * (52.0 * x * d - un13) - minu;
    v_plane[i] = l * (117.0 * y * d - vn13) - minv;
  }

  luv
}
