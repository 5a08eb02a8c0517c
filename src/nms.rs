// 该文件是 Renying （人影） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use thiserror::Error;
use tracing::trace;

use crate::detection::{Detection, DetectionList, MERGED_COLOR};

/// 默认重合阈值: 相交面积 / 较小框面积
pub const DEFAULT_OVERLAP: f32 = 0.65;

#[derive(Error, Debug, PartialEq)]
pub enum NmsError {
  #[error("被抑制的检测 {index} 与任何保留的检测都不相交")]
  Orphan { index: usize },
}

/// 贪心合并重叠的检测框
///
/// 按得分从高到低扫描, 若较低得分的框与已保留框的相交面积超过二者中较小面积的 `overlap` 倍则被抑制.
/// 每个被抑制的框归入与其相交面积最大的保留框, 输出框为保留框及其子框按得分加权的平均位置,
/// 得分取保留框自身得分, `level` 为子框数量.
pub fn suppress(input: &DetectionList, overlap: f32) -> Result<DetectionList, NmsError> {
  let mut dets: Vec<Detection> = input.iter().copied().collect();
  dets.sort_by(|a, b| b.score.total_cmp(&a.score));
  let n = dets.len();
  let area: Vec<f32> = dets.iter().map(Detection::area).collect();

  let mut keep = vec![true; n];
  for i in 0..n {
    if !keep[i] {
      continue;
    }
    for j in i + 1..n {
      if keep[j] && dets[i].intersection(&dets[j]) / area[i].min(area[j]) > overlap {
        keep[j] = false;
      }
    }
  }

  let mut parent = vec![0usize; n];
  for i in 0..n {
    if keep[i] {
      parent[i] = i;
      continue;
    }
    let mut best = 0.0f32;
    let mut found = None;
    for j in (0..n).filter(|&j| keep[j]) {
      let inter = dets[i].intersection(&dets[j]);
      if inter > best {
        best = inter;
        found = Some(j);
      }
    }
    parent[i] = found.ok_or(NmsError::Orphan { index: i })?;
  }

  let mut merged = DetectionList::new();
  for i in (0..n).filter(|&i| keep[i]) {
    let (mut sx, mut sy, mut sw, mut sh, mut ss) = (0.0f32, 0.0f32, 0.0f32, 0.0f32, 0.0f32);
    let mut children = 0usize;
    for (j, d) in dets.iter().enumerate().filter(|&(j, _)| parent[j] == i) {
      sx += d.x * d.score;
      sy += d.y * d.score;
      sw += d.width * d.score;
      sh += d.height * d.score;
      ss += d.score;
      if j != i {
        children += 1;
      }
    }
    merged.push(
      Detection::new(sx / ss, sy / ss, sw / ss, sh / ss, dets[i].score)
        .with_level(children)
        .with_color(MERGED_COLOR),
    );
  }

  trace!("非极大值抑制: {} -> {}", n, merged.len());
  Ok(merged)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn overlapping_pair_merges_into_one() {
    let input: DetectionList = vec![
      Detection::new(1.0, 1.0, 10.0, 10.0, 0.5),
      Detection::new(0.0, 0.0, 10.0, 10.0, 0.9),
    ]
    .into();
    let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
    assert_eq!(out.len(), 1);
    let d = out.iter().next().unwrap();
    assert_eq!(d.score, 0.9);
    assert_eq!(d.level, 1);
    // 按得分加权: (0*0.9 + 1*0.5) / 1.4
    assert!((d.x - 0.5 / 1.4).abs() < 1e-6);
    assert!((d.width - 10.0).abs() < 1e-6);
  }

  #[test]
  fn disjoint_pair_is_kept() {
    let input: DetectionList = vec![
      Detection::new(0.0, 0.0, 10.0, 10.0, 0.9),
      Detection::new(100.0, 100.0, 10.0, 10.0, 0.5),
    ]
    .into();
    let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|d| d.level == 0));
    let first = out.iter().next().unwrap();
    assert_eq!((first.x, first.y, first.score), (0.0, 0.0, 0.9));
  }

  #[test]
  fn small_box_inside_large_is_absorbed() {
    let input: DetectionList = vec![
      Detection::new(0.0, 0.0, 100.0, 100.0, 1.0),
      Detection::new(10.0, 10.0, 20.0, 20.0, 2.0),
    ]
    .into();
    let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out.iter().next().unwrap().score, 2.0);
  }

  #[test]
  fn child_joins_largest_overlap_survivor() {
    // 中间框被左框抑制, 但与右框相交更多, 计入右框
    let input: DetectionList = vec![
      Detection::new(0.0, 0.0, 10.0, 10.0, 3.0),
      Detection::new(3.0, 0.0, 10.0, 10.0, 2.0),
      Detection::new(4.0, 0.0, 10.0, 10.0, 1.0),
    ]
    .into();
    let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
    let levels: Vec<usize> = out.iter().map(|d| d.level).collect();
    assert_eq!(out.len(), 2);
    assert_eq!(levels, vec![0, 1]);
  }

  #[test]
  fn empty_input_gives_empty_output() {
    assert!(suppress(&DetectionList::new(), DEFAULT_OVERLAP).unwrap().is_empty());
  }
}
