// 该文件是 Renying （人影） 项目的一部分。
// tests/nms.rs - 非极大值抑制性质测试
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

use proptest::prelude::*;

use renying::{
  detection::{Detection, DetectionList, MERGED_COLOR},
  nms::{DEFAULT_OVERLAP, suppress},
};

#[test]
fn overlapping_pair_collapses_to_stronger_box() {
  let input: DetectionList = vec![
    Detection::new(0.0, 0.0, 10.0, 10.0, 0.9),
    Detection::new(1.0, 1.0, 10.0, 10.0, 0.5),
  ]
  .into();
  let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
  assert_eq!(out.len(), 1);
  let d = out.as_slice()[0];
  assert_eq!((d.score, d.level, d.color), (0.9, 1, MERGED_COLOR));
  assert!((d.y - 0.5 / 1.4).abs() < 1e-6);
}

#[test]
fn separated_pair_is_unchanged() {
  let input: DetectionList = vec![
    Detection::new(0.0, 0.0, 10.0, 10.0, 0.9),
    Detection::new(100.0, 100.0, 10.0, 10.0, 0.5),
  ]
  .into();
  let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
  let boxes: Vec<_> = out.iter().map(|d| (d.x, d.y, d.width, d.height, d.score, d.level)).collect();
  assert_eq!(
    boxes,
    vec![(0.0, 0.0, 10.0, 10.0, 0.9, 0), (100.0, 100.0, 10.0, 10.0, 0.5, 0)]
  );
}

#[test]
fn overlap_below_threshold_keeps_both() {
  // 相交 5x10, 比例 0.5
  let input: DetectionList = vec![
    Detection::new(0.0, 0.0, 10.0, 10.0, 0.9),
    Detection::new(5.0, 0.0, 10.0, 10.0, 0.5),
  ]
  .into();
  assert_eq!(suppress(&input, DEFAULT_OVERLAP).unwrap().len(), 2);
}

#[test]
fn output_is_ordered_by_score() {
  let input: DetectionList = vec![
    Detection::new(0.0, 0.0, 10.0, 10.0, 0.1),
    Detection::new(50.0, 0.0, 10.0, 10.0, 0.7),
    Detection::new(100.0, 0.0, 10.0, 10.0, 0.4),
  ]
  .into();
  let scores: Vec<f32> = suppress(&input, DEFAULT_OVERLAP).unwrap().iter().map(|d| d.score).collect();
  assert_eq!(scores, vec![0.7, 0.4, 0.1]);
}

// 每个框落在各自 100x100 的格子内, 互不相交
fn separated_boxes() -> impl Strategy<Value = Vec<Detection>> {
  proptest::collection::vec((0.0f32..40.0, 0.0f32..40.0, 1.0f32..50.0, 1.0f32..50.0, 0.01f32..5.0), 0..30)
    .prop_map(|cells| {
      cells
        .into_iter()
        .enumerate()
        .map(|(i, (x, y, w, h, s))| {
          let (cx, cy) = ((i % 6) as f32 * 100.0, (i / 6) as f32 * 100.0);
          Detection::new(cx + x, cy + y, w, h, s)
        })
        .collect()
    })
}

fn close(a: &DetectionList, b: &DetectionList) -> bool {
  a.len() == b.len()
    && a.iter().zip(b.iter()).all(|(p, q)| {
      (p.x - q.x).abs() < 1e-3
        && (p.y - q.y).abs() < 1e-3
        && (p.width - q.width).abs() < 1e-3
        && (p.height - q.height).abs() < 1e-3
        && p.score == q.score
        && p.level == q.level
    })
}

proptest! {
  #[test]
  fn separated_boxes_survive_unmerged(boxes in separated_boxes()) {
    let input: DetectionList = boxes.into();
    let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
    prop_assert_eq!(out.len(), input.len());
    prop_assert!(out.iter().all(|d| d.level == 0));
  }

  #[test]
  fn suppression_is_idempotent(boxes in separated_boxes()) {
    let input: DetectionList = boxes.into();
    let once = suppress(&input, DEFAULT_OVERLAP).unwrap();
    let twice = suppress(&once, DEFAULT_OVERLAP).unwrap();
    prop_assert!(close(&once, &twice));
  }

  #[test]
  fn kept_boxes_never_overlap_above_threshold(
    boxes in proptest::collection::vec((0.0f32..60.0, 0.0f32..60.0, 5.0f32..30.0, 5.0f32..30.0), 1..25)
  ) {
    // 得分互不相同, 输出框的得分即可定位其保留的原始框
    let input: DetectionList = boxes
      .into_iter()
      .enumerate()
      .map(|(i, (x, y, w, h))| Detection::new(x, y, w, h, 1.0 + i as f32))
      .collect();
    let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
    let kept: Vec<Detection> = out
      .iter()
      .map(|m| *input.iter().find(|d| d.score == m.score).unwrap())
      .collect();
    for (i, a) in kept.iter().enumerate() {
      for b in &kept[i + 1..] {
        let ratio = a.intersection(b) / a.area().min(b.area());
        prop_assert!(ratio <= DEFAULT_OVERLAP, "{:?} / {:?} 重合 {}", a, b, ratio);
      }
    }
  }

  #[test]
  fn every_input_is_accounted_for(
    boxes in proptest::collection::vec((0.0f32..60.0, 0.0f32..60.0, 5.0f32..30.0, 0.01f32..1.0), 1..25)
  ) {
    let input: DetectionList = boxes
      .into_iter()
      .map(|(x, y, s, score)| Detection::new(x, y, s, s, score))
      .collect();
    let out = suppress(&input, DEFAULT_OVERLAP).unwrap();
    let merged: usize = out.iter().map(|d| d.level + 1).sum();
    prop_assert_eq!(merged, input.len());
    prop_assert_eq!(out.max_score(), input.max_score());
  }
}
