// 该文件是 Renying （人影） 项目的一部分。
// src/detector/cascade.rs - 决策树级联分类器
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

use crate::{
  detection::Detection,
  features::{FeatureLayer, N_CHANNELS},
  model::AcfModel,
};

/// 单个窗口的评分结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowScore {
  pub score: f32,
  /// 提前终止时所在的树编号, 全部通过时为树的数量
  pub level: usize,
}

/// 通过级联的窗口, 坐标为通道网格中的列与行
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowHit {
  pub column: usize,
  pub row: usize,
  pub score: f32,
  pub level: usize,
}

/// 在特征层上滑动窗口并逐棵树累加得分
#[derive(Debug, Clone, Copy)]
pub struct Cascade<'a> {
  model: &'a AcfModel,
  threshold: f32,
}

impl<'a> Cascade<'a> {
  pub fn new(model: &'a AcfModel) -> Self {
    Self {
      model,
      threshold: model.casc_thr(),
    }
  }

  /// 替换模型自带的拒绝阈值
  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn threshold(&self) -> f32 {
    self.threshold
  }

  /// 窗口内特征编号到特征层偏移量的映射
  ///
  /// 编号按 通道 -> 列 -> 行 排列, 偏移量为 `z * w * h + c * h + r`, 其中 `w`/`h` 为填充后的层尺寸.
  pub fn feature_offsets(&self, layer_width: usize, layer_height: usize) -> Vec<usize> {
    let o = self.model.opts();
    let cols = o.model_width_pad / o.shrink;
    let rows = o.model_height_pad / o.shrink;
    let plane = layer_width * layer_height;
    let mut cids = Vec::with_capacity(N_CHANNELS * cols * rows);
    for z in 0..N_CHANNELS {
      for c in 0..cols {
        for r in 0..rows {
          cids.push(z * plane + c * layer_height + r);
        }
      }
    }
    cids
  }

  /// 层上可放置窗口的列数与行数
  pub fn window_grid(&self, layer: &FeatureLayer) -> (usize, usize) {
    let o = self.model.opts();
    let stride = o.shrink as i64;
    let count = |channel: usize, model: usize| {
      let span = (channel * o.shrink) as i64 - model as i64 + 1;
      if span <= 0 { 0 } else { ((span + stride - 1) / stride) as usize }
    };
    (
      count(layer.width(), o.model_width_pad),
      count(layer.height(), o.model_height_pad),
    )
  }

  /// 对以 `window[0]` 为左上角的窗口求值
  pub fn score_window(&self, window: &[f32], cids: &[usize]) -> WindowScore {
    let trees = self.model.trees();
    let nodes = trees.nodes_per_tree;
    let depth = trees.tree_depth;
    let feature = |k: usize| window[cids[trees.fids[k] as usize]];

    let mut score = 0.0f32;
    let mut level = trees.n_trees;
    for t in 0..trees.n_trees {
      let offset = t * nodes;
      let mut k = offset;
      if depth == 0 {
        while trees.child[k] != 0 {
          let left = (feature(k) < trees.thrs[k]) as usize;
          k = trees.child[k] as usize - left + offset;
        }
      } else {
        let mut k0 = 0usize;
        for _ in 0..depth {
          let step = if feature(k) < trees.thrs[k] { 1 } else { 2 };
          k0 = step + 2 * k0;
          k = k0 + offset;
        }
      }
      score += trees.hs[k];
      if score <= self.threshold {
        level = t;
        break;
      }
    }

    WindowScore { score, level }
  }

  /// 在列 `column`、行 `row` 处求值
  pub fn score_at(&self, layer: &FeatureLayer, cids: &[usize], column: usize, row: usize) -> WindowScore {
    let base = row + column * layer.height();
    self.score_window(&layer.data()[base..], cids)
  }

  /// 扫描整个特征层, 按列并行, 结果按列优先顺序排列
  pub fn scan(&self, layer: &FeatureLayer) -> Vec<WindowHit> {
    let cids = self.feature_offsets(layer.width(), layer.height());
    let (cols, rows) = self.window_grid(layer);
    (0..cols)
      .into_par_iter()
      .flat_map_iter(|column| {
        let cids = &cids;
        (0..rows).filter_map(move |row| {
          let s = self.score_at(layer, cids, column, row);
          (s.score > self.threshold).then_some(WindowHit {
            column,
            row,
            score: s.score,
            level: s.level,
          })
        })
      })
      .collect()
  }

  /// 将窗口位置换算为该层缩放图像中的像素坐标
  ///
  /// 去掉金字塔填充并居中到未填充窗口, 宽高固定为未填充的窗口尺寸.
  pub fn to_detection(&self, hit: &WindowHit) -> Detection {
    let o = self.model.opts();
    let shrink = o.shrink as f32;
    let shift_w = (o.model_width_pad - o.model_width) as f32 / 2.0;
    let shift_h = (o.model_height_pad - o.model_height) as f32 / 2.0;
    Detection::new(
      hit.column as f32 * shrink - o.pad_width as f32 + shift_w,
      hit.row as f32 * shrink - o.pad_height as f32 + shift_h,
      o.model_width as f32,
      o.model_height as f32,
      hit.score,
    )
    .with_level(hit.level)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectorOpts, TreeEnsemble};

  fn opts() -> DetectorOpts {
    DetectorOpts {
      name: "test".into(),
      model_height: 8,
      model_width: 4,
      model_height_pad: 8,
      model_width_pad: 8,
      pad_height: 0,
      pad_width: 4,
      shrink: 4,
      lambdas: [0.0; 3],
      casc_thr: -1.0,
    }
  }

  // 每棵树都是根据特征 0 划分的树桩: 左叶 hs[1], 右叶 hs[2]
  fn stumps(leaves: &[(f32, f32)], thr: f32) -> TreeEnsemble {
    let n = leaves.len();
    TreeEnsemble::from_trees(
      0,
      vec![vec![0, 0, 0]; n],
      vec![vec![thr, 0.0, 0.0]; n],
      vec![vec![2, 0, 0]; n],
      leaves.iter().map(|&(l, r)| vec![0.0, l, r]).collect(),
    )
    .unwrap()
  }

  fn layer(width: usize, height: usize, value: f32) -> FeatureLayer {
    FeatureLayer::from_raw(width, height, 4, vec![value; N_CHANNELS * width * height]).unwrap()
  }

  #[test]
  fn offsets_follow_plane_column_row_order() {
    let model = AcfModel::new(opts(), stumps(&[(1.0, 1.0)], 0.0)).unwrap();
    let cids = Cascade::new(&model).feature_offsets(5, 7);
    assert_eq!(cids.len(), 10 * 2 * 2);
    assert_eq!(&cids[..4], &[0, 1, 7, 8]);
    assert_eq!(cids[4], 35);
  }

  #[test]
  fn variable_depth_walk_picks_side() {
    let model = AcfModel::new(opts(), stumps(&[(-0.5, 2.0)], 0.3)).unwrap();
    let cascade = Cascade::new(&model);
    let cids = cascade.feature_offsets(2, 2);
    let low = vec![0.0f32; 40];
    let high = vec![1.0f32; 40];
    assert_eq!(cascade.score_window(&low, &cids).score, -0.5);
    assert_eq!(cascade.score_window(&high, &cids).score, 2.0);
  }

  #[test]
  fn fixed_depth_matches_variable_depth_on_stumps() {
    let variable = AcfModel::new(opts(), stumps(&[(-0.5, 2.0), (0.25, 1.0)], 0.3)).unwrap();
    let mut fixed_trees = stumps(&[(-0.5, 2.0), (0.25, 1.0)], 0.3);
    fixed_trees.tree_depth = 1;
    let fixed = AcfModel::new(opts(), fixed_trees).unwrap();

    let cids = Cascade::new(&variable).feature_offsets(2, 2);
    for v in [0.0f32, 0.29, 0.31, 5.0] {
      let window = vec![v; 40];
      let a = Cascade::new(&variable).score_window(&window, &cids);
      let b = Cascade::new(&fixed).score_window(&window, &cids);
      assert_eq!(a, b);
    }
  }

  #[test]
  fn rejection_stops_at_failing_tree() {
    let model = AcfModel::new(opts(), stumps(&[(1.0, 1.0), (-3.0, -3.0), (5.0, 5.0)], 0.0)).unwrap();
    let cascade = Cascade::new(&model);
    let cids = cascade.feature_offsets(2, 2);
    let s = cascade.score_window(&[0.0; 40], &cids);
    assert_eq!(s, WindowScore { score: -2.0, level: 1 });

    let all = cascade.with_threshold(f32::NEG_INFINITY).score_window(&[0.0; 40], &cids);
    assert_eq!(all, WindowScore { score: 3.0, level: 3 });
  }

  #[test]
  fn grid_covers_windows_that_fit() {
    let model = AcfModel::new(opts(), stumps(&[(1.0, 1.0)], 0.0)).unwrap();
    let cascade = Cascade::new(&model);
    // 层 6x5, 窗口 2x2 个格点
    assert_eq!(cascade.window_grid(&layer(6, 5, 0.0)), (5, 4));
    assert_eq!(cascade.window_grid(&layer(1, 1, 0.0)), (0, 0));
    let hits = cascade.scan(&layer(6, 5, 0.0));
    assert_eq!(hits.len(), 20);
    assert_eq!((hits[0].column, hits[0].row), (0, 0));
    assert_eq!((hits[1].column, hits[1].row), (0, 1));
  }

  #[test]
  fn detection_is_shifted_and_centred() {
    let model = AcfModel::new(opts(), stumps(&[(1.0, 1.0)], 0.0)).unwrap();
    let cascade = Cascade::new(&model);
    let hit = WindowHit {
      column: 3,
      row: 2,
      score: 1.5,
      level: 1,
    };
    let d = cascade.to_detection(&hit);
    // x = 3*4 - 4 + (8-4)/2, y = 2*4 - 0 + 0
    assert_eq!((d.x, d.y, d.width, d.height), (10.0, 8.0, 4.0, 8.0));
    assert_eq!((d.score, d.level), (1.5, 1));
  }
}
