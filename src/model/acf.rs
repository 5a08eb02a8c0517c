// 该文件是 Renying （人影） 项目的一部分。
// src/model/acf.rs - ACF 检测器模型
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

use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::features::N_CHANNELS;

#[derive(Error, Debug)]
pub enum AcfModelError {
  #[error("模型读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("模型缺少字段: {0}")]
  MissingField(&'static str),
  #[error("不支持的模型格式: {0}")]
  UnsupportedFormat(String),
  #[error("模型路径必须使用 {0} 方案")]
  SchemeMismatch(&'static str),
  #[error("模型数据不一致: {0}")]
  Inconsistent(String),
}

/// 检测窗口与特征金字塔相关的模型参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOpts {
  pub name: String,
  /// 未填充的窗口尺寸
  pub model_height: usize,
  pub model_width: usize,
  /// 填充后的窗口尺寸
  pub model_height_pad: usize,
  pub model_width_pad: usize,
  /// 金字塔每层在四周填充的像素数
  pub pad_height: usize,
  pub pad_width: usize,
  pub shrink: usize,
  pub lambdas: [f32; 3],
  /// 级联拒绝阈值
  pub casc_thr: f32,
}

/// 决策树集成, 第 `t` 棵树的第 `k` 个节点位于 `t * nodes_per_tree + k`
#[derive(Debug, Clone, PartialEq)]
pub struct TreeEnsemble {
  /// 固定深度, 0 表示按 `child` 遍历的可变深度
  pub tree_depth: u32,
  pub nodes_per_tree: usize,
  pub n_trees: usize,
  pub fids: Vec<u32>,
  pub thrs: Vec<f32>,
  pub child: Vec<u32>,
  pub hs: Vec<f32>,
}

impl TreeEnsemble {
  /// 由按树分组的节点数组构造, 每棵树的节点数必须一致
  pub fn from_trees(
    tree_depth: u32,
    fids: Vec<Vec<u32>>,
    thrs: Vec<Vec<f32>>,
    child: Vec<Vec<u32>>,
    hs: Vec<Vec<f32>>,
  ) -> Result<Self, AcfModelError> {
    let n_trees = fids.len();
    let nodes_per_tree = fids.first().map(Vec::len).unwrap_or(0);

    fn flatten<T>(name: &str, trees: Vec<Vec<T>>, n_trees: usize, nodes: usize) -> Result<Vec<T>, AcfModelError> {
      if trees.len() != n_trees || trees.iter().any(|t| t.len() != nodes) {
        return Err(AcfModelError::Inconsistent(format!(
          "{} 的形状与 fids ({}x{}) 不一致",
          name, n_trees, nodes
        )));
      }
      Ok(trees.into_iter().flatten().collect())
    }

    Ok(Self {
      tree_depth,
      nodes_per_tree,
      n_trees,
      fids: flatten("fids", fids, n_trees, nodes_per_tree)?,
      thrs: flatten("thrs", thrs, n_trees, nodes_per_tree)?,
      child: flatten("child", child, n_trees, nodes_per_tree)?,
      hs: flatten("hs", hs, n_trees, nodes_per_tree)?,
    })
  }
}

/// 加载后只读的 ACF 检测器模型
#[derive(Debug, Clone)]
pub struct AcfModel {
  opts: DetectorOpts,
  trees: TreeEnsemble,
}

impl AcfModel {
  /// 组装并校验模型
  pub fn new(opts: DetectorOpts, trees: TreeEnsemble) -> Result<Self, AcfModelError> {
    let model = Self { opts, trees };
    model.validate()?;
    Ok(model)
  }

  /// 从 `.json` 模型文件加载
  pub fn load(path: impl AsRef<Path>) -> Result<Self, AcfModelError> {
    let path = path.as_ref();
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
      error!("不支持的模型文件: {}", path.display());
      return Err(AcfModelError::UnsupportedFormat(path.display().to_string()));
    }

    info!("加载检测器模型: {}", path.display());
    let reader = BufReader::new(File::open(path)?);
    let raw: RawDetector = serde_json::from_reader(reader)?;
    let model = raw.into_model()?;
    model.log_summary();
    Ok(model)
  }

  /// 从 JSON 文本解析
  pub fn from_json_str(text: &str) -> Result<Self, AcfModelError> {
    let raw: RawDetector = serde_json::from_str(text)?;
    raw.into_model()
  }

  fn log_summary(&self) {
    let o = &self.opts;
    info!("检测器名称: {}", o.name);
    debug!("窗口尺寸: {}x{}", o.model_height, o.model_width);
    debug!("填充窗口尺寸: {}x{}", o.model_height_pad, o.model_width_pad);
    debug!("近似指数: {:?}", o.lambdas);
    debug!("填充: {},{}", o.pad_height, o.pad_width);
    debug!("缩小系数: {}", o.shrink);
    debug!("级联阈值: {}", o.casc_thr);
    debug!("树深度: {}", self.trees.tree_depth);
    info!(
      "分类器: {} 棵树, 每棵 {} 个节点",
      self.trees.n_trees, self.trees.nodes_per_tree
    );
  }

  fn validate(&self) -> Result<(), AcfModelError> {
    let o = &self.opts;
    let t = &self.trees;
    let bad = |msg: String| Err(AcfModelError::Inconsistent(msg));

    if o.shrink == 0 {
      return bad("缩小系数必须为正".into());
    }
    if o.model_height == 0 || o.model_width == 0 {
      return bad("窗口尺寸不能为零".into());
    }
    if o.model_height_pad < o.model_height || o.model_width_pad < o.model_width {
      return bad(format!(
        "填充窗口 {}x{} 小于窗口 {}x{}",
        o.model_height_pad, o.model_width_pad, o.model_height, o.model_width
      ));
    }
    if o.model_height_pad < o.shrink || o.model_width_pad < o.shrink {
      return bad("填充窗口小于缩小系数".into());
    }

    let total = t.n_trees * t.nodes_per_tree;
    if t.n_trees == 0 || t.nodes_per_tree == 0 {
      return bad("分类器为空".into());
    }
    for (name, len) in [
      ("fids", t.fids.len()),
      ("thrs", t.thrs.len()),
      ("child", t.child.len()),
      ("hs", t.hs.len()),
    ] {
      if len != total {
        return bad(format!("{} 长度为 {}, 期望 {}", name, len, total));
      }
    }

    let n_features = self.n_features();
    if let Some((i, fid)) = t.fids.iter().enumerate().find(|&(_, &f)| f as usize >= n_features) {
      return bad(format!("节点 {} 的特征编号 {} 超出范围 {}", i, fid, n_features));
    }

    // 子节点必须排在父节点之后, 因此 0 只可能是叶子标记
    for (i, &c) in t.child.iter().enumerate() {
      let k = i % t.nodes_per_tree;
      if c != 0 && ((c as usize) < k + 2 || c as usize >= t.nodes_per_tree) {
        return bad(format!("节点 {} 的子节点编号 {} 无效", i, c));
      }
    }

    if t.tree_depth > 0 {
      let Some(full) = t.tree_depth.checked_add(1).and_then(|d| 1usize.checked_shl(d)) else {
        return bad(format!("树深度 {} 过大", t.tree_depth));
      };
      let needed = full - 1;
      if t.nodes_per_tree < needed {
        return bad(format!(
          "深度 {} 需要 {} 个节点, 实际 {}",
          t.tree_depth, needed, t.nodes_per_tree
        ));
      }
    }

    Ok(())
  }

  pub fn opts(&self) -> &DetectorOpts {
    &self.opts
  }

  pub fn trees(&self) -> &TreeEnsemble {
    &self.trees
  }

  pub fn name(&self) -> &str {
    &self.opts.name
  }

  pub fn shrink(&self) -> usize {
    self.opts.shrink
  }

  pub fn casc_thr(&self) -> f32 {
    self.opts.casc_thr
  }

  pub fn n_trees(&self) -> usize {
    self.trees.n_trees
  }

  /// 每个填充窗口内的特征数量
  pub fn n_features(&self) -> usize {
    let o = &self.opts;
    (o.model_height_pad / o.shrink) * (o.model_width_pad / o.shrink) * N_CHANNELS
  }
}

#[derive(Deserialize)]
struct RawDetector {
  opts: Option<RawOpts>,
  clf: Option<RawClf>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOpts {
  name: Option<String>,
  model_ds: Option<[f32; 2]>,
  model_ds_pad: Option<[f32; 2]>,
  casc_thr: Option<f32>,
  p_pyramid: Option<RawPyramid>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPyramid {
  pad: Option<[f32; 2]>,
  lambdas: Option<[f32; 3]>,
  p_chns: Option<RawChns>,
}

#[derive(Deserialize)]
struct RawChns {
  shrink: Option<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawClf {
  tree_depth: Option<u32>,
  fids: Option<Vec<Vec<u32>>>,
  thrs: Option<Vec<Vec<f32>>>,
  child: Option<Vec<Vec<u32>>>,
  hs: Option<Vec<Vec<f32>>>,
}

fn field<T>(value: Option<T>, name: &'static str) -> Result<T, AcfModelError> {
  value.ok_or(AcfModelError::MissingField(name))
}

impl RawDetector {
  fn into_model(self) -> Result<AcfModel, AcfModelError> {
    let opts = field(self.opts, "opts")?;
    let pyramid = field(opts.p_pyramid, "opts.pPyramid")?;
    let chns = field(pyramid.p_chns, "opts.pPyramid.pChns")?;
    let clf = field(self.clf, "clf")?;

    let model_ds = field(opts.model_ds, "opts.modelDs")?;
    let model_ds_pad = field(opts.model_ds_pad, "opts.modelDsPad")?;
    let pad = field(pyramid.pad, "opts.pPyramid.pad")?;

    let detector = DetectorOpts {
      name: field(opts.name, "opts.name")?,
      model_height: model_ds[0] as usize,
      model_width: model_ds[1] as usize,
      model_height_pad: model_ds_pad[0] as usize,
      model_width_pad: model_ds_pad[1] as usize,
      pad_height: pad[0] as usize,
      pad_width: pad[1] as usize,
      shrink: field(chns.shrink, "opts.pPyramid.pChns.shrink")? as usize,
      lambdas: field(pyramid.lambdas, "opts.pPyramid.lambdas")?,
      casc_thr: field(opts.casc_thr, "opts.cascThr")?,
    };

    let trees = TreeEnsemble::from_trees(
      clf.tree_depth.unwrap_or(0),
      field(clf.fids, "clf.fids")?,
      field(clf.thrs, "clf.thrs")?,
      field(clf.child, "clf.child")?,
      field(clf.hs, "clf.hs")?,
    )?;

    AcfModel::new(detector, trees)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const STUMP_MODEL: &str = r#"{
    "opts": {
      "name": "stump",
      "modelDs": [16, 8],
      "modelDsPad": [24, 16],
      "cascThr": -1.0,
      "pPyramid": { "pad": [4, 4], "lambdas": [0, 0.11, 0.11], "pChns": { "shrink": 4 } }
    },
    "clf": {
      "fids": [[5, 0, 0], [7, 0, 0]],
      "thrs": [[0.5, 0, 0], [0.1, 0, 0]],
      "child": [[2, 0, 0], [2, 0, 0]],
      "hs": [[0, -1, 1], [0, 0.5, -0.5]]
    }
  }"#;

  #[test]
  fn parses_variable_depth_model() {
    let model = AcfModel::from_json_str(STUMP_MODEL).unwrap();
    assert_eq!(model.name(), "stump");
    assert_eq!(model.n_trees(), 2);
    assert_eq!(model.trees().nodes_per_tree, 3);
    assert_eq!(model.trees().tree_depth, 0);
    assert_eq!(model.opts().model_width_pad, 16);
    assert_eq!(model.n_features(), 6 * 4 * 10);
    assert_eq!(model.trees().hs[4], 0.5);
  }

  #[test]
  fn missing_field_is_named() {
    let text = STUMP_MODEL.replace(r#""cascThr": -1.0,"#, "");
    let err = AcfModel::from_json_str(&text).unwrap_err();
    assert!(matches!(err, AcfModelError::MissingField("opts.cascThr")));
  }

  #[test]
  fn ragged_arrays_are_rejected() {
    let text = STUMP_MODEL.replace("[[0.5, 0, 0], [0.1, 0, 0]]", "[[0.5, 0, 0], [0.1, 0]]");
    let err = AcfModel::from_json_str(&text).unwrap_err();
    assert!(matches!(err, AcfModelError::Inconsistent(_)));
  }

  #[test]
  fn out_of_range_feature_is_rejected() {
    let text = STUMP_MODEL.replace("[[5, 0, 0], [7, 0, 0]]", "[[5, 0, 0], [240, 0, 0]]");
    let err = AcfModel::from_json_str(&text).unwrap_err();
    assert!(matches!(err, AcfModelError::Inconsistent(_)));
  }

  #[test]
  fn oversized_depth_is_rejected() {
    let text = STUMP_MODEL.replace(r#""clf": {"#, r#""clf": { "treeDepth": 64,"#);
    let err = AcfModel::from_json_str(&text).unwrap_err();
    assert!(matches!(err, AcfModelError::Inconsistent(_)));
  }

  #[test]
  fn backward_child_is_rejected() {
    let text = STUMP_MODEL.replace("[[2, 0, 0], [2, 0, 0]]", "[[2, 0, 0], [1, 0, 0]]");
    let err = AcfModel::from_json_str(&text).unwrap_err();
    assert!(matches!(err, AcfModelError::Inconsistent(_)));
  }

  #[test]
  fn fixed_depth_needs_full_tree() {
    let text = STUMP_MODEL.replace(r#""clf": {"#, r#""clf": { "treeDepth": 2,"#);
    let err = AcfModel::from_json_str(&text).unwrap_err();
    assert!(matches!(err, AcfModelError::Inconsistent(_)));
    let text = STUMP_MODEL.replace(r#""clf": {"#, r#""clf": { "treeDepth": 1,"#);
    assert!(AcfModel::from_json_str(&text).is_ok());
  }

  #[test]
  fn non_json_path_is_unsupported() {
    let err = AcfModel::load("/tmp/detector.mat").unwrap_err();
    assert!(matches!(err, AcfModelError::UnsupportedFormat(_)));
  }
}
