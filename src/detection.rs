// 该文件是 Renying （人影） 项目的一部分。
// src/detection.rs - 检测结果
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

use serde::Serialize;

/// 未合并的原始检测框颜色
pub const RAW_COLOR: [u8; 3] = [255, 0, 0];
/// 非极大值抑制后合并得到的检测框颜色
pub const MERGED_COLOR: [u8; 3] = [0, 255, 0];

/// 原图像素坐标下的一个检测框
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Detection {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
  pub score: f32,
  /// 级联中的停止位置, 合并后为被合并的检测数
  pub level: usize,
  #[serde(skip)]
  pub color: [u8; 3],
}

impl Detection {
  pub fn new(x: f32, y: f32, width: f32, height: f32, score: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
      score,
      level: 0,
      color: RAW_COLOR,
    }
  }

  pub fn with_level(mut self, level: usize) -> Self {
    self.level = level;
    self
  }

  pub fn with_color(mut self, color: [u8; 3]) -> Self {
    self.color = color;
    self
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// 两个检测框的相交面积, 不相交时为 0
  pub fn intersection(&self, other: &Detection) -> f32 {
    let w = (self.x + self.width).min(other.x + other.width) - self.x.max(other.x);
    let h = (self.y + self.height).min(other.y + other.height) - self.y.max(other.y);
    if w <= 0.0 || h <= 0.0 { 0.0 } else { w * h }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DetectionList {
  items: Vec<Detection>,
}

impl DetectionList {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, detection: Detection) {
    self.items.push(detection);
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
    self.items.iter()
  }

  pub fn as_slice(&self) -> &[Detection] {
    &self.items
  }

  /// 平移全部检测框
  pub fn move_by(&mut self, dx: f32, dy: f32) {
    for d in self.items.iter_mut() {
      d.x += dx;
      d.y += dy;
    }
  }

  /// 按比例缩放全部检测框 (位置与尺寸)
  pub fn resize(&mut self, sx: f32, sy: f32) {
    for d in self.items.iter_mut() {
      d.x *= sx;
      d.y *= sy;
      d.width *= sx;
      d.height *= sy;
    }
  }

  /// 保留宽高均不小于给定值的检测框
  pub fn filter_size(&self, min_width: f32, min_height: f32) -> DetectionList {
    self
      .items
      .iter()
      .filter(|d| d.width >= min_width && d.height >= min_height)
      .copied()
      .collect()
  }

  pub fn max_score(&self) -> Option<f32> {
    self.items.iter().map(|d| d.score).max_by(f32::total_cmp)
  }
}

impl From<Vec<Detection>> for DetectionList {
  fn from(items: Vec<Detection>) -> Self {
    Self { items }
  }
}

impl FromIterator<Detection> for DetectionList {
  fn from_iter<T: IntoIterator<Item = Detection>>(iter: T) -> Self {
    Self {
      items: iter.into_iter().collect(),
    }
  }
}

impl Extend<Detection> for DetectionList {
  fn extend<T: IntoIterator<Item = Detection>>(&mut self, iter: T) {
    self.items.extend(iter);
  }
}

impl IntoIterator for DetectionList {
  type Item = Detection;
  type IntoIter = std::vec::IntoIter<Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.into_iter()
  }
}

impl<'a> IntoIterator for &'a DetectionList {
  type Item = &'a Detection;
  type IntoIter = std::slice::Iter<'a, Detection>;

  fn into_iter(self) -> Self::IntoIter {
    self.items.iter()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn list() -> DetectionList {
    vec![
      Detection::new(0.0, 0.0, 10.0, 20.0, 0.5),
      Detection::new(5.0, 5.0, 40.0, 80.0, 2.0),
      Detection::new(9.0, 1.0, 30.0, 10.0, -1.0),
    ]
    .into()
  }

  #[test]
  fn intersection_of_disjoint_boxes_is_zero() {
    let a = Detection::new(0.0, 0.0, 10.0, 10.0, 1.0);
    let b = Detection::new(10.0, 0.0, 10.0, 10.0, 1.0);
    assert_eq!(a.intersection(&b), 0.0);
    let c = Detection::new(1.0, 1.0, 10.0, 10.0, 1.0);
    assert_eq!(a.intersection(&c), 81.0);
  }

  #[test]
  fn move_and_resize() {
    let mut l = list();
    l.move_by(1.0, -1.0);
    l.resize(2.0, 0.5);
    let first = l.iter().next().unwrap();
    assert_eq!((first.x, first.y, first.width, first.height), (2.0, -0.5, 20.0, 10.0));
  }

  #[test]
  fn filter_keeps_large_boxes() {
    let l = list().filter_size(20.0, 15.0);
    assert_eq!(l.len(), 1);
    assert_eq!(l.max_score(), Some(2.0));
  }

  #[test]
  fn empty_list_has_no_max_score() {
    assert_eq!(DetectionList::new().max_score(), None);
    assert_eq!(list().max_score(), Some(2.0));
  }
}
