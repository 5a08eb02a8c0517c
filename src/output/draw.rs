// 该文件是 Renying （人影） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
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

use image::{ImageBuffer, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::{
  detection::{Detection, DetectionList},
  detector::AcfResult,
  frame::{AsNhwcFrame, RgbNhwcFrame},
};

const LINE_WIDTH: u32 = 2;

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

impl<const W: u32, const H: u32> ToRgbImage for RgbNhwcFrame<W, H> {
  fn to_rgb_image(&self) -> RgbImage {
    let data = self.as_nhwc();
    ImageBuffer::from_fn(W, H, |x, y| {
      let idx = (y as usize * W as usize + x as usize) * 3;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}

/// 在图像上绘制检测框
pub struct Draw {
  line_width: u32,
  /// 同时绘制合并前的原始检测
  with_raw: bool,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      line_width: LINE_WIDTH,
      with_raw: false,
    }
  }
}

impl Draw {
  pub fn with_raw(mut self, with_raw: bool) -> Self {
    self.with_raw = with_raw;
    self
  }

  fn draw_box(&self, image: &mut RgbImage, d: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let x0 = (d.x.floor() as i32).clamp(0, w - 1);
    let y0 = (d.y.floor() as i32).clamp(0, h - 1);
    let x1 = ((d.x + d.width).ceil() as i32).clamp(0, w - 1);
    let y1 = ((d.y + d.height).ceil() as i32).clamp(0, h - 1);

    for t in 0..self.line_width as i32 {
      let width = x1 - x0 + 1 - 2 * t;
      let height = y1 - y0 + 1 - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x0 + t, y0 + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(d.color));
    }
  }

  pub fn draw_detections(&self, image: &mut RgbImage, detections: &DetectionList) {
    if image.width() == 0 || image.height() == 0 {
      return;
    }
    for d in detections {
      self.draw_box(image, d);
    }
  }

  /// 复制帧并绘制一帧的结果
  pub fn draw_result<F: ToRgbImage>(&self, frame: &F, result: &AcfResult) -> RgbImage {
    let mut image = frame.to_rgb_image();
    if self.with_raw {
      self.draw_detections(&mut image, &result.raw);
    }
    self.draw_detections(&mut image, &result.detections);
    image
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detection::MERGED_COLOR;

  #[test]
  fn box_outline_uses_detection_color() {
    let mut image = RgbImage::new(20, 20);
    let list: DetectionList = vec![Detection::new(2.0, 3.0, 10.0, 8.0, 1.0).with_color(MERGED_COLOR)].into();
    Draw::default().draw_detections(&mut image, &list);
    assert_eq!(image.get_pixel(2, 3).0, MERGED_COLOR);
    assert_eq!(image.get_pixel(3, 4).0, MERGED_COLOR);
    assert_eq!(image.get_pixel(6, 7).0, [0, 0, 0]);
  }

  #[test]
  fn boxes_outside_are_clamped() {
    let mut image = RgbImage::new(10, 10);
    let list: DetectionList = vec![Detection::new(-5.0, -5.0, 30.0, 30.0, 1.0)].into();
    Draw::default().draw_detections(&mut image, &list);
    assert_eq!(image.get_pixel(0, 0).0, [255, 0, 0]);
    assert_eq!(image.get_pixel(9, 9).0, [255, 0, 0]);
  }

  #[test]
  fn frame_converts_to_image() {
    let mut data = vec![0u8; 12];
    data[3..6].copy_from_slice(&[1, 2, 3]);
    let frame = RgbNhwcFrame::<2, 2>::try_from(data).unwrap();
    assert_eq!(frame.to_rgb_image().get_pixel(1, 0).0, [1, 2, 3]);
  }
}
