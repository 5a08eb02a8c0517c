// 该文件是 Renying （人影） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use image::{ImageReader, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameError, RgbNhwcFrame},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 读取图像并缩放到 `W`x`H`
pub(crate) fn load_frame<const W: u32, const H: u32>(
  path: &Path,
) -> Result<RgbNhwcFrame<W, H>, ImageFileInputError> {
  let image: RgbImage = ImageReader::open(path)?.decode()?.to_rgb8();
  let image = if image.dimensions() != (W, H) {
    debug!(
      "缩放图像 {}: {}x{} -> {}x{}",
      path.display(),
      image.width(),
      image.height(),
      W,
      H
    );
    image::imageops::resize(&image, W, H, FilterType::Triangle)
  } else {
    image
  };
  Ok(RgbNhwcFrame::try_from(image.into_raw())?)
}

/// 单张图像, 只产生一帧
pub struct ImageFileInput<const W: u32, const H: u32> {
  frame: Option<RgbNhwcFrame<W, H>>,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for ImageFileInput<W, H> {
  const SCHEME: &'static str = "image";
}

impl<const W: u32, const H: u32> FromUrl for ImageFileInput<W, H> {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    Ok(ImageFileInput {
      frame: Some(load_frame(Path::new(url.path()))?),
    })
  }
}

impl<const W: u32, const H: u32> ImageFileInput<W, H> {
  pub fn into_nhwc(self) -> ImageFileInputNhwc<W, H> {
    ImageFileInputNhwc { inner: self }
  }
}

pub struct ImageFileInputNhwc<const W: u32, const H: u32> {
  inner: ImageFileInput<W, H>,
}

impl<const W: u32, const H: u32> Iterator for ImageFileInputNhwc<W, H> {
  type Item = RgbNhwcFrame<W, H>;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.frame.take()
  }
}
