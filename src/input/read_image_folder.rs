// 该文件是 Renying （人影） 项目的一部分。
// src/input/read_image_folder.rs - 图像目录输入
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

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};
use url::Url;

use super::read_image_file::{ImageFileInputError, load_frame};
use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcFrame};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| IMAGE_EXTENSIONS.iter().any(|x| x.eq_ignore_ascii_case(e)))
    .unwrap_or(false)
}

/// 目录中的图像按文件名顺序逐帧读取
pub struct ImageFolderInput<const W: u32, const H: u32> {
  files: Vec<PathBuf>,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for ImageFolderInput<W, H> {
  const SCHEME: &'static str = "folder";
}

impl<const W: u32, const H: u32> FromUrl for ImageFolderInput<W, H> {
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

    let mut files = Vec::new();
    for entry in std::fs::read_dir(url.path())? {
      let path = entry?.path();
      if path.is_file() && is_image(&path) {
        files.push(path);
      }
    }
    files.sort();
    info!("目录 {} 中共 {} 张图像", url.path(), files.len());

    Ok(ImageFolderInput { files })
  }
}

impl<const W: u32, const H: u32> ImageFolderInput<W, H> {
  pub fn files(&self) -> &[PathBuf] {
    &self.files
  }

  pub fn into_nhwc(self) -> ImageFolderInputNhwc<W, H> {
    ImageFolderInputNhwc {
      files: self.files.into_iter(),
    }
  }
}

pub struct ImageFolderInputNhwc<const W: u32, const H: u32> {
  files: std::vec::IntoIter<PathBuf>,
}

impl<const W: u32, const H: u32> Iterator for ImageFolderInputNhwc<W, H> {
  type Item = RgbNhwcFrame<W, H>;

  /// 无法解码的文件被跳过
  fn next(&mut self) -> Option<Self::Item> {
    for path in self.files.by_ref() {
      match load_frame(&path) {
        Ok(frame) => return Some(frame),
        Err(e) => warn!("跳过图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn files_are_read_in_name_order() {
    let dir = std::env::temp_dir().join("renying-read-image-folder");
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
      RgbImage::from_pixel(4, 2, image::Rgb([value; 3])).save(dir.join(name)).unwrap();
    }
    std::fs::write(dir.join("notes.txt"), "not an image").unwrap();
    std::fs::write(dir.join("broken.jpg"), "garbage").unwrap();

    let url = Url::from_directory_path(&dir).unwrap();
    let url = Url::parse(&url.as_str().replacen("file", "folder", 1)).unwrap();
    let input = ImageFolderInput::<4, 2>::from_url(&url).unwrap();
    assert_eq!(input.files().len(), 4);

    use crate::frame::AsNhwcFrame;
    let firsts: Vec<u8> = input.into_nhwc().map(|f| f.as_nhwc()[0]).collect();
    assert_eq!(firsts, vec![10, 20, 30]);
  }
}
