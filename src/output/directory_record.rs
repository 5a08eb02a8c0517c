// 该文件是 Renying （人影） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  fs::{File, OpenOptions},
  io::Write,
  path::PathBuf,
  sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
  },
};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, detector::AcfResult, frame::RgbNhwcFrame, output::Render,
};

pub const RECORD_FILE: &str = "detections.jsonl";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[cfg(feature = "save_image_file")]
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("记录文件锁已损坏")]
  Poisoned,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  timestamp: String,
  frame: u64,
  #[serde(flatten)]
  result: &'a AcfResult,
}

/// 每帧向 `record:///dir` 下的 `detections.jsonl` 追加一行 JSON
///
/// 查询参数 `images` 使有检测的帧另存为 `dir/年/月/日/时-分-秒-序号.png`, `always` 则保存每一帧.
pub struct DirectoryRecordOutput<const W: u32, const H: u32> {
  directory: PathBuf,
  file: Mutex<File>,
  frame_counter: AtomicU64,
  images: bool,
  always: bool,
}

impl<const W: u32, const H: u32> FromUrlWithScheme for DirectoryRecordOutput<W, H> {
  const SCHEME: &'static str = "record";
}

impl<const W: u32, const H: u32> FromUrl for DirectoryRecordOutput<W, H> {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let directory = PathBuf::from(uri.path());
    std::fs::create_dir_all(&directory)?;
    let file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(directory.join(RECORD_FILE))?;
    debug!("检测记录写入 {}", directory.join(RECORD_FILE).display());

    Ok(DirectoryRecordOutput {
      directory,
      file: Mutex::new(file),
      frame_counter: AtomicU64::new(0),
      images: uri.query_pairs().any(|(k, _)| k == "images"),
      always: uri.query_pairs().any(|(k, _)| k == "always"),
    })
  }
}

impl<const W: u32, const H: u32> DirectoryRecordOutput<W, H> {
  fn frame_path(&self, now: &DateTime<Utc>, frame: u64) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!("{}-{:04X}.png", now.format("%H-%M-%S"), frame & 0xFFFF)))
  }

  #[cfg(feature = "save_image_file")]
  fn save_frame(
    &self,
    now: &DateTime<Utc>,
    index: u64,
    frame: &RgbNhwcFrame<W, H>,
    result: &AcfResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    let path = self.frame_path(now, index)?;
    crate::output::draw::Draw::default()
      .draw_result(frame, result)
      .save(&path)?;
    debug!("保存帧图像: {}", path.display());
    Ok(())
  }

  #[cfg(not(feature = "save_image_file"))]
  fn save_frame(
    &self,
    now: &DateTime<Utc>,
    index: u64,
    _frame: &RgbNhwcFrame<W, H>,
    _result: &AcfResult,
  ) -> Result<(), DirectoryRecordOutputError> {
    let path = self.frame_path(now, index)?;
    tracing::warn!("未启用 save_image_file, 不保存 {}", path.display());
    Ok(())
  }
}

impl<const W: u32, const H: u32> Render<RgbNhwcFrame<W, H>, AcfResult> for DirectoryRecordOutput<W, H> {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &RgbNhwcFrame<W, H>, result: &AcfResult) -> Result<(), Self::Error> {
    let now = Utc::now();
    let index = self.frame_counter.fetch_add(1, Ordering::Relaxed) + 1;
    let mut line = serde_json::to_string(&FrameRecord {
      timestamp: now.to_rfc3339(),
      frame: index,
      result,
    })?;
    line.push('\n');

    {
      let mut file = self.file.lock().map_err(|_| DirectoryRecordOutputError::Poisoned)?;
      file.write_all(line.as_bytes())?;
    }

    if self.images && (self.always || !result.is_empty()) {
      self.save_frame(&now, index, frame, result)?;
    }
    Ok(())
  }
}
