// 该文件是 Renying （人影） 项目的一部分。
// src/output/status_log.rs - 状态日志输出
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
use tracing::{debug, info};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, detector::AcfResult, output::Render};

#[derive(Error, Debug)]
pub enum StatusLogError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// `log://` 只输出每帧状态行, `log://?detections` 另外逐条输出检测框
pub struct StatusLogOutput {
  detections: bool,
}

impl FromUrlWithScheme for StatusLogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for StatusLogOutput {
  type Error = StatusLogError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StatusLogError::SchemeMismatch);
    }
    Ok(StatusLogOutput {
      detections: url.query_pairs().any(|(k, _)| k == "detections"),
    })
  }
}

impl<Frame> Render<Frame, AcfResult> for StatusLogOutput {
  type Error = StatusLogError;

  fn render_result(&self, _frame: &Frame, result: &AcfResult) -> Result<(), Self::Error> {
    info!("{}", result);
    if self.detections {
      for (i, d) in result.detections.iter().enumerate() {
        debug!(
          "#{} x:{:.1} y:{:.1} w:{:.1} h:{:.1} score:{:.3} level:{}",
          i, d.x, d.y, d.width, d.height, d.score, d.level
        );
      }
    }
    Ok(())
  }
}
