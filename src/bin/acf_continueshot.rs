// 该文件是 Renying （人影） 项目的一部分。
// src/bin/acf_continueshot.rs - 连续帧头肩检测
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use renying::{
  FromUrl,
  detector::AcfDetectorBuilder,
  frame::RgbNhwcFrame,
  input::InputWrapper,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};
use tracing::info;

const FRAME_WIDTH: u32 = 960;
const FRAME_HEIGHT: u32 = 720;

/// Renying 连续检测参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测器模型, 如 acf:///path/model.json?threads=4
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源, 如 folder:///path/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径, 如 record:///path/out 或 log://
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 最多处理的帧数
  #[arg(long, value_name = "FRAMES")]
  pub frames: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::<FRAME_WIDTH, FRAME_HEIGHT>::from_url(&args.input)?;
  let model = AcfDetectorBuilder::from_url(&args.model)?.build::<RgbNhwcFrame<FRAME_WIDTH, FRAME_HEIGHT>>()?;
  let output = OutputWrapper::<FRAME_WIDTH, FRAME_HEIGHT>::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frames)
    .run_task(input.into_nhwc(), model, output)?;

  Ok(())
}
