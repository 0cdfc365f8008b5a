// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use shanan_labeler::config::Config;

/// Label Studio 批量目标检测预标注
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// Label Studio 地址
  #[arg(long, env = "LABEL_STUDIO_URL", default_value = "http://localhost:8080")]
  pub ls_url: Url,

  /// Label Studio API 密钥
  #[arg(long, env = "LABEL_STUDIO_API_KEY", hide_env_values = true)]
  pub ls_api_key: String,

  /// Label Studio 项目 ID
  #[arg(long, env = "LABEL_STUDIO_PROJECT_ID", default_value = "1")]
  pub project: u64,

  /// 任务 JSON 文件路径（任务 ID 列表或任务数据列表），
  /// 或逗号分隔的任务 ID，例如: 1,2,3
  /// 只给出 ID 时会从 Label Studio 自动下载任务数据
  #[arg(long, default_value = "tasks.json", value_name = "TASKS")]
  pub tasks: String,

  /// 模型目录
  #[arg(long, env = "MODEL_DIR", default_value = ".")]
  pub model_dir: PathBuf,

  /// 模型文件名
  #[arg(long, env = "MODEL_NAME", default_value = "yolo26n.rknn")]
  pub model_name: String,

  /// 模型版本，用于在平台上区分不同的预测集合
  #[arg(long, env = "MODEL_VERSION")]
  pub model_version: Option<String>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, env = "MODEL_SCORE_THRESHOLD", default_value = "0.5", value_name = "THRESHOLD")]
  pub score_threshold: f32,

  /// 日志级别
  #[arg(long, env = "LOG_LEVEL", default_value = "info")]
  pub log_level: String,

  /// 预测输出，默认提交到 Label Studio
  /// 支持格式:
  /// - 目录记录: folder:///path/to/records
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 平台请求超时（秒），不指定或为 0 时不设超时
  #[arg(long, env = "LABEL_STUDIO_TIMEOUT", value_name = "SECONDS")]
  pub request_timeout: Option<u64>,
}

impl From<Args> for Config {
  fn from(args: Args) -> Self {
    Config {
      ls_url: args.ls_url,
      ls_api_key: args.ls_api_key,
      project: args.project,
      tasks: args.tasks,
      model_dir: args.model_dir,
      model_name: args.model_name,
      model_version: args.model_version,
      score_threshold: args.score_threshold,
      log_level: args.log_level,
      output: args.output,
      request_timeout: args.request_timeout,
    }
  }
}
