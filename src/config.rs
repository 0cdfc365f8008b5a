// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 运行配置
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

use std::{path::PathBuf, time::Duration};

use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须在 0.0 - 1.0 之间，实际为 {0}")]
  ScoreThreshold(f32),
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
}

/// 进程启动时构建一次，之后只读
#[derive(Clone)]
pub struct Config {
  pub ls_url: Url,
  pub ls_api_key: String,
  pub project: u64,
  pub tasks: String,
  pub model_dir: PathBuf,
  pub model_name: String,
  pub model_version: Option<String>,
  pub score_threshold: f32,
  pub log_level: String,
  pub output: Option<Url>,
  /// 单次平台请求超时（秒），缺省或为 0 时不设超时
  pub request_timeout: Option<u64>,
}

impl Config {
  pub fn model_path(&self) -> PathBuf {
    self.model_dir.join(&self.model_name)
  }

  pub fn request_timeout(&self) -> Option<Duration> {
    self
      .request_timeout
      .filter(|secs| *secs > 0)
      .map(Duration::from_secs)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.score_threshold) {
      return Err(ConfigError::ScoreThreshold(self.score_threshold));
    }
    Ok(())
  }

  pub fn check_model(&self) -> Result<PathBuf, ConfigError> {
    let path = self.model_path();
    if !path.is_file() {
      return Err(ConfigError::ModelNotFound(path));
    }
    Ok(path)
  }
}
