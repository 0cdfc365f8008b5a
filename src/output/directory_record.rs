// 该文件是 Shanan （山南西风） 项目的一部分。
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

use chrono::{Datelike, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tracing::debug;

use crate::{FromUrl, FromUrlWithScheme, annotation::PredictionRecord, output::Submit};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 将预测记录按日期写入目录，不提交到标注平台
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  record_counter: AtomicU32,
  compact: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let compact = uri.query_pairs().any(|(k, _)| k == "compact");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      record_counter: AtomicU32::new(0),
      compact,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    DirectoryRecordOutput {
      directory: directory.into(),
      record_counter: AtomicU32::new(0),
      compact: false,
    }
  }

  fn record_id(&self) -> u32 {
    self.record_counter.fetch_add(1, Ordering::Relaxed) + 1
  }

  fn record_path(&self, task: u64) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-task{}-{:04X}.json",
      now.format("%H-%M-%S"),
      task,
      self.record_id()
    )))
  }
}

impl Submit for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn submit(&self, record: &PredictionRecord) -> Result<(), Self::Error> {
    let path = self.record_path(record.task)?;
    let content = if self.compact {
      serde_json::to_vec(record)?
    } else {
      serde_json::to_vec_pretty(record)?
    };
    std::fs::write(&path, content)?;
    debug!("预测记录已写入: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::Path;

  fn json_files(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          found.push(path);
        }
      }
    }
    found.sort();
    found
  }

  #[test]
  fn records_are_written_per_submission() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path());
    let record = PredictionRecord {
      task: 42,
      score: 0.5,
      model_version: "v1".to_string(),
      result: Vec::new(),
    };

    output.submit(&record).unwrap();
    output.submit(&record).unwrap();

    let files = json_files(dir.path());
    assert_eq!(files.len(), 2);
    let content = std::fs::read_to_string(&files[0]).unwrap();
    let parsed: PredictionRecord = serde_json::from_str(&content).unwrap();
    assert_eq!(parsed, record);
    assert!(files[0].to_string_lossy().contains("task42"));
  }

  #[test]
  fn scheme_is_checked() {
    let url = url::Url::parse("http://localhost/records").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));

    let url = url::Url::parse("folder:///tmp/records?compact").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory, PathBuf::from("/tmp/records"));
    assert!(output.compact);
  }
}
