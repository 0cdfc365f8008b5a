// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 任务输入解析
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

use std::{path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::platform::LabelingPlatform;

#[derive(Error, Debug)]
pub enum InputError {
  #[error("任务列表不能为空")]
  Empty,
  #[error("任务文件内容必须是列表")]
  NotAList,
  #[error("第 {index} 个任务缺少 'id' 或 'data'，所有任务都必须包含这两个字段")]
  MalformedTaskRecord { index: usize },
  #[error("未知的任务格式: 任务应为任务数据字典列表或任务 ID 列表")]
  UnknownTaskFormat,
  #[error("第 {index} 个任务与第一个任务的格式不一致")]
  MixedTaskFormat { index: usize },
  #[error("无效的任务 ID: '{0}'")]
  InvalidTaskId(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("任务文件 JSON 解析错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("从标注平台获取任务 {id} 失败: {source}")]
  Platform {
    id: u64,
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

/// 标注平台上的一个任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
  pub id: u64,
  pub data: Map<String, Value>,
}

/// 命令行给出的任务来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSpec {
  /// 任务 JSON 文件：任务 ID 列表或任务数据列表
  File(PathBuf),
  /// 逗号分隔的任务 ID
  Ids(Vec<u64>),
}

impl FromStr for TaskSpec {
  type Err = InputError;

  /// 存在的文件按文件处理，否则按逗号分隔的 ID 解析
  fn from_str(spec: &str) -> Result<Self, Self::Err> {
    let path = PathBuf::from(spec);
    if path.exists() {
      return Ok(TaskSpec::File(path));
    }

    debug!("'{}' 不是文件，按任务 ID 列表解析", spec);
    spec
      .split(',')
      .map(str::trim)
      .map(|id| {
        id.parse::<u64>()
          .map_err(|_| InputError::InvalidTaskId(id.to_string()))
      })
      .collect::<Result<Vec<_>, _>>()
      .map(TaskSpec::Ids)
  }
}

impl TaskSpec {
  pub fn entries(&self) -> Result<Vec<Value>, InputError> {
    match self {
      TaskSpec::File(path) => {
        info!("从文件读取任务: {}", path.display());
        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str(&content)? {
          Value::Array(entries) => Ok(entries),
          _ => Err(InputError::NotAList),
        }
      }
      TaskSpec::Ids(ids) => Ok(ids.iter().copied().map(Value::from).collect()),
    }
  }
}

pub fn load_task_spec(spec: &str) -> Result<Vec<Value>, InputError> {
  spec.parse::<TaskSpec>()?.entries()
}

pub fn resolve_tasks<P: LabelingPlatform>(
  spec: &str,
  platform: &P,
) -> Result<Vec<Task>, InputError> {
  let entries = load_task_spec(spec)?;
  resolve_entries(entries, platform)
}

/// 由第一个元素的类型决定解析方式，并要求整个列表类型一致
pub fn resolve_entries<P: LabelingPlatform>(
  entries: Vec<Value>,
  platform: &P,
) -> Result<Vec<Task>, InputError> {
  let Some(first) = entries.first() else {
    return Err(InputError::Empty);
  };
  info!("检测到 {} 个任务", entries.len());

  let full_records = match first {
    Value::Object(_) => true,
    Value::Number(n) if n.is_u64() => false,
    _ => return Err(InputError::UnknownTaskFormat),
  };

  if full_records {
    return entries
      .into_iter()
      .enumerate()
      .map(|(index, entry)| task_record(index, entry))
      .collect();
  }

  let ids = entries
    .iter()
    .enumerate()
    .map(|(index, entry)| {
      entry
        .as_u64()
        .ok_or(InputError::MixedTaskFormat { index })
    })
    .collect::<Result<Vec<_>, _>>()?;
  fetch_tasks(&ids, platform)
}

fn task_record(index: usize, entry: Value) -> Result<Task, InputError> {
  let Value::Object(mut record) = entry else {
    return Err(InputError::MixedTaskFormat { index });
  };

  let id = record.get("id").and_then(Value::as_u64);
  let data = record.remove("data");
  match (id, data) {
    (Some(id), Some(Value::Object(data))) => Ok(Task { id, data }),
    _ => Err(InputError::MalformedTaskRecord { index }),
  }
}

fn fetch_tasks<P: LabelingPlatform>(ids: &[u64], platform: &P) -> Result<Vec<Task>, InputError> {
  info!("从标注平台加载任务...");
  let mut tasks = Vec::with_capacity(ids.len());
  for (i, &id) in ids.iter().enumerate() {
    debug!("[{}/{}] 加载任务 {}", i + 1, ids.len(), id);
    let data = platform
      .get_task_data(id)
      .map_err(|e| InputError::Platform {
        id,
        source: Box::new(e),
      })?;
    tasks.push(Task { id, data });
  }
  info!("任务加载完成");
  Ok(tasks)
}
