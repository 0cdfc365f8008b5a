// 该文件是 Shanan （山南西风） 项目的一部分。
// src/response.rs - 模型响应归一化
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

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::annotation::TaskPrediction;

/// 带版本信息的结构化模型响应
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model_version: Option<String>,
  pub predictions: Vec<TaskPrediction>,
}

impl ModelResponse {
  pub fn new(predictions: Vec<TaskPrediction>) -> Self {
    ModelResponse {
      model_version: None,
      predictions,
    }
  }

  pub fn has_model_version(&self) -> bool {
    self
      .model_version
      .as_deref()
      .is_some_and(|version| !version.is_empty())
  }

  pub fn set_version(&mut self, version: impl Into<String>) {
    self.model_version = Some(version.into());
    self.update_predictions_version();
  }

  /// 为未标注版本的预测补上响应的版本，已有版本的预测保持不变
  pub fn update_predictions_version(&mut self) {
    let Some(version) = self.model_version.as_ref() else {
      return;
    };
    for prediction in self.predictions.iter_mut() {
      if prediction.model_version.as_deref().is_none_or(str::is_empty) {
        prediction.model_version = Some(version.clone());
      }
    }
  }
}

/// 检测适配器可能返回的响应形态
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
  Structured(ModelResponse),
  /// 旧格式：预测字典列表
  Legacy(Vec<Value>),
  Unrecognized(Value),
}

impl From<Value> for RawResponse {
  fn from(value: Value) -> Self {
    match value {
      Value::Array(items) => RawResponse::Legacy(items),
      Value::Object(map) if map.contains_key("predictions") => {
        let value = Value::Object(map);
        match serde_json::from_value::<ModelResponse>(value.clone()) {
          Ok(response) => RawResponse::Structured(response),
          Err(e) => {
            debug!("结构化响应解析失败: {}", e);
            RawResponse::Unrecognized(value)
          }
        }
      }
      other => RawResponse::Unrecognized(other),
    }
  }
}

/// 将不同形态的响应统一为预测列表
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
  model_version: Option<String>,
}

impl Reconciler {
  pub fn new(model_version: Option<String>) -> Self {
    Reconciler {
      model_version: model_version.filter(|version| !version.is_empty()),
    }
  }

  pub fn model_version(&self) -> Option<&str> {
    self.model_version.as_deref()
  }

  /// 响应为空或无法识别时返回空列表，不视为错误
  pub fn reconcile(&self, task_id: u64, response: Option<RawResponse>) -> Vec<TaskPrediction> {
    let Some(response) = response else {
      warn!("任务 {} 没有预测结果", task_id);
      return Vec::new();
    };

    match response {
      RawResponse::Structured(mut response) => {
        if !response.has_model_version() {
          if let Some(version) = self.model_version.as_deref() {
            response.set_version(version);
          }
        } else {
          response.update_predictions_version();
        }
        response.predictions
      }
      RawResponse::Legacy(items) => items
        .into_iter()
        .enumerate()
        .filter_map(
          |(index, item)| match serde_json::from_value::<TaskPrediction>(item) {
            Ok(prediction) => Some(prediction),
            Err(e) => {
              warn!("任务 {} 的第 {} 个预测格式无效，已忽略: {}", task_id, index, e);
              None
            }
          },
        )
        .collect(),
      RawResponse::Unrecognized(value) => {
        error!("任务 {} 的模型响应无法识别: {}", task_id, value);
        Vec::new()
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn prediction(version: Option<&str>) -> TaskPrediction {
    TaskPrediction {
      result: Vec::new(),
      score: Some(0.5),
      model_version: version.map(str::to_string),
    }
  }

  #[test]
  fn structured_without_version_gets_run_version() {
    let reconciler = Reconciler::new(Some("v2".to_string()));
    let response = RawResponse::Structured(ModelResponse::new(vec![
      prediction(None),
      prediction(None),
    ]));

    let predictions = reconciler.reconcile(1, Some(response));
    assert_eq!(predictions.len(), 2);
    assert!(
      predictions
        .iter()
        .all(|p| p.model_version.as_deref() == Some("v2"))
    );
  }

  #[test]
  fn structured_with_version_keeps_its_own() {
    let reconciler = Reconciler::new(Some("v2".to_string()));
    let mut response = ModelResponse::new(vec![prediction(None), prediction(Some("v0"))]);
    response.model_version = Some("v1".to_string());

    let predictions = reconciler.reconcile(1, Some(RawResponse::Structured(response)));
    assert_eq!(predictions[0].model_version.as_deref(), Some("v1"));
    assert_eq!(predictions[1].model_version.as_deref(), Some("v0"));
  }

  #[test]
  fn structured_without_any_version_stays_unversioned() {
    let reconciler = Reconciler::new(None);
    let response = RawResponse::Structured(ModelResponse::new(vec![prediction(None)]));
    let predictions = reconciler.reconcile(1, Some(response));
    assert_eq!(predictions[0].model_version, None);
  }

  #[test]
  fn legacy_list_passes_through() {
    let reconciler = Reconciler::new(Some("v2".to_string()));
    let response = RawResponse::from(json!([
      { "result": [], "score": 0.8 },
      { "result": [], "model_version": "old" },
      { "no_result": true }
    ]));

    let predictions = reconciler.reconcile(9, Some(response));
    assert_eq!(predictions.len(), 2);
    assert_eq!(predictions[0].score, Some(0.8));
    assert_eq!(predictions[0].model_version, None);
    assert_eq!(predictions[1].score, None);
    assert_eq!(predictions[1].model_version.as_deref(), Some("old"));
  }

  #[test]
  fn legacy_regions_are_not_reshaped() {
    let items = json!([
      {
        "result": [
          {
            "id": "a",
            "from_name": "label",
            "to_name": "image",
            "type": "rectanglelabels",
            "value": { "x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0, "rectanglelabels": ["cat"] }
          },
          {
            "from_name": "scene",
            "to_name": "image",
            "type": "choices",
            "value": { "choices": ["outdoor"] }
          }
        ],
        "score": 0.7,
        "model_version": "legacy"
      }
    ]);
    let reconciler = Reconciler::new(Some("v2".to_string()));
    let predictions = reconciler.reconcile(4, Some(RawResponse::from(items.clone())));

    assert_eq!(predictions.len(), 1);
    assert_eq!(predictions[0].model_version.as_deref(), Some("legacy"));
    assert_eq!(serde_json::to_value(&predictions[0]).unwrap(), items[0]);
  }

  #[test]
  fn missing_or_unknown_response_is_empty() {
    let reconciler = Reconciler::new(Some("v2".to_string()));
    assert!(reconciler.reconcile(1, None).is_empty());
    assert!(
      reconciler
        .reconcile(1, Some(RawResponse::from(json!("oops"))))
        .is_empty()
    );
    assert!(
      reconciler
        .reconcile(1, Some(RawResponse::from(json!({ "predictions": 3 }))))
        .is_empty()
    );
  }

  #[test]
  fn json_shapes_are_classified() {
    assert!(matches!(
      RawResponse::from(json!({ "predictions": [], "model_version": "x" })),
      RawResponse::Structured(ModelResponse { model_version: Some(_), .. })
    ));
    assert!(matches!(
      RawResponse::from(json!([])),
      RawResponse::Legacy(_)
    ));
    assert!(matches!(
      RawResponse::from(Value::Null),
      RawResponse::Unrecognized(Value::Null)
    ));
  }
}
