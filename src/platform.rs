// 该文件是 Shanan （山南西风） 项目的一部分。
// src/platform.rs - 标注平台接口
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

use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::annotation::PredictionRecord;

mod label_studio;
pub use self::label_studio::{LabelStudioClient, PlatformError};

pub const RECTANGLE_LABELS_TAG: &str = "RectangleLabels";
pub const DEFAULT_IMAGE_FIELD: &str = "image";

pub trait LabelingPlatform {
  type Error: std::error::Error + Send + Sync + 'static;

  fn get_project(&self, id: u64) -> Result<Project, Self::Error>;
  fn get_task_data(&self, id: u64) -> Result<Map<String, Value>, Self::Error>;
  fn create_prediction(&self, record: &PredictionRecord) -> Result<(), Self::Error>;
}

pub trait ImageFetch {
  type Error: std::error::Error + Send + Sync + 'static;

  fn fetch_image(&self, reference: &str) -> Result<RgbImage, Self::Error>;
}

impl<T: LabelingPlatform> LabelingPlatform for &T {
  type Error = T::Error;

  fn get_project(&self, id: u64) -> Result<Project, Self::Error> {
    (**self).get_project(id)
  }

  fn get_task_data(&self, id: u64) -> Result<Map<String, Value>, Self::Error> {
    (**self).get_task_data(id)
  }

  fn create_prediction(&self, record: &PredictionRecord) -> Result<(), Self::Error> {
    (**self).create_prediction(record)
  }
}

impl<T: ImageFetch> ImageFetch for &T {
  type Error = T::Error;

  fn fetch_image(&self, reference: &str) -> Result<RgbImage, Self::Error> {
    (**self).fetch_image(reference)
  }
}

/// 标注项目
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Project {
  pub id: u64,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub label_config: String,
  #[serde(default)]
  pub parsed_label_config: Map<String, Value>,
}

/// 标签配置中的一个控制标签
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlTag {
  pub from_name: String,
  pub kind: String,
  pub to_name: String,
  pub image_field: String,
  pub labels: Vec<String>,
}

impl Project {
  /// 优先选取第一个 RectangleLabels 控制标签，没有时退回第一个控制标签
  pub fn control_tag(&self) -> Option<ControlTag> {
    let tags: Vec<ControlTag> = self
      .parsed_label_config
      .iter()
      .filter_map(|(name, schema)| {
        let tag = ControlTag::parse(name, schema);
        if tag.is_none() {
          warn!("控制标签 '{}' 缺少 toName，已跳过", name);
        }
        tag
      })
      .collect();

    let index = tags
      .iter()
      .position(|tag| tag.kind == RECTANGLE_LABELS_TAG)
      .unwrap_or(0);
    tags.into_iter().nth(index)
  }
}

impl ControlTag {
  fn parse(name: &str, schema: &Value) -> Option<ControlTag> {
    let to_name = schema
      .get("to_name")
      .and_then(Value::as_array)
      .and_then(|names| names.first())
      .and_then(Value::as_str)?;

    let image_field = schema
      .get("inputs")
      .and_then(Value::as_array)
      .and_then(|inputs| inputs.first())
      .and_then(|input| input.get("value"))
      .and_then(Value::as_str)
      .map(|value| value.trim_start_matches('$'))
      .filter(|value| !value.is_empty())
      .unwrap_or(DEFAULT_IMAGE_FIELD);

    let labels = schema
      .get("labels")
      .and_then(Value::as_array)
      .map(|labels| {
        labels
          .iter()
          .filter_map(Value::as_str)
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default();

    Some(ControlTag {
      from_name: name.to_string(),
      kind: schema
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string(),
      to_name: to_name.to_string(),
      image_field: image_field.to_string(),
      labels,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn project(parsed: Value) -> Project {
    serde_json::from_value(json!({
      "id": 1,
      "title": "demo",
      "parsed_label_config": parsed,
    }))
    .unwrap()
  }

  #[test]
  fn rectangle_labels_tag_is_preferred() {
    let project = project(json!({
      "quality": {
        "type": "Choices",
        "to_name": ["img"],
        "inputs": [{ "type": "Image", "value": "img" }],
        "labels": ["good", "bad"]
      },
      "label": {
        "type": "RectangleLabels",
        "to_name": ["img"],
        "inputs": [{ "type": "Image", "value": "$photo" }],
        "labels": ["cat", "dog"]
      }
    }));

    let tag = project.control_tag().unwrap();
    assert_eq!(tag.from_name, "label");
    assert_eq!(tag.to_name, "img");
    assert_eq!(tag.image_field, "photo");
    assert_eq!(tag.labels, ["cat", "dog"]);
  }

  #[test]
  fn falls_back_to_first_tag() {
    let project = project(json!({
      "box": { "type": "Rectangle", "to_name": ["image"] },
      "other": { "type": "Choices", "to_name": ["image"] }
    }));

    let tag = project.control_tag().unwrap();
    assert_eq!(tag.from_name, "box");
    assert_eq!(tag.image_field, DEFAULT_IMAGE_FIELD);
    assert!(tag.labels.is_empty());
  }

  #[test]
  fn tags_without_target_are_skipped() {
    let untargeted = project(json!({ "label": { "type": "RectangleLabels" } }));
    assert_eq!(untargeted.control_tag(), None);

    // 缺少 toName 的 RectangleLabels 不参与优先选择
    let mixed = project(json!({
      "label": { "type": "RectangleLabels", "labels": ["cat"] },
      "scene": { "type": "Choices", "to_name": ["image"], "labels": ["indoor"] }
    }));
    let tag = mixed.control_tag().unwrap();
    assert_eq!(tag.from_name, "scene");
    assert_eq!(tag.kind, "Choices");
    assert_eq!(tag.to_name, "image");
    assert_eq!(Project::default().control_tag(), None);
  }
}
