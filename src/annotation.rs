// 该文件是 Shanan （山南西风） 项目的一部分。
// src/annotation.rs - 标注区域构建
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

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::error;

use crate::{
  geometry::{GeometryError, ImageDimensions, normalize},
  model::DetectItem,
};

pub const RECTANGLE_LABELS: &str = "rectanglelabels";
pub const DEFAULT_MODEL_VERSION: &str = "none";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnnotationError {
  #[error("类别索引 {index} 超出标签表范围，可用标签: {available:?}")]
  LabelIndexOutOfRange { index: usize, available: Vec<String> },
  #[error("几何错误: {0}")]
  Geometry(#[from] GeometryError),
}

/// 标注项目的字段名与检测器类别表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSchema {
  pub from_field: String,
  pub to_field: String,
  pub label_names: Vec<String>,
}

impl LabelSchema {
  pub fn label(&self, class_index: usize) -> Result<&str, AnnotationError> {
    self
      .label_names
      .get(class_index)
      .map(String::as_str)
      .ok_or_else(|| AnnotationError::LabelIndexOutOfRange {
        index: class_index,
        available: self.label_names.clone(),
      })
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangleValue {
  pub rotation: f64,
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
  pub rectanglelabels: Vec<String>,
}

/// 一个检测框对应的标注区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRegion {
  pub id: String,
  #[serde(rename = "from_name")]
  pub from_field: String,
  #[serde(rename = "to_name")]
  pub to_field: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub score: f64,
  pub original_width: u32,
  pub original_height: u32,
  #[serde(rename = "image_rotation", alias = "rotation", default)]
  pub rotation: f64,
  pub value: RectangleValue,
}

/// 预测结果中的一个区域
///
/// 由检测器构建的区域是 `Rectangle`；从外部读入的区域（旧式列表、
/// 其他后端返回的结果）一律保留为原始 JSON，原样提交，不做字段校验。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Region {
  Rectangle(AnnotationRegion),
  Raw(Value),
}

impl Region {
  pub fn as_rectangle(&self) -> Option<&AnnotationRegion> {
    match self {
      Region::Rectangle(region) => Some(region),
      Region::Raw(_) => None,
    }
  }
}

impl From<AnnotationRegion> for Region {
  fn from(region: AnnotationRegion) -> Self {
    Region::Rectangle(region)
  }
}

impl<'de> Deserialize<'de> for Region {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    Value::deserialize(deserializer).map(Region::Raw)
  }
}

/// 单个任务的预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPrediction {
  pub result: Vec<Region>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub score: Option<f64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub model_version: Option<String>,
}

/// 提交到标注平台的预测记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
  pub task: u64,
  pub score: f64,
  pub model_version: String,
  pub result: Vec<Region>,
}

impl PredictionRecord {
  pub fn new(task: u64, prediction: TaskPrediction) -> Self {
    PredictionRecord {
      task,
      score: prediction.score.unwrap_or(0.0),
      model_version: prediction
        .model_version
        .unwrap_or_else(|| DEFAULT_MODEL_VERSION.to_string()),
      result: prediction.result,
    }
  }
}

/// 逐框构建标注区域并累计置信度
pub struct AnnotationBuilder<'a> {
  schema: &'a LabelSchema,
  dims: ImageDimensions,
  regions: Vec<AnnotationRegion>,
  score_sum: f64,
}

impl<'a> AnnotationBuilder<'a> {
  pub fn new(schema: &'a LabelSchema, dims: ImageDimensions) -> Result<Self, AnnotationError> {
    dims.check()?;
    Ok(AnnotationBuilder {
      schema,
      dims,
      regions: Vec::new(),
      score_sum: 0.0,
    })
  }

  pub fn push(&mut self, item: &DetectItem) -> Result<&AnnotationRegion, AnnotationError> {
    let label = match self.schema.label(item.class_id as usize) {
      Ok(label) => label.to_string(),
      Err(e) => {
        error!(
          "检测器类别 {} 在标签配置中没有对应标签，检测器与标注配置不一致: {}",
          item.class_id, e
        );
        return Err(e);
      }
    };

    let [x1, y1, x2, y2] = item.bbox;
    let rect = normalize([x1 as f64, y1 as f64, x2 as f64, y2 as f64], self.dims)?;
    let score = item.score as f64;

    self.regions.push(AnnotationRegion {
      id: self.regions.len().to_string(),
      from_field: self.schema.from_field.clone(),
      to_field: self.schema.to_field.clone(),
      kind: RECTANGLE_LABELS.to_string(),
      score,
      original_width: self.dims.width,
      original_height: self.dims.height,
      rotation: 0.0,
      value: RectangleValue {
        rotation: 0.0,
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
        rectanglelabels: vec![label],
      },
    });
    self.score_sum += score;

    Ok(&self.regions[self.regions.len() - 1])
  }

  /// 平均置信度，没有检测框时为 0
  pub fn mean_score(&self) -> f64 {
    if self.regions.is_empty() {
      0.0
    } else {
      self.score_sum / self.regions.len() as f64
    }
  }

  pub fn finish(self) -> TaskPrediction {
    let score = self.mean_score();
    TaskPrediction {
      result: self.regions.into_iter().map(Region::from).collect(),
      score: Some(score),
      model_version: None,
    }
  }
}

pub fn build_prediction(
  schema: &LabelSchema,
  dims: ImageDimensions,
  items: &[DetectItem],
) -> Result<TaskPrediction, AnnotationError> {
  let mut builder = AnnotationBuilder::new(schema, dims)?;
  for item in items {
    builder.push(item)?;
  }
  Ok(builder.finish())
}
