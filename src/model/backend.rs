// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/backend.rs - 检测适配器
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
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  annotation::{AnnotationError, LabelSchema, build_prediction},
  geometry::ImageDimensions,
  input::Task,
  model::{ClassNames, DetectResult, Model},
  platform::{ImageFetch, Project},
  response::{ModelResponse, RawResponse},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum BackendError {
  #[error("标签配置中没有连接到图像的控制标签")]
  NoControlTag,
  #[error("任务 {task} 图像获取失败: {source}")]
  Fetch { task: u64, source: BoxError },
  #[error("任务 {task} 模型推理失败: {source}")]
  Model { task: u64, source: BoxError },
  #[error("任务 {task} 标注构建失败: {source}")]
  Annotation {
    task: u64,
    #[source]
    source: AnnotationError,
  },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FitError {
  #[error("尚未实现训练 (事件: {event})")]
  Unsupported { event: String },
}

/// 检测适配器的生命周期接口
pub trait MlBackend {
  type State;
  type Error: std::error::Error + Send + Sync + 'static;

  fn setup(&self, project: &Project) -> Result<Self::State, Self::Error>;

  /// 返回 `None` 表示没有任何预测
  fn predict(
    &self,
    tasks: &[Task],
    state: &Self::State,
  ) -> Result<Option<RawResponse>, Self::Error>;

  fn fit(&self, event: &str, _data: &Value) -> Result<(), FitError> {
    Err(FitError::Unsupported {
      event: event.to_string(),
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YoloState {
  pub schema: LabelSchema,
  pub image_field: String,
}

pub struct YoloBackend<M, F> {
  model: M,
  fetcher: F,
  score_threshold: f32,
}

impl<M, F> YoloBackend<M, F> {
  pub fn new(model: M, fetcher: F) -> Self {
    YoloBackend {
      model,
      fetcher,
      score_threshold: 0.0,
    }
  }

  pub fn with_score_threshold(mut self, score_threshold: f32) -> Self {
    self.score_threshold = score_threshold;
    self
  }
}

impl<M, F> MlBackend for YoloBackend<M, F>
where
  M: Model<Input = RgbImage, Output = DetectResult> + ClassNames,
  M::Error: std::error::Error + Send + Sync + 'static,
  F: ImageFetch,
{
  type State = YoloState;
  type Error = BackendError;

  fn setup(&self, project: &Project) -> Result<Self::State, Self::Error> {
    let tag = project.control_tag().ok_or(BackendError::NoControlTag)?;
    let label_names = self.model.class_names().to_vec();

    if !tag.labels.is_empty() && !tag.labels.iter().any(|l| label_names.contains(l)) {
      warn!(
        "控制标签 '{}' 的标签与模型标签没有交集，请检查标签配置\n  标签配置: {:?}\n  模型标签: {:?}",
        tag.from_name, tag.labels, label_names
      );
    }

    info!(
      "标签映射: {} -> {} (图像字段 '{}', {} 个类别)",
      tag.from_name,
      tag.to_name,
      tag.image_field,
      label_names.len()
    );

    Ok(YoloState {
      schema: LabelSchema {
        from_field: tag.from_name,
        to_field: tag.to_name,
        label_names,
      },
      image_field: tag.image_field,
    })
  }

  fn predict(
    &self,
    tasks: &[Task],
    state: &Self::State,
  ) -> Result<Option<RawResponse>, Self::Error> {
    debug!("对 {} 个任务运行预测", tasks.len());
    let mut predictions = Vec::with_capacity(tasks.len());

    for task in tasks {
      let Some(reference) = task.data.get(&state.image_field).and_then(Value::as_str) else {
        warn!("任务 {} 缺少图像字段 '{}'", task.id, state.image_field);
        continue;
      };

      let image = self
        .fetcher
        .fetch_image(reference)
        .map_err(|e| BackendError::Fetch {
          task: task.id,
          source: Box::new(e),
        })?;
      let dims = ImageDimensions::from(&image);

      let now = std::time::Instant::now();
      let result = self.model.infer(&image).map_err(|e| BackendError::Model {
        task: task.id,
        source: Box::new(e),
      })?;
      debug!("推理完成，耗时: {:.2?}", now.elapsed());

      let items: Vec<_> = result
        .items
        .iter()
        .filter(|item| item.score >= self.score_threshold)
        .cloned()
        .collect();

      let prediction = build_prediction(&state.schema, dims, &items).map_err(|e| {
        error!("任务 {} 标注构建失败", task.id);
        BackendError::Annotation {
          task: task.id,
          source: e,
        }
      })?;
      debug!(
        "任务 {}: 检测到 {} 个物体，保留 {} 个",
        task.id,
        result.len(),
        prediction.result.len()
      );
      predictions.push(prediction);
    }

    if predictions.is_empty() {
      return Ok(None);
    }
    Ok(Some(RawResponse::Structured(ModelResponse::new(predictions))))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;
  use serde_json::json;
  use std::convert::Infallible;

  struct FixedModel {
    names: Vec<String>,
    items: Vec<DetectItem>,
  }

  impl Model for FixedModel {
    type Input = RgbImage;
    type Output = DetectResult;
    type Error = Infallible;

    fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
      Ok(DetectResult::from(self.items.clone()))
    }
  }

  impl ClassNames for FixedModel {
    fn class_names(&self) -> &[String] {
      &self.names
    }
  }

  struct BlankImage;

  impl ImageFetch for BlankImage {
    type Error = Infallible;

    fn fetch_image(&self, _reference: &str) -> Result<RgbImage, Self::Error> {
      Ok(RgbImage::new(200, 100))
    }
  }

  fn backend(items: Vec<DetectItem>) -> YoloBackend<FixedModel, BlankImage> {
    let model = FixedModel {
      names: vec!["cat".to_string(), "dog".to_string()],
      items,
    };
    YoloBackend::new(model, BlankImage)
  }

  fn project() -> Project {
    serde_json::from_value(json!({
      "id": 1,
      "parsed_label_config": {
        "label": {
          "type": "RectangleLabels",
          "to_name": ["image"],
          "inputs": [{ "type": "Image", "value": "image" }],
          "labels": ["cat"]
        }
      }
    }))
    .unwrap()
  }

  fn task(id: u64, data: Value) -> Task {
    Task {
      id,
      data: data.as_object().cloned().unwrap_or_default(),
    }
  }

  #[test]
  fn setup_derives_schema() {
    let state = backend(Vec::new()).setup(&project()).unwrap();
    assert_eq!(state.schema.from_field, "label");
    assert_eq!(state.schema.to_field, "image");
    assert_eq!(state.schema.label_names, ["cat", "dog"]);
    assert_eq!(state.image_field, "image");
  }

  #[test]
  fn setup_without_control_tag_fails() {
    let err = backend(Vec::new()).setup(&Project::default()).unwrap_err();
    assert!(matches!(err, BackendError::NoControlTag));
  }

  #[test]
  fn low_scores_are_filtered() {
    let items = vec![
      DetectItem {
        class_id: 0,
        score: 0.9,
        bbox: [0.0, 0.0, 20.0, 10.0],
      },
      DetectItem {
        class_id: 1,
        score: 0.2,
        bbox: [0.0, 0.0, 20.0, 10.0],
      },
    ];
    let backend = backend(items).with_score_threshold(0.5);
    let state = backend.setup(&project()).unwrap();

    let response = backend
      .predict(&[task(1, json!({ "image": "/a.png" }))], &state)
      .unwrap();
    let Some(RawResponse::Structured(response)) = response else {
      panic!("expected structured response");
    };
    assert_eq!(response.model_version, None);
    assert_eq!(response.predictions.len(), 1);
    assert_eq!(response.predictions[0].result.len(), 1);
    let region = response.predictions[0].result[0].as_rectangle().unwrap();
    assert_eq!(region.original_width, 200);
  }

  #[test]
  fn task_without_image_yields_nothing() {
    let backend = backend(Vec::new());
    let state = backend.setup(&project()).unwrap();
    let response = backend
      .predict(&[task(1, json!({ "text": "hello" }))], &state)
      .unwrap();
    assert_eq!(response, None);
  }

  #[test]
  fn label_mismatch_is_fatal() {
    let backend = backend(vec![DetectItem {
      class_id: 5,
      score: 0.9,
      bbox: [0.0, 0.0, 1.0, 1.0],
    }]);
    let state = backend.setup(&project()).unwrap();
    let err = backend
      .predict(&[task(3, json!({ "image": "/a.png" }))], &state)
      .unwrap_err();
    assert!(matches!(
      err,
      BackendError::Annotation {
        task: 3,
        source: AnnotationError::LabelIndexOutOfRange { index: 5, .. }
      }
    ));
  }

  #[test]
  fn training_is_unsupported() {
    let err = backend(Vec::new())
      .fit("START_TRAINING", &Value::Null)
      .unwrap_err();
    assert_eq!(
      err,
      FitError::Unsupported {
        event: "START_TRAINING".to_string()
      }
    );
  }
}
