// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 预测结果输出
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
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, annotation::PredictionRecord, platform::LabelingPlatform};

/// 一次提交一个任务的完整预测记录
pub trait Submit {
  type Error;
  fn submit(&self, record: &PredictionRecord) -> Result<(), Self::Error>;
}

mod directory_record;
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("标注平台提交错误: {0}")]
  PlatformError(Box<dyn std::error::Error + Send + Sync>),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 提交到标注平台
pub struct PlatformOutput<P> {
  platform: P,
}

impl<P> PlatformOutput<P> {
  pub fn new(platform: P) -> Self {
    PlatformOutput { platform }
  }
}

impl<P: LabelingPlatform> Submit for PlatformOutput<P> {
  type Error = P::Error;

  fn submit(&self, record: &PredictionRecord) -> Result<(), Self::Error> {
    self.platform.create_prediction(record)
  }
}

pub enum OutputWrapper<P> {
  Platform(PlatformOutput<P>),
  DirectoryRecord(DirectoryRecordOutput),
}

impl<P: LabelingPlatform> OutputWrapper<P> {
  /// 未指定输出时提交到标注平台
  pub fn new(url: Option<&Url>, platform: P) -> Result<Self, OutputError> {
    let Some(url) = url else {
      return Ok(OutputWrapper::Platform(PlatformOutput::new(platform)));
    };

    match url.scheme() {
      DirectoryRecordOutput::SCHEME => Ok(OutputWrapper::DirectoryRecord(
        DirectoryRecordOutput::from_url(url)?,
      )),
      scheme => Err(OutputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

impl<P: LabelingPlatform> Submit for OutputWrapper<P> {
  type Error = OutputError;

  fn submit(&self, record: &PredictionRecord) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Platform(output) => output
        .submit(record)
        .map_err(|e| OutputError::PlatformError(Box::new(e))),
      OutputWrapper::DirectoryRecord(output) => output.submit(record).map_err(OutputError::from),
    }
  }
}
