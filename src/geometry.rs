// 该文件是 Shanan （山南西风） 项目的一部分。
// src/geometry.rs - 检测框几何归一化
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
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
  #[error("图像尺寸无效: {width}x{height}")]
  InvalidImage { width: u32, height: u32 },
}

/// 源图像的像素尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDimensions {
  pub width: u32,
  pub height: u32,
}

impl ImageDimensions {
  pub fn new(width: u32, height: u32) -> Result<Self, GeometryError> {
    let dims = ImageDimensions { width, height };
    dims.check()?;
    Ok(dims)
  }

  pub fn check(&self) -> Result<(), GeometryError> {
    if self.width == 0 || self.height == 0 {
      return Err(GeometryError::InvalidImage {
        width: self.width,
        height: self.height,
      });
    }
    Ok(())
  }
}

impl From<&image::RgbImage> for ImageDimensions {
  fn from(image: &image::RgbImage) -> Self {
    let (width, height) = image.dimensions();
    ImageDimensions { width, height }
  }
}

/// 以图像宽高百分比表示的矩形
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentRect {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
}

/// 将像素坐标 `[x_min, y_min, x_max, y_max]` 转换为百分比矩形。
///
/// 输出不做裁剪，超出图像范围的框会得到 [0, 100] 之外的值。
pub fn normalize(xyxy: [f64; 4], dims: ImageDimensions) -> Result<PercentRect, GeometryError> {
  dims.check()?;
  let w = dims.width as f64;
  let h = dims.height as f64;
  let [x1, y1, x2, y2] = xyxy;

  Ok(PercentRect {
    x: x1 / w * 100.0,
    y: y1 / h * 100.0,
    width: (x2 - x1) / w * 100.0,
    height: (y2 - y1) / h * 100.0,
  })
}

/// `normalize` 的逆变换
pub fn denormalize(rect: &PercentRect, dims: ImageDimensions) -> Result<[f64; 4], GeometryError> {
  dims.check()?;
  let w = dims.width as f64;
  let h = dims.height as f64;
  let x1 = rect.x * w / 100.0;
  let y1 = rect.y * h / 100.0;

  Ok([
    x1,
    y1,
    x1 + rect.width * w / 100.0,
    y1 + rect.height * h / 100.0,
  ])
}
