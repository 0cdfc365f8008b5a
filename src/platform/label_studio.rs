// 该文件是 Shanan （山南西风） 项目的一部分。
// src/platform/label_studio.rs - Label Studio HTTP 客户端
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

use std::time::Duration;

use image::RgbImage;
use reqwest::{
  StatusCode,
  blocking::{Client, RequestBuilder, Response},
  header::{AUTHORIZATION, HeaderValue, InvalidHeaderValue},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::{ImageFetch, LabelingPlatform, Project};
use crate::annotation::PredictionRecord;

#[derive(Error, Debug)]
pub enum PlatformError {
  #[error("HTTP 请求错误: {0}")]
  Http(#[from] reqwest::Error),
  #[error("请求 {url} 返回状态 {status}: {body}")]
  Status {
    url: String,
    status: StatusCode,
    body: String,
  },
  #[error("URL 错误: {0}")]
  Url(#[from] url::ParseError),
  #[error("图像解码错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("API 密钥格式无效: {0}")]
  ApiKey(#[from] InvalidHeaderValue),
}

#[derive(Deserialize)]
struct TaskPayload {
  #[serde(default)]
  data: Map<String, Value>,
}

pub struct LabelStudioClient {
  base_url: Url,
  token: HeaderValue,
  timeout: Option<Duration>,
  client: Client,
}

impl LabelStudioClient {
  /// 请求不设超时，与平台交互的耗时由平台自身决定
  pub fn new(base_url: Url, api_key: &str) -> Result<Self, PlatformError> {
    Self::with_timeout(base_url, api_key, None)
  }

  /// `timeout` 作用于每个请求的整个过程（连接、发送、读取响应体）
  pub fn with_timeout(
    base_url: Url,
    api_key: &str,
    timeout: Option<Duration>,
  ) -> Result<Self, PlatformError> {
    let mut base_url = base_url;
    if !base_url.path().ends_with('/') {
      let path = format!("{}/", base_url.path());
      base_url.set_path(&path);
    }

    let mut token = HeaderValue::from_str(&format!("Token {}", api_key))?;
    token.set_sensitive(true);

    // blocking 客户端默认 30 秒超时，这里显式覆盖
    let client = Client::builder().timeout(timeout).build()?;
    match timeout {
      Some(timeout) => info!("已连接 Label Studio: {}，请求超时 {:?}", base_url, timeout),
      None => info!("已连接 Label Studio: {}，请求不设超时", base_url),
    }

    Ok(LabelStudioClient {
      base_url,
      token,
      timeout,
      client,
    })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.timeout
  }

  fn endpoint(&self, path: &str) -> Result<Url, PlatformError> {
    Ok(self.base_url.join(path)?)
  }

  /// 绝对 URL 原样使用，相对路径直接拼接在平台地址之后
  pub fn resolve_image_url(&self, reference: &str) -> Result<Url, PlatformError> {
    if let Ok(url) = Url::parse(reference) {
      if matches!(url.scheme(), "http" | "https") {
        return Ok(url);
      }
    }

    let base = self.base_url.as_str().trim_end_matches('/');
    let url = if reference.starts_with('/') {
      format!("{}{}", base, reference)
    } else {
      format!("{}/{}", base, reference)
    };
    Ok(Url::parse(&url)?)
  }

  fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
    request.header(AUTHORIZATION, self.token.clone())
  }

  fn check(response: Response) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let url = response.url().to_string();
    let body = response.text().unwrap_or_default();
    Err(PlatformError::Status { url, status, body })
  }

  fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, PlatformError> {
    debug!("GET {}", url);
    let response = self.authorized(self.client.get(url)).send()?;
    Ok(Self::check(response)?.json()?)
  }
}

impl LabelingPlatform for LabelStudioClient {
  type Error = PlatformError;

  fn get_project(&self, id: u64) -> Result<Project, Self::Error> {
    let url = self.endpoint(&format!("api/projects/{}/", id))?;
    self.get_json(url)
  }

  fn get_task_data(&self, id: u64) -> Result<Map<String, Value>, Self::Error> {
    let url = self.endpoint(&format!("api/tasks/{}/", id))?;
    let task: TaskPayload = self.get_json(url)?;
    Ok(task.data)
  }

  fn create_prediction(&self, record: &PredictionRecord) -> Result<(), Self::Error> {
    let url = self.endpoint("api/predictions/")?;
    debug!("POST {} (任务 {})", url, record.task);
    let response = self
      .authorized(self.client.post(url))
      .json(record)
      .send()?;
    Self::check(response)?;
    Ok(())
  }
}

impl ImageFetch for LabelStudioClient {
  type Error = PlatformError;

  fn fetch_image(&self, reference: &str) -> Result<RgbImage, Self::Error> {
    let url = self.resolve_image_url(reference)?;
    debug!("下载图像: {}", url);

    // 只向平台自身发送令牌
    let same_origin = url.origin() == self.base_url.origin();
    let request = self.client.get(url);
    let request = if same_origin {
      self.authorized(request)
    } else {
      request
    };

    let bytes = Self::check(request.send()?)?.bytes()?;
    let image = image::load_from_memory(&bytes)?;
    Ok(image.to_rgb8())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{io::Read, net::TcpListener, thread};

  fn client(base: &str) -> LabelStudioClient {
    LabelStudioClient::new(Url::parse(base).unwrap(), "secret").unwrap()
  }

  #[test]
  fn relative_image_reference_is_appended() {
    let client = client("http://localhost:8080");
    let url = client
      .resolve_image_url("/data/upload/1/cat.png")
      .unwrap();
    assert_eq!(url.as_str(), "http://localhost:8080/data/upload/1/cat.png");
  }

  #[test]
  fn base_path_is_kept() {
    let client = client("https://example.com/studio");
    assert_eq!(client.base_url().as_str(), "https://example.com/studio/");
    assert_eq!(
      client.endpoint("api/tasks/3/").unwrap().as_str(),
      "https://example.com/studio/api/tasks/3/"
    );
    assert_eq!(
      client.resolve_image_url("data/x.jpg").unwrap().as_str(),
      "https://example.com/studio/data/x.jpg"
    );
  }

  #[test]
  fn absolute_image_reference_is_used_as_is() {
    let client = client("http://localhost:8080");
    let url = client
      .resolve_image_url("https://cdn.example.com/a.jpg")
      .unwrap();
    assert_eq!(url.as_str(), "https://cdn.example.com/a.jpg");
  }

  #[test]
  fn requests_have_no_timeout_by_default() {
    assert_eq!(client("http://localhost:8080").timeout(), None);
  }

  #[test]
  fn configured_timeout_bounds_a_stalled_request() {
    // 接受连接后只读取请求，不做任何响应
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
      if let Ok((mut stream, _)) = listener.accept() {
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf);
        thread::sleep(Duration::from_secs(5));
      }
    });

    let base = Url::parse(&format!("http://{}", addr)).unwrap();
    let timeout = Some(Duration::from_millis(200));
    let client = LabelStudioClient::with_timeout(base, "secret", timeout).unwrap();
    assert_eq!(client.timeout(), timeout);

    let started = std::time::Instant::now();
    let err = client.get_project(1).unwrap_err();
    assert!(matches!(err, PlatformError::Http(ref e) if e.is_timeout()));
    assert!(started.elapsed() < Duration::from_secs(5));
  }
}
