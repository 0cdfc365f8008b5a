// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use image::RgbImage;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shanan_labeler::{
  config::Config,
  input::{Task, resolve_tasks},
  model::{ClassNames, DetectResult, MlBackend, Model, YoloBackend},
  output::OutputWrapper,
  platform::{LabelStudioClient, LabelingPlatform, Project},
  task::{BatchRun, install_interrupt_handler},
};

fn init_logging(level: &str) {
  let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
  let config = Config::from(args::Args::parse());
  init_logging(&config.log_level);
  config.validate()?;

  info!("Label Studio 地址: {}", config.ls_url);
  info!("项目 ID: {}", config.project);
  info!("任务来源: {}", config.tasks);
  info!("模型文件路径: {}", config.model_path().display());
  info!("置信度阈值: {}", config.score_threshold);

  let client = LabelStudioClient::with_timeout(
    config.ls_url.clone(),
    &config.ls_api_key,
    config.request_timeout(),
  )?;
  let project = client
    .get_project(config.project)
    .with_context(|| format!("获取项目 {} 失败", config.project))?;
  info!("已获取项目: {} {}", project.id, project.title);

  let tasks = resolve_tasks(&config.tasks, &client).context("任务解析失败")?;

  load_and_run(&config, &client, &project, tasks)
}

#[cfg(feature = "model_yolo26")]
fn load_and_run(
  config: &Config,
  client: &LabelStudioClient,
  project: &Project,
  tasks: Vec<Task>,
) -> Result<()> {
  let model_path = config.check_model()?;
  let model = shanan_labeler::model::Yolo26Builder::new(model_path)
    .build()
    .context("模型加载失败")?;
  run_batch(config, client, project, tasks, model)
}

#[cfg(not(feature = "model_yolo26"))]
fn load_and_run(
  _config: &Config,
  _client: &LabelStudioClient,
  _project: &Project,
  _tasks: Vec<Task>,
) -> Result<()> {
  anyhow::bail!("未启用任何检测模型，请使用 `--features model_yolo26` 重新编译")
}

#[cfg_attr(not(feature = "model_yolo26"), allow(dead_code))]
fn run_batch<M>(
  config: &Config,
  client: &LabelStudioClient,
  project: &Project,
  tasks: Vec<Task>,
  model: M,
) -> Result<()>
where
  M: Model<Input = RgbImage, Output = DetectResult> + ClassNames,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  let backend = YoloBackend::new(model, client).with_score_threshold(config.score_threshold);
  let state = backend.setup(project).context("检测适配器初始化失败")?;
  info!("检测适配器已创建");

  let output = OutputWrapper::new(config.output.as_ref(), client)?;
  let summary = BatchRun::new(tasks, &backend, state, config.model_version.clone())
    .with_interrupt(install_interrupt_handler()?)
    .run(&output)?;

  if summary.interrupted {
    info!("预测已中断，已提交 {} 个任务", summary.submitted);
  } else {
    info!("模型预测完成");
  }
  Ok(())
}
