// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 批量预测任务
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

use std::sync::mpsc::{Receiver, channel};
use std::{thread, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
  annotation::PredictionRecord,
  input::Task,
  model::MlBackend,
  output::Submit,
  response::Reconciler,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
  pub total: usize,
  pub processed: usize,
  pub submitted: usize,
  pub skipped: usize,
  pub predictions: usize,
  pub interrupted: bool,
}

/// 安装 Ctrl-C 处理器，收到信号后当前任务完成即退出循环
pub fn install_interrupt_handler() -> anyhow::Result<Receiver<()>> {
  let (tx, rx) = channel();

  ctrlc::set_handler(move || {
    info!("收到中断信号，当前任务完成后退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })
  .context("设置 Ctrl-C 处理器失败")?;

  Ok(rx)
}

/// 一次批量预测运行
pub struct BatchRun<'a, B: MlBackend> {
  tasks: Vec<Task>,
  backend: &'a B,
  state: B::State,
  reconciler: Reconciler,
  interrupt: Option<Receiver<()>>,
}

impl<'a, B: MlBackend> BatchRun<'a, B> {
  pub fn new(
    tasks: Vec<Task>,
    backend: &'a B,
    state: B::State,
    model_version: Option<String>,
  ) -> Self {
    BatchRun {
      tasks,
      backend,
      state,
      reconciler: Reconciler::new(model_version),
      interrupt: None,
    }
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .is_some_and(|rx| rx.try_recv().is_ok())
  }

  /// 逐个任务推理并提交，任务之间严格串行
  pub fn run<O>(self, output: &O) -> anyhow::Result<BatchSummary>
  where
    O: Submit,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let total = self.tasks.len();
    let mut summary = BatchSummary {
      total,
      ..Default::default()
    };

    info!("开始批量预测，共 {} 个任务", total);
    for (i, task) in self.tasks.iter().enumerate() {
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        summary.interrupted = true;
        break;
      }

      info!("[{}/{}] 处理任务 {}", i + 1, total, task.id);
      let now = std::time::Instant::now();
      let response = self
        .backend
        .predict(std::slice::from_ref(task), &self.state)
        .with_context(|| format!("任务 {} 推理失败", task.id))?;
      let predictions = self.reconciler.reconcile(task.id, response);
      summary.processed += 1;

      if predictions.is_empty() {
        warn!("任务 {} 没有可提交的预测，跳过", task.id);
        summary.skipped += 1;
        continue;
      }

      for prediction in predictions {
        let record = PredictionRecord::new(task.id, prediction);
        output
          .submit(&record)
          .with_context(|| format!("任务 {} 预测提交失败", task.id))?;
        summary.predictions += 1;
      }
      summary.submitted += 1;
      info!("任务 {} 完成，耗时: {:.2?}", task.id, now.elapsed());
    }

    info!(
      "批量预测结束: 共 {} 个任务，已处理 {}，已提交 {}，跳过 {}，预测记录 {}{}",
      summary.total,
      summary.processed,
      summary.submitted,
      summary.skipped,
      summary.predictions,
      if summary.interrupted { "（已中断）" } else { "" }
    );
    Ok(summary)
  }
}
