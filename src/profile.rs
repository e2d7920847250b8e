// 该文件是 Beifeng （北风） 项目的一部分。
// src/profile.rs - 阶段计时
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

use std::{
  collections::HashMap,
  time::{Duration, Instant},
};

use tracing::{debug, warn};

pub const STAGE_OVERALL: &str = "detection overall";
pub const STAGE_PRE_PROCESS: &str = "stage 1: pre-process";
pub const STAGE_DETECTION: &str = "stage 2: detection";
pub const STAGE_POST_PROCESS: &str = "stage 3: post-process";

/// 阶段观察者，同一标签的相邻两次调用分别标记开始与结束
pub trait StageObserver {
  fn save(&mut self, label: &'static str);
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
  pub label: &'static str,
  pub count: usize,
  pub total: Duration,
  pub min: Duration,
  pub max: Duration,
}

impl StageSummary {
  pub fn average(&self) -> Duration {
    if self.count == 0 {
      Duration::ZERO
    } else {
      self.total / self.count as u32
    }
  }
}

/// 按标签累计耗时的计时器
#[derive(Debug, Default)]
pub struct TimeStamp {
  open: HashMap<&'static str, Instant>,
  spans: HashMap<&'static str, Vec<Duration>>,
  order: Vec<&'static str>,
}

impl TimeStamp {
  pub fn new() -> Self {
    Self::default()
  }

  /// 以显式时长记录一次跨度
  pub fn record(&mut self, label: &'static str, elapsed: Duration) {
    self.note(label);
    self.spans.entry(label).or_default().push(elapsed);
  }

  fn note(&mut self, label: &'static str) {
    if !self.order.contains(&label) {
      self.order.push(label);
    }
  }

  pub fn spans(&self, label: &str) -> &[Duration] {
    self.spans.get(label).map(Vec::as_slice).unwrap_or(&[])
  }

  /// 按首次出现顺序给出每个标签的统计
  pub fn summary(&self) -> Vec<StageSummary> {
    self
      .order
      .iter()
      .filter_map(|&label| {
        let spans = self.spans.get(label)?;
        Some(StageSummary {
          label,
          count: spans.len(),
          total: spans.iter().sum(),
          min: spans.iter().min().copied().unwrap_or_default(),
          max: spans.iter().max().copied().unwrap_or_default(),
        })
      })
      .collect()
  }

  pub fn show_summary(&self, title: &str) {
    if !self.open.is_empty() {
      warn!("{} 个计时区间未结束", self.open.len());
    }

    println!("############################");
    println!("SUMMARY: {}", title);
    println!("############################");
    for stage in self.summary() {
      println!(
        "{:<24} count: {:>6}  total: {:.2?}  avg: {:.2?}  min: {:.2?}  max: {:.2?}",
        stage.label,
        stage.count,
        stage.total,
        stage.average(),
        stage.min,
        stage.max
      );
    }
  }

  pub fn clear(&mut self) {
    self.open.clear();
    self.spans.clear();
    self.order.clear();
  }
}

impl StageObserver for TimeStamp {
  fn save(&mut self, label: &'static str) {
    match self.open.remove(label) {
      Some(start) => {
        let elapsed = start.elapsed();
        debug!("{} 耗时: {:.2?}", label, elapsed);
        self.record(label, elapsed);
      }
      None => {
        self.note(label);
        self.open.insert(label, Instant::now());
      }
    }
  }
}

/// 为嵌套调用重新借用可选观察者
pub(crate) fn reborrow<'a>(
  observer: &'a mut Option<&mut dyn StageObserver>,
) -> Option<&'a mut dyn StageObserver> {
  match observer {
    Some(observer) => Some(&mut **observer),
    None => None,
  }
}

/// 在可选观察者上标记 `label` 的开始与结束，包裹 `f` 的执行
pub(crate) fn timed<T>(
  observer: &mut Option<&mut dyn StageObserver>,
  label: &'static str,
  f: impl FnOnce() -> T,
) -> T {
  if let Some(observer) = observer.as_deref_mut() {
    observer.save(label);
  }
  let result = f();
  if let Some(observer) = observer.as_deref_mut() {
    observer.save(label);
  }
  result
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn paired_saves_record_one_span() {
    let mut ts = TimeStamp::new();
    ts.save(STAGE_PRE_PROCESS);
    ts.save(STAGE_PRE_PROCESS);
    ts.save(STAGE_PRE_PROCESS);
    assert_eq!(ts.spans(STAGE_PRE_PROCESS).len(), 1);
    ts.save(STAGE_PRE_PROCESS);
    assert_eq!(ts.spans(STAGE_PRE_PROCESS).len(), 2);
  }

  #[test]
  fn summary_keeps_first_seen_order() {
    let mut ts = TimeStamp::new();
    ts.record(STAGE_DETECTION, Duration::from_millis(30));
    ts.record(STAGE_PRE_PROCESS, Duration::from_millis(10));
    ts.record(STAGE_DETECTION, Duration::from_millis(10));

    let summary = ts.summary();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].label, STAGE_DETECTION);
    assert_eq!(summary[0].count, 2);
    assert_eq!(summary[0].total, Duration::from_millis(40));
    assert_eq!(summary[0].average(), Duration::from_millis(20));
    assert_eq!(summary[0].min, Duration::from_millis(10));
    assert_eq!(summary[0].max, Duration::from_millis(30));
    assert_eq!(summary[1].label, STAGE_PRE_PROCESS);
  }

  #[test]
  fn enclosing_span_is_listed_first() {
    let mut ts = TimeStamp::new();
    for _ in 0..2 {
      ts.save(STAGE_OVERALL);
      ts.save(STAGE_PRE_PROCESS);
      ts.save(STAGE_PRE_PROCESS);
      ts.save(STAGE_DETECTION);
      ts.save(STAGE_DETECTION);
      ts.save(STAGE_OVERALL);
    }

    let labels: Vec<&str> = ts.summary().iter().map(|s| s.label).collect();
    assert_eq!(labels, vec![STAGE_OVERALL, STAGE_PRE_PROCESS, STAGE_DETECTION]);
    assert!(ts.summary().iter().all(|s| s.count == 2));
  }

  #[test]
  fn clear_drops_everything() {
    let mut ts = TimeStamp::new();
    ts.record(STAGE_OVERALL, Duration::from_millis(1));
    ts.save(STAGE_DETECTION);
    ts.clear();
    assert!(ts.summary().is_empty());
    ts.save(STAGE_DETECTION);
    ts.save(STAGE_DETECTION);
    assert_eq!(ts.spans(STAGE_DETECTION).len(), 1);
  }

  #[test]
  fn timed_wraps_one_span() {
    let mut none: Option<&mut dyn StageObserver> = None;
    assert_eq!(timed(&mut none, STAGE_OVERALL, || 7), 7);

    let mut ts = TimeStamp::new();
    {
      let mut some: Option<&mut dyn StageObserver> = Some(&mut ts);
      let value = timed(&mut some, STAGE_OVERALL, || "done");
      assert_eq!(value, "done");
    }
    assert_eq!(ts.spans(STAGE_OVERALL).len(), 1);
  }
}
