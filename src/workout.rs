//! ワークアウト（複数種目の連続実施）
//!
//! SETUP でキューを編集し、開始すると先頭の種目から順に ExerciseEngine を
//! 駆動する。全種目の目標回数に達したら COMPLETE となり、集計を一度だけ出す。

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use thiserror::Error;

use crate::exercise::{ExerciseCatalog, ExerciseEngine};

pub const MIN_TARGET_REPS: u32 = 1;
pub const MAX_TARGET_REPS: u32 = 100;

#[derive(Debug, Error, PartialEq)]
pub enum WorkoutError {
    #[error("workout queue is empty")]
    EmptyQueue,
    #[error("operation not allowed while workout is {0:?}")]
    WrongPhase(WorkoutPhase),
    #[error("target reps must be 1-100, got {0}")]
    InvalidReps(u32),
    #[error("unknown exercise: {0}")]
    UnknownExercise(String),
    #[error("queue index {0} out of range")]
    IndexOutOfRange(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutPhase {
    Setup,
    Active,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub exercise: String,
    pub target_reps: u32,
    pub completed_left: u32,
    pub completed_right: u32,
}

impl QueueEntry {
    pub fn new(exercise: &str, target_reps: u32) -> Self {
        Self {
            exercise: exercise.to_string(),
            target_reps,
            completed_left: 0,
            completed_right: 0,
        }
    }

    /// 左右別なら両側、合算なら多い方が目標に達したか
    pub fn is_complete(&self, track_both_sides: bool) -> bool {
        if track_both_sides {
            self.completed_left >= self.target_reps && self.completed_right >= self.target_reps
        } else {
            self.completed_left.max(self.completed_right) >= self.target_reps
        }
    }

    /// 完了した回数（左右別なら少ない方）
    pub fn completed_reps(&self, track_both_sides: bool) -> u32 {
        if track_both_sides {
            self.completed_left.min(self.completed_right)
        } else {
            self.completed_left.max(self.completed_right)
        }
    }

    /// 左右の合計（合算種目は多い方）
    pub fn side_reps(&self, track_both_sides: bool) -> u32 {
        if track_both_sides {
            self.completed_left + self.completed_right
        } else {
            self.completed_left.max(self.completed_right)
        }
    }

    fn clear_progress(&mut self) {
        self.completed_left = 0;
        self.completed_right = 0;
    }
}

/// 完了時の集計（履歴保存用）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSummary {
    pub exercise_names: Vec<String>,
    pub total_exercises: usize,
    pub total_reps: u32,
    pub total_side_reps: u32,
    pub target_reps: u32,
    pub duration_seconds: u64,
    /// `m:ss`
    pub duration: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entries: Vec<QueueEntry>,
}

pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkoutEvent {
    /// 次の種目へ進んだ
    Advanced { index: usize, exercise: String },
    Completed(WorkoutSummary),
}

pub struct WorkoutSequencer {
    catalog: Arc<ExerciseCatalog>,
    queue: Vec<QueueEntry>,
    phase: WorkoutPhase,
    index: usize,
    start_t: f64,
    started_at: Option<DateTime<Utc>>,
    summary: Option<WorkoutSummary>,
}

impl WorkoutSequencer {
    pub fn new(catalog: Arc<ExerciseCatalog>) -> Self {
        Self {
            catalog,
            queue: Vec::new(),
            phase: WorkoutPhase::Setup,
            index: 0,
            start_t: 0.0,
            started_at: None,
            summary: None,
        }
    }

    pub fn phase(&self) -> WorkoutPhase {
        self.phase
    }

    pub fn queue(&self) -> &[QueueEntry] {
        &self.queue
    }

    /// 実施中の種目（ACTIVE 以外は None）
    pub fn current(&self) -> Option<&QueueEntry> {
        if self.phase != WorkoutPhase::Active {
            return None;
        }
        self.queue.get(self.index)
    }

    pub fn current_index(&self) -> usize {
        self.index
    }

    pub fn summary(&self) -> Option<&WorkoutSummary> {
        self.summary.as_ref()
    }

    fn ensure_setup(&self) -> Result<(), WorkoutError> {
        match self.phase {
            WorkoutPhase::Setup => Ok(()),
            phase => Err(WorkoutError::WrongPhase(phase)),
        }
    }

    fn ensure_index(&self, index: usize) -> Result<(), WorkoutError> {
        if index < self.queue.len() {
            Ok(())
        } else {
            Err(WorkoutError::IndexOutOfRange(index))
        }
    }

    pub fn add(&mut self, exercise: &str, target_reps: u32) -> Result<(), WorkoutError> {
        self.ensure_setup()?;
        if !(MIN_TARGET_REPS..=MAX_TARGET_REPS).contains(&target_reps) {
            return Err(WorkoutError::InvalidReps(target_reps));
        }
        if !self.catalog.contains(exercise) {
            return Err(WorkoutError::UnknownExercise(exercise.to_string()));
        }
        self.queue.push(QueueEntry::new(exercise, target_reps));
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<QueueEntry, WorkoutError> {
        self.ensure_setup()?;
        self.ensure_index(index)?;
        Ok(self.queue.remove(index))
    }

    pub fn move_up(&mut self, index: usize) -> Result<(), WorkoutError> {
        self.ensure_setup()?;
        self.ensure_index(index)?;
        if index == 0 {
            return Err(WorkoutError::IndexOutOfRange(index));
        }
        self.queue.swap(index, index - 1);
        Ok(())
    }

    pub fn move_down(&mut self, index: usize) -> Result<(), WorkoutError> {
        self.ensure_setup()?;
        self.ensure_index(index + 1)?;
        self.queue.swap(index, index + 1);
        Ok(())
    }

    pub fn clear(&mut self) -> Result<(), WorkoutError> {
        self.ensure_setup()?;
        self.queue.clear();
        Ok(())
    }

    /// 進捗をゼロにして先頭の種目を開始
    pub fn start(&mut self, t: f64, engine: &mut ExerciseEngine) -> Result<(), WorkoutError> {
        self.ensure_setup()?;
        let Some(first) = self.queue.first() else {
            return Err(WorkoutError::EmptyQueue);
        };
        engine.switch(&first.exercise);

        self.queue.iter_mut().for_each(QueueEntry::clear_progress);
        self.index = 0;
        self.start_t = t;
        self.started_at = Some(Utc::now());
        self.summary = None;
        self.phase = WorkoutPhase::Active;
        tracing::info!(exercises = self.queue.len(), "workout started");
        Ok(())
    }

    /// エンジンの回数を現在の種目へ反映し、完了していれば次へ進む
    ///
    /// ACTIVE 以外では何もしない。
    pub fn track(&mut self, t: f64, engine: &mut ExerciseEngine) -> Option<WorkoutEvent> {
        if self.phase != WorkoutPhase::Active {
            return None;
        }
        let entry = self.queue.get_mut(self.index)?;
        (entry.completed_left, entry.completed_right) = engine.reps();

        let track_both_sides = self
            .catalog
            .get(&entry.exercise)
            .map_or(true, |d| d.track_both_sides);
        if !entry.is_complete(track_both_sides) {
            return None;
        }
        tracing::info!(
            exercise = %entry.exercise,
            left = entry.completed_left,
            right = entry.completed_right,
            "workout entry complete"
        );

        self.index += 1;
        match self.queue.get(self.index) {
            Some(next) => {
                let exercise = next.exercise.clone();
                engine.switch(&exercise);
                Some(WorkoutEvent::Advanced {
                    index: self.index,
                    exercise,
                })
            }
            None => {
                engine.reset();
                let summary = self.finish(t);
                Some(WorkoutEvent::Completed(summary))
            }
        }
    }

    fn track_both_sides(&self, exercise: &str) -> bool {
        self.catalog
            .get(exercise)
            .map_or(true, |d| d.track_both_sides)
    }

    fn finish(&mut self, t: f64) -> WorkoutSummary {
        let finished_at = Utc::now();
        let duration_seconds = (t - self.start_t).max(0.0).round() as u64;

        let mut total_reps = 0;
        let mut total_side_reps = 0;
        for entry in &self.queue {
            let both = self.track_both_sides(&entry.exercise);
            total_reps += entry.completed_reps(both);
            total_side_reps += entry.side_reps(both);
        }

        let summary = WorkoutSummary {
            exercise_names: self
                .queue
                .iter()
                .map(|e| self.catalog.display_name(&e.exercise).to_string())
                .collect(),
            total_exercises: self.queue.len(),
            total_reps,
            total_side_reps,
            target_reps: self.queue.iter().map(|e| e.target_reps).sum(),
            duration_seconds,
            duration: format_duration(duration_seconds),
            started_at: self.started_at.unwrap_or(finished_at),
            finished_at,
            entries: self.queue.clone(),
        };
        self.phase = WorkoutPhase::Complete;
        self.summary = Some(summary.clone());
        tracing::info!(
            total_exercises = summary.total_exercises,
            total_reps = summary.total_reps,
            duration = %summary.duration,
            "workout complete"
        );
        summary
    }

    /// どの段階からでも SETUP に戻す（集計は出さない）
    pub fn reset(&mut self, engine: &mut ExerciseEngine) {
        if self.phase != WorkoutPhase::Setup {
            tracing::info!(phase = ?self.phase, "workout reset");
        }
        self.queue.iter_mut().for_each(QueueEntry::clear_progress);
        self.index = 0;
        self.start_t = 0.0;
        self.started_at = None;
        self.summary = None;
        self.phase = WorkoutPhase::Setup;
        engine.reset();
    }
}

/// ワークアウト履歴の保存先
pub trait WorkoutStore: Send {
    fn save(&mut self, summary: &WorkoutSummary) -> Result<()>;
}

/// 履歴の保存を別スレッドで行う。フレーム処理は保存の完了を待たない
pub struct ThreadedHistory {
    tx: Option<Sender<WorkoutSummary>>,
    failed: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadedHistory {
    pub fn start(mut store: Box<dyn WorkoutStore>) -> Self {
        let (tx, rx) = mpsc::channel::<WorkoutSummary>();
        let failed = Arc::new(AtomicBool::new(false));
        let failed_ref = failed.clone();

        let handle = thread::spawn(move || {
            for summary in rx {
                match store.save(&summary) {
                    Ok(()) => failed_ref.store(false, Ordering::Release),
                    Err(e) => {
                        failed_ref.store(true, Ordering::Release);
                        tracing::warn!(error = %format!("{e:#}"), "failed to save workout history");
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            failed,
            handle: Some(handle),
        }
    }

    /// 保存を依頼してすぐ戻る
    pub fn submit(&mut self, summary: WorkoutSummary) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(summary).is_err() {
            self.failed.store(true, Ordering::Release);
            tracing::warn!("history writer is not running");
        }
    }

    /// 直近の保存が失敗したか
    pub fn save_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// 依頼済みの保存を終えるまで待って停止する
    pub fn shutdown(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("history writer thread panicked");
            }
        }
    }
}

impl Drop for ThreadedHistory {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// JSON Lines 形式の追記ファイル
#[derive(Debug, Clone)]
pub struct JsonlHistory {
    path: PathBuf,
}

impl JsonlHistory {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 古い順。ファイルが無ければ空
    pub fn load_all(&self) -> Result<Vec<WorkoutSummary>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read history {}", self.path.display()))?;
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("bad history record at line {}", i + 1))
            })
            .collect()
    }
}

impl JsonlHistory {
    /// 古い順で `index` 番目の記録を消してファイルを書き直す
    pub fn delete(&mut self, index: usize) -> Result<WorkoutSummary> {
        let mut records = self.load_all()?;
        if index >= records.len() {
            anyhow::bail!("history record {index} out of range ({} records)", records.len());
        }
        let removed = records.remove(index);

        let mut content = String::new();
        for record in &records {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }
        fs::write(&self.path, content)
            .with_context(|| format!("failed to rewrite history {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), index, "workout history record deleted");
        Ok(removed)
    }
}

impl WorkoutStore for JsonlHistory {
    fn save(&mut self, summary: &WorkoutSummary) -> Result<()> {
        let line = serde_json::to_string(summary)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open history {}", self.path.display()))?;
        writeln!(file, "{line}")?;
        tracing::info!(path = %self.path.display(), "workout history saved");
        Ok(())
    }
}
