//! 1人・1カメラ分のセッション
//!
//! 転倒検出・リハビリ計測・ワークアウト・ROI・通知の状態をすべて所有し、
//! `process_frame` だけが状態を更新する（単一書き込み）。

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::exercise::{ExerciseCatalog, ExerciseEngine, ExerciseMetrics};
use crate::fall::{FallDetector, FallReport, FallState};
use crate::notify::{AlertKind, Notifier};
use crate::pose::{Frame, StreamSpace};
use crate::roi::{Roi, RoiEditor, RoiStore};
use crate::workout::{
    JsonlHistory, QueueEntry, ThreadedHistory, WorkoutError, WorkoutEvent, WorkoutPhase,
    WorkoutSequencer, WorkoutStore, WorkoutSummary,
};

pub const DEFAULT_EXERCISE: &str = "bicep_curls";

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutStatus {
    pub phase: WorkoutPhase,
    pub index: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<QueueEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advanced_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<WorkoutSummary>,
}

/// 1フレームの処理結果
#[derive(Debug, Clone, Serialize)]
pub struct FrameReport {
    pub t: f64,
    /// 主要ランドマークがすべて十分な可視度で写っているか（参考値）
    pub pose_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fall: Option<FallReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<AlertKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exercise: Option<ExerciseMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workout: Option<WorkoutStatus>,
    pub delivery_failed: bool,
    pub history_failed: bool,
}

pub struct Session {
    config: Config,
    space: StreamSpace,
    catalog: Arc<ExerciseCatalog>,
    fall: FallDetector,
    engine: ExerciseEngine,
    workout: WorkoutSequencer,
    roi: Option<Roi>,
    roi_store: RoiStore,
    notifier: Notifier,
    history: ThreadedHistory,
    fall_enabled: bool,
    rehab_enabled: bool,
}

impl Session {
    /// 設定どおりの通知先・履歴ファイルで開始
    pub fn new(config: Config) -> Self {
        let notifier = Notifier::from_config(&config.notify);
        let history = Box::new(JsonlHistory::new(&config.history.path));
        Self::with_parts(config, notifier, history)
    }

    pub fn with_parts(config: Config, notifier: Notifier, history: Box<dyn WorkoutStore>) -> Self {
        let space = StreamSpace::from_config(&config.stream);
        let catalog = Arc::new(ExerciseCatalog::builtin().with_overrides(&config.exercises));
        let roi_store = RoiStore::new(&config.roi.path);
        let roi = roi_store.load();
        tracing::info!(
            width = config.stream.width,
            height = config.stream.height,
            exercises = catalog.len(),
            roi = roi.is_some(),
            "session started"
        );

        Self {
            space,
            fall: FallDetector::new(config.fall.clone(), &space),
            engine: ExerciseEngine::new(Arc::clone(&catalog), &config.rehab, DEFAULT_EXERCISE),
            workout: WorkoutSequencer::new(Arc::clone(&catalog)),
            catalog,
            roi,
            roi_store,
            notifier,
            history: ThreadedHistory::start(history),
            fall_enabled: true,
            rehab_enabled: true,
            config,
        }
    }

    pub fn process_frame(&mut self, t: f64, frame: &Frame) -> FrameReport {
        let pose_ready = frame.all_visible(self.config.pose.visibility_threshold);

        let mut alert = None;
        let fall = self.fall_enabled.then(|| {
            let report = self.fall.process(t, frame, self.roi.as_ref());
            if let Some(entered) = report.entered {
                alert = self.notifier.on_transition(t, entered, report.confidence);
            }
            report
        });

        let (exercise, workout) = if self.rehab_enabled {
            let metrics = self.engine.process(frame);
            let event = self.workout.track(t, &mut self.engine);
            (Some(metrics), self.workout_status(event))
        } else {
            (None, None)
        };

        FrameReport {
            t,
            pose_ready,
            fall,
            alert,
            exercise,
            workout,
            delivery_failed: self.notifier.delivery_failed(),
            history_failed: self.history.save_failed(),
        }
    }

    fn workout_status(&mut self, event: Option<WorkoutEvent>) -> Option<WorkoutStatus> {
        let mut advanced_to = None;
        let mut completed = None;
        match event {
            Some(WorkoutEvent::Advanced { exercise, .. }) => advanced_to = Some(exercise),
            Some(WorkoutEvent::Completed(summary)) => {
                self.history.submit(summary.clone());
                completed = Some(summary);
            }
            None => {}
        }
        if self.workout.phase() == WorkoutPhase::Setup {
            return None;
        }
        Some(WorkoutStatus {
            phase: self.workout.phase(),
            index: self.workout.current_index(),
            total: self.workout.queue().len(),
            current: self.workout.current().cloned(),
            advanced_to,
            completed,
        })
    }

    pub fn space(&self) -> &StreamSpace {
        &self.space
    }

    pub fn catalog(&self) -> &ExerciseCatalog {
        &self.catalog
    }

    pub fn fall_state(&self) -> FallState {
        self.fall.state()
    }

    pub fn set_fall_enabled(&mut self, enabled: bool) {
        self.fall_enabled = enabled;
        tracing::info!(enabled, "fall detection toggled");
    }

    pub fn set_rehab_enabled(&mut self, enabled: bool) {
        self.rehab_enabled = enabled;
        tracing::info!(enabled, "rehab tracking toggled");
    }

    /// 転倒検出の状態と通知クールダウンを初期化
    pub fn reset_fall(&mut self) {
        self.fall.reset();
        self.notifier.reset();
    }

    // ---- リハビリ ----

    /// 単独種目を選ぶ。ワークアウト実施中は選べない
    pub fn select_exercise(&mut self, key: &str) -> Result<bool, WorkoutError> {
        if self.workout.phase() == WorkoutPhase::Active {
            return Err(WorkoutError::WrongPhase(WorkoutPhase::Active));
        }
        Ok(self.engine.switch(key))
    }

    pub fn reset_exercise(&mut self) {
        self.engine.reset();
    }

    pub fn exercise_metrics(&self) -> ExerciseMetrics {
        self.engine.metrics()
    }

    // ---- ワークアウト ----

    pub fn workout(&self) -> &WorkoutSequencer {
        &self.workout
    }

    pub fn add_to_workout(&mut self, exercise: &str, target_reps: u32) -> Result<(), WorkoutError> {
        self.workout.add(exercise, target_reps)
    }

    pub fn remove_from_workout(&mut self, index: usize) -> Result<QueueEntry, WorkoutError> {
        self.workout.remove(index)
    }

    pub fn move_workout_entry_up(&mut self, index: usize) -> Result<(), WorkoutError> {
        self.workout.move_up(index)
    }

    pub fn move_workout_entry_down(&mut self, index: usize) -> Result<(), WorkoutError> {
        self.workout.move_down(index)
    }

    pub fn clear_workout(&mut self) -> Result<(), WorkoutError> {
        self.workout.clear()
    }

    pub fn start_workout(&mut self, t: f64) -> Result<(), WorkoutError> {
        self.workout.start(t, &mut self.engine)
    }

    pub fn reset_workout(&mut self) {
        self.workout.reset(&mut self.engine);
    }

    // ---- ROI ----

    pub fn roi(&self) -> Option<&Roi> {
        self.roi.as_ref()
    }

    /// 現在のROIを表示座標に展開した編集ドラフト
    pub fn roi_editor(&self, display_w: f32, display_h: f32) -> RoiEditor {
        RoiEditor::edit(
            self.config.roi.corner_hit_distance,
            self.roi.as_ref(),
            &self.space,
            display_w,
            display_h,
        )
    }

    /// ドラフトを確定して保存
    pub fn commit_roi(&mut self, editor: &RoiEditor, display_w: f32, display_h: f32) -> Result<()> {
        let roi = editor.commit(&self.space, display_w, display_h)?;
        self.set_roi(roi)
    }

    /// メモリ上のROIは保存の成否に関わらず更新する
    pub fn set_roi(&mut self, roi: Roi) -> Result<()> {
        self.roi = Some(roi);
        self.roi_store.save(&roi)
    }

    pub fn delete_roi(&mut self) -> Result<()> {
        self.roi = None;
        self.roi_store.delete()
    }

    pub fn delivery_failed(&self) -> bool {
        self.notifier.delivery_failed()
    }

    /// 保存の失敗はフラグに残すだけで、ワークアウトの状態は戻さない
    pub fn history_failed(&self) -> bool {
        self.history.save_failed()
    }

    /// セッション終了。配信待ちのアラートと履歴を書き切ってから状態を破棄する
    pub fn stop(self) {
        tracing::info!(fall_state = ?self.fall.state(), "session stopped");
    }
}
