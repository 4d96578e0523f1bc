use serde::Serialize;
use std::sync::Arc;

use crate::config::RehabConfig;
use crate::pose::Frame;
use crate::smooth::Ema;

use super::catalog::ExerciseCatalog;
use super::definition::{Counting, ExerciseDefinition};
use super::form::{form_error, FormGrade, FormScorer};

/// 1回の動作の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Down,
    Up,
    Sitting,
    Standing,
}

#[derive(Debug, Clone)]
struct SideState {
    raw: Option<f32>,
    smooth: Ema,
    stage: Option<Stage>,
    reps: u32,
}

impl SideState {
    fn new(alpha: f32) -> Self {
        Self {
            raw: None,
            smooth: Ema::new(alpha),
            stage: None,
            reps: 0,
        }
    }

    fn observe(&mut self, raw: f32) {
        self.raw = Some(raw);
        self.smooth.apply(raw);
    }

    /// down→up のヒステリシス遷移。回数が増えたら true
    ///
    /// 判定は平滑化前の角度で行う。
    fn step(&mut self, raw: f32, def: &ExerciseDefinition) -> bool {
        self.observe(raw);
        if def.down_compare.compare(raw, def.down_threshold) {
            self.stage = Some(Stage::Down);
        }
        if def.up_compare.compare(raw, def.up_threshold) && self.stage == Some(Stage::Down) {
            self.stage = Some(Stage::Up);
            self.reps += 1;
            return true;
        }
        false
    }

    fn metrics(&self, label: &str) -> SideMetrics {
        SideMetrics {
            label: label.to_string(),
            stage: self.stage,
            angle: self.smooth.value(),
            raw_angle: self.raw,
            reps: self.reps,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SideMetrics {
    pub label: String,
    pub stage: Option<Stage>,
    /// 平滑化後の角度
    pub angle: Option<f32>,
    pub raw_angle: Option<f32>,
    pub reps: u32,
}

/// 左右を区別しない種目の合算カウンタ
#[derive(Debug, Clone, Serialize)]
pub struct CombinedMetrics {
    pub stage: Option<Stage>,
    pub reps: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseMetrics {
    pub exercise: String,
    pub exercise_name: String,
    pub track_both_sides: bool,
    pub left: SideMetrics,
    pub right: SideMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub combined: Option<CombinedMetrics>,
    pub form_accuracy_pct: Option<f32>,
    pub mean_error_deg: Option<f32>,
    pub form_grade: Option<FormGrade>,
}

impl ExerciseMetrics {
    /// 未知の種目
    fn unknown(key: &str) -> Self {
        let empty = |label: &str| SideMetrics {
            label: label.to_string(),
            stage: None,
            angle: None,
            raw_angle: None,
            reps: 0,
        };
        Self {
            exercise: key.to_string(),
            exercise_name: "Unknown".to_string(),
            track_both_sides: true,
            left: empty("Left"),
            right: empty("Right"),
            combined: None,
            form_accuracy_pct: None,
            mean_error_deg: None,
            form_grade: None,
        }
    }

    /// 完了判定に使う回数（左右別なら少ない方、合算なら合算値）
    pub fn reps(&self) -> u32 {
        match &self.combined {
            Some(c) => c.reps,
            None => self.left.reps.min(self.right.reps),
        }
    }
}

/// 選択中の種目の回数カウントとフォーム評価
pub struct ExerciseEngine {
    catalog: Arc<ExerciseCatalog>,
    key: String,
    default_alpha: f32,
    left: SideState,
    right: SideState,
    form: FormScorer,
}

impl ExerciseEngine {
    pub fn new(catalog: Arc<ExerciseCatalog>, config: &RehabConfig, key: &str) -> Self {
        let mut engine = Self {
            catalog,
            key: key.to_string(),
            default_alpha: config.angle_alpha,
            left: SideState::new(config.angle_alpha),
            right: SideState::new(config.angle_alpha),
            form: FormScorer::new(config),
        };
        engine.reset();
        engine
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn definition(&self) -> Option<&ExerciseDefinition> {
        self.catalog.get(&self.key)
    }

    /// 種目を切り替えて状態をリセット
    ///
    /// 未知のキーも受け付け、以後のメトリクスは "Unknown" になる。
    pub fn switch(&mut self, key: &str) -> bool {
        self.key = key.to_string();
        self.reset();
        let known = self.catalog.contains(key);
        if known {
            tracing::info!(exercise = key, "exercise switched");
        } else {
            tracing::warn!(exercise = key, "unknown exercise selected");
        }
        known
    }

    /// 回数・ステージ・角度・誤差履歴をすべて消去
    pub fn reset(&mut self) {
        let alpha = self
            .definition()
            .and_then(|d| d.angle_alpha)
            .unwrap_or(self.default_alpha);
        self.left = SideState::new(alpha);
        self.right = SideState::new(alpha);
        self.form.reset();
    }

    /// (左, 右) の回数
    pub fn reps(&self) -> (u32, u32) {
        (self.left.reps, self.right.reps)
    }

    pub fn process(&mut self, frame: &Frame) -> ExerciseMetrics {
        let catalog = Arc::clone(&self.catalog);
        let Some(def) = catalog.get(&self.key) else {
            return ExerciseMetrics::unknown(&self.key);
        };

        match def.counting {
            Counting::PerSide => self.process_per_side(frame, def),
            Counting::SitToStand { hip_extended } => {
                self.process_sit_to_stand(frame, def, hip_extended)
            }
        }
        self.metrics_for(def)
    }

    fn process_per_side(&mut self, frame: &Frame, def: &ExerciseDefinition) {
        let mut errors = Vec::with_capacity(2);
        let sides = [
            ("left", &mut self.left, &def.joints.left, true),
            ("right", &mut self.right, &def.joints.right, def.track_both_sides),
        ];
        for (name, side, triple, scored) in sides {
            // 関節が欠けた側はこのフレームを飛ばす
            let Some(raw) = triple.angle(frame) else {
                continue;
            };
            if side.step(raw, def) {
                tracing::info!(exercise = %self.key, side = name, reps = side.reps, "rep counted");
            }
            if scored {
                errors.extend(form_error(raw, side.stage, def));
            }
        }
        self.form.push(&errors);
    }

    /// 膝（left）と股関節（right）の平滑化角度が両方そろったときだけ判定
    fn process_sit_to_stand(&mut self, frame: &Frame, def: &ExerciseDefinition, hip_extended: f32) {
        if let Some(knee) = def.joints.left.angle(frame) {
            self.left.observe(knee);
        }
        if let Some(hip) = def.joints.right.angle(frame) {
            self.right.observe(hip);
        }
        let (Some(knee), Some(hip)) = (self.left.smooth.value(), self.right.smooth.value()) else {
            return;
        };

        let flexed = knee < def.up_threshold && hip < def.up_threshold;
        let extended = knee >= def.down_threshold && hip >= hip_extended;
        if flexed {
            self.left.stage = Some(Stage::Sitting);
        }
        if extended && self.left.stage == Some(Stage::Sitting) {
            self.left.stage = Some(Stage::Standing);
            self.left.reps += 1;
            self.right.reps = self.left.reps;
            tracing::info!(exercise = %self.key, reps = self.left.reps, "rep counted");
        }
        self.right.stage = self.left.stage;
    }

    /// 現在の状態（フレーム処理なし）
    pub fn metrics(&self) -> ExerciseMetrics {
        match self.definition() {
            Some(def) => self.metrics_for(def),
            None => ExerciseMetrics::unknown(&self.key),
        }
    }

    fn metrics_for(&self, def: &ExerciseDefinition) -> ExerciseMetrics {
        let combined = (!def.track_both_sides).then(|| CombinedMetrics {
            stage: self.left.stage.or(self.right.stage),
            reps: self.left.reps.max(self.right.reps),
        });
        let scored = !def.is_sit_to_stand();
        ExerciseMetrics {
            exercise: self.key.clone(),
            exercise_name: def.name.clone(),
            track_both_sides: def.track_both_sides,
            left: self.left.metrics(&def.label_left),
            right: self.right.metrics(&def.label_right),
            combined,
            form_accuracy_pct: self.form.accuracy().filter(|_| scored),
            mean_error_deg: self.form.mean_error().filter(|_| scored),
            form_grade: self.form.grade().filter(|_| scored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Landmark;
    use crate::testutil::{elbows, sit_stand};

    fn engine(key: &str) -> ExerciseEngine {
        ExerciseEngine::new(
            Arc::new(ExerciseCatalog::builtin()),
            &RehabConfig::default(),
            key,
        )
    }

    #[test]
    fn test_elbow_fixture_angle() {
        let mut eng = engine("bicep_curls");
        let m = eng.process(&elbows(45.0));
        assert!((m.left.raw_angle.unwrap() - 45.0).abs() < 1e-3);
        assert!((m.right.raw_angle.unwrap() - 45.0).abs() < 1e-3);
    }

    #[test]
    fn test_curl_cycles_count_exactly() {
        let mut eng = engine("bicep_curls");
        // ヒステリシス幅より小さいノイズを含む
        let cycle = [170.0, 175.0, 150.0, 100.0, 25.0, 20.0, 28.0, 35.0, 22.0, 90.0];
        for _ in 0..5 {
            for &deg in &cycle {
                eng.process(&elbows(deg));
            }
        }
        assert_eq!(eng.reps(), (5, 5));
        let m = eng.metrics();
        assert_eq!(m.left.stage, Some(Stage::Up));
        assert_eq!(m.reps(), 5);
        assert!(m.combined.is_none());
    }

    #[test]
    fn test_up_without_down_counts_nothing() {
        let mut eng = engine("bicep_curls");
        for &deg in &[100.0, 25.0, 20.0, 100.0, 25.0, 150.0, 10.0] {
            eng.process(&elbows(deg));
        }
        assert_eq!(eng.reps(), (0, 0));
        assert_eq!(eng.metrics().left.stage, None);
        assert_eq!(eng.metrics().form_accuracy_pct, None);
    }

    #[test]
    fn test_missing_side_is_skipped() {
        let mut eng = engine("bicep_curls");
        for &deg in &[170.0, 20.0] {
            let mut frame = elbows(deg);
            frame.set(Landmark::RightWrist, None);
            eng.process(&frame);
        }
        assert_eq!(eng.reps(), (1, 0));
        assert_eq!(eng.metrics().right.angle, None);
    }

    #[test]
    fn test_form_accuracy_from_stage_errors() {
        let mut eng = engine("bicep_curls");
        // down(理想160) で 170 → 誤差10, up(理想30) で 20 → 誤差10
        eng.process(&elbows(170.0));
        let m = eng.process(&elbows(20.0));
        assert!((m.mean_error_deg.unwrap() - 10.0).abs() < 1e-2);
        let acc = m.form_accuracy_pct.unwrap();
        assert!((acc - 66.666).abs() < 0.1);
        assert_eq!(m.form_grade, Some(FormGrade::Fair));
    }

    #[test]
    fn test_smoothed_angle_uses_ema() {
        let mut eng = engine("bicep_curls");
        eng.process(&elbows(100.0));
        let m = eng.process(&elbows(160.0));
        // 0.35 * 160 + 0.65 * 100 = 121
        assert!((m.left.angle.unwrap() - 121.0).abs() < 1e-2);
    }

    #[test]
    fn test_exercise_alpha_overrides_default() {
        let mut raw = ExerciseCatalog::builtin().get("bicep_curls").unwrap().clone();
        raw.angle_alpha = Some(1.0);
        let overrides = std::collections::BTreeMap::from([("raw_curls".to_string(), raw)]);
        let catalog = Arc::new(ExerciseCatalog::builtin().with_overrides(&overrides));
        let mut eng = ExerciseEngine::new(catalog, &RehabConfig::default(), "raw_curls");

        eng.process(&elbows(100.0));
        let m = eng.process(&elbows(160.0));
        assert!((m.left.angle.unwrap() - 160.0).abs() < 1e-2);

        // 組み込み種目に戻すと [rehab] の α (0.35)
        eng.switch("bicep_curls");
        eng.process(&elbows(100.0));
        let m = eng.process(&elbows(160.0));
        assert!((m.left.angle.unwrap() - 121.0).abs() < 1e-2);
    }

    #[test]
    fn test_sit_to_stand_counts_and_mirrors() {
        let mut eng = engine("sit_to_stand");
        for _ in 0..3 {
            for _ in 0..10 {
                eng.process(&sit_stand(false));
            }
            for _ in 0..10 {
                eng.process(&sit_stand(true));
            }
        }
        let m = eng.metrics();
        assert_eq!(eng.reps(), (3, 3));
        assert_eq!(m.left.stage, Some(Stage::Standing));
        assert_eq!(m.right.stage, Some(Stage::Standing));
        let combined = m.combined.unwrap();
        assert_eq!(combined.reps, 3);
        assert_eq!(combined.stage, Some(Stage::Standing));
        assert_eq!(m.form_accuracy_pct, None);
        assert_eq!(m.left.label, "Knee Angle");
    }

    #[test]
    fn test_sit_to_stand_requires_sitting_first() {
        let mut eng = engine("sit_to_stand");
        for _ in 0..20 {
            eng.process(&sit_stand(true));
        }
        assert_eq!(eng.reps(), (0, 0));
    }

    #[test]
    fn test_unknown_exercise() {
        let mut eng = engine("jumping_jacks");
        let m = eng.process(&elbows(170.0));
        assert_eq!(m.exercise_name, "Unknown");
        assert_eq!(m.left.reps, 0);
        assert_eq!(m.form_accuracy_pct, None);
        assert!(!eng.switch("moonwalk"));
        assert!(eng.switch("front_raise"));
        assert_eq!(eng.metrics().exercise_name, "Front Raise");
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut eng = engine("bicep_curls");
        eng.process(&elbows(170.0));
        eng.process(&elbows(20.0));
        eng.reset();
        let once = serde_json::to_value(eng.metrics()).unwrap();
        eng.reset();
        let twice = serde_json::to_value(eng.metrics()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(eng.reps(), (0, 0));
        assert_eq!(eng.metrics().left.angle, None);
    }

    #[test]
    fn test_switch_resets_progress() {
        let mut eng = engine("bicep_curls");
        eng.process(&elbows(170.0));
        eng.process(&elbows(20.0));
        eng.switch("knee_extension");
        assert_eq!(eng.reps(), (0, 0));
        assert_eq!(eng.key(), "knee_extension");
    }
}
