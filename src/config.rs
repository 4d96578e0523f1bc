use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::exercise::ExerciseDefinition;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub fall: FallConfig,
    #[serde(default)]
    pub rehab: RehabConfig,
    #[serde(default)]
    pub roi: RoiConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    /// 組み込み種目の上書き・追加（キーは種目ID）
    #[serde(default)]
    pub exercises: BTreeMap<String, ExerciseDefinition>,
}

/// 推定ストリームの解像度（幾何判定の座標空間）
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_width")]
    pub width: u32,
    #[serde(default = "default_stream_height")]
    pub height: u32,
}

fn default_stream_width() -> u32 { 640 }
fn default_stream_height() -> u32 { 360 }

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            width: default_stream_width(),
            height: default_stream_height(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoseConfig {
    /// キャリブレーション判定の可視度閾値
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
}

fn default_visibility_threshold() -> f32 { 0.5 }

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FallConfig {
    /// この信頼度以上で UNSAFE
    #[serde(default = "default_conf_threshold")]
    pub conf_threshold: f32,
    /// 体幹傾きがこの角度以上で水平とみなす（度）
    #[serde(default = "default_horizontal_angle_deg")]
    pub horizontal_angle_deg: f32,
    /// 腰中点のyがフレーム高さのこの比率以上で床上とみなす
    #[serde(default = "default_ground_y_ratio")]
    pub ground_y_ratio: f32,
    /// 急激な動きの速度閾値 (px/s)
    #[serde(default = "default_sudden_speed_thresh")]
    pub sudden_speed_thresh: f32,
    /// 急激な動きの後、静止を判定する時間窓（秒）
    #[serde(default = "default_inactivity_window_s")]
    pub inactivity_window_s: f64,
    /// 静止とみなす速度閾値 (px/s)
    #[serde(default = "default_inactivity_speed_thresh")]
    pub inactivity_speed_thresh: f32,
    /// ROI内で横になっているときに強制する信頼度
    #[serde(default = "default_sleeping_confidence")]
    pub sleeping_confidence: f32,
    /// 速度EMAのα
    #[serde(default = "default_speed_alpha")]
    pub speed_alpha: f32,
    /// 重心履歴の最大サンプル数
    #[serde(default = "default_center_history_len")]
    pub center_history_len: usize,
    #[serde(default)]
    pub weights: FallWeights,
    #[serde(default)]
    pub waving: WavingConfig,
    #[serde(default)]
    pub help: HelpConfig,
}

fn default_conf_threshold() -> f32 { 0.45 }
fn default_horizontal_angle_deg() -> f32 { 55.0 }
fn default_ground_y_ratio() -> f32 { 0.8 }
fn default_sudden_speed_thresh() -> f32 { 280.0 }
fn default_inactivity_window_s() -> f64 { 2.5 }
fn default_inactivity_speed_thresh() -> f32 { 18.0 }
fn default_sleeping_confidence() -> f32 { 0.0 }
fn default_speed_alpha() -> f32 { 0.3 }
fn default_center_history_len() -> usize { 90 }

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            conf_threshold: default_conf_threshold(),
            horizontal_angle_deg: default_horizontal_angle_deg(),
            ground_y_ratio: default_ground_y_ratio(),
            sudden_speed_thresh: default_sudden_speed_thresh(),
            inactivity_window_s: default_inactivity_window_s(),
            inactivity_speed_thresh: default_inactivity_speed_thresh(),
            sleeping_confidence: default_sleeping_confidence(),
            speed_alpha: default_speed_alpha(),
            center_history_len: default_center_history_len(),
            weights: FallWeights::default(),
            waving: WavingConfig::default(),
            help: HelpConfig::default(),
        }
    }
}

/// 転倒信頼度の重み（合計1.0）
#[derive(Debug, Clone, Deserialize)]
pub struct FallWeights {
    #[serde(default = "default_weight_horizontal")]
    pub horizontal: f32,
    #[serde(default = "default_weight_ground")]
    pub ground: f32,
    #[serde(default = "default_weight_sudden")]
    pub sudden: f32,
    #[serde(default = "default_weight_inactive")]
    pub inactive: f32,
}

fn default_weight_horizontal() -> f32 { 0.35 }
fn default_weight_ground() -> f32 { 0.25 }
fn default_weight_sudden() -> f32 { 0.25 }
fn default_weight_inactive() -> f32 { 0.15 }

impl Default for FallWeights {
    fn default() -> Self {
        Self {
            horizontal: default_weight_horizontal(),
            ground: default_weight_ground(),
            sudden: default_weight_sudden(),
            inactive: default_weight_inactive(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WavingConfig {
    /// 手振りと判定する最小スイング回数
    #[serde(default = "default_min_swings")]
    pub min_swings: u32,
    /// スイング判定の水平移動量（肩幅に対する比率）
    #[serde(default = "default_swing_threshold")]
    pub swing_threshold: f32,
    /// 手首履歴の時間窓（秒）
    #[serde(default = "default_time_window_s")]
    pub time_window_s: f64,
    /// 手首が肩より上とみなす高さ（体幹長に対する比率）
    #[serde(default = "default_hand_raised_min_y")]
    pub hand_raised_min_y: f32,
    /// 手首履歴の最大サンプル数
    #[serde(default = "default_wrist_history_len")]
    pub max_samples: usize,
}

fn default_min_swings() -> u32 { 2 }
fn default_swing_threshold() -> f32 { 0.15 }
fn default_time_window_s() -> f64 { 2.0 }
fn default_hand_raised_min_y() -> f32 { 0.1 }
fn default_wrist_history_len() -> usize { 120 }

impl Default for WavingConfig {
    fn default() -> Self {
        Self {
            min_swings: default_min_swings(),
            swing_threshold: default_swing_threshold(),
            time_window_s: default_time_window_s(),
            hand_raised_min_y: default_hand_raised_min_y(),
            max_samples: default_wrist_history_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelpConfig {
    /// HELPに入るまで手振りが継続する時間（秒）
    #[serde(default = "default_sustain_s")]
    pub sustain_s: f64,
    /// 最後のトリガーからHELPを保持する最短時間（秒）
    #[serde(default = "default_hold_s")]
    pub hold_s: f64,
    /// 手振りが止んでからHELPを解除するまでの静止時間（秒）
    #[serde(default = "default_clear_after_quiet_s")]
    pub clear_after_quiet_s: f64,
}

fn default_sustain_s() -> f64 { 1.5 }
fn default_hold_s() -> f64 { 6.0 }
fn default_clear_after_quiet_s() -> f64 { 2.0 }

impl Default for HelpConfig {
    fn default() -> Self {
        Self {
            sustain_s: default_sustain_s(),
            hold_s: default_hold_s(),
            clear_after_quiet_s: default_clear_after_quiet_s(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RehabConfig {
    /// 関節角度EMAのα（種目側の指定が優先）
    #[serde(default = "default_angle_alpha")]
    pub angle_alpha: f32,
    /// 精度0%となる平均誤差（度）
    #[serde(default = "default_max_acceptable_error")]
    pub max_acceptable_error: f32,
    /// 「良好」判定の精度（%）
    #[serde(default = "default_good_threshold")]
    pub good_threshold: f32,
    /// 「注意」判定の精度（%）
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: f32,
    /// フォーム誤差のスライディングウィンドウ長
    #[serde(default = "default_error_window")]
    pub error_window: usize,
}

fn default_angle_alpha() -> f32 { 0.35 }
fn default_max_acceptable_error() -> f32 { 30.0 }
fn default_good_threshold() -> f32 { 85.0 }
fn default_warning_threshold() -> f32 { 60.0 }
fn default_error_window() -> usize { 100 }

impl Default for RehabConfig {
    fn default() -> Self {
        Self {
            angle_alpha: default_angle_alpha(),
            max_acceptable_error: default_max_acceptable_error(),
            good_threshold: default_good_threshold(),
            warning_threshold: default_warning_threshold(),
            error_window: default_error_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoiConfig {
    /// ROIの保存先
    #[serde(default = "default_roi_path")]
    pub path: String,
    /// 編集時のコーナーヒット判定距離（表示ピクセル）
    #[serde(default = "default_corner_hit_distance")]
    pub corner_hit_distance: f32,
}

fn default_roi_path() -> String { "bed_roi.json".to_string() }
fn default_corner_hit_distance() -> f32 { 10.0 }

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            path: default_roi_path(),
            corner_hit_distance: default_corner_hit_distance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    /// チャネルごとの再通知抑制時間（秒）
    #[serde(default = "default_cooldown_s")]
    pub cooldown_s: f64,
    #[serde(default = "default_true")]
    pub help_enabled: bool,
    #[serde(default = "default_true")]
    pub fall_enabled: bool,
    /// アラートをJSON Linesで追記するファイル（未指定ならログのみ）
    #[serde(default)]
    pub alert_log: Option<String>,
}

fn default_cooldown_s() -> f64 { 60.0 }
fn default_true() -> bool { true }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            cooldown_s: default_cooldown_s(),
            help_enabled: true,
            fall_enabled: true,
            alert_log: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    /// ワークアウト履歴（JSON Lines）の保存先
    #[serde(default = "default_history_path")]
    pub path: String,
}

fn default_history_path() -> String { "rehab_history.jsonl".to_string() }

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: default_history_path(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    /// 読み込めなければデフォルト値を使う
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "config not found, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config load failed, using defaults");
                Self::default()
            }
        }
    }
}
