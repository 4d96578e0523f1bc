use serde::Serialize;
use std::collections::VecDeque;

use crate::config::FallConfig;
use crate::geometry::{midpoint, torso_tilt_deg, Point};
use crate::pose::{Frame, JointAngles, Landmark, StreamSpace};
use crate::roi::Roi;
use crate::smooth::Ema;

use super::help::{HelpState, HelpTransition};
use super::waving::WavingDetector;

/// 1フレームの最終分類（優先度: HELP > EMERGENCY > SAFE_SLEEPING > SAFE）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FallState {
    Safe,
    SafeSleeping,
    Help,
    Emergency,
}

impl FallState {
    /// 外部通知の対象となる状態か
    pub fn is_alarm(self) -> bool {
        matches!(self, Self::Help | Self::Emergency)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FallReport {
    pub state: FallState,
    /// 重み付き転倒信頼度 (0.0〜1.0)
    pub confidence: f32,
    /// UNSAFEに入ってからの経過秒（SAFE中は0）
    pub unsafe_duration_s: f64,
    pub waving_active: bool,
    pub help_active: bool,
    pub sleeping: bool,
    pub horizontal: bool,
    pub on_ground: bool,
    pub sudden: bool,
    pub inactive: bool,
    pub torso_tilt_deg: f32,
    /// 平滑化した体幹中心速度 (px/s)
    pub speed: f32,
    pub angles: JointAngles,
    /// このフレームで状態が変わった場合の新状態
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entered: Option<FallState>,
}

/// 転倒・救助要請の判定ステートマシン
///
/// 体幹中心の速度（EMA）、体幹傾き、腰の高さ、急な動きとその後の静止、
/// 手振りを組み合わせて毎フレーム分類する。
pub struct FallDetector {
    config: FallConfig,
    frame_height: f32,
    centers: VecDeque<(f64, Point)>,
    speed: Ema,
    last_sudden_t: Option<f64>,
    unsafe_since: Option<f64>,
    waving: WavingDetector,
    help: HelpState,
    state: FallState,
}

impl FallDetector {
    pub fn new(config: FallConfig, space: &StreamSpace) -> Self {
        Self {
            frame_height: space.height,
            centers: VecDeque::with_capacity(config.center_history_len),
            speed: Ema::new(config.speed_alpha),
            last_sudden_t: None,
            unsafe_since: None,
            waving: WavingDetector::new(config.waving.clone()),
            help: HelpState::new(config.help.clone()),
            state: FallState::Safe,
            config,
        }
    }

    pub fn state(&self) -> FallState {
        self.state
    }

    pub fn process(&mut self, t: f64, frame: &Frame, roi: Option<&Roi>) -> FallReport {
        let shoulder_mid = midpoint(
            frame.point(Landmark::LeftShoulder),
            frame.point(Landmark::RightShoulder),
        );
        let hip_mid = midpoint(frame.point(Landmark::LeftHip), frame.point(Landmark::RightHip));
        let torso_mid = match (shoulder_mid, hip_mid) {
            (Some(_), Some(_)) => midpoint(shoulder_mid, hip_mid),
            _ => hip_mid.or(shoulder_mid),
        };

        let raw_speed = torso_mid.map_or(0.0, |c| self.track_center(t, c));
        let speed = self.speed.apply(raw_speed);

        let tilt = torso_tilt_deg(shoulder_mid, hip_mid);
        let horizontal = tilt >= self.config.horizontal_angle_deg;
        let on_ground =
            hip_mid.is_some_and(|h| h.y >= self.frame_height * self.config.ground_y_ratio);

        let sudden = speed >= self.config.sudden_speed_thresh;
        if sudden {
            self.last_sudden_t = Some(t);
        }
        let inactive = self
            .last_sudden_t
            .is_some_and(|ts| t - ts <= self.config.inactivity_window_s)
            && speed <= self.config.inactivity_speed_thresh;

        let waving = self.waving.update(t, frame);
        match self.help.update(t, waving) {
            HelpTransition::Activated => {
                tracing::info!(t, "help requested by waving gesture");
            }
            HelpTransition::Cleared => {
                self.waving.reset_swings();
                tracing::info!(t, "help cleared");
            }
            HelpTransition::None => {}
        }

        let w = &self.config.weights;
        let mut confidence = [
            (horizontal, w.horizontal),
            (on_ground, w.ground),
            (sudden, w.sudden),
            (inactive, w.inactive),
        ]
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, weight)| weight)
        .sum::<f32>()
        .clamp(0.0, 1.0);

        let sleeping = horizontal
            && torso_mid
                .zip(roi)
                .is_some_and(|(c, roi)| roi.contains(c));
        if sleeping {
            confidence = self.config.sleeping_confidence;
        }

        let safe = confidence < self.config.conf_threshold || sleeping;
        if safe {
            self.unsafe_since = None;
        } else if self.unsafe_since.is_none() {
            self.unsafe_since = Some(t);
        }
        let unsafe_duration_s = self.unsafe_since.map_or(0.0, |since| t - since);

        let state = if self.help.is_active() {
            FallState::Help
        } else if !safe {
            FallState::Emergency
        } else if sleeping {
            FallState::SafeSleeping
        } else {
            FallState::Safe
        };

        let entered = (state != self.state).then_some(state);
        if let Some(next) = entered {
            tracing::info!(
                t,
                from = ?self.state,
                to = ?next,
                confidence,
                "fall state changed"
            );
            self.state = next;
        }

        FallReport {
            state,
            confidence,
            unsafe_duration_s,
            waving_active: self.help.is_waving(),
            help_active: self.help.is_active(),
            sleeping,
            horizontal,
            on_ground,
            sudden,
            inactive,
            torso_tilt_deg: tilt,
            speed,
            angles: JointAngles::from_frame(frame),
            entered,
        }
    }

    /// 中心履歴に追加し、直前サンプルからの瞬間速度を返す
    fn track_center(&mut self, t: f64, center: Point) -> f32 {
        let speed = match self.centers.back() {
            Some(&(last_t, last)) => {
                let dt = (t - last_t).max(1e-3) as f32;
                (center.x - last.x).hypot(center.y - last.y) / dt
            }
            None => 0.0,
        };
        self.centers.push_back((t, center));
        while self.centers.len() > self.config.center_history_len {
            self.centers.pop_front();
        }
        speed
    }

    pub fn reset(&mut self) {
        self.centers.clear();
        self.speed.reset();
        self.last_sudden_t = None;
        self.unsafe_since = None;
        self.waving.clear();
        self.help.reset();
        self.state = FallState::Safe;
    }
}
