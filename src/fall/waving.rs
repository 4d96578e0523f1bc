//! 手振り（助けを求めるジェスチャー）検出

use std::collections::VecDeque;

use crate::config::WavingConfig;
use crate::geometry::{distance, midpoint};
use crate::pose::{Frame, Landmark};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wrist {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SwingDir {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy)]
struct WristSample {
    t: f64,
    x: f32,
}

/// 上げた手首の水平位置を時間窓で追跡し、方向反転（スイング）を数える
///
/// 1フレームにつき最新の2サンプル間だけを評価する。スイングは発生時刻付きで
/// 保持し、時間窓から外れたものは数えない。
#[derive(Debug, Clone)]
pub struct WavingDetector {
    config: WavingConfig,
    history: VecDeque<WristSample>,
    swings: VecDeque<f64>,
    last_dir: Option<SwingDir>,
    active_wrist: Option<Wrist>,
}

impl WavingDetector {
    pub fn new(config: WavingConfig) -> Self {
        Self {
            history: VecDeque::with_capacity(config.max_samples),
            swings: VecDeque::new(),
            last_dir: None,
            active_wrist: None,
            config,
        }
    }

    /// このフレームで手振りが成立しているか
    ///
    /// 肩・手首・腰中点のいずれかが欠損したフレームは状態を変えずに false。
    /// 両手首が下がっていれば履歴を破棄する。
    pub fn update(&mut self, t: f64, frame: &Frame) -> bool {
        let ls = frame.point(Landmark::LeftShoulder);
        let rs = frame.point(Landmark::RightShoulder);
        let lw = frame.point(Landmark::LeftWrist);
        let rw = frame.point(Landmark::RightWrist);
        let shoulder_mid = midpoint(ls, rs);
        let hip_mid = midpoint(frame.point(Landmark::LeftHip), frame.point(Landmark::RightHip));

        let (Some(ls), Some(rs), Some(lw), Some(rw), Some(shoulder_mid), Some(hip_mid)) =
            (ls, rs, lw, rw, shoulder_mid, hip_mid)
        else {
            return false;
        };

        let shoulder_w = distance(ls, rs).max(1.0);
        let torso_h = distance(shoulder_mid, hip_mid).max(1.0);
        // y軸は下向き。肩より上 = yが小さい
        let min_hand_y = shoulder_mid.y - self.config.hand_raised_min_y * torso_h;

        let left_raised = lw.y < min_hand_y;
        let right_raised = rw.y < min_hand_y;
        if !left_raised && !right_raised {
            self.clear();
            return false;
        }

        let (wrist, pos) = if left_raised {
            (Wrist::Left, lw)
        } else {
            (Wrist::Right, rw)
        };
        if self.active_wrist != Some(wrist) {
            self.clear();
            self.active_wrist = Some(wrist);
        }

        let swing_px = shoulder_w * self.config.swing_threshold;
        if let Some(prev) = self.history.back() {
            let dx = pos.x - prev.x;
            if dx.abs() > swing_px {
                let dir = if dx > 0.0 { SwingDir::Right } else { SwingDir::Left };
                if self.last_dir.is_some_and(|d| d != dir) {
                    self.swings.push_back(t);
                }
                self.last_dir = Some(dir);
            }
        }

        self.history.push_back(WristSample { t, x: pos.x });
        self.evict(t);

        self.history.len() >= 3 && self.swing_count() >= self.config.min_swings
    }

    fn evict(&mut self, t: f64) {
        let cutoff = t - self.config.time_window_s;
        while self.history.front().is_some_and(|s| s.t < cutoff)
            || self.history.len() > self.config.max_samples
        {
            self.history.pop_front();
        }
        while self.swings.front().is_some_and(|&st| st < cutoff) {
            self.swings.pop_front();
        }
    }

    /// 時間窓内のスイング回数
    pub fn swing_count(&self) -> u32 {
        self.swings.len() as u32
    }

    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    /// HELP解除時にスイングだけをリセット
    pub fn reset_swings(&mut self) {
        self.swings.clear();
        self.last_dir = None;
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.reset_swings();
        self.active_wrist = None;
    }
}
