use serde::Serialize;
use std::collections::VecDeque;

use crate::config::RehabConfig;

use super::definition::ExerciseDefinition;
use super::engine::Stage;

/// フォーム評価の段階
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormGrade {
    Good,
    Fair,
    Poor,
}

impl FormGrade {
    pub fn from_accuracy(accuracy: f32, good: f32, warning: f32) -> Self {
        if accuracy >= good {
            Self::Good
        } else if accuracy >= warning {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

/// 現在のステージの理想角度との差（度）
///
/// ステージ未確定、または理想角度を持たないステージでは None。
pub fn form_error(angle: f32, stage: Option<Stage>, def: &ExerciseDefinition) -> Option<f32> {
    let ideal = match stage? {
        Stage::Down => def.ideal_down_angle,
        Stage::Up => def.ideal_up_angle,
        Stage::Sitting | Stage::Standing => return None,
    };
    Some((angle - ideal).abs())
}

/// 直近Nフレームの平均誤差から精度 (0〜100%) を出す
#[derive(Debug, Clone)]
pub struct FormScorer {
    window: VecDeque<f32>,
    capacity: usize,
    max_acceptable_error: f32,
    good_threshold: f32,
    warning_threshold: f32,
}

impl FormScorer {
    pub fn new(config: &RehabConfig) -> Self {
        let capacity = config.error_window.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            max_acceptable_error: config.max_acceptable_error.max(f32::EPSILON),
            good_threshold: config.good_threshold,
            warning_threshold: config.warning_threshold,
        }
    }

    /// 1フレーム分の誤差（追跡中の各側）を平均して窓に追加
    pub fn push(&mut self, errors: &[f32]) {
        if errors.is_empty() {
            return;
        }
        let avg = errors.iter().sum::<f32>() / errors.len() as f32;
        self.window.push_back(avg);
        while self.window.len() > self.capacity {
            self.window.pop_front();
        }
    }

    pub fn mean_error(&self) -> Option<f32> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f32>() / self.window.len() as f32)
    }

    pub fn accuracy(&self) -> Option<f32> {
        self.mean_error()
            .map(|m| (100.0 - m / self.max_acceptable_error * 100.0).clamp(0.0, 100.0))
    }

    pub fn grade(&self) -> Option<FormGrade> {
        self.accuracy()
            .map(|a| FormGrade::from_accuracy(a, self.good_threshold, self.warning_threshold))
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}
