use crate::config::StreamConfig;
use crate::geometry::Point;

use super::keypoint::{Frame, Keypoint, Landmark};

/// ストリーム座標空間（推定に使う解像度）
///
/// 表示座標はウィンドウサイズで変わるため、幾何判定の前に
/// 必ずストリーム座標へ変換する。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSpace {
    pub width: f32,
    pub height: f32,
}

impl StreamSpace {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(config.width, config.height)
    }

    /// 表示座標 → ストリーム座標（整数丸め）
    pub fn from_display(&self, p: Point, display_w: f32, display_h: f32) -> Point {
        let sx = self.width / display_w.max(1.0);
        let sy = self.height / display_h.max(1.0);
        Point::new((p.x * sx).round(), (p.y * sy).round())
    }

    /// ストリーム座標 → 表示座標（整数丸め）
    pub fn to_display(&self, p: Point, display_w: f32, display_h: f32) -> Point {
        let sx = display_w / self.width.max(1.0);
        let sy = display_h / self.height.max(1.0);
        Point::new((p.x * sx).round(), (p.y * sy).round())
    }

    /// 正規化座標 (0.0〜1.0) の33点ランドマークからFrameを作る
    ///
    /// 33点未満の入力は空フレームとして扱う。座標はピクセルに丸める。
    pub fn frame_from_normalized(&self, landmarks: &[Keypoint]) -> Frame {
        if landmarks.len() < 33 {
            return Frame::new();
        }
        Landmark::ALL
            .iter()
            .map(|&l| {
                let kp = landmarks[l.model_index()];
                (
                    l,
                    Keypoint::new(
                        (kp.x * self.width).round(),
                        (kp.y * self.height).round(),
                        kp.visibility,
                    ),
                )
            })
            .collect()
    }
}
